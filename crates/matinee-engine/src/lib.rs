//! # matinee-engine
//!
//! The authoritative session/round state machine and vote aggregation.
//!
//! - **Model**: `Session`, `Round`, `Vote`, `Participant` and their
//!   status enums
//! - **Aggregator**: pure per-option totals, percentages, statistics,
//!   and deterministic winner selection
//! - **Engine**: [`SessionRoundEngine`] — the single mutator of session
//!   state. Mutations for one session are serialized behind a
//!   per-session lock; sessions proceed independently. State-change
//!   events are published on a `tokio::sync::broadcast` channel under
//!   that lock, so subscribers see one session's events in exactly the
//!   order its mutations committed.

#![deny(unsafe_code)]

pub mod aggregator;
pub mod engine;
pub mod model;

pub use engine::{EngineConfig, SessionEvent, SessionRoundEngine, VoteOutcome};
pub use model::{Participant, Round, RoundStatus, Session, SessionStatus, Vote};
