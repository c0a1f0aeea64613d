//! # matinee-core
//!
//! Foundation types for the matinee voting coordinator.
//!
//! This crate provides the shared vocabulary the other matinee crates
//! depend on:
//!
//! - **Branded IDs**: `SessionId`, `RoundId`, `UserId`, `MediaId` as
//!   newtypes for type safety
//! - **Errors**: the closed [`VotingError`] set via `thiserror`, with
//!   wire-format error codes
//! - **Backoff**: reconnect policy and delay calculation for the client
//!   connection manager

#![deny(unsafe_code)]

pub mod backoff;
pub mod errors;
pub mod ids;

pub use backoff::ReconnectPolicy;
pub use errors::VotingError;
pub use ids::{MediaId, RoundId, SessionId, UserId};
