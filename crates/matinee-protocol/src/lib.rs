//! # matinee-protocol
//!
//! Wire vocabulary exchanged between clients and the session
//! coordinator: message kinds, payload shapes, and the
//! acknowledgment/error envelope.
//!
//! Every frame is `{ "type": KIND, "payload": { ... } }` with
//! SCREAMING_SNAKE kinds and camelCase payload fields. The protocol is
//! transport-agnostic — any reliable-ordered transport works — and
//! guarantees nothing across reconnects: a client re-issues
//! `JOIN_SESSION` after reconnecting and the server resends full current
//! state using the same kinds.

#![deny(unsafe_code)]

pub mod messages;

pub use messages::{
    AckError, AckPayload, ClientMessage, OptionResult, RoundInfo, RoundResults, ServerMessage,
    VoteStats,
};
