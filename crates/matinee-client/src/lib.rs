//! # matinee-client
//!
//! Client-side WebSocket transport for the matinee coordinator.
//!
//! [`ConnectionManager`] owns a supervised connection to the
//! coordinator: it dials, forwards outbound [`ClientMessage`]s, decodes
//! inbound [`ServerMessage`]s onto a channel, pings on a heartbeat
//! interval while connected, and transparently reconnects with
//! exponential backoff when the transport drops. After a reconnect it
//! re-issues `JOIN_SESSION` for the session last joined, so the server
//! resends full current state. Once the reconnect policy is exhausted
//! it stays down until [`ConnectionManager::retry_now`] restarts the
//! cycle.
//!
//! [`ClientMessage`]: matinee_protocol::ClientMessage
//! [`ServerMessage`]: matinee_protocol::ServerMessage

#![deny(unsafe_code)]

pub mod connection;

pub use connection::{ConnectionManager, ConnectionState};
