//! # matinee-server
//!
//! The coordinator's network surface: an Axum server combining
//! WebSocket push (session events fanned out to participants) with a
//! small REST API (session creation, vote submission, results,
//! settings). All state lives in the
//! [`SessionRoundEngine`](matinee_engine::SessionRoundEngine); this
//! crate is transport.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod rest;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, MatineeServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
