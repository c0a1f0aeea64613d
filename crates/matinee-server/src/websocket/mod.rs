//! WebSocket transport: per-connection state, session fan-out,
//! heartbeat liveness, message dispatch, and the engine→socket event
//! bridge.

pub mod broadcast;
pub mod connection;
pub mod event_bridge;
pub mod handler;
pub mod heartbeat;
