//! Pong-deadline liveness watchdog.
//!
//! The writer task pings on a fixed interval; every inbound frame
//! refreshes the connection's pong deadline. The watchdog only reads
//! that deadline: a participant is declared silent once the time since
//! the last pong exceeds the silence limit.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Why the watchdog stopped watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessVerdict {
    /// No pong arrived within the silence limit.
    WentSilent,
    /// The connection is being torn down for another reason.
    Cancelled,
}

/// Watch a connection's pong deadline until it is missed or the
/// connection is cancelled.
///
/// Checks every `check_every`; the deadline is missed when
/// `last_pong_elapsed` exceeds `silence_limit`. A freshly established
/// connection gets the full limit before its first pong is due.
pub async fn watch_liveness(
    connection: Arc<ClientConnection>,
    check_every: Duration,
    silence_limit: Duration,
    cancel: CancellationToken,
) -> LivenessVerdict {
    let mut ticker = time::interval(check_every);
    // The immediate first tick would see zero elapsed; skip it.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.last_pong_elapsed() > silence_limit {
                    return LivenessVerdict::WentSilent;
                }
            }
            () = cancel.cancelled() => {
                return LivenessVerdict::Cancelled;
            }
        }
    }
}
