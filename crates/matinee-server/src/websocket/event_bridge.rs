//! Bridges engine session events onto WebSocket connections.

use std::sync::Arc;

use matinee_engine::SessionEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::broadcast::BroadcastManager;

/// Spawn the event bridge task.
///
/// Forwards every [`SessionEvent`] from the engine's broadcast stream
/// to the connections bound to that session. Runs until cancelled or
/// the event stream closes.
pub fn spawn(
    manager: Arc<BroadcastManager>,
    mut events: broadcast::Receiver<SessionEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("event bridge cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Ok(SessionEvent { session_id, message }) => {
                        manager.broadcast_to_session(&session_id, &message).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event bridge lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("event stream closed, stopping bridge");
                        break;
                    }
                },
            }
        }
    })
}
