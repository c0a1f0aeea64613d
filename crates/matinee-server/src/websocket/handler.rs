//! Dispatch for incoming WebSocket text frames.

use std::sync::Arc;

use matinee_engine::SessionRoundEngine;
use matinee_protocol::{AckPayload, ClientMessage, ServerMessage};
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// Ack code for frames that cannot be decoded as a protocol message.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";

/// Handle one text frame from a connection.
///
/// Replies (ACK plus any resync messages) are queued on the connection
/// directly. On a successful join the replies are queued before the
/// session is bound, so broadcast fan-out can never jump ahead of the
/// resync.
pub async fn handle_text(
    text: &str,
    engine: &SessionRoundEngine,
    connection: &Arc<ClientConnection>,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(conn_id = %connection.id, error = %e, "undecodable frame");
            reply(
                connection,
                &ServerMessage::Ack {
                    ack: AckPayload::rejected(INVALID_MESSAGE, format!("invalid message: {e}")),
                },
            );
            return;
        }
    };

    match message {
        ClientMessage::JoinSession { session_id } => {
            match engine
                .join_session(
                    &session_id,
                    connection.user_id().clone(),
                    connection.username().to_string(),
                )
                .await
            {
                Ok(resync) => {
                    reply(
                        connection,
                        &ServerMessage::Ack {
                            ack: AckPayload::ok(),
                        },
                    );
                    for message in &resync {
                        reply(connection, message);
                    }
                    connection.bind_session(session_id.clone());
                    let _ = engine
                        .record_host_heartbeat(&session_id, connection.user_id())
                        .await;
                    debug!(conn_id = %connection.id, session_id = %session_id, "joined session");
                }
                Err(e) => {
                    debug!(conn_id = %connection.id, session_id = %session_id, error = %e, "join rejected");
                    reply(
                        connection,
                        &ServerMessage::Ack {
                            ack: AckPayload::rejected(e.code(), e.to_string()),
                        },
                    );
                }
            }
        }
        ClientMessage::LeaveSession { session_id } => {
            let ack = match engine.leave_session(&session_id, connection.user_id()).await {
                Ok(()) => {
                    connection.unbind_session();
                    AckPayload::ok()
                }
                Err(e) => AckPayload::rejected(e.code(), e.to_string()),
            };
            reply(connection, &ServerMessage::Ack { ack });
        }
    }
}

fn reply(connection: &Arc<ClientConnection>, message: &ServerMessage) {
    if !connection.send_message(message) {
        warn!(conn_id = %connection.id, "failed to queue reply");
    }
}
