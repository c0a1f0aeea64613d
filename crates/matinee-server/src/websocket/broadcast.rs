//! Session event fan-out to connected WebSocket participants.

use std::collections::HashMap;
use std::sync::Arc;

use matinee_core::SessionId;
use matinee_protocol::ServerMessage;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// Manages message broadcasting to connected participants.
pub struct BroadcastManager {
    /// Connected participants indexed by connection ID.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
}

impl BroadcastManager {
    /// Create a new broadcast manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
    }

    /// Remove a connection by ID.
    pub async fn remove(&self, connection_id: &str) {
        let mut conns = self.connections.write().await;
        let _ = conns.remove(connection_id);
    }

    /// Broadcast a message to all connections bound to the given
    /// session. The message is serialized once and shared.
    pub async fn broadcast_to_session(&self, session_id: &SessionId, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize session message");
                return;
            }
        };
        let conns = self.connections.read().await;
        let mut recipients = 0;
        for conn in conns.values() {
            if conn.session_id().as_ref() == Some(session_id) {
                recipients += 1;
                if !conn.send(Arc::clone(&json)) {
                    warn!(conn_id = %conn.id, session_id = %session_id, "failed to send to participant");
                }
            }
        }
        debug!(session_id = %session_id, recipients, "broadcast to session");
    }

    /// Number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Get connections bound to a specific session.
    pub async fn session_connections(&self, session_id: &SessionId) -> Vec<Arc<ClientConnection>> {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|c| c.session_id().as_ref() == Some(session_id))
            .cloned()
            .collect()
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}
