//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use matinee_core::{SessionId, UserId};
use matinee_protocol::ServerMessage;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Represents a connected WebSocket participant.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Identity supplied at upgrade time.
    user_id: UserId,
    /// Display name supplied at upgrade time.
    username: String,
    /// Bound session ID (set on `JOIN_SESSION`).
    session_id: Mutex<Option<SessionId>>,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// When the last pong (or any inbound frame) arrived.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, user_id: UserId, username: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id,
            username,
            session_id: Mutex::new(None),
            tx,
            connected_at: now,
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// The participant identity behind this connection.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Display name supplied at upgrade time.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Bind this connection to a session.
    pub fn bind_session(&self, session_id: SessionId) {
        *self.session_id.lock() = Some(session_id);
    }

    /// Drop the session binding.
    pub fn unbind_session(&self) {
        *self.session_id.lock() = None;
    }

    /// Get the current bound session ID.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.lock().clone()
    }

    /// Send pre-serialized text to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a protocol message and send it to the client.
    pub fn send_message(&self, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total messages dropped for this connection.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity (pong or any frame), refreshing the
    /// liveness deadline.
    pub fn record_activity(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    #[must_use]
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matinee_protocol::AckPayload;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new("conn_1".into(), UserId::from("u1"), "ada".into(), tx);
        (conn, rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.id, "conn_1");
        assert_eq!(conn.user_id().as_str(), "u1");
        assert_eq!(conn.username(), "ada");
        assert!(conn.session_id().is_none());
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection();
        let sent = conn.send(Arc::new("hello".into()));
        assert!(sent);
        let msg = rx.recv().await.unwrap();
        assert_eq!(&**msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new("conn_2".into(), UserId::from("u1"), "ada".into(), tx);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new("conn_3".into(), UserId::from("u1"), "ada".into(), tx);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn bind_and_unbind_session() {
        let (conn, _rx) = make_connection();
        assert!(conn.session_id().is_none());
        conn.bind_session(SessionId::from("sess_42"));
        assert_eq!(conn.session_id().unwrap().as_str(), "sess_42");
        conn.unbind_session();
        assert!(conn.session_id().is_none());
    }

    #[test]
    fn activity_refreshes_pong_deadline() {
        let (conn, _rx) = make_connection();
        std::thread::sleep(Duration::from_millis(15));
        let before = conn.last_pong_elapsed();
        assert!(before >= Duration::from_millis(15));
        conn.record_activity();
        assert!(conn.last_pong_elapsed() < before);
    }

    #[tokio::test]
    async fn send_message_serializes_wire_shape() {
        let (conn, mut rx) = make_connection();
        let sent = conn.send_message(&ServerMessage::Ack {
            ack: AckPayload::ok(),
        });
        assert!(sent);
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "ACK");
        assert_eq!(parsed["payload"]["success"], true);
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }
}
