//! Supervised WebSocket connection with reconnect and heartbeat.
//!
//! The supervisor task owns the socket for its whole life: dial,
//! connected read/write loop, backoff wait, redial. Callers interact
//! through channels only — outbound messages in, decoded server
//! messages out, connection state on a watch channel. Messages sent
//! while disconnected are dropped with a warning rather than queued;
//! the resync-on-rejoin protocol makes replay unnecessary.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use matinee_core::{ReconnectPolicy, SessionId, VotingError};
use matinee_protocol::{ClientMessage, ServerMessage};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;

/// Observable state of the managed connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// A dial or handshake is in flight.
    Connecting,
    /// The socket is up and messages flow.
    Connected,
    /// The socket is down; a retry may be pending or exhausted.
    Disconnected,
}

/// Why the connected loop ended.
enum Closed {
    /// Shutdown was requested; do not reconnect.
    Cancelled,
    /// The transport failed; reconnect per policy.
    Dropped(String),
}

/// Handle to a supervised coordinator connection.
///
/// Dropping the handle does not tear down the socket; call
/// [`ConnectionManager::shutdown`] for a clean close.
pub struct ConnectionManager {
    outbound: mpsc::Sender<ClientMessage>,
    retry: mpsc::Sender<()>,
    state: watch::Receiver<ConnectionState>,
    /// Session last joined through this connection. Re-issued as
    /// `JOIN_SESSION` after every reconnect so the server resends full
    /// current state.
    session: Arc<Mutex<Option<SessionId>>>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Dial `url` and keep the connection alive per `policy`.
    ///
    /// Returns the manager handle and the stream of decoded server
    /// messages. The supervisor task runs until [`shutdown`] is called.
    ///
    /// [`shutdown`]: ConnectionManager::shutdown
    #[must_use]
    pub fn connect(
        url: String,
        policy: ReconnectPolicy,
        heartbeat_interval: Duration,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (retry_tx, retry_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();
        let session = Arc::new(Mutex::new(None));

        let _ = tokio::spawn(supervise(
            url,
            policy,
            heartbeat_interval,
            state_tx,
            outbound_rx,
            inbound_tx,
            retry_rx,
            Arc::clone(&session),
            cancel.clone(),
        ));

        (
            Self {
                outbound: outbound_tx,
                retry: retry_tx,
                state: state_rx,
                session,
                cancel,
            },
            inbound_rx,
        )
    }

    /// A watch receiver tracking the connection state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Whether the socket is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    /// Send a message to the coordinator.
    ///
    /// Dropped with a warning when the connection is down or the
    /// outbound queue is full.
    pub fn send(&self, message: ClientMessage) {
        match &message {
            ClientMessage::JoinSession { session_id } => {
                *self.session.lock() = Some(session_id.clone());
            }
            ClientMessage::LeaveSession { .. } => {
                *self.session.lock() = None;
            }
        }
        if !self.is_connected() {
            warn!(?message, "not connected, dropping outbound message");
            return;
        }
        if let Err(err) = self.outbound.try_send(message) {
            warn!(error = %err, "outbound queue full, dropping message");
        }
    }

    /// Restart the reconnect cycle immediately, resetting the attempt
    /// counter. The escape hatch after the policy is exhausted.
    pub fn retry_now(&self) {
        let _ = self.retry.try_send(());
    }

    /// Close the connection and stop the supervisor.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    url: String,
    policy: ReconnectPolicy,
    heartbeat_interval: Duration,
    state_tx: watch::Sender<ConnectionState>,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    inbound_tx: mpsc::Sender<ServerMessage>,
    mut retry_rx: mpsc::Receiver<()>,
    session: Arc<Mutex<Option<SessionId>>>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    // The first connect is not a REconnect; the caller joins explicitly.
    let mut rejoin = false;
    loop {
        let _ = state_tx.send(ConnectionState::Connecting);
        let dialed = tokio::select! {
            result = connect_async(&url) => result,
            () = cancel.cancelled() => return,
        };

        match dialed {
            Ok((ws, _)) => {
                attempt = 0;
                info!(%url, "connected");
                let _ = state_tx.send(ConnectionState::Connected);
                let resync = if rejoin {
                    session.lock().clone()
                } else {
                    None
                };
                rejoin = true;
                let closed = run_connection(
                    ws,
                    resync,
                    &mut outbound_rx,
                    &inbound_tx,
                    heartbeat_interval,
                    &cancel,
                )
                .await;
                let _ = state_tx.send(ConnectionState::Disconnected);
                match closed {
                    Closed::Cancelled => return,
                    Closed::Dropped(reason) => {
                        let err = VotingError::ConnectionLost { reason };
                        warn!(code = err.code(), error = %err, "connection lost");
                    }
                }
            }
            Err(err) => {
                let _ = state_tx.send(ConnectionState::Disconnected);
                warn!(error = %err, attempt, "connect failed");
            }
        }

        match policy.delay_for(attempt) {
            Some(delay_ms) => {
                debug!(attempt, delay_ms, "scheduling reconnect");
                tokio::select! {
                    () = time::sleep(Duration::from_millis(delay_ms)) => attempt += 1,
                    triggered = retry_rx.recv() => {
                        if triggered.is_none() {
                            return;
                        }
                        attempt = 0;
                    }
                    () = cancel.cancelled() => return,
                }
            }
            None => {
                let err = VotingError::ReconnectExhausted {
                    attempts: policy.max_attempts,
                };
                warn!(code = err.code(), error = %err, "waiting for manual retry");
                tokio::select! {
                    triggered = retry_rx.recv() => {
                        if triggered.is_none() {
                            return;
                        }
                        attempt = 0;
                    }
                    () = cancel.cancelled() => return,
                }
            }
        }
    }
}

/// The connected read/write loop. Pings on the heartbeat interval,
/// answers server pings, and forwards frames both ways until the
/// transport drops or shutdown is requested.
///
/// `resync` is the session to re-join after a reconnect; the server
/// answers with full current state.
async fn run_connection(
    ws: WsStream,
    resync: Option<SessionId>,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    inbound_tx: &mpsc::Sender<ServerMessage>,
    heartbeat_interval: Duration,
    cancel: &CancellationToken,
) -> Closed {
    let (mut write, mut read) = ws.split();

    if let Some(session_id) = resync {
        debug!(%session_id, "re-joining session after reconnect");
        let join = ClientMessage::JoinSession { session_id };
        match serde_json::to_string(&join) {
            Ok(text) => {
                if let Err(err) = write.send(Message::text(text)).await {
                    return Closed::Dropped(err.to_string());
                }
            }
            Err(err) => warn!(error = %err, "failed to encode rejoin message"),
        }
    }

    let mut heartbeat = time::interval(heartbeat_interval);
    // The first tick completes immediately; consume it so the first
    // ping goes out one interval after connect.
    let _ = heartbeat.tick().await;

    loop {
        tokio::select! {
            message = outbound_rx.recv() => match message {
                Some(message) => match serde_json::to_string(&message) {
                    Ok(text) => {
                        if let Err(err) = write.send(Message::text(text)).await {
                            return Closed::Dropped(err.to_string());
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to encode outbound message"),
                },
                None => return Closed::Cancelled,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(message) => {
                            if inbound_tx.send(message).await.is_err() {
                                return Closed::Cancelled;
                            }
                        }
                        Err(err) => warn!(error = %err, "undecodable server frame"),
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(err) = write.send(Message::Pong(payload)).await {
                        return Closed::Dropped(err.to_string());
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    return Closed::Dropped("server closed the connection".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Closed::Dropped(err.to_string()),
                None => return Closed::Dropped("stream ended".to_string()),
            },
            _ = heartbeat.tick() => {
                if let Err(err) = write.send(Message::Ping(Vec::new().into())).await {
                    return Closed::Dropped(err.to_string());
                }
            },
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Closed::Cancelled;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use matinee_core::SessionId;
    use matinee_core::UserId;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }

    fn user_joined_text(user: &str) -> String {
        serde_json::to_string(&ServerMessage::UserJoined {
            user_id: UserId::from(user),
            username: user.to_string(),
        })
        .unwrap()
    }

    async fn wait_for_state(
        state: &mut watch::Receiver<ConnectionState>,
        wanted: ConnectionState,
    ) {
        while *state.borrow() != wanted {
            state.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn connects_and_exchanges_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::text(user_joined_text("ada"))).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    return text.as_str().to_string();
                }
            }
            String::new()
        });

        let (manager, mut inbound) = ConnectionManager::connect(
            format!("ws://{addr}"),
            fast_policy(5),
            Duration::from_secs(30),
        );

        let message = inbound.recv().await.unwrap();
        assert!(matches!(
            message,
            ServerMessage::UserJoined { ref user_id, .. } if user_id.as_str() == "ada"
        ));

        let mut state = manager.state();
        wait_for_state(&mut state, ConnectionState::Connected).await;
        manager.send(ClientMessage::JoinSession {
            session_id: SessionId::from("sess_1"),
        });

        let received = server.await.unwrap();
        assert!(received.contains("JOIN_SESSION"));
        assert!(received.contains("sess_1"));
        manager.shutdown();
    }

    #[tokio::test]
    async fn reconnects_after_server_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First connection is dropped right after the handshake.
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            drop(ws);

            // Second connection proves the client redialed.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::text(user_joined_text("back"))).await.unwrap();
            // Hold the socket open until the client hangs up.
            while ws.next().await.is_some() {}
        });

        let (manager, mut inbound) = ConnectionManager::connect(
            format!("ws://{addr}"),
            fast_policy(5),
            Duration::from_secs(30),
        );

        let message = inbound.recv().await.unwrap();
        assert!(matches!(
            message,
            ServerMessage::UserJoined { ref user_id, .. } if user_id.as_str() == "back"
        ));

        manager.shutdown();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn send_while_disconnected_drops_message() {
        // Nothing listens on this port; the dial fails immediately.
        let (manager, _inbound) = ConnectionManager::connect(
            "ws://127.0.0.1:1".to_string(),
            fast_policy(1),
            Duration::from_secs(30),
        );
        let mut state = manager.state();
        wait_for_state(&mut state, ConnectionState::Disconnected).await;

        assert!(!manager.is_connected());
        // Must not panic or block.
        manager.send(ClientMessage::LeaveSession {
            session_id: SessionId::from("sess_1"),
        });
        manager.shutdown();
    }

    #[tokio::test]
    async fn retry_now_restarts_an_exhausted_cycle() {
        // Reserve a port, then free it so the first dial fails.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (manager, mut inbound) = ConnectionManager::connect(
            format!("ws://{addr}"),
            fast_policy(1),
            Duration::from_secs(30),
        );

        // Let the single attempt fail and the policy exhaust.
        let mut state = manager.state();
        wait_for_state(&mut state, ConnectionState::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Bring the server up and trigger a manual retry.
        let listener = TcpListener::bind(addr).await.unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::text(user_joined_text("again"))).await.unwrap();
            while ws.next().await.is_some() {}
        });
        manager.retry_now();

        let message = inbound.recv().await.unwrap();
        assert!(matches!(message, ServerMessage::UserJoined { .. }));

        manager.shutdown();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejoins_bound_session_after_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First connection: wait for the explicit join, then drop.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if matches!(frame, Message::Text(_)) {
                    break;
                }
            }
            drop(ws);

            // Second connection: the client must re-join on its own.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if let Message::Text(text) = frame {
                    return text.as_str().to_string();
                }
            }
            String::new()
        });

        let (manager, _inbound) = ConnectionManager::connect(
            format!("ws://{addr}"),
            fast_policy(5),
            Duration::from_secs(30),
        );
        let mut state = manager.state();
        wait_for_state(&mut state, ConnectionState::Connected).await;
        manager.send(ClientMessage::JoinSession {
            session_id: SessionId::from("sess_42"),
        });

        let rejoin = server.await.unwrap();
        assert!(rejoin.contains("JOIN_SESSION"));
        assert!(rejoin.contains("sess_42"));
        manager.shutdown();
    }

    #[test]
    fn state_is_comparable() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(ConnectionState::Connecting, ConnectionState::Disconnected);
    }
}
