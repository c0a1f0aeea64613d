//! HTTP/WebSocket server wiring.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use futures::{SinkExt, StreamExt};
use matinee_core::UserId;
use matinee_engine::SessionRoundEngine;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::health::health_check;
use crate::rest;
use crate::shutdown::{DEFAULT_DRAIN_TIMEOUT, ShutdownCoordinator};
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::connection::ClientConnection;
use crate::websocket::event_bridge;
use crate::websocket::handler;
use crate::websocket::heartbeat::{LivenessVerdict, watch_liveness};

/// Per-connection outbound queue depth.
const OUTBOUND_CAPACITY: usize = 256;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    /// Session/round coordination engine.
    pub engine: Arc<SessionRoundEngine>,
    /// WebSocket fan-out.
    pub broadcast: Arc<BroadcastManager>,
    /// Shutdown coordination.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server start time, for uptime reporting.
    pub start_time: Instant,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

/// The matinee coordination server.
pub struct MatineeServer {
    config: ServerConfig,
    engine: Arc<SessionRoundEngine>,
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ServerHandle {
    /// Bound address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Shut the server down and wait for its tasks to drain.
    pub async fn shutdown(self) {
        self.shutdown.drain(DEFAULT_DRAIN_TIMEOUT).await;
    }
}

impl MatineeServer {
    /// Create a server over an existing engine.
    #[must_use]
    pub fn new(config: ServerConfig, engine: Arc<SessionRoundEngine>) -> Self {
        Self { config, engine }
    }

    /// Bind and start serving. Returns once the listener is bound.
    pub async fn start(self) -> std::io::Result<ServerHandle> {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let state = AppState {
            engine: Arc::clone(&self.engine),
            broadcast: Arc::new(BroadcastManager::new()),
            shutdown: Arc::clone(&shutdown),
            start_time: Instant::now(),
            config: Arc::new(self.config.clone()),
        };

        let listener =
            TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "server listening");

        shutdown.register(event_bridge::spawn(
            Arc::clone(&state.broadcast),
            state.engine.subscribe(),
            shutdown.token(),
        ));
        shutdown.register(spawn_reaper(
            Arc::clone(&state.engine),
            self.config.host_grace_secs,
            self.config.reaper_interval_secs,
            shutdown.token(),
        ));

        let app = router(state);
        let token = shutdown.token();
        shutdown.register(tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        }));

        Ok(ServerHandle { addr, shutdown })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/sessions", post(rest::create_session))
        .route("/sessions/{id}", patch(rest::update_session))
        .route("/sessions/{id}/results", get(rest::get_results))
        .route("/sessions/{id}/rounds", post(rest::start_round))
        .route(
            "/sessions/{id}/rounds/current/complete",
            post(rest::end_round),
        )
        .route("/votes", post(rest::cast_vote))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.broadcast.connection_count().await;
    let sessions = state.engine.session_count();
    Json(health_check(state.start_time, connections, sessions))
}

/// Identity carried on the WebSocket upgrade request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsQuery {
    user_id: UserId,
    username: String,
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.broadcast.connection_count().await >= state.config.max_connections {
        warn!(max = state.config.max_connections, "connection limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, query.user_id, query.username))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: UserId, username: String) {
    let conn_id = format!("conn_{}", Uuid::now_v7());
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(OUTBOUND_CAPACITY);
    let conn = Arc::new(ClientConnection::new(
        conn_id.clone(),
        user_id,
        username,
        tx,
    ));
    state.broadcast.add(Arc::clone(&conn)).await;
    info!(conn_id = %conn_id, user_id = %conn.user_id(), "client connected");

    let cancel = state.shutdown.token().child_token();
    let (mut sink, mut stream) = socket.split();

    // Writer: outbound queue plus periodic pings.
    let writer_cancel = cancel.clone();
    let ping_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(text) => {
                        if sink.send(Message::Text((*text).clone().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Watchdog: close the connection when pongs stop arriving.
    let hb_cancel = cancel.clone();
    let hb_conn = Arc::clone(&conn);
    let hb_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let hb_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let watchdog = tokio::spawn(async move {
        let verdict = watch_liveness(
            Arc::clone(&hb_conn),
            hb_interval,
            hb_timeout,
            hb_cancel.clone(),
        )
        .await;
        if verdict == LivenessVerdict::WentSilent {
            warn!(conn_id = %hb_conn.id, "pong deadline missed, closing connection");
            hb_cancel.cancel();
        }
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    conn.record_activity();
                    handler::handle_text(text.as_str(), &state.engine, &conn).await;
                }
                Some(Ok(Message::Pong(_))) => {
                    conn.record_activity();
                    if let Some(session_id) = conn.session_id() {
                        let _ = state
                            .engine
                            .record_host_heartbeat(&session_id, conn.user_id())
                            .await;
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    // axum answers pings automatically
                    conn.record_activity();
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Binary(_))) => {
                    debug!(conn_id = %conn.id, "ignoring binary frame");
                }
                Some(Err(e)) => {
                    debug!(conn_id = %conn.id, error = %e, "read error");
                    break;
                }
            },
            () = cancel.cancelled() => break,
        }
    }

    cancel.cancel();
    let _ = writer.await;
    let _ = watchdog.await;
    // Roster membership is kept; the client can resync on reconnect.
    state.broadcast.remove(&conn.id).await;
    info!(conn_id = %conn.id, dropped = conn.drop_count(), "client disconnected");
}

/// Periodically close sessions whose host has gone silent.
fn spawn_reaper(
    engine: Arc<SessionRoundEngine>,
    host_grace_secs: u64,
    reaper_interval_secs: u64,
    cancel: tokio_util::sync::CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let grace = chrono::Duration::seconds(host_grace_secs.min(i64::MAX as u64) as i64);
        let mut interval =
            tokio::time::interval(Duration::from_secs(reaper_interval_secs.max(1)));
        let _ = interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let closed = engine.close_stale_sessions(grace).await;
                    if closed > 0 {
                        info!(closed, "stale sessions closed");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use matinee_engine::EngineConfig;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState {
            engine: Arc::new(SessionRoundEngine::new(EngineConfig::default())),
            broadcast: Arc::new(BroadcastManager::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            config: Arc::new(ServerConfig::default()),
        }
    }

    #[tokio::test]
    async fn health_route_ok() {
        let app = router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn unknown_route_404() {
        let app = router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_session_via_rest() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"hostId":"host_1","username":"ada"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["hostId"], "host_1");
        assert!(!body["sessionId"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn vote_against_unknown_session_404() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/votes")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"sessionId":"missing","userId":"u1","mediaId":"m1","value":1}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn results_before_any_round_409() {
        let state = test_state();
        let session_id =
            state
                .engine
                .create_session(UserId::from("host"), "host".into(), None);
        let app = router(state);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{session_id}/results"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn start_round_requires_host() {
        let state = test_state();
        let session_id =
            state
                .engine
                .create_session(UserId::from("host"), "host".into(), None);
        let app = router(state);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/sessions/{session_id}/rounds"))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"userId":"not_host","mediaOptions":["m1","m2"]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn ws_upgrade_requires_identity() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/ws")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // Missing query params rejected before the upgrade
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
