//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON
//! wire format of the media-server configuration. Each type implements
//! [`Default`] with production default values, and `#[serde(default)]`
//! allows partial JSON — missing fields get their default value during
//! deserialization.

use matinee_core::ReconnectPolicy;
use serde::{Deserialize, Serialize};

/// Root settings type for the matinee coordinator.
///
/// Loaded from `~/.matinee/settings.json` with defaults applied for
/// missing fields. `MATINEE_*` environment variables can override
/// specific values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatineeSettings {
    /// Settings schema version.
    pub version: String,
    /// Server network settings.
    pub server: ServerSettings,
    /// Session and voting behavior settings.
    pub session: SessionSettings,
    /// Client transport settings.
    pub client: ClientSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for MatineeSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            session: SessionSettings::default(),
            client: ClientSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port serving both the REST routes and the WebSocket upgrade.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings to each connection.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this long without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// How long to wait for in-flight work during graceful shutdown.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 50,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Session and voting behavior settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Participant cap applied when a session does not set its own.
    pub default_max_participants: usize,
    /// Minimum allowed vote magnitude.
    pub vote_min: i8,
    /// Maximum allowed vote magnitude.
    pub vote_max: i8,
    /// How long a session survives without host liveness before the
    /// reaper closes it.
    pub host_grace_secs: u64,
    /// How often the stale-session reaper runs.
    pub reaper_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_max_participants: 8,
            vote_min: -1,
            vote_max: 1,
            host_grace_secs: 300,
            reaper_interval_secs: 60,
        }
    }
}

/// Client transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Reconnect policy for dropped connections.
    pub reconnect: ReconnectPolicy,
    /// Interval between client heartbeat pings while connected.
    pub heartbeat_interval_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval_ms: 30_000,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON-formatted log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
