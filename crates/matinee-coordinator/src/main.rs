//! # matinee-coordinator
//!
//! Voting coordinator binary — loads settings, builds the session
//! engine, and starts the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use matinee_engine::{EngineConfig, SessionRoundEngine};
use matinee_server::{MatineeServer, ServerConfig};
use matinee_settings::MatineeSettings;
use tracing_subscriber::EnvFilter;

/// Matinee voting coordinator.
#[derive(Parser, Debug)]
#[command(name = "matinee-coordinator", about = "Matinee voting coordinator")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings if specified, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.matinee/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn init_logging(settings: &MatineeSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn engine_config(settings: &MatineeSettings) -> EngineConfig {
    EngineConfig {
        vote_min: settings.session.vote_min,
        vote_max: settings.session.vote_max,
        default_max_participants: settings.session.default_max_participants,
        ..EngineConfig::default()
    }
}

fn server_config(settings: &MatineeSettings, cli: &Cli) -> ServerConfig {
    ServerConfig {
        host: cli.host.clone().unwrap_or_else(|| settings.server.host.clone()),
        port: cli.port.unwrap_or(settings.server.port),
        max_connections: settings.server.max_connections,
        heartbeat_interval_secs: settings.server.heartbeat_interval_secs,
        heartbeat_timeout_secs: settings.server.heartbeat_timeout_secs,
        max_message_size: settings.server.max_message_size,
        host_grace_secs: settings.session.host_grace_secs,
        reaper_interval_secs: settings.session.reaper_interval_secs,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(matinee_settings::settings_path);
    let settings =
        matinee_settings::load_settings_from_path(&settings_path).unwrap_or_default();

    init_logging(&settings);

    let engine = Arc::new(SessionRoundEngine::new(engine_config(&settings)));
    let config = server_config(&settings, &args);
    let shutdown_timeout =
        std::time::Duration::from_millis(settings.server.shutdown_timeout_ms);

    let server = MatineeServer::new(config, engine);
    let handle = server.start().await.context("Failed to bind server")?;
    tracing::info!("matinee coordinator listening on http://{}", handle.addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    tokio::time::timeout(shutdown_timeout.max(std::time::Duration::from_secs(1)), async {
        handle.shutdown().await;
    })
    .await
    .ok();

    tracing::info!("Shutdown complete");
    Ok(())
}
