//! voice-server - standalone WebSocket host for the voice interaction
//! orchestrator core.

mod api;
mod bootstrap;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use voice_core::Lifecycle;

use crate::api::{start_server, AppState};
use crate::bootstrap::bootstrap_services;
use crate::config::ServerConfig;

/// Headless WebSocket host for the voice interaction orchestrator.
#[derive(Parser, Debug)]
#[command(name = "voice-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter (e.g. "info", "voice_core=debug,voice_server=info").
    #[arg(short, long, default_value = "info", env = "VOICE_LOG")]
    log: String,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "VOICE_BIND_PORT")]
    port: Option<u16>,

    /// Knowledge directory (overrides config file).
    #[arg(short = 'k', long, env = "VOICE_KNOWLEDGE_DIR")]
    knowledge_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting voice-server");

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(dir) = args.knowledge_dir {
        config.knowledge_dir = Some(dir);
    }

    let services = bootstrap_services(&config).context("failed to bootstrap services")?;
    tracing::info!("services bootstrapped");

    let sessions = services.sessions.clone();
    let lifecycle_for_sweep = services.lifecycle.clone();
    let sweep_interval_ms = config.core.session_gc_interval_ms;
    let idle_timeout_ms = config.core.session_idle_timeout_ms;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(sweep_interval_ms));
        loop {
            interval.tick().await;
            if !lifecycle_for_sweep.is_ready() {
                break;
            }
            let expired = sessions.sweep_expired_with_timeout(idle_timeout_ms);
            for session_id in &expired {
                sessions.remove(session_id);
            }
            if !expired.is_empty() {
                tracing::debug!(count = expired.len(), "swept idle sessions");
            }
        }
    });

    let app_state = AppState::from(services);
    let bind_port = config.bind_port;
    let bind_port_range_end = config.bind_port_range_end;

    let server_handle = tokio::spawn(async move {
        if let Err(err) = start_server(app_state, bind_port, bind_port_range_end).await {
            tracing::error!(error = %err, "server error");
        }
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    server_handle.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
