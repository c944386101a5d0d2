//! HTTP/WebSocket API layer.
//!
//! Thin handlers that delegate to `voice-core`; this module only owns
//! router construction, shared state, and server startup.

pub mod http;
pub mod ws;

use std::sync::Arc;

use thiserror::Error;
use voice_core::lanes::LaneProducer;
use voice_core::session::session_loop::SharedResources;
use voice_core::session::SessionRegistry;
use voice_core::ServerLifecycle;

use crate::bootstrap::BootstrappedServices;

/// Errors that can occur when starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    #[error("no available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared state handed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedResources>,
    pub sessions: Arc<SessionRegistry>,
    pub lifecycle: Arc<ServerLifecycle>,
    pub reflex: Arc<dyn LaneProducer>,
    pub fallback: Arc<dyn LaneProducer>,
}

impl From<BootstrappedServices> for AppState {
    fn from(services: BootstrappedServices) -> Self {
        Self {
            shared: services.shared,
            sessions: services.sessions,
            lifecycle: services.lifecycle,
            reflex: services.reflex,
            fallback: services.fallback,
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the configured port range and serves the router until the
/// listener is closed.
pub async fn start_server(state: AppState, port: u16, port_range_end: u16) -> Result<(), ServerError> {
    let (bound_port, listener) = find_available_port(port, port_range_end).await?;
    tracing::info!(port = bound_port, "voice-server listening");

    let app = http::create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
