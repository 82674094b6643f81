//! The ETL web server.
//!
//! One axum application serves both transports:
//!
//! ```text
//! GET  /health   → liveness literal, never touches the transform
//! GET  /{*path}  → inline transform, pull mode
//! PUT  /{*path}  → inline transform, push mode
//! GET  /ws       → WebSocket upgrade, framed session transport
//! ```
//!
//! The server owns the single [`Transform`] instance and the pooled
//! [`AisClient`]; each request owns nothing beyond its own buffers.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use aisetl_core::{ServerConfig, Transform};

use crate::client::AisClient;
use crate::handler::{handle_get, handle_put};
use crate::websocket::ws_upgrade;

/// State shared by every request handler.
pub struct ServerState {
    /// The process-wide transform instance.
    pub transform: Arc<dyn Transform>,
    /// Immutable process configuration.
    pub config: ServerConfig,
    /// The pooled outbound client (fetch, direct put, cluster API).
    pub client: Arc<AisClient>,
}

/// The ETL web server: router construction plus the serve loop.
pub struct EtlServer {
    state: Arc<ServerState>,
}

impl EtlServer {
    /// Creates a server for one transform instance.
    pub fn new(config: ServerConfig, transform: Arc<dyn Transform>, client: Arc<AisClient>) -> Self {
        Self {
            state: Arc::new(ServerState {
                transform,
                config,
                client,
            }),
        }
    }

    /// Builds the axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/ws", get(ws_upgrade))
            .route("/", get(handle_get).put(handle_put))
            .route("/{*path}", get(handle_get).put(handle_put))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured port and serves until the token is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.state.config.listen_port));
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already-bound listener until the token is cancelled.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(addr = %addr, "ETL server listening");

        let router = self.router();
        tokio::select! {
            result = axum::serve(listener, router) => {
                result?;
            }
            () = shutdown.cancelled() => {
                info!(addr = %addr, "ETL server shutting down");
            }
        }
        Ok(())
    }
}

/// Liveness endpoint. Shares nothing with the transform path.
async fn health() -> &'static str {
    "Running"
}
