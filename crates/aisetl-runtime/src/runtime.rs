//! Runtime orchestration.
//!
//! [`EtlRuntime::from_env`] performs the full bootstrap — package installs,
//! configuration, client, transform — and [`EtlRuntime::run`] serves until a
//! shutdown signal arrives.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use aisetl_core::{ObjectClient, ServerConfig, Transform};
use aisetl_transport::{AisClient, EtlServer};

use crate::bootstrap::{self, BootstrapResult};
use crate::config::load_server_config;
use crate::packages;

/// A fully bootstrapped ETL process, ready to serve.
pub struct EtlRuntime {
    config: ServerConfig,
    client: Arc<AisClient>,
    transform: Arc<dyn Transform>,
}

impl EtlRuntime {
    /// Bootstraps from the environment.
    ///
    /// Order matters and mirrors the container contract: packages first (the
    /// transform may depend on them at build time), then configuration, the
    /// shared client, and finally the transform named by the class payload.
    pub fn from_env() -> BootstrapResult<Self> {
        packages::install_from_env()?;

        let mut config = load_server_config()?;
        let payload = bootstrap::load_from_env()?;
        // Direct-put must be advertised by both the deployment and the ETL.
        config.direct_put = config.direct_put && payload.direct_put;

        let client = Arc::new(AisClient::new(&config)?);
        let shared: Arc<dyn ObjectClient> = client.clone();
        let transform = bootstrap::build_transform(&payload, shared, &config)?;

        info!(
            kind = %payload.kind,
            port = config.listen_port,
            workers = config.num_workers,
            direct_put = config.direct_put,
            "Bootstrap complete",
        );
        Ok(Self {
            config,
            client,
            transform,
        })
    }

    /// Assembles a runtime from already-built parts.
    pub fn new(config: ServerConfig, transform: Arc<dyn Transform>, client: Arc<AisClient>) -> Self {
        Self {
            config,
            client,
            transform,
        }
    }

    /// Worker-thread count for the tokio runtime.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers.max(1)
    }

    /// Serves until ctrl-c or SIGTERM.
    pub async fn run(self) -> std::io::Result<()> {
        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            signal_token.cancel();
        });

        let server = EtlServer::new(self.config, self.transform, self.client);
        server.serve(shutdown).await
    }
}

/// Waits for shutdown signals (ctrl-c or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received ctrl-c, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received ctrl-c, shutting down");
    }
}
