//! Container entrypoint.
//!
//! Bootstraps the process from the environment and serves until shutdown.
//! The worker-thread count comes from `NUM_WORKERS`, so the tokio runtime is
//! built by hand after the (synchronous) bootstrap has read the config.

use tracing::error;

use aisetl_runtime::{EtlRuntime, LoggingBuilder};

fn main() {
    LoggingBuilder::new()
        .with_level(tracing::Level::INFO)
        .init();

    let runtime = match EtlRuntime::from_env() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Bootstrap failed");
            std::process::exit(e.exit_code());
        }
    };

    let tokio_runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(runtime.num_workers())
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to build runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio_runtime.block_on(runtime.run()) {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
