//! # aisetl-runtime
//!
//! Bootstrap and process orchestration for the AIStore ETL web server.
//!
//! The container entrypoint (`aisetl-bootstrap`) drives this crate:
//!
//! 1. Install declared runtime/OS packages ([`packages`]).
//! 2. Load the immutable [`aisetl_core::ServerConfig`] from the environment
//!    ([`config`]).
//! 3. Decode `ETL_CLASS_PAYLOAD` and materialize the transform it names from
//!    the compile-time registry ([`bootstrap`]).
//! 4. Serve over HTTP and WebSocket until a shutdown signal ([`runtime`]).
//!
//! Failures map onto the container exit-code contract: `1` for a bad or
//! missing payload (or any other bootstrap failure), `2` for a package
//! install failure, `3` for a payload naming an unregistered transform, `4`
//! for an unsupported server variant.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod packages;
pub mod runtime;

pub use bootstrap::{BootstrapError, BootstrapResult, ClassPayload};
pub use config::{ConfigError, load_server_config};
pub use logging::LoggingBuilder;
pub use runtime::EtlRuntime;

// Linking a worker crate is what contributes its transforms to the registry.
#[cfg(feature = "worker-audio-manager")]
use aisetl_worker_audio_manager as _;
#[cfg(feature = "worker-audio-splitter")]
use aisetl_worker_audio_splitter as _;
#[cfg(feature = "worker-echo")]
use aisetl_worker_echo as _;
#[cfg(feature = "worker-hash")]
use aisetl_worker_hash as _;
