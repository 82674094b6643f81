//! # aisetl
//!
//! Inline and offline object transformation against an AIStore cluster.
//!
//! A storage target streams object payloads to a per-pod transformer over
//! HTTP or WebSocket; the transformer runs a registered
//! [`Transform`](aisetl_core::Transform) and either returns the result
//! inline, PUTs it to a host-announced direct-put target, or answers on the
//! same WebSocket session.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────────┐     ┌─────────────────┐
//! │  aisetl-runtime  │────▶│  aisetl-transport │────▶│    Transform    │
//! │  (bootstrap,     │     │  (HTTP + WS       │     │  (registry of   │
//! │   config, exit   │     │   server, pooled  │     │   worker crates)│
//! │   codes)         │     │   client)         │     │                 │
//! └──────────────────┘     └───────────────────┘     └─────────────────┘
//! ```
//!
//! - **aisetl-core**: the transform contract, error taxonomy, compile-time
//!   registry, and the object-client seam.
//! - **aisetl-transport**: one server, two transports; direct-put and
//!   chunked streaming live here.
//! - **aisetl-runtime**: decodes `ETL_CLASS_PAYLOAD`, installs declared
//!   packages, and serves until shutdown.
//! - **Workers**: `echo`, `hash-with-args`, `audio-splitter`, and the
//!   fan-out `audio-manager` ship with the default build.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use aisetl::prelude::*;
//!
//! fn main() {
//!     LoggingBuilder::new().with_level(tracing::Level::INFO).init();
//!     let runtime = EtlRuntime::from_env().unwrap_or_else(|e| {
//!         std::process::exit(e.exit_code());
//!     });
//!     // ... build a tokio runtime and block_on(runtime.run())
//! }
//! ```

pub use aisetl_core::*;

pub use aisetl_runtime;
pub use aisetl_transport;

/// Prelude module for building and hosting transforms.
pub mod prelude {
    pub use aisetl_core::{
        BuildContext, BuildError, Bucket, EtlCall, ExecMode, ObjectClient, ServerConfig,
        Transform, TransformError, TransformResult, TransformSpec,
    };
    pub use aisetl_runtime::{EtlRuntime, LoggingBuilder};
    pub use aisetl_transport::{AisClient, EtlServer};
}
