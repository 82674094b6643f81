//! # aisetl-transport
//!
//! HTTP and WebSocket transports for the AIStore ETL web server, plus the
//! pooled outbound client.
//!
//! The server hosts exactly one [`aisetl_core::Transform`] instance and
//! exposes the uniform request contract over two transports:
//!
//! - **HTTP**: `GET /health`, pull-mode `GET /{path}`, push-mode
//!   `PUT /{path}`, with `etl_args` in the query string and direct-put/FQN
//!   overrides in reserved headers.
//! - **WebSocket**: `GET /ws` upgrades into a framed binary session
//!   (see [`frame`]) with strictly ordered request/response pairs.
//!
//! Outbound traffic (pull-mode fetch, direct-put delivery, cluster object
//! API) flows through one [`AisClient`] whose connection pool is shared with
//! workers doing recursive ETL calls.

pub mod client;
pub mod frame;
mod handler;
pub mod payload;
mod server;
mod websocket;

pub use client::{AisClient, DirectPutOutcome};
pub use handler::{DIRECT_PUT_HEADER, FQN_HEADER};
pub use server::{EtlServer, ServerState};
