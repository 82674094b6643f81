//! # aisetl-core
//!
//! Core abstractions for the AIStore ETL web-server runtime.
//!
//! This crate defines the seams everything else plugs into:
//!
//! - [`Transform`] — the user-transform capability contract, including the
//!   chunked streaming form and the blocking/cooperative scheduling flag.
//! - [`registry`] — the compile-time registry of transform implementations,
//!   keyed by a stable identifier.
//! - [`ObjectClient`] — the minimal cluster API workers consume for
//!   recursive ETL calls.
//! - [`ServerConfig`] — the immutable process configuration.
//! - The error taxonomy ([`TransformError`], [`EtlError`], [`ClientError`]).
//!
//! The transport crate implements the server and the concrete client; the
//! runtime crate wires everything together at bootstrap.

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod transform;

pub use client::{Bucket, EtlCall, ObjectClient};
pub use config::{ArgType, DEFAULT_CHUNK_SIZE, ServerConfig};
pub use error::{
    ClientError, ClientResult, EtlError, EtlResult, MAX_ERROR_MESSAGE_BYTES, TransformError,
    TransformResult, truncate_message,
};
pub use registry::{BuildContext, BuildError, TRANSFORMS, TransformSpec, find_transform};
pub use transform::{
    ChunkReader, ChunkWriter, DEFAULT_CONTENT_TYPE, ExecMode, PayloadStream, Transform,
};
