//! Object-client seam between workers and the cluster.
//!
//! The transport crate provides the concrete pooled implementation; workers
//! only ever see this trait, handed to them at build time through the
//! registry. A worker must never construct its own HTTP client: recursive ETL
//! calls ride the same long-lived connection pool the server uses.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ClientResult;

/// A bucket reference: name plus backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Bucket name.
    pub name: String,
    /// Backend provider (e.g. `ais`, `aws`, `gcp`).
    pub provider: String,
}

impl Bucket {
    /// A native (`ais`-provider) bucket.
    pub fn ais(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: "ais".to_string(),
        }
    }

    /// Sets the provider.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }
}

/// An ETL invocation attached to an object read.
#[derive(Debug, Clone, Default)]
pub struct EtlCall {
    /// Registered name of the ETL to run on the object.
    pub name: String,
    /// Opaque per-request arguments, already URL-safe.
    pub args: Option<String>,
    /// Ask the cluster to direct-put the result instead of relaying it.
    pub direct: bool,
}

impl EtlCall {
    /// Creates a call to the named ETL.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
            direct: false,
        }
    }

    /// Attaches opaque arguments.
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }

    /// Enables direct-put delivery.
    pub fn direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }
}

/// Minimal object API a worker needs from the cluster.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Reads one object, optionally through an ETL.
    async fn get_object(
        &self,
        bucket: &Bucket,
        key: &str,
        etl: Option<&EtlCall>,
    ) -> ClientResult<Bytes>;

    /// Writes one object.
    async fn put_content(&self, bucket: &Bucket, key: &str, body: Bytes) -> ClientResult<()>;
}
