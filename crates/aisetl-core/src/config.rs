//! Server configuration.
//!
//! One [`ServerConfig`] is constructed from the environment at process start
//! (see the runtime crate) and passed down explicitly; nothing reads the
//! environment after startup and the struct never changes for the lifetime of
//! the process.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Streaming chunk size when `CHUNK_SIZE` is not set.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// How the server obtains the source payload in pull mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// Fetch the object bytes from the host target over HTTP.
    #[default]
    Bytes,
    /// Interpret the request path as a local filesystem path and read it.
    Fqn,
}

/// Process-wide server configuration.
///
/// Field names double as the environment variable names (upper-cased) the
/// runtime reads them from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL used to fetch objects in pull mode (`AIS_TARGET_URL`).
    pub ais_target_url: Option<String>,
    /// Cluster URL for workers that call back into the cluster (`AIS_ENDPOINT`).
    pub ais_endpoint: Option<String>,
    /// Payload-source mode (`ARG_TYPE`).
    pub arg_type: ArgType,
    /// TCP port the server binds (`LISTEN_PORT`).
    pub listen_port: u16,
    /// Runtime worker-thread count (`NUM_WORKERS`).
    pub num_workers: usize,
    /// Streaming chunk size in bytes; `0` disables streaming entirely
    /// (`CHUNK_SIZE`).
    pub chunk_size: usize,
    /// Maximum accepted WebSocket message size (`MAX_WS_MESSAGE_BYTES`).
    pub max_ws_message_bytes: usize,
    /// Timeout for outbound HTTP calls, in seconds (`HTTP_TIMEOUT`).
    pub http_timeout: u64,
    /// Maximum idle connections per host in the pooled client (`MAX_POOL_SIZE`).
    pub max_pool_size: usize,
    /// Whether this deployment advertises direct-put support (`DIRECT_PUT`).
    pub direct_put: bool,
    /// Root directory FQN payload paths must resolve under (`FQN_ROOT`).
    pub fqn_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ais_target_url: None,
            ais_endpoint: None,
            arg_type: ArgType::Bytes,
            listen_port: 8000,
            num_workers: 6,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_ws_message_bytes: 16 * 1024 * 1024 * 1024,
            http_timeout: 60,
            max_pool_size: 100,
            direct_put: true,
            fqn_root: PathBuf::from("/"),
        }
    }
}

impl ServerConfig {
    /// Outbound HTTP timeout as a [`Duration`].
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    /// Whether chunked streaming is enabled for streaming-capable transforms.
    pub fn streaming_enabled(&self) -> bool {
        self.chunk_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.arg_type, ArgType::Bytes);
        assert_eq!(config.listen_port, 8000);
        assert_eq!(config.num_workers, 6);
        assert_eq!(config.max_ws_message_bytes, 17_179_869_184);
        assert_eq!(config.http_timeout(), Duration::from_secs(60));
        assert!(config.direct_put);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.streaming_enabled());
    }

    #[test]
    fn test_zero_chunk_size_disables_streaming() {
        let config = ServerConfig {
            chunk_size: 0,
            ..ServerConfig::default()
        };
        assert!(!config.streaming_enabled());
    }

    #[test]
    fn test_arg_type_from_lowercase() {
        let arg: ArgType = serde_json::from_str("\"fqn\"").unwrap();
        assert_eq!(arg, ArgType::Fqn);
    }
}
