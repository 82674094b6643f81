//! Environment-backed configuration loading.
//!
//! The server configuration is read from the environment exactly once at
//! process start and handed around as a plain struct; nothing else in the
//! workspace touches the environment after this point (workers receive their
//! own settings through the class-payload descriptor or their build fns).

use figment::Figment;
use figment::providers::Env;
use thiserror::Error;

use aisetl_core::ServerConfig;

/// The environment variables the server configuration is drawn from.
///
/// Names match `ServerConfig` field names, upper-cased.
const ENV_KEYS: &[&str] = &[
    "ais_target_url",
    "ais_endpoint",
    "arg_type",
    "listen_port",
    "num_workers",
    "chunk_size",
    "max_ws_message_bytes",
    "http_timeout",
    "max_pool_size",
    "direct_put",
    "fqn_root",
];

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable failed to parse into its field.
    #[error("failed to load configuration from environment: {0}")]
    Extract(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Loads the server configuration from the environment.
pub fn load_server_config() -> ConfigResult<ServerConfig> {
    Figment::new()
        .merge(Env::raw().only(ENV_KEYS))
        .extract()
        .map_err(|e| ConfigError::Extract(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aisetl_core::ArgType;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_with_empty_env() {
        figment::Jail::expect_with(|_jail| {
            let config = load_server_config().unwrap();
            assert_eq!(config.listen_port, 8000);
            assert_eq!(config.num_workers, 6);
            assert_eq!(config.arg_type, ArgType::Bytes);
            assert!(config.ais_target_url.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("AIS_TARGET_URL", "http://target:8081");
            jail.set_env("ARG_TYPE", "fqn");
            jail.set_env("CHUNK_SIZE", "65536");
            jail.set_env("NUM_WORKERS", "2");
            jail.set_env("DIRECT_PUT", "false");
            jail.set_env("FQN_ROOT", "/mnt/ais");
            let config = load_server_config().unwrap();
            assert_eq!(config.ais_target_url.as_deref(), Some("http://target:8081"));
            assert_eq!(config.arg_type, ArgType::Fqn);
            assert_eq!(config.chunk_size, 65536);
            assert_eq!(config.num_workers, 2);
            assert!(!config.direct_put);
            assert!(config.streaming_enabled());
            assert_eq!(config.fqn_root, PathBuf::from("/mnt/ais"));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LISTEN_PORT", "not-a-port");
            assert!(load_server_config().is_err());
            Ok(())
        });
    }
}
