//! Class-payload decoding and transform materialization.
//!
//! `ETL_CLASS_PAYLOAD` carries a base64-encoded JSON descriptor:
//!
//! ```json
//! {"kind": "audio-splitter", "variant": "fastapi", "direct_put": true, "config": {}}
//! ```
//!
//! `kind` selects from the compile-time transform registry — the process can
//! only ever run code that was linked into it, so a descriptor naming
//! anything else is rejected outright. `variant` survives from older
//! descriptors that chose between server implementations; every supported
//! value maps onto the one unified server.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use aisetl_core::{
    BuildContext, ClientError, ObjectClient, ServerConfig, Transform, find_transform,
    registry::registered_kinds,
};

use crate::config::ConfigError;

/// Environment variable carrying the encoded descriptor.
pub const ETL_CLASS_PAYLOAD: &str = "ETL_CLASS_PAYLOAD";

/// Server variants accepted from legacy descriptors.
const KNOWN_VARIANTS: &[&str] = &["fastapi", "flask", "http"];

/// The decoded class-payload descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassPayload {
    /// Registry identifier of the transform to run.
    pub kind: String,
    /// Legacy server-variant selector; all supported values map onto the
    /// unified server.
    #[serde(default)]
    pub variant: Option<String>,
    /// Per-ETL direct-put advertisement.
    #[serde(default = "default_true")]
    pub direct_put: bool,
    /// Free-form worker configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_true() -> bool {
    true
}

/// Errors that end the bootstrap; each maps to a process exit code.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// `ETL_CLASS_PAYLOAD` was absent or empty.
    #[error("ETL_CLASS_PAYLOAD is not set")]
    MissingPayload,

    /// The payload was not base64, not JSON, or not a descriptor.
    #[error("failed to decode class payload: {0}")]
    InvalidPayload(String),

    /// A runtime or OS package failed to install.
    #[error("package installation failed: {0}")]
    PackageInstall(String),

    /// The descriptor named something that is not a registered transform.
    #[error("rejected class payload: {0}")]
    UnsafePayload(String),

    /// The descriptor named a server variant this runtime does not provide.
    #[error("unsupported server variant: {0}")]
    UnsupportedVariant(String),

    /// The transform's build function failed.
    #[error("failed to build transform: {0}")]
    Build(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The outbound client could not be constructed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl BootstrapError {
    /// The process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingPayload
            | Self::InvalidPayload(_)
            | Self::Build(_)
            | Self::Config(_)
            | Self::Client(_) => 1,
            Self::PackageInstall(_) => 2,
            Self::UnsafePayload(_) => 3,
            Self::UnsupportedVariant(_) => 4,
        }
    }
}

/// Result type for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Reads and decodes the descriptor from the environment.
pub fn load_from_env() -> BootstrapResult<ClassPayload> {
    let raw = std::env::var(ETL_CLASS_PAYLOAD).unwrap_or_default();
    if raw.is_empty() {
        return Err(BootstrapError::MissingPayload);
    }
    decode_class_payload(&raw)
}

/// Decodes a base64 JSON descriptor.
pub fn decode_class_payload(raw: &str) -> BootstrapResult<ClassPayload> {
    let bytes = BASE64
        .decode(raw.trim())
        .map_err(|e| BootstrapError::InvalidPayload(format!("invalid base64: {e}")))?;
    let payload: ClassPayload = serde_json::from_slice(&bytes)
        .map_err(|e| BootstrapError::InvalidPayload(format!("invalid descriptor: {e}")))?;
    validate_variant(&payload)?;
    Ok(payload)
}

fn validate_variant(payload: &ClassPayload) -> BootstrapResult<()> {
    match payload.variant.as_deref() {
        None => Ok(()),
        Some(v) if KNOWN_VARIANTS.contains(&v) => Ok(()),
        Some(v) => Err(BootstrapError::UnsupportedVariant(v.to_string())),
    }
}

/// Materializes the transform named by the descriptor.
///
/// The registry lookup is the safety boundary: a descriptor can only select
/// among transforms compiled into this binary.
pub fn build_transform(
    payload: &ClassPayload,
    client: Arc<dyn ObjectClient>,
    server: &ServerConfig,
) -> BootstrapResult<Arc<dyn Transform>> {
    let spec = find_transform(&payload.kind).ok_or_else(|| {
        BootstrapError::UnsafePayload(format!(
            "'{}' is not a registered transform (registered: {})",
            payload.kind,
            registered_kinds().join(", "),
        ))
    })?;
    info!(kind = %payload.kind, "Building transform");
    let ctx = BuildContext {
        config: payload.config.clone(),
        client,
        server: server.clone(),
    };
    (spec.build)(&ctx).map_err(|e| BootstrapError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    use aisetl_core::{Bucket, ClientResult, EtlCall};

    fn encode(json: &str) -> String {
        BASE64.encode(json.as_bytes())
    }

    struct NullClient;

    #[async_trait]
    impl ObjectClient for NullClient {
        async fn get_object(
            &self,
            _bucket: &Bucket,
            _key: &str,
            _etl: Option<&EtlCall>,
        ) -> ClientResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn put_content(
            &self,
            _bucket: &Bucket,
            _key: &str,
            _body: Bytes,
        ) -> ClientResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_decode_minimal_descriptor() {
        let payload = decode_class_payload(&encode(r#"{"kind":"echo"}"#)).unwrap();
        assert_eq!(payload.kind, "echo");
        assert_eq!(payload.variant, None);
        assert!(payload.direct_put);
    }

    #[test]
    fn test_decode_full_descriptor() {
        let json = r#"{"kind":"hash-with-args","variant":"fastapi","direct_put":false,"config":{"seed_default":7}}"#;
        let payload = decode_class_payload(&encode(json)).unwrap();
        assert_eq!(payload.kind, "hash-with-args");
        assert_eq!(payload.variant.as_deref(), Some("fastapi"));
        assert!(!payload.direct_put);
        assert_eq!(payload.config["seed_default"], 7);
    }

    #[test]
    fn test_bad_base64_exits_1() {
        let err = decode_class_payload("%%%not-base64%%%").unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidPayload(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_bad_json_exits_1() {
        let err = decode_class_payload(&encode("not json")).unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidPayload(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_unknown_variant_exits_4() {
        let err =
            decode_class_payload(&encode(r#"{"kind":"echo","variant":"twisted"}"#)).unwrap_err();
        assert!(matches!(err, BootstrapError::UnsupportedVariant(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_legacy_variants_accepted() {
        for variant in ["fastapi", "flask", "http"] {
            let json = format!(r#"{{"kind":"echo","variant":"{variant}"}}"#);
            assert!(decode_class_payload(&encode(&json)).is_ok());
        }
    }

    #[test]
    fn test_unregistered_kind_is_unsafe_and_exits_3() {
        let payload = decode_class_payload(&encode(r#"{"kind":"arbitrary-code"}"#)).unwrap();
        let err = match build_transform(&payload, Arc::new(NullClient), &ServerConfig::default()) {
            Err(err) => err,
            Ok(_) => panic!("expected build_transform to fail"),
        };
        assert!(matches!(err, BootstrapError::UnsafePayload(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[cfg(feature = "worker-echo")]
    #[test]
    fn test_registered_kind_builds() {
        let payload = decode_class_payload(&encode(r#"{"kind":"echo"}"#)).unwrap();
        let transform =
            build_transform(&payload, Arc::new(NullClient), &ServerConfig::default()).unwrap();
        assert_eq!(transform.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_missing_payload_exits_1() {
        assert_eq!(BootstrapError::MissingPayload.exit_code(), 1);
        assert_eq!(
            BootstrapError::PackageInstall("pip3 exited with 1".into()).exit_code(),
            2,
        );
    }
}
