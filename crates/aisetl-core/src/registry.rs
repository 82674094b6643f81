//! Compile-time transform registry.
//!
//! Worker crates contribute [`TransformSpec`] entries to a distributed slice;
//! the bootstrap selects one by its stable `kind` identifier. Linking a worker
//! crate into the final binary is what makes its transform available — there
//! is no runtime code loading of any form.

use std::sync::Arc;

use linkme::distributed_slice;
use thiserror::Error;

use crate::client::ObjectClient;
use crate::config::ServerConfig;
use crate::transform::Transform;

/// Everything a build function may draw on.
///
/// `config` is the descriptor's free-form `config` object; `client` is the
/// process-wide pooled object client (shared with the server; see
/// [`crate::client::ObjectClient`]).
pub struct BuildContext {
    /// Worker-specific configuration from the class-payload descriptor.
    pub config: serde_json::Value,
    /// Shared cluster client for workers that call back (recursive ETL).
    pub client: Arc<dyn ObjectClient>,
    /// The process server configuration.
    pub server: ServerConfig,
}

/// A transform build failure (bad worker config, missing environment).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BuildError(pub String);

impl BuildError {
    /// Creates a build error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Builds a transform instance from the build context.
pub type BuildFn = fn(&BuildContext) -> Result<Arc<dyn Transform>, BuildError>;

/// One registry entry: a stable identifier and its build function.
pub struct TransformSpec {
    /// Stable identifier selected by the class-payload descriptor.
    pub kind: &'static str,
    /// Build function invoked once at bootstrap.
    pub build: BuildFn,
}

/// Registry of transform implementations.
/// Each worker crate contributes one entry per transform it provides.
#[distributed_slice]
pub static TRANSFORMS: [TransformSpec];

/// Looks up a registered transform by kind.
pub fn find_transform(kind: &str) -> Option<&'static TransformSpec> {
    TRANSFORMS.iter().find(|spec| spec.kind == kind)
}

/// All registered kinds, for diagnostics.
pub fn registered_kinds() -> Vec<&'static str> {
    TRANSFORMS.iter().map(|spec| spec.kind).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformResult;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct Upper;

    #[async_trait]
    impl Transform for Upper {
        async fn transform(
            &self,
            payload: Bytes,
            _path: &str,
            _etl_args: &str,
        ) -> TransformResult<Bytes> {
            Ok(Bytes::from(payload.to_ascii_uppercase()))
        }
    }

    fn build_upper(_ctx: &BuildContext) -> Result<Arc<dyn Transform>, BuildError> {
        Ok(Arc::new(Upper))
    }

    #[distributed_slice(TRANSFORMS)]
    static UPPER_SPEC: TransformSpec = TransformSpec {
        kind: "test-upper",
        build: build_upper,
    };

    #[test]
    fn test_find_registered_kind() {
        let spec = find_transform("test-upper").expect("registered in this module");
        assert_eq!(spec.kind, "test-upper");
        assert!(registered_kinds().contains(&"test-upper"));
    }

    #[test]
    fn test_unknown_kind() {
        assert!(find_transform("no-such-kind").is_none());
    }
}
