//! Seeded-hash transform: the response is the lowercase hex xxhash64 digest
//! of the payload.
//!
//! The seed comes from `etl_args` when it parses as an unsigned integer;
//! otherwise the configured default applies (`seed_default` in the descriptor
//! config, or the `SEED_DEFAULT` environment variable, or `0`). An
//! unparseable seed is not an error — it is logged and the default is used.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use linkme::distributed_slice;
use tracing::warn;
use twox_hash::XxHash64;

use aisetl_core::{
    BuildContext, BuildError, TRANSFORMS, Transform, TransformResult, TransformSpec,
};

/// Environment variable holding the fallback seed.
pub const SEED_DEFAULT: &str = "SEED_DEFAULT";

/// The seeded-hash transform.
pub struct HashWithArgs {
    default_seed: u64,
}

impl HashWithArgs {
    /// Creates the transform with an explicit default seed.
    pub fn new(default_seed: u64) -> Self {
        Self { default_seed }
    }

    fn seed_for(&self, etl_args: &str) -> u64 {
        if etl_args.is_empty() {
            return self.default_seed;
        }
        match etl_args.parse() {
            Ok(seed) => seed,
            Err(_) => {
                warn!(
                    etl_args = %etl_args,
                    default_seed = self.default_seed,
                    "Invalid seed in etl_args, using default",
                );
                self.default_seed
            }
        }
    }
}

#[async_trait]
impl Transform for HashWithArgs {
    fn content_type(&self) -> &str {
        "text/plain"
    }

    async fn transform(
        &self,
        payload: Bytes,
        _path: &str,
        etl_args: &str,
    ) -> TransformResult<Bytes> {
        let digest = XxHash64::oneshot(self.seed_for(etl_args), &payload);
        Ok(Bytes::from(format!("{digest:016x}")))
    }
}

fn build(ctx: &BuildContext) -> Result<Arc<dyn Transform>, BuildError> {
    let default_seed = match ctx.config.get("seed_default") {
        Some(value) => value
            .as_u64()
            .ok_or_else(|| BuildError::new("seed_default must be an unsigned integer"))?,
        None => match std::env::var(SEED_DEFAULT) {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid SEED_DEFAULT, falling back to 0");
                0
            }),
            Err(_) => 0,
        },
    };
    Ok(Arc::new(HashWithArgs::new(default_seed)))
}

#[distributed_slice(TRANSFORMS)]
static HASH_WITH_ARGS: TransformSpec = TransformSpec {
    kind: "hash-with-args",
    build,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_digest() {
        // xxhash64 of the empty input under seed 0.
        let out = HashWithArgs::new(0)
            .transform(Bytes::new(), "x", "")
            .await
            .unwrap();
        assert_eq!(&out[..], b"ef46db3751d8e999");
    }

    #[tokio::test]
    async fn test_digest_shape_and_determinism() {
        let hash = HashWithArgs::new(0);
        let a = hash.transform(Bytes::from_static(b"a"), "x", "42").await.unwrap();
        let b = hash.transform(Bytes::from_static(b"a"), "x", "42").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.iter().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_seed_changes_digest() {
        let hash = HashWithArgs::new(0);
        let unseeded = hash.transform(Bytes::from_static(b"a"), "x", "").await.unwrap();
        let seeded = hash.transform(Bytes::from_static(b"a"), "x", "42").await.unwrap();
        assert_ne!(unseeded, seeded);
    }

    #[tokio::test]
    async fn test_invalid_seed_falls_back_to_default() {
        let hash = HashWithArgs::new(7);
        let explicit = hash.transform(Bytes::from_static(b"a"), "x", "7").await.unwrap();
        let fallback = hash
            .transform(Bytes::from_static(b"a"), "x", "not-a-seed")
            .await
            .unwrap();
        assert_eq!(explicit, fallback);
    }

    #[test]
    fn test_registered() {
        assert!(aisetl_core::find_transform("hash-with-args").is_some());
    }
}
