//! Identity transform: the response body is the request payload, unchanged.
//!
//! Mostly useful as a wire-contract probe — every transport feature (pull,
//! push, direct put, WebSocket framing) can be exercised against it and the
//! output compared byte for byte against the input.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use linkme::distributed_slice;

use aisetl_core::{
    BuildContext, BuildError, TRANSFORMS, Transform, TransformResult, TransformSpec,
};

/// The identity transform.
pub struct EchoTransform;

#[async_trait]
impl Transform for EchoTransform {
    async fn transform(
        &self,
        payload: Bytes,
        _path: &str,
        _etl_args: &str,
    ) -> TransformResult<Bytes> {
        Ok(payload)
    }
}

fn build(_ctx: &BuildContext) -> Result<Arc<dyn Transform>, BuildError> {
    Ok(Arc::new(EchoTransform))
}

#[distributed_slice(TRANSFORMS)]
static ECHO: TransformSpec = TransformSpec {
    kind: "echo",
    build,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_payload() {
        let payload = Bytes::from_static(b"hello");
        let out = EchoTransform
            .transform(payload.clone(), "bck/obj", "")
            .await
            .unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn test_echo_empty_payload() {
        let out = EchoTransform
            .transform(Bytes::new(), "", "")
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_registered() {
        assert!(aisetl_core::find_transform("echo").is_some());
    }
}
