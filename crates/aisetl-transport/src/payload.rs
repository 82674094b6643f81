//! Payload acquisition for FQN requests.
//!
//! In FQN mode the transformer reads the source object from the local
//! filesystem (a volume shared with the host) instead of receiving it over
//! HTTP. Every resolved path must stay under the configured root; a path that
//! escapes it is treated as unavailable, not as an authorization error.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures::StreamExt;
use tokio_util::io::ReaderStream;

use aisetl_core::{EtlError, EtlResult, PayloadStream};

/// Resolves a raw FQN against the allowed root.
///
/// The raw path is taken relative to the root whether or not it starts with a
/// slash; parent-directory components are rejected outright so a request can
/// never traverse out of the root lexically.
pub fn resolve_fqn(root: &Path, raw: &str) -> EtlResult<PathBuf> {
    let relative = Path::new(raw.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => {
                return Err(EtlError::FileUnavailable {
                    path: raw.to_string(),
                    reason: "path escapes the allowed root".to_string(),
                });
            }
        }
    }
    Ok(resolved)
}

/// Reads a complete FQN payload.
pub async fn read_fqn(root: &Path, raw: &str) -> EtlResult<Bytes> {
    let path = resolve_fqn(root, raw)?;
    tokio::fs::read(&path)
        .await
        .map(Bytes::from)
        .map_err(|e| EtlError::FileUnavailable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Opens an FQN payload as a byte stream.
pub async fn open_fqn_stream(root: &Path, raw: &str) -> EtlResult<PayloadStream> {
    let path = resolve_fqn(root, raw)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| EtlError::FileUnavailable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    let display = path.display().to_string();
    Ok(ReaderStream::new(file)
        .map(move |item| {
            item.map(Bytes::from).map_err(|e| EtlError::FileUnavailable {
                path: display.clone(),
                reason: e.to_string(),
            })
        })
        .boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_inside_root() {
        let resolved = resolve_fqn(Path::new("/mnt/ais"), "/bck/obj.wav").unwrap();
        assert_eq!(resolved, PathBuf::from("/mnt/ais/bck/obj.wav"));
    }

    #[test]
    fn test_resolve_relative() {
        let resolved = resolve_fqn(Path::new("/mnt/ais"), "bck/obj.wav").unwrap();
        assert_eq!(resolved, PathBuf::from("/mnt/ais/bck/obj.wav"));
    }

    #[test]
    fn test_reject_parent_traversal() {
        let err = resolve_fqn(Path::new("/mnt/ais"), "/bck/../../etc/passwd").unwrap_err();
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), "PAYLOAD_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = read_fqn(Path::new("/mnt/ais"), "/no/such/object").await.unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[tokio::test]
    async fn test_read_existing_file() {
        let dir = std::env::temp_dir().join(format!("aisetl-fqn-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("obj.bin"), b"payload").unwrap();
        let bytes = read_fqn(&dir, "/obj.bin").await.unwrap();
        assert_eq!(&bytes[..], b"payload");
        std::fs::remove_dir_all(&dir).ok();
    }
}
