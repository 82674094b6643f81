//! The transform capability contract.
//!
//! A transform is the unit of user logic the server hosts: it receives the
//! complete logical object (buffered, or as a chunked reader when it opts into
//! streaming), the object path, and the opaque `etl_args` string, and produces
//! the transformed bytes.
//!
//! The server never imposes a schema on `etl_args`; by convention workers
//! URL-decode it and parse JSON, but that is entirely their business.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::error::{EtlError, TransformError, TransformResult};

/// MIME type advertised when a transform does not override [`Transform::content_type`].
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// How a transform's body behaves with respect to the scheduler.
///
/// This is the deploy-time capability flag that replaces the choice between a
/// thread-per-request server and an event-loop server: the server stays async
/// and places each call where it belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// The transform awaits at its suspension points and never blocks the
    /// I/O scheduler. Runs directly on the server's runtime.
    #[default]
    Cooperative,
    /// The transform blocks (CPU-bound work, subprocess I/O). Runs on the
    /// blocking worker pool.
    Blocking,
}

// =============================================================================
// Streaming handles
// =============================================================================

/// Byte stream feeding a [`ChunkReader`].
pub type PayloadStream = BoxStream<'static, Result<Bytes, EtlError>>;

/// Reader handle for streaming transforms.
///
/// Re-chunks the underlying payload stream so that every chunk handed to the
/// transform has exactly the configured size, except the final one.
pub struct ChunkReader {
    stream: PayloadStream,
    chunk_size: usize,
    pending: BytesMut,
    exhausted: bool,
}

impl ChunkReader {
    /// Wraps a payload stream, re-chunking to `chunk_size` bytes.
    pub fn new(stream: PayloadStream, chunk_size: usize) -> Self {
        Self {
            stream,
            chunk_size: chunk_size.max(1),
            pending: BytesMut::new(),
            exhausted: false,
        }
    }

    /// Returns the next chunk, or `None` once the payload is fully consumed.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, EtlError>> {
        while !self.exhausted && self.pending.len() < self.chunk_size {
            match self.stream.next().await {
                Some(Ok(bytes)) => self.pending.extend_from_slice(&bytes),
                Some(Err(err)) => return Some(Err(err)),
                None => self.exhausted = true,
            }
        }
        if self.pending.is_empty() {
            return None;
        }
        let take = self.pending.len().min(self.chunk_size);
        Some(Ok(self.pending.split_to(take).freeze()))
    }

    /// Drains the remaining payload into a single buffer.
    pub async fn read_all(&mut self) -> Result<Bytes, EtlError> {
        let mut buf = std::mem::take(&mut self.pending);
        while let Some(item) = self.stream.next().await {
            buf.extend_from_slice(&item?);
        }
        self.exhausted = true;
        Ok(buf.freeze())
    }
}

/// Writer handle for streaming transforms.
///
/// Chunks written here flow into the response body (or the direct-put body)
/// as they are produced.
pub struct ChunkWriter {
    tx: mpsc::Sender<Bytes>,
}

impl ChunkWriter {
    /// Creates a writer and the receiving half the server drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Writes one output chunk. Fails when the peer is gone (client
    /// disconnect); the transform should stop producing.
    pub async fn write(&mut self, chunk: Bytes) -> TransformResult<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| TransformError::failed("output stream closed"))
    }
}

// =============================================================================
// Transform trait
// =============================================================================

/// A user-defined object transformation hosted by the ETL server.
///
/// One instance serves the whole process and is shared across concurrent
/// requests; implementations must be safe under that sharing. The instance is
/// built once at bootstrap from the registry (see [`crate::registry`]) and
/// must behave deterministically with respect to `(payload, path, etl_args)`.
#[async_trait]
pub trait Transform: Send + Sync {
    /// MIME type advertised on inline responses.
    fn content_type(&self) -> &str {
        DEFAULT_CONTENT_TYPE
    }

    /// Scheduling capability of [`Transform::transform`].
    fn exec_mode(&self) -> ExecMode {
        ExecMode::Cooperative
    }

    /// Whether this transform prefers the chunked reader/writer form.
    ///
    /// Only honored when the server's chunk size is non-zero; otherwise the
    /// payload is buffered and [`Transform::transform`] is called once.
    fn wants_stream(&self) -> bool {
        false
    }

    /// Transforms one complete object.
    async fn transform(&self, payload: Bytes, path: &str, etl_args: &str)
    -> TransformResult<Bytes>;

    /// Streaming alternative, selected when [`Transform::wants_stream`] holds
    /// and chunking is enabled. The default buffers the payload and delegates
    /// to [`Transform::transform`].
    async fn transform_stream(
        &self,
        reader: &mut ChunkReader,
        writer: &mut ChunkWriter,
        path: &str,
        etl_args: &str,
    ) -> TransformResult<()> {
        let payload = reader
            .read_all()
            .await
            .map_err(|e| TransformError::failed(e.to_string()))?;
        let out = self.transform(payload, path, etl_args).await?;
        writer.write(out).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn payload_stream(parts: Vec<&'static [u8]>) -> PayloadStream {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p)))).boxed()
    }

    #[tokio::test]
    async fn test_chunk_reader_rechunks() {
        let mut reader = ChunkReader::new(payload_stream(vec![b"abcd", b"ef", b"ghij"]), 3);
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().await {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks, vec![&b"abc"[..], &b"def"[..], &b"ghi"[..], &b"j"[..]]);
    }

    #[tokio::test]
    async fn test_chunk_reader_read_all() {
        let mut reader = ChunkReader::new(payload_stream(vec![b"hello ", b"world"]), 4);
        // A chunk already pulled must not be lost by read_all.
        let first = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(&first[..], b"hell");
        let rest = reader.read_all().await.unwrap();
        assert_eq!(&rest[..], b"o world");
    }

    #[tokio::test]
    async fn test_chunk_reader_empty_stream() {
        let mut reader = ChunkReader::new(payload_stream(vec![]), 8);
        assert!(reader.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_chunk_writer_closed_peer() {
        let (mut writer, rx) = ChunkWriter::channel(1);
        drop(rx);
        assert!(writer.write(Bytes::from_static(b"x")).await.is_err());
    }
}
