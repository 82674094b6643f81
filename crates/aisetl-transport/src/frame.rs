//! WebSocket wire format.
//!
//! Request frames are binary with a length-prefixed header followed by the
//! payload; all integers are big-endian:
//!
//! ```text
//! u32 path_len | path_bytes
//! u32 args_len | args_bytes
//! u32 dp_len   | dp_bytes          (empty = no direct put)
//! payload_bytes...
//! ```
//!
//! Response frames carry one status byte (`0` ok, `1` error) followed by the
//! transformed payload or a UTF-8 error message.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Status byte of a successful response frame.
pub const STATUS_OK: u8 = 0;
/// Status byte of an error response frame.
pub const STATUS_ERR: u8 = 1;

/// A malformed request frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame ended inside a length prefix or a declared field.
    #[error("frame truncated")]
    Truncated,

    /// A header field was not valid UTF-8.
    #[error("frame field is not valid UTF-8: {field}")]
    InvalidUtf8 {
        /// Which field failed to decode.
        field: &'static str,
    },
}

/// One decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsRequest {
    /// Object path.
    pub path: String,
    /// Opaque per-request arguments (may be empty).
    pub etl_args: String,
    /// Direct-put target URL, when the host requests direct delivery.
    pub direct_put_url: Option<String>,
    /// The object payload.
    pub payload: Bytes,
}

impl WsRequest {
    /// Decodes a binary frame.
    pub fn decode(mut data: Bytes) -> Result<Self, FrameError> {
        let path = take_string(&mut data, "path")?;
        let etl_args = take_string(&mut data, "etl_args")?;
        let dp = take_string(&mut data, "direct_put_url")?;
        let direct_put_url = if dp.is_empty() { None } else { Some(dp) };
        Ok(Self {
            path,
            etl_args,
            direct_put_url,
            payload: data,
        })
    }

    /// Encodes this request as a binary frame.
    pub fn encode(&self) -> Bytes {
        let dp = self.direct_put_url.as_deref().unwrap_or("");
        let mut buf = BytesMut::with_capacity(
            12 + self.path.len() + self.etl_args.len() + dp.len() + self.payload.len(),
        );
        put_field(&mut buf, self.path.as_bytes());
        put_field(&mut buf, self.etl_args.as_bytes());
        put_field(&mut buf, dp.as_bytes());
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

fn put_field(buf: &mut BytesMut, field: &[u8]) {
    buf.put_u32(field.len() as u32);
    buf.put_slice(field);
}

fn take_string(data: &mut Bytes, field: &'static str) -> Result<String, FrameError> {
    if data.len() < 4 {
        return Err(FrameError::Truncated);
    }
    let len_bytes = data.split_to(4);
    let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if data.len() < len {
        return Err(FrameError::Truncated);
    }
    let raw = data.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8 { field })
}

/// Encodes a success response frame.
pub fn encode_ok(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(STATUS_OK);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encodes an error response frame.
pub fn encode_err(message: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + message.len());
    buf.put_u8(STATUS_ERR);
    buf.put_slice(message.as_bytes());
    buf.freeze()
}
