//! Unified error types for the ETL runtime.
//!
//! Two layers: [`TransformError`] is what a transform raises, [`EtlError`] is
//! what the server boundary maps onto an HTTP status. Client-side failures
//! (object fetch, direct put, cluster calls) use [`ClientError`].

use thiserror::Error;

/// Transform failure messages are truncated to this many bytes before they
/// leave the process (error responses and error frames).
pub const MAX_ERROR_MESSAGE_BYTES: usize = 1024;

// =============================================================================
// Transform Errors
// =============================================================================

/// Errors a transform may raise.
///
/// Workers with richer failure vocabularies (media decoding, subprocess
/// handling) define their own enums and convert into this one.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// A required field of `etl_args` was absent.
    #[error("missing required argument: {field}")]
    ArgsMissing {
        /// Name of the missing field.
        field: String,
    },

    /// `etl_args` could not be decoded.
    #[error("invalid etl_args: {reason}")]
    ArgsInvalid {
        /// Reason the decode failed.
        reason: String,
    },

    /// The transform itself failed.
    #[error("{0}")]
    Failed(String),
}

impl TransformError {
    /// Creates an args-missing error for the given field.
    pub fn args_missing(field: impl Into<String>) -> Self {
        Self::ArgsMissing {
            field: field.into(),
        }
    }

    /// Creates an args-invalid error with the given reason.
    pub fn args_invalid(reason: impl Into<String>) -> Self {
        Self::ArgsInvalid {
            reason: reason.into(),
        }
    }

    /// Creates a generic transform failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

// =============================================================================
// Server-Boundary Errors
// =============================================================================

/// Request-level errors, classified into the runtime's error taxonomy.
///
/// Every handler catches, classifies, and maps through [`EtlError::http_status`];
/// the original exception context is logged where the error is raised.
#[derive(Debug, Error)]
pub enum EtlError {
    /// A required field of `etl_args` was absent.
    #[error("missing required argument: {field}")]
    ArgsMissing {
        /// Name of the missing field.
        field: String,
    },

    /// `etl_args` could not be decoded.
    #[error("invalid etl_args: {reason}")]
    ArgsInvalid {
        /// Reason the decode failed.
        reason: String,
    },

    /// Pull-mode fetch from the host target failed.
    #[error("failed to fetch source object from {url}: {reason}")]
    FetchFailed {
        /// The URL that was fetched.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The local file backing an FQN request is missing or unreadable.
    #[error("source file unavailable: {path}: {reason}")]
    FileUnavailable {
        /// The file path that was requested.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// The user transform failed; message already truncated.
    #[error("transform failed: {0}")]
    TransformFailed(String),

    /// Writing the result to the direct-put target failed after bytes were
    /// sent. Connect-stage failures fall back to an inline response instead.
    #[error("direct put to {url} failed: {reason}")]
    DirectPutFailed {
        /// The direct-put target URL.
        url: String,
        /// Reason for failure.
        reason: String,
    },
}

impl EtlError {
    /// The HTTP status this error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ArgsMissing { .. } | Self::ArgsInvalid { .. } => 400,
            Self::FetchFailed { .. } => 502,
            Self::FileUnavailable { .. } => 404,
            Self::TransformFailed(_) => 500,
            Self::DirectPutFailed { .. } => 502,
        }
    }

    /// Stable error-code string used in logs and error frames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ArgsMissing { .. } => "ARGS_MISSING",
            Self::ArgsInvalid { .. } => "ARGS_INVALID",
            Self::FetchFailed { .. } | Self::FileUnavailable { .. } => "PAYLOAD_UNAVAILABLE",
            Self::TransformFailed(_) => "TRANSFORM_FAILED",
            Self::DirectPutFailed { .. } => "DIRECT_PUT_FAILED",
        }
    }
}

impl From<TransformError> for EtlError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::ArgsMissing { field } => Self::ArgsMissing { field },
            TransformError::ArgsInvalid { reason } => Self::ArgsInvalid { reason },
            TransformError::Failed(msg) => Self::TransformFailed(truncate_message(&msg)),
        }
    }
}

/// Truncates a message to [`MAX_ERROR_MESSAGE_BYTES`] on a char boundary.
pub fn truncate_message(msg: &str) -> String {
    if msg.len() <= MAX_ERROR_MESSAGE_BYTES {
        return msg.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_BYTES;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    msg[..end].to_string()
}

// =============================================================================
// Client Errors
// =============================================================================

/// Errors from outbound HTTP operations (object fetch, direct put, cluster API).
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {reason}")]
    Request {
        /// Target URL.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The remote answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        /// Target URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Response body (best effort).
        body: String,
    },

    /// The client is not configured for this operation.
    #[error("client not configured: {0}")]
    NotConfigured(String),

    /// The underlying HTTP client could not be constructed.
    #[error("failed to initialize HTTP client: {0}")]
    Init(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transform operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for request handling.
pub type EtlResult<T> = Result<T, EtlError>;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
