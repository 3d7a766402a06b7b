//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured
//! logging is the caller's responsibility — these types carry the context
//! needed to build meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to the model runtime.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the runtime endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The runtime did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the runtime.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// NDJSON stream parsing or chunk-level error.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// The runtime returned a response with no usable payload.
    #[error("empty response: {what}")]
    EmptyResponse { what: String },
}

impl InferenceError {
    /// Whether this error is transient (connectivity, timeout, 5xx) rather
    /// than a malformed request. Transient errors are worth reporting to the
    /// user as "runtime unavailable" instead of a parse failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InferenceError::ConnectionFailed { .. }
                | InferenceError::Timeout { .. }
                | InferenceError::HttpError { status: 500..=599, .. }
        )
    }
}
