//! Invocation error taxonomy
//!
//! Every failure crossing the crate boundary is one of these classified
//! variants. Raw vendor bodies never appear here, only the extracted
//! vendor message with secrets scrubbed.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, InvokeError>;

/// Coarse error kind, useful for matching and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownProvider,
    ModeMismatch,
    Validation,
    Auth,
    RateLimit,
    ServerUnavailable,
    BadRequest,
    Timeout,
    StreamIncomplete,
    UnknownTransport,
    Configuration,
}

/// Errors that can occur while invoking a provider
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    #[error("unknown provider '{provider}'")]
    UnknownProvider { provider: String },

    #[error("mode mismatch: {message}")]
    ModeMismatch { message: String },

    #[error("invalid credential field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("server unavailable{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    ServerUnavailable { status: Option<u16>, message: String },

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("deadline exceeded after {after:?}")]
    Timeout { after: Duration },

    #[error("stream ended early after {chunks_received} chunk(s){}",
            .cause.as_ref().map(|c| format!(": {}", c)).unwrap_or_default())]
    StreamIncomplete {
        chunks_received: usize,
        cause: Option<Box<InvokeError>>,
    },

    #[error("transport error: {message}")]
    UnknownTransport { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl InvokeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvokeError::UnknownProvider { .. } => ErrorKind::UnknownProvider,
            InvokeError::ModeMismatch { .. } => ErrorKind::ModeMismatch,
            InvokeError::Validation { .. } => ErrorKind::Validation,
            InvokeError::Auth { .. } => ErrorKind::Auth,
            InvokeError::RateLimit { .. } => ErrorKind::RateLimit,
            InvokeError::ServerUnavailable { .. } => ErrorKind::ServerUnavailable,
            InvokeError::BadRequest { .. } => ErrorKind::BadRequest,
            InvokeError::Timeout { .. } => ErrorKind::Timeout,
            InvokeError::StreamIncomplete { .. } => ErrorKind::StreamIncomplete,
            InvokeError::UnknownTransport { .. } => ErrorKind::UnknownTransport,
            InvokeError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Whether the retry loop may attempt the call again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InvokeError::RateLimit { .. }
                | InvokeError::ServerUnavailable { .. }
                | InvokeError::UnknownTransport { .. }
        )
    }

    /// "Try again later" failures worth surfacing differently to end users
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InvokeError::RateLimit { .. } | InvokeError::ServerUnavailable { .. }
        )
    }

    /// Vendor-requested wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            InvokeError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        InvokeError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn mode_mismatch(message: impl Into<String>) -> Self {
        InvokeError::ModeMismatch {
            message: message.into(),
        }
    }
}
