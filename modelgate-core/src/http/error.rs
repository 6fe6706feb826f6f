//! Transport fault types and header parsing

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What went wrong below the HTTP status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Connection could not be established (DNS, refused, TLS)
    Connect,
    /// Connect, time-to-headers, or idle read timed out
    Timeout,
    /// Connection dropped or reset while in use
    Io,
    /// Response body could not be read or decoded
    Body,
    /// Response body exceeded the configured limit
    TooLarge,
    /// Client could not be built or the pool is shut down
    Setup,
    /// Anything reqwest could not attribute
    Other,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::Connect => "connect",
            FaultKind::Timeout => "timeout",
            FaultKind::Io => "io",
            FaultKind::Body => "body",
            FaultKind::TooLarge => "too_large",
            FaultKind::Setup => "setup",
            FaultKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A failure that happened before or while reading a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} fault: {message}")]
pub struct TransportFault {
    pub kind: FaultKind,
    pub message: String,
}

impl TransportFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(FaultKind::Timeout, format!("no response within {:?}", after))
    }

    /// Classify a reqwest error without leaking the request URL's query or headers
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FaultKind::Timeout
        } else if err.is_connect() {
            FaultKind::Connect
        } else if err.is_body() || err.is_decode() {
            FaultKind::Body
        } else if err.is_request() {
            FaultKind::Io
        } else if err.is_builder() {
            FaultKind::Setup
        } else {
            FaultKind::Other
        };
        Self::new(kind, root_cause(err))
    }

    /// Whether the pooled client behind this fault should be discarded
    pub fn evicts_client(&self) -> bool {
        matches!(
            self.kind,
            FaultKind::Connect | FaultKind::Timeout | FaultKind::Io | FaultKind::Body
        )
    }
}

/// Innermost error message; reqwest's own Display embeds the URL
fn root_cause(err: &reqwest::Error) -> String {
    let mut root: &dyn std::error::Error = err;
    while let Some(source) = root.source() {
        root = source;
    }
    root.to_string()
}

/// Parse a `Retry-After` header value given in delta-seconds
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let trimmed = header_value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // Some vendors send fractional seconds
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}
