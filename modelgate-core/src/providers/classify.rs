//! Vendor failure classification
//!
//! Maps HTTP statuses, vendor error bodies, transport faults, and in-stream
//! error payloads onto the fixed [`InvokeError`] taxonomy. Only the vendor's
//! `error.message` survives into the error, scrubbed and truncated.

use crate::config::scrub;
use crate::http::{FaultKind, RawResponse, TransportFault};
use crate::providers::error::InvokeError;
use serde_json::Value;
use std::time::Duration;

/// Longest vendor message carried into an error
const MAX_MESSAGE_CHARS: usize = 512;

/// What a vendor error body says about its cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodySignal {
    Auth,
    RateLimit,
    Overloaded,
    InvalidRequest,
}

/// Error mapper for converting vendor failures to the common taxonomy
pub struct ErrorMapper;

impl ErrorMapper {
    /// Classify a non-2xx response
    pub fn from_response(response: &RawResponse, secret: Option<&str>) -> InvokeError {
        Self::from_status(response.status, &response.body, response.retry_after, secret)
    }

    pub fn from_status(
        status: u16,
        body: &[u8],
        retry_after: Option<Duration>,
        secret: Option<&str>,
    ) -> InvokeError {
        let parsed: Option<Value> = serde_json::from_slice(body).ok();
        let signal = parsed.as_ref().and_then(Self::signal);
        let message = parsed
            .as_ref()
            .and_then(Self::vendor_message)
            .map(|m| sanitize(&m, secret))
            .unwrap_or_else(|| format!("HTTP {}", status));
        let retry_after = retry_after.or_else(|| parsed.as_ref().and_then(body_retry_after));

        match (status, signal) {
            (401 | 403, _) | (400, Some(BodySignal::Auth)) => InvokeError::Auth { message },
            (429, _) | (_, Some(BodySignal::RateLimit)) => InvokeError::RateLimit {
                message,
                retry_after,
            },
            (400 | 404 | 405 | 409 | 413 | 415 | 422, Some(BodySignal::InvalidRequest)) => {
                InvokeError::BadRequest { message }
            }
            (408 | 500..=599, _) | (_, Some(BodySignal::Overloaded)) => {
                InvokeError::ServerUnavailable {
                    status: Some(status),
                    message,
                }
            }
            (400 | 404 | 405 | 409 | 413 | 415 | 422, _) => InvokeError::BadRequest { message },
            _ => InvokeError::UnknownTransport {
                message: format!("unexpected HTTP {}: {}", status, message),
            },
        }
    }

    /// Classify a fault below the status line
    pub fn from_transport_fault(fault: &TransportFault) -> InvokeError {
        match fault.kind {
            FaultKind::Connect | FaultKind::Timeout | FaultKind::Io | FaultKind::Body => {
                InvokeError::ServerUnavailable {
                    status: None,
                    message: fault.to_string(),
                }
            }
            FaultKind::Setup => InvokeError::Configuration {
                message: fault.message.clone(),
            },
            FaultKind::TooLarge | FaultKind::Other => InvokeError::UnknownTransport {
                message: fault.to_string(),
            },
        }
    }

    /// Classify an error object delivered inside a stream
    pub fn from_stream_payload(payload: &Value, secret: Option<&str>) -> InvokeError {
        let message = Self::vendor_message(payload)
            .map(|m| sanitize(&m, secret))
            .unwrap_or_else(|| "error event in stream".to_string());

        match Self::signal(payload) {
            Some(BodySignal::Auth) => InvokeError::Auth { message },
            Some(BodySignal::RateLimit) => InvokeError::RateLimit {
                message,
                retry_after: body_retry_after(payload),
            },
            Some(BodySignal::InvalidRequest) => InvokeError::BadRequest { message },
            Some(BodySignal::Overloaded) | None => InvokeError::ServerUnavailable {
                status: None,
                message,
            },
        }
    }

    /// `error.message`, a bare string `error`, or a top-level `message`
    fn vendor_message(value: &Value) -> Option<String> {
        let error = value.get("error");
        error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .or_else(|| error.and_then(Value::as_str))
            .or_else(|| value.get("message").and_then(Value::as_str))
            .map(str::to_string)
    }

    /// Reads the machine-readable `type`, `code` and `status` fields only;
    /// free-text messages never decide the kind.
    fn signal(value: &Value) -> Option<BodySignal> {
        const AUTH: [&str; 4] = [
            "invalid_api_key",
            "authentication_error",
            "permission_error",
            "unauthenticated",
        ];
        const RATE: [&str; 4] = [
            "rate_limit_exceeded",
            "rate_limit_error",
            "insufficient_quota",
            "resource_exhausted",
        ];
        const OVERLOADED: [&str; 3] = ["overloaded_error", "server_error", "unavailable"];
        const INVALID: [&str; 3] = [
            "invalid_request_error",
            "invalid_argument",
            "not_found_error",
        ];

        let error = value.get("error").unwrap_or(value);
        let tags: Vec<String> = ["type", "code", "status"]
            .iter()
            .filter_map(|key| error.get(*key).and_then(Value::as_str))
            .map(str::to_ascii_lowercase)
            .collect();
        let tagged = |known: &[&str]| tags.iter().any(|tag| known.contains(&tag.as_str()));

        if tagged(&AUTH) {
            Some(BodySignal::Auth)
        } else if tagged(&RATE) {
            Some(BodySignal::RateLimit)
        } else if tagged(&INVALID) {
            Some(BodySignal::InvalidRequest)
        } else if tagged(&OVERLOADED) {
            Some(BodySignal::Overloaded)
        } else {
            None
        }
    }
}

fn body_retry_after(value: &Value) -> Option<Duration> {
    let error = value.get("error").unwrap_or(value);
    error
        .get("retry_after")
        .and_then(Value::as_f64)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

fn sanitize(message: &str, secret: Option<&str>) -> String {
    let scrubbed = scrub(message, secret);
    if scrubbed.chars().count() <= MAX_MESSAGE_CHARS {
        return scrubbed;
    }
    let mut truncated: String = scrubbed.chars().take(MAX_MESSAGE_CHARS).collect();
    truncated.push('…');
    truncated
}
