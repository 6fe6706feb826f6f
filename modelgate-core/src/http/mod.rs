//! HTTP transport for vendor API calls
//!
//! This module implements the network layer, handling:
//! - Pooled clients per provider+endpoint with bounded concurrency
//! - Authentication header attachment
//! - Timeouts for time-to-headers and idle stream reads
//! - Request ID generation and correlation

pub mod client;
pub mod error;
pub mod pool;

pub use client::HttpTransport;
pub use error::{parse_retry_after, FaultKind, TransportFault};
pub use pool::{ConnectionPool, PoolKey, PoolSlot, PooledClient};

use crate::credentials::Credentials;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

/// How the API key is presented to the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Key in a vendor-specific header, e.g. `x-api-key`
    ApiKeyHeader(&'static str),
}

/// Vendor-specific request ready to send; carries no secrets
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub provider_id: String,
    pub base_url: String,
    /// Endpoint path appended to `base_url`, e.g. "/chat/completions"
    pub path: &'static str,
    /// Non-secret headers
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
    pub streaming: bool,
    pub timeout: Duration,
    pub auth: AuthScheme,
}

impl WireRequest {
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }

    pub fn pool_key(&self) -> PoolKey {
        PoolKey::new(self.provider_id.clone(), self.url())
    }
}

/// Per-attempt request metadata
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Correlation id sent as `X-Request-ID`
    pub request_id: Uuid,

    /// One-based attempt number
    pub attempt: u32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            attempt: 1,
        }
    }
}

impl RequestOptions {
    pub fn new(request_id: Uuid, attempt: u32) -> Self {
        Self {
            request_id,
            attempt,
        }
    }
}

/// Fully read response body, successful or not
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Raw body bytes of a streaming response
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportFault>> + Send>>;

/// Open streaming response; dropping it aborts the read and frees its pool slot
pub struct RawStream {
    pub body: ByteStream,
    slot: Option<PoolSlot>,
}

impl RawStream {
    pub fn new(body: ByteStream) -> Self {
        Self { body, slot: None }
    }

    pub fn with_slot(mut self, slot: PoolSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn holds_slot(&self) -> bool {
        self.slot.is_some()
    }
}

impl fmt::Debug for RawStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawStream")
            .field("holds_slot", &self.slot.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum TransportResponse {
    Complete(RawResponse),
    Stream(RawStream),
}

/// Sends wire requests; implemented over reqwest and by test doubles
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one attempt.
    ///
    /// Non-2xx statuses are returned as `Complete` responses for the
    /// classifier; `Err` is reserved for faults below the status line.
    async fn send(
        &self,
        request: &WireRequest,
        credentials: &Credentials,
        options: &RequestOptions,
    ) -> Result<TransportResponse, TransportFault>;

    /// Release pooled resources
    async fn shutdown(&self) {}
}
