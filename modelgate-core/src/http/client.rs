//! HTTP transport implementation using reqwest

use super::error::{parse_retry_after, FaultKind, TransportFault};
use super::pool::{ConnectionPool, PoolKey};
use super::{
    AuthScheme, ByteStream, RawResponse, RawStream, RequestOptions, Transport, TransportResponse,
    WireRequest,
};
use crate::config::TransportConfig;
use crate::credentials::Credentials;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::Response;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Pooled reqwest transport
#[derive(Clone)]
pub struct HttpTransport {
    pool: Arc<ConnectionPool>,
    max_response_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new(config.clone())),
            max_response_bytes: config.max_response_bytes,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    fn fail(&self, key: &PoolKey, generation: u64, fault: TransportFault) -> TransportFault {
        if fault.evicts_client() {
            self.pool.evict(key, generation);
        }
        fault
    }

    async fn read_body(
        &self,
        response: Response,
        key: &PoolKey,
        generation: u64,
    ) -> Result<Bytes, TransportFault> {
        if let Some(length) = response.content_length() {
            if length as usize > self.max_response_bytes {
                return Err(too_large(length as usize, self.max_response_bytes));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.fail(key, generation, TransportFault::from_reqwest(&e)))?;

        if body.len() > self.max_response_bytes {
            return Err(too_large(body.len(), self.max_response_bytes));
        }
        Ok(body)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &WireRequest,
        credentials: &Credentials,
        options: &RequestOptions,
    ) -> Result<TransportResponse, TransportFault> {
        let key = request.pool_key();
        let pooled = self.pool.acquire(&key).await?;
        let generation = pooled.generation;

        debug!(
            provider = %request.provider_id,
            request_id = %options.request_id,
            attempt = options.attempt,
            streaming = request.streaming,
            "sending request"
        );

        let mut builder = pooled
            .client
            .post(request.url())
            .header("X-Request-ID", options.request_id.to_string())
            .json(&request.body);

        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        if let Some(api_key) = credentials.api_key() {
            builder = match request.auth {
                AuthScheme::Bearer => builder.bearer_auth(api_key),
                AuthScheme::ApiKeyHeader(name) => builder.header(name, api_key),
            };
        }

        // For streams the timeout bounds time-to-headers and each idle read,
        // never the whole body.
        let sent = if request.streaming {
            builder = builder.header(ACCEPT, "text/event-stream");
            match tokio::time::timeout(request.timeout, builder.send()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(self.fail(&key, generation, TransportFault::timeout(request.timeout)))
                }
            }
        } else {
            builder.timeout(request.timeout).send().await
        };

        let response =
            sent.map_err(|e| self.fail(&key, generation, TransportFault::from_reqwest(&e)))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        debug!(
            provider = %request.provider_id,
            request_id = %options.request_id,
            status = status.as_u16(),
            "response headers received"
        );

        if request.streaming && status.is_success() {
            let body = idle_bounded(
                Box::pin(response.bytes_stream()),
                request.timeout,
                Evictor {
                    pool: Arc::clone(&self.pool),
                    key,
                    generation,
                },
            );
            return Ok(TransportResponse::Stream(
                RawStream::new(body).with_slot(pooled.slot),
            ));
        }

        if !status.is_success() {
            warn!(
                provider = %request.provider_id,
                request_id = %options.request_id,
                status = status.as_u16(),
                "vendor returned error status"
            );
        }

        let body = self.read_body(response, &key, generation).await?;
        Ok(TransportResponse::Complete(RawResponse {
            status: status.as_u16(),
            retry_after,
            body,
        }))
    }

    async fn shutdown(&self) {
        self.pool.shutdown();
    }
}

fn too_large(actual: usize, limit: usize) -> TransportFault {
    TransportFault::new(
        FaultKind::TooLarge,
        format!("response size {} exceeds maximum {}", actual, limit),
    )
}

struct Evictor {
    pool: Arc<ConnectionPool>,
    key: PoolKey,
    generation: u64,
}

struct BodyState {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    idle: Duration,
    evictor: Evictor,
    done: bool,
}

/// Wrap a body stream so a stalled read fails with a timeout fault and evicts the client
fn idle_bounded(
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    idle: Duration,
    evictor: Evictor,
) -> ByteStream {
    let state = BodyState {
        inner,
        idle,
        evictor,
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        let fault = match tokio::time::timeout(state.idle, state.inner.next()).await {
            Ok(Some(Ok(bytes))) => return Some((Ok(bytes), state)),
            Ok(None) => return None,
            Ok(Some(Err(e))) => TransportFault::from_reqwest(&e),
            Err(_) => TransportFault::timeout(state.idle),
        };
        state.done = true;
        let Evictor {
            pool,
            key,
            generation,
        } = &state.evictor;
        pool.evict(key, *generation);
        Some((Err(fault), state))
    }))
}
