//! Invocation dispatcher
//!
//! The single entry point for calling a provider:
//! resolve → build → send → classify/retry → decode or stream → account usage.
//!
//! Every invocation is independent. The only shared mutable state is the
//! transport's connection pool.

use crate::config::{ConfigError, ConfigValidator, GatewayConfig, ProviderOverride};
use crate::credentials::{self, Credentials, API_KEY};
use crate::http::{HttpTransport, RequestOptions, Transport, TransportResponse};
use crate::protocol::{InvokeMode, InvokeParameters, InvokeResult, PromptMessage};
use crate::providers::builder::{BuiltRequest, RequestBuilder};
use crate::providers::classify::ErrorMapper;
use crate::providers::error::{GatewayResult, InvokeError};
use crate::providers::registry::{ProviderRegistry, RegisteredProvider};
use crate::providers::retry::{RetryExecutor, RetryPolicy};
use crate::streaming::{self, ChunkStream, StreamContext};
use futures::StreamExt;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// One invocation: provider, model, mode, credentials, prompt, and options
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub provider: String,
    pub model: String,
    pub mode: InvokeMode,
    pub credentials: Credentials,
    pub messages: Vec<PromptMessage>,
    pub parameters: InvokeParameters,
    pub deadline: Option<Instant>,
}

impl InvokeRequest {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, mode: InvokeMode) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            mode,
            credentials: Credentials::default(),
            messages: Vec::new(),
            parameters: InvokeParameters::default(),
            deadline: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_messages(mut self, messages: Vec<PromptMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_message(mut self, message: PromptMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_parameters(mut self, parameters: InvokeParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.parameters.stream = stream;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

/// Result of an invocation: a complete result, or a lazy chunk stream
pub enum InvokeOutput {
    Complete(InvokeResult),
    Stream(ChunkStream),
}

impl InvokeOutput {
    pub fn into_result(self) -> Option<InvokeResult> {
        match self {
            InvokeOutput::Complete(result) => Some(result),
            InvokeOutput::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<ChunkStream> {
        match self {
            InvokeOutput::Complete(_) => None,
            InvokeOutput::Stream(stream) => Some(stream),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, InvokeOutput::Stream(_))
    }

    /// Wait for the complete result, draining a stream if necessary.
    ///
    /// A drained stream reports `model` as given, since stream events do not
    /// carry the vendor's model name.
    pub async fn collect(self, model: &str) -> GatewayResult<InvokeResult> {
        match self {
            InvokeOutput::Complete(result) => Ok(result),
            InvokeOutput::Stream(stream) => streaming::collect(stream, model).await,
        }
    }
}

impl fmt::Debug for InvokeOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeOutput::Complete(result) => f.debug_tuple("Complete").field(result).finish(),
            InvokeOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Everything one attempt needs, fixed across retries
struct PreparedCall<'a> {
    provider: &'a RegisteredProvider,
    built: BuiltRequest,
    model: String,
    credentials: Cow<'a, Credentials>,
    mode: InvokeMode,
    request_id: Uuid,
    stream_context: StreamContext,
}

pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn Transport>,
    retry: Option<RetryPolicy>,
    overrides: HashMap<String, ProviderOverride>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ProviderRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            retry: None,
            overrides: HashMap::new(),
        }
    }

    /// Built-in providers over the default HTTP transport
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(ProviderRegistry::builtin()),
            Arc::new(HttpTransport::default()),
        )
    }

    /// Dispatcher configured from a gateway configuration file
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let registry = ProviderRegistry::builtin();
        ConfigValidator::new()
            .with_known_providers(registry.ids())
            .validate(config)?;

        Ok(Self::new(Arc::new(registry), Arc::new(HttpTransport::new(&config.transport)))
            .with_retry_policy(config.retry.clone())
            .with_overrides(config.providers.clone()))
    }

    /// Use one retry policy for every provider instead of the descriptor's
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, ProviderOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Invoke a provider.
    ///
    /// Non-streaming requests return `InvokeOutput::Complete`; streaming
    /// requests return `InvokeOutput::Stream` once the first chunk has
    /// arrived. Retries happen only before that point.
    pub async fn invoke(&self, request: InvokeRequest) -> GatewayResult<InvokeOutput> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "invoke",
            provider = %request.provider,
            model = %request.model,
            mode = %request.mode,
            request_id = %request_id,
            stream = request.parameters.stream,
        );

        let started = Instant::now();
        let deadline = request.deadline;
        let work = self.invoke_inner(request, request_id, started).instrument(span);

        match deadline {
            None => work.await,
            Some(deadline) => match tokio::time::timeout_at(deadline, work).await {
                Ok(result) => result,
                Err(_) => {
                    let after = deadline.saturating_duration_since(started);
                    error!(request_id = %request_id, ?after, "invocation deadline exceeded");
                    Err(InvokeError::Timeout { after })
                }
            },
        }
    }

    async fn invoke_inner(
        &self,
        request: InvokeRequest,
        request_id: Uuid,
        started: Instant,
    ) -> GatewayResult<InvokeOutput> {
        let provider = self.registry.resolve(&request.provider)?;
        let call = self.prepare(
            provider,
            request.mode,
            &request.model,
            &request.messages,
            &request.parameters,
            &request.credentials,
            request_id,
        )?;
        credentials::check_static(&provider.descriptor, &request.model, &call.credentials)?;
        credentials::check_key_shape(&call.credentials)?;

        let policy = self.retry_policy(provider);
        let outcome = RetryExecutor::new(&policy)
            .execute(|attempt| self.attempt(&call, attempt))
            .await;

        match outcome.result {
            Ok(InvokeOutput::Stream(stream)) => {
                info!(attempts = outcome.attempts, "stream opened");
                Ok(InvokeOutput::Stream(match request.deadline {
                    Some(deadline) => streaming::with_deadline(stream, deadline, started),
                    None => stream,
                }))
            }
            Ok(output) => {
                info!(
                    attempts = outcome.attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "invocation complete"
                );
                Ok(output)
            }
            Err(err) => {
                error!(attempts = outcome.attempts, kind = ?err.kind(), error = %err, "invocation failed");
                Err(err)
            }
        }
    }

    /// Check credentials: static schema checks, key shape, then exactly one
    /// minimal live call that is never retried.
    pub async fn validate_credentials(
        &self,
        provider_id: &str,
        model: &str,
        credentials: &Credentials,
    ) -> GatewayResult<()> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "validate_credentials",
            provider = %provider_id,
            model = %model,
            request_id = %request_id,
        );

        async {
            let provider = self.registry.resolve(provider_id)?;
            let credentials = self.effective_credentials(provider, credentials);
            credentials::check_static(&provider.descriptor, model, &credentials)?;
            credentials::check_key_shape(&credentials)?;

            let mode = credentials::probe_mode(&provider.descriptor, &credentials);
            let (messages, parameters) = credentials::probe_request(mode);
            let call = self
                .prepare(provider, mode, model, &messages, &parameters, &credentials, request_id)
                .map_err(credentials::probe_failure)?;

            match self.attempt(&call, 1).await {
                Ok(_) => {
                    info!("credentials accepted");
                    Ok(())
                }
                Err(err) => {
                    let err = credentials::probe_failure(err);
                    error!(error = %err, "credential validation failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Release pooled transport resources
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }

    #[allow(clippy::too_many_arguments)]
    fn prepare<'a>(
        &self,
        provider: &'a RegisteredProvider,
        mode: InvokeMode,
        model: &str,
        messages: &[PromptMessage],
        parameters: &InvokeParameters,
        credentials: &'a Credentials,
        request_id: Uuid,
    ) -> GatewayResult<PreparedCall<'a>> {
        let credentials = self.effective_credentials(provider, credentials);
        let builder = RequestBuilder::new(&provider.descriptor, provider.adapter.as_ref())
            .with_override(self.overrides.get(provider.id()));
        let built = builder.build(mode, model, messages, parameters, &credentials)?;

        let stream_context = StreamContext {
            accountant: builder.accountant(),
            prompt_estimate: built.prompt_estimate,
            secret: credentials.api_key().map(str::to_string),
        };

        Ok(PreparedCall {
            provider,
            built,
            model: model.to_string(),
            credentials,
            mode,
            request_id,
            stream_context,
        })
    }

    /// Caller credentials, with the configured key filled in when absent
    fn effective_credentials<'a>(
        &self,
        provider: &RegisteredProvider,
        credentials: &'a Credentials,
    ) -> Cow<'a, Credentials> {
        if credentials.api_key().is_some() {
            return Cow::Borrowed(credentials);
        }
        match self
            .overrides
            .get(provider.id())
            .and_then(|o| o.api_key.as_ref())
            .filter(|key| !key.is_empty())
        {
            Some(key) => {
                let mut filled = credentials.clone();
                filled.insert(API_KEY, key.expose_secret());
                Cow::Owned(filled)
            }
            None => Cow::Borrowed(credentials),
        }
    }

    fn retry_policy(&self, provider: &RegisteredProvider) -> RetryPolicy {
        let mut policy = self
            .retry
            .clone()
            .unwrap_or_else(|| provider.descriptor.retry_policy.clone());
        if let Some(max_attempts) = self
            .overrides
            .get(provider.id())
            .and_then(|o| o.max_attempts)
        {
            policy = policy.with_max_attempts(max_attempts);
        }
        policy
    }

    /// One send: classify failures, decode successes, and for streams wait
    /// for the first chunk so that pre-data failures stay retryable.
    async fn attempt(&self, call: &PreparedCall<'_>, attempt: u32) -> GatewayResult<InvokeOutput> {
        let wire = &call.built.wire;
        let options = RequestOptions::new(call.request_id, attempt);
        let secret = call.stream_context.secret.as_deref();
        debug!(attempt, url = %wire.url(), streaming = wire.streaming, "sending request");

        let response = self
            .transport
            .send(wire, &call.credentials, &options)
            .await
            .map_err(|fault| ErrorMapper::from_transport_fault(&fault))?;

        match response {
            TransportResponse::Complete(raw) if !raw.is_success() => {
                Err(ErrorMapper::from_response(&raw, secret))
            }
            TransportResponse::Complete(raw) => {
                let mut result = call.provider.adapter.decode_response(call.mode, &raw.body)?;
                result.usage = call
                    .stream_context
                    .accountant
                    .finalize(result.usage, call.stream_context.prompt_estimate);
                if wire.streaming {
                    debug!("vendor answered a streaming request with a complete body");
                    Ok(InvokeOutput::Stream(streaming::from_result(result)))
                } else {
                    Ok(InvokeOutput::Complete(result))
                }
            }
            TransportResponse::Stream(raw) => {
                let decoder = call.provider.adapter.stream_decoder(call.mode);
                let mut stream = streaming::normalize(raw, decoder, call.stream_context.clone());

                let first = match stream.next().await {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(err)) => return Err(err),
                    None => {
                        return Err(InvokeError::StreamIncomplete {
                            chunks_received: 0,
                            cause: None,
                        })
                    }
                };
                let stream: ChunkStream =
                    Box::pin(futures::stream::once(async move { Ok(first) }).chain(stream));

                if wire.streaming {
                    Ok(InvokeOutput::Stream(stream))
                } else {
                    Ok(InvokeOutput::Complete(
                        streaming::collect(stream, &call.model).await?,
                    ))
                }
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("providers", &self.registry.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
