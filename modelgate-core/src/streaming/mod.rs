//! Streaming normalizer
//!
//! Converts a vendor's raw SSE body into a lazy, forward-only sequence of
//! [`StreamChunk`]s:
//! - SSE framing tolerant of arbitrary chunk boundaries and CRLF
//! - Per-provider event decoding through [`StreamDecoder`]
//! - The terminal chunk is held until the sentinel so late usage can ride on it
//! - Errors before the first chunk surface as classified errors (so the caller
//!   may retry); after it they surface as `StreamIncomplete`

pub mod decoder;
pub mod sse;

pub use decoder::{DecodedEvent, StreamDecoder};
pub use sse::{SseEvent, SseFramer};

use crate::http::RawStream;
use crate::protocol::{
    FinishReason, FunctionCall, InvokeResult, StreamChunk, ToolCall, ToolCallDelta, Usage,
};
use crate::providers::classify::ErrorMapper;
use crate::providers::error::{GatewayResult, InvokeError};
use crate::providers::tokens::TokenAccountant;
use futures::{Stream, StreamExt};
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Normalized chunk sequence of one invocation
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, InvokeError>> + Send>>;

/// What the normalizer needs besides the raw body
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub accountant: TokenAccountant,
    /// Local prompt estimate used when the vendor reports no prompt tokens
    pub prompt_estimate: u32,
    /// Secret to scrub from in-stream error messages
    pub secret: Option<String>,
}

enum Phase {
    Reading,
    Failing(InvokeError),
    Finished,
}

struct Normalizer {
    raw: RawStream,
    framer: SseFramer,
    decoder: Box<dyn StreamDecoder>,
    context: StreamContext,
    pending: VecDeque<SseEvent>,
    ready: VecDeque<StreamChunk>,
    produced: usize,
    held_finish: Option<FinishReason>,
    usage: Usage,
    eof: bool,
    phase: Phase,
}

impl Normalizer {
    fn push_chunk(&mut self, delta: String, tool_calls: Vec<ToolCallDelta>) {
        self.ready.push_back(StreamChunk {
            index: self.produced,
            delta,
            tool_calls,
            finish_reason: None,
            usage: None,
        });
        self.produced += 1;
    }

    fn push_terminal(&mut self, finish: FinishReason) {
        let usage = self
            .context
            .accountant
            .finalize(self.usage, self.context.prompt_estimate);
        self.ready.push_back(StreamChunk {
            index: self.produced,
            delta: String::new(),
            tool_calls: Vec::new(),
            finish_reason: Some(finish),
            usage: Some(usage),
        });
        self.produced += 1;
        self.phase = Phase::Finished;
    }

    /// Before any chunk the cause surfaces as-is; after it, as `StreamIncomplete`
    fn fail(&mut self, cause: Option<InvokeError>) {
        let error = match cause {
            Some(cause) if self.produced == 0 => cause,
            None if self.produced == 0 => InvokeError::ServerUnavailable {
                status: None,
                message: "stream closed before any data".to_string(),
            },
            cause => InvokeError::StreamIncomplete {
                chunks_received: self.produced,
                cause: cause.map(Box::new),
            },
        };
        self.phase = Phase::Failing(error);
    }

    fn apply(&mut self, event: SseEvent) {
        let decoded = match self.decoder.decode(&event) {
            Ok(decoded) => decoded,
            Err(error) => return self.fail(Some(error)),
        };

        for item in decoded {
            match item {
                DecodedEvent::Delta { text, tool_calls } => {
                    if !text.is_empty() || !tool_calls.is_empty() {
                        self.push_chunk(text, tool_calls);
                    }
                }
                DecodedEvent::Finish(reason) => self.held_finish = Some(reason),
                DecodedEvent::Usage(usage) => self.usage.merge(usage),
                DecodedEvent::Error(payload) => {
                    let error =
                        ErrorMapper::from_stream_payload(&payload, self.context.secret.as_deref());
                    warn!(chunks = self.produced, error = %error, "error event inside stream");
                    return self.fail(Some(error));
                }
                DecodedEvent::Done => {
                    let finish = self.held_finish.take().unwrap_or(FinishReason::Stop);
                    return self.push_terminal(finish);
                }
            }
        }
    }

    async fn next_item(&mut self) -> Option<Result<StreamChunk, InvokeError>> {
        loop {
            if let Some(chunk) = self.ready.pop_front() {
                return Some(Ok(chunk));
            }

            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => return None,
                Phase::Failing(error) => return Some(Err(error)),
                Phase::Reading => self.phase = Phase::Reading,
            }

            if let Some(event) = self.pending.pop_front() {
                self.apply(event);
                continue;
            }

            if self.eof {
                match self.held_finish.take() {
                    // Some servers close without the sentinel after a finish reason
                    Some(finish) => {
                        debug!("stream closed after finish reason without sentinel");
                        self.push_terminal(finish);
                    }
                    None => self.fail(None),
                }
                continue;
            }

            match self.raw.body.next().await {
                Some(Ok(bytes)) => match self.framer.push(&bytes) {
                    Ok(events) => self.pending.extend(events),
                    Err(fault) => self.fail(Some(ErrorMapper::from_transport_fault(&fault))),
                },
                Some(Err(fault)) => self.fail(Some(ErrorMapper::from_transport_fault(&fault))),
                None => {
                    self.eof = true;
                    if let Some(event) = self.framer.finish() {
                        self.pending.push_back(event);
                    }
                }
            }
        }
    }
}

/// Normalize a raw streaming body into chunks.
///
/// The returned stream owns the raw stream, so dropping it at any point
/// aborts the read and releases the pool slot.
pub fn normalize(
    raw: RawStream,
    decoder: Box<dyn StreamDecoder>,
    context: StreamContext,
) -> ChunkStream {
    let state = Normalizer {
        raw,
        framer: SseFramer::new(),
        decoder,
        context,
        pending: VecDeque::new(),
        ready: VecDeque::new(),
        produced: 0,
        held_finish: None,
        usage: Usage::default(),
        eof: false,
        phase: Phase::Reading,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        let item = state.next_item().await?;
        Some((item, state))
    }))
}

/// Present a complete result as a stream, for vendors that answer a
/// streaming request with a plain JSON body
pub fn from_result(result: InvokeResult) -> ChunkStream {
    let mut chunks = Vec::new();
    let tool_calls: Vec<ToolCallDelta> = result
        .tool_calls
        .iter()
        .enumerate()
        .map(|(index, call)| ToolCallDelta {
            index: index as u32,
            id: Some(call.id.clone()),
            name: Some(call.function.name.clone()),
            arguments: Some(call.function.arguments.clone()),
        })
        .collect();

    if !result.content.is_empty() || !tool_calls.is_empty() {
        chunks.push(Ok(StreamChunk {
            index: 0,
            delta: result.content,
            tool_calls,
            finish_reason: None,
            usage: None,
        }));
    }
    chunks.push(Ok(StreamChunk {
        index: chunks.len(),
        delta: String::new(),
        tool_calls: Vec::new(),
        finish_reason: Some(result.finish_reason),
        usage: Some(result.usage),
    }));

    Box::pin(futures::stream::iter(chunks))
}

/// Bound the remainder of a stream by a deadline.
///
/// On expiry the inner stream is dropped and a single `Timeout` is yielded.
pub fn with_deadline(stream: ChunkStream, deadline: Instant, started: Instant) -> ChunkStream {
    Box::pin(futures::stream::unfold(Some(stream), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout_at(deadline, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => {
                drop(inner);
                Some((
                    Err(InvokeError::Timeout {
                        after: deadline.saturating_duration_since(started),
                    }),
                    None,
                ))
            }
        }
    }))
}

/// Drain a stream into one result; `model` is reported as given
pub async fn collect(mut stream: ChunkStream, model: &str) -> GatewayResult<InvokeResult> {
    let mut content = String::new();
    let mut calls: BTreeMap<u32, ToolCall> = BTreeMap::new();
    let mut finish_reason = None;
    let mut usage = Usage::default();
    let mut received = 0;

    while let Some(item) = stream.next().await {
        let chunk = item?;
        received += 1;
        content.push_str(&chunk.delta);
        for delta in chunk.tool_calls {
            let call = calls.entry(delta.index).or_insert_with(|| ToolCall {
                id: String::new(),
                tool_type: "function".to_string(),
                function: FunctionCall {
                    name: String::new(),
                    arguments: String::new(),
                },
            });
            if let Some(id) = delta.id {
                call.id = id;
            }
            if let Some(name) = delta.name {
                call.function.name = name;
            }
            if let Some(arguments) = delta.arguments {
                call.function.arguments.push_str(&arguments);
            }
        }
        if let Some(reason) = chunk.finish_reason {
            finish_reason = Some(reason);
        }
        if let Some(reported) = chunk.usage {
            usage = reported;
        }
    }

    let finish_reason = finish_reason.ok_or_else(|| InvokeError::StreamIncomplete {
        chunks_received: received,
        cause: None,
    })?;

    Ok(InvokeResult {
        model: model.to_string(),
        content,
        tool_calls: calls.into_values().collect(),
        finish_reason,
        usage,
        system_fingerprint: None,
    })
}
