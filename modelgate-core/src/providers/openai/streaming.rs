//! Streaming decoders for OpenAI-style SSE bodies
//!
//! Every event is `data: {json}`; the body ends with `data: [DONE]`. An
//! `error` key in a payload is an in-stream failure.

use super::types::{OpenAIChatChunk, OpenAICompletionChunk};
use crate::protocol::{FinishReason, ToolCallDelta, Usage};
use crate::providers::error::InvokeError;
use crate::providers::tokens::TokenAccountant;
use crate::streaming::decoder::parse_json;
use crate::streaming::{DecodedEvent, SseEvent, StreamDecoder};
use serde_json::Value;

const DONE_SENTINEL: &str = "[DONE]";

/// Decoder for `/chat/completions` streams
#[derive(Debug, Default)]
pub struct ChatStreamDecoder;

/// Decoder for `/completions` streams
#[derive(Debug, Default)]
pub struct CompletionStreamDecoder;

/// Sentinel, error payload, or a parsed JSON payload
enum Preamble {
    Done,
    Error(Value),
    Payload(Value),
}

fn preamble(event: &SseEvent) -> Result<Option<Preamble>, InvokeError> {
    let data = event.data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == DONE_SENTINEL {
        return Ok(Some(Preamble::Done));
    }
    let value = parse_json(data)?;
    if value.get("error").is_some_and(|e| !e.is_null()) {
        return Ok(Some(Preamble::Error(value)));
    }
    Ok(Some(Preamble::Payload(value)))
}

fn usage_event(raw: Option<&Value>) -> Option<DecodedEvent> {
    let usage = raw.filter(|u| u.is_object()).map(TokenAccountant::extract_usage)?;
    (!usage.is_empty()).then_some(DecodedEvent::Usage(usage))
}

fn malformed(e: serde_json::Error) -> InvokeError {
    InvokeError::UnknownTransport {
        message: format!("malformed stream event: {}", e),
    }
}

impl StreamDecoder for ChatStreamDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<DecodedEvent>, InvokeError> {
        let payload = match preamble(event)? {
            None => return Ok(Vec::new()),
            Some(Preamble::Done) => return Ok(vec![DecodedEvent::Done]),
            Some(Preamble::Error(value)) => return Ok(vec![DecodedEvent::Error(value)]),
            Some(Preamble::Payload(value)) => value,
        };
        let chunk: OpenAIChatChunk = serde_json::from_value(payload).map_err(malformed)?;

        let mut decoded = Vec::new();
        let mut usage = Usage::default();
        for choice in chunk.choices {
            let tool_calls: Vec<ToolCallDelta> = choice
                .delta
                .tool_calls
                .into_iter()
                .map(|tc| {
                    let (name, arguments) = match tc.function {
                        Some(f) => (f.name, f.arguments),
                        None => (None, None),
                    };
                    ToolCallDelta {
                        index: tc.index,
                        id: tc.id,
                        name,
                        arguments,
                    }
                })
                .collect();
            let text = choice.delta.content.unwrap_or_default();
            if !text.is_empty() || !tool_calls.is_empty() {
                decoded.push(DecodedEvent::Delta { text, tool_calls });
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                decoded.push(DecodedEvent::Finish(FinishReason::from_vendor(reason)));
            }
            if let Some(DecodedEvent::Usage(choice_usage)) = usage_event(choice.usage.as_ref()) {
                usage.merge(choice_usage);
            }
        }
        if let Some(DecodedEvent::Usage(chunk_usage)) = usage_event(chunk.usage.as_ref()) {
            usage.merge(chunk_usage);
        }
        if !usage.is_empty() {
            decoded.push(DecodedEvent::Usage(usage));
        }

        Ok(decoded)
    }
}

impl StreamDecoder for CompletionStreamDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<DecodedEvent>, InvokeError> {
        let payload = match preamble(event)? {
            None => return Ok(Vec::new()),
            Some(Preamble::Done) => return Ok(vec![DecodedEvent::Done]),
            Some(Preamble::Error(value)) => return Ok(vec![DecodedEvent::Error(value)]),
            Some(Preamble::Payload(value)) => value,
        };
        let chunk: OpenAICompletionChunk = serde_json::from_value(payload).map_err(malformed)?;

        let mut decoded = Vec::new();
        for choice in chunk.choices {
            if !choice.text.is_empty() {
                decoded.push(DecodedEvent::text(choice.text));
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                decoded.push(DecodedEvent::Finish(FinishReason::from_vendor(reason)));
            }
        }
        decoded.extend(usage_event(chunk.usage.as_ref()));

        Ok(decoded)
    }
}
