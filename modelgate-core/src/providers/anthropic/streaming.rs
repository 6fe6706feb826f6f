//! Streaming decoder for Anthropic Messages SSE bodies
//!
//! Events are named (`event: content_block_delta`) and the JSON payload
//! repeats the name in `type`. The body ends with `message_stop`.

use super::types::{ContentBlock, StreamEvent};
use crate::protocol::{FinishReason, ToolCallDelta};
use crate::providers::error::InvokeError;
use crate::providers::tokens::TokenAccountant;
use crate::streaming::decoder::parse_json;
use crate::streaming::{DecodedEvent, SseEvent, StreamDecoder};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MessagesStreamDecoder {
    /// Content block index to tool-call ordinal
    tool_blocks: HashMap<u32, u32>,
}

impl MessagesStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn tool_ordinal(&mut self, block: u32) -> u32 {
        let next = self.tool_blocks.len() as u32;
        *self.tool_blocks.entry(block).or_insert(next)
    }

    fn block_start(&mut self, index: u32, block: ContentBlock) -> Vec<DecodedEvent> {
        match block {
            ContentBlock::ToolUse { id, name, .. } => vec![DecodedEvent::Delta {
                text: String::new(),
                tool_calls: vec![ToolCallDelta {
                    index: self.tool_ordinal(index),
                    id: Some(id),
                    name: Some(name),
                    arguments: None,
                }],
            }],
            ContentBlock::Text { text } if !text.is_empty() => vec![DecodedEvent::text(text)],
            _ => Vec::new(),
        }
    }
}

impl StreamDecoder for MessagesStreamDecoder {
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<DecodedEvent>, InvokeError> {
        let data = event.data.trim();
        if data.is_empty() {
            return Ok(match event.event.as_deref() {
                Some("message_stop") => vec![DecodedEvent::Done],
                _ => Vec::new(),
            });
        }

        let value = parse_json(data)?;
        let payload: StreamEvent =
            serde_json::from_value(value.clone()).map_err(|e| InvokeError::UnknownTransport {
                message: format!("malformed stream event: {}", e),
            })?;

        let decoded = match payload.event_type.as_str() {
            "message_start" => payload
                .message
                .and_then(|m| m.usage)
                .map(|u| vec![DecodedEvent::Usage(TokenAccountant::extract_usage(&u))])
                .unwrap_or_default(),
            "content_block_start" => match (payload.index, payload.content_block) {
                (Some(index), Some(block)) => self.block_start(index, block),
                _ => Vec::new(),
            },
            "content_block_delta" => {
                let (Some(index), Some(delta)) = (payload.index, payload.delta) else {
                    return Ok(Vec::new());
                };
                match delta.delta_type.as_deref() {
                    Some("text_delta") => delta
                        .text
                        .map(|text| vec![DecodedEvent::text(text)])
                        .unwrap_or_default(),
                    Some("input_json_delta") => match delta.partial_json {
                        Some(fragment) if !fragment.is_empty() => vec![DecodedEvent::Delta {
                            text: String::new(),
                            tool_calls: vec![ToolCallDelta {
                                index: self.tool_ordinal(index),
                                id: None,
                                name: None,
                                arguments: Some(fragment),
                            }],
                        }],
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                }
            }
            "message_delta" => {
                let mut decoded = Vec::new();
                if let Some(reason) = payload.delta.and_then(|d| d.stop_reason) {
                    decoded.push(DecodedEvent::Finish(FinishReason::from_vendor(&reason)));
                }
                if let Some(usage) = payload.usage {
                    decoded.push(DecodedEvent::Usage(TokenAccountant::extract_usage(&usage)));
                }
                decoded
            }
            "message_stop" => vec![DecodedEvent::Done],
            "error" => vec![DecodedEvent::Error(value)],
            // ping, content_block_stop, and future event types
            _ => Vec::new(),
        };

        Ok(decoded)
    }
}
