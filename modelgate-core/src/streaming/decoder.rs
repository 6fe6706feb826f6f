//! Per-provider stream event decoding

use super::sse::SseEvent;
use crate::protocol::{FinishReason, ToolCallDelta, Usage};
use crate::providers::error::InvokeError;

/// Provider-independent meaning of one wire event
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// Content fragment and/or tool-call fragments
    Delta {
        text: String,
        tool_calls: Vec<ToolCallDelta>,
    },
    /// Finish reason; held until the stream's sentinel
    Finish(FinishReason),
    /// Usage counts, possibly partial
    Usage(Usage),
    /// Error object reported inside the stream
    Error(serde_json::Value),
    /// Provider sentinel; nothing follows
    Done,
}

impl DecodedEvent {
    pub fn text(text: impl Into<String>) -> Self {
        DecodedEvent::Delta {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Stateful decoder for one stream
pub trait StreamDecoder: Send {
    /// Decode one SSE event; malformed payloads are errors
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<DecodedEvent>, InvokeError>;
}

/// Parse an event payload as JSON, classifying garbage as a transport problem
pub fn parse_json(data: &str) -> Result<serde_json::Value, InvokeError> {
    serde_json::from_str(data).map_err(|e| InvokeError::UnknownTransport {
        message: format!("malformed stream event: {}", e),
    })
}
