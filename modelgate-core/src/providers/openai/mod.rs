//! OpenAI wire format
//!
//! Serves OpenAI itself plus every vendor that speaks the same API (Kimi,
//! self-hosted "OpenAI-compatible" servers).

pub mod converter;
pub mod streaming;
pub mod types;

use crate::protocol::{InvokeMode, InvokeResult};
use crate::providers::adapter::{parse_body, to_body, BuildContext, ProviderAdapter};
use crate::providers::error::InvokeError;
use crate::streaming::StreamDecoder;
use serde_json::Value;

pub const CHAT_PATH: &str = "/chat/completions";
pub const COMPLETION_PATH: &str = "/completions";

/// OpenAI-format adapter
#[derive(Debug, Clone, Default)]
pub struct OpenAiAdapter {
    stream_usage: bool,
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a trailing usage event on streams (`stream_options.include_usage`).
    /// Only the first-party API is known to accept it.
    pub fn with_stream_usage(mut self, enabled: bool) -> Self {
        self.stream_usage = enabled;
        self
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn endpoint(&self, mode: InvokeMode) -> &'static str {
        match mode {
            InvokeMode::Chat => CHAT_PATH,
            InvokeMode::Completion => COMPLETION_PATH,
        }
    }

    fn build_body(&self, context: &BuildContext<'_>) -> Result<Value, InvokeError> {
        match context.mode {
            InvokeMode::Chat => to_body(&converter::to_chat_request(context, self.stream_usage)),
            InvokeMode::Completion => to_body(&converter::to_completion_request(
                context,
                self.stream_usage,
            )),
        }
    }

    fn decode_response(&self, mode: InvokeMode, body: &[u8]) -> Result<InvokeResult, InvokeError> {
        match mode {
            InvokeMode::Chat => converter::from_chat_response(parse_body(body)?),
            InvokeMode::Completion => converter::from_completion_response(parse_body(body)?),
        }
    }

    fn stream_decoder(&self, mode: InvokeMode) -> Box<dyn StreamDecoder> {
        match mode {
            InvokeMode::Chat => Box::new(streaming::ChatStreamDecoder),
            InvokeMode::Completion => Box::new(streaming::CompletionStreamDecoder),
        }
    }
}
