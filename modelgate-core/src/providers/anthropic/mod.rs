//! Anthropic provider implementation
//!
//! Speaks the Messages API: key in `x-api-key`, a pinned `anthropic-version`
//! header, the system prompt as a top-level field, and named SSE events.

pub mod converter;
pub mod streaming;
pub mod types;

use crate::http::AuthScheme;
use crate::protocol::{InvokeMode, InvokeResult};
use crate::providers::adapter::{parse_body, to_body, BuildContext, ProviderAdapter};
use crate::providers::error::InvokeError;
use crate::streaming::StreamDecoder;
use serde_json::Value;

pub const MESSAGES_PATH: &str = "/messages";
pub const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn endpoint(&self, _mode: InvokeMode) -> &'static str {
        MESSAGES_PATH
    }

    fn auth_scheme(&self) -> AuthScheme {
        AuthScheme::ApiKeyHeader("x-api-key")
    }

    fn extra_headers(&self) -> Vec<(&'static str, String)> {
        vec![("anthropic-version", API_VERSION.to_string())]
    }

    fn build_body(&self, context: &BuildContext<'_>) -> Result<Value, InvokeError> {
        to_body(&converter::to_anthropic_request(context)?)
    }

    fn decode_response(&self, _mode: InvokeMode, body: &[u8]) -> Result<InvokeResult, InvokeError> {
        Ok(converter::from_anthropic_response(parse_body(body)?))
    }

    fn stream_decoder(&self, _mode: InvokeMode) -> Box<dyn StreamDecoder> {
        Box::new(streaming::MessagesStreamDecoder::new())
    }
}
