//! Provider adapter trait
//!
//! An adapter owns everything vendor-specific about the wire: endpoint paths,
//! how the key is presented, the request body shape, the response shape, and
//! the streaming event format. Everything else is shared.

use crate::http::AuthScheme;
use crate::protocol::{InvokeMode, InvokeParameters, InvokeResult, PromptMessage};
use crate::providers::error::InvokeError;
use crate::streaming::StreamDecoder;
use serde_json::Value;

/// Inputs to body construction, after defaults have been applied
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub mode: InvokeMode,
    pub model: &'a str,
    pub messages: &'a [PromptMessage],
    pub parameters: &'a InvokeParameters,
    /// Resolved output budget; always sent
    pub max_tokens: u32,
}

impl BuildContext<'_> {
    pub fn stream(&self) -> bool {
        self.parameters.stream
    }
}

/// Core trait every vendor wire format implements
pub trait ProviderAdapter: Send + Sync {
    /// Endpoint path for a mode, relative to the base URL
    fn endpoint(&self, mode: InvokeMode) -> &'static str;

    fn auth_scheme(&self) -> AuthScheme {
        AuthScheme::Bearer
    }

    /// Fixed non-secret headers, e.g. an API version
    fn extra_headers(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Build the JSON request body
    fn build_body(&self, context: &BuildContext<'_>) -> Result<Value, InvokeError>;

    /// Decode a successful non-streaming body
    fn decode_response(&self, mode: InvokeMode, body: &[u8]) -> Result<InvokeResult, InvokeError>;

    /// Fresh decoder for one streaming response
    fn stream_decoder(&self, mode: InvokeMode) -> Box<dyn StreamDecoder>;
}

/// Deserialize a success body, classifying garbage as a transport problem
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, InvokeError> {
    serde_json::from_slice(body).map_err(|e| InvokeError::UnknownTransport {
        message: format!("malformed response body: {}", e),
    })
}

pub(crate) fn to_body<T: serde::Serialize>(request: &T) -> Result<Value, InvokeError> {
    serde_json::to_value(request).map_err(|e| InvokeError::BadRequest {
        message: format!("failed to serialize request: {}", e),
    })
}
