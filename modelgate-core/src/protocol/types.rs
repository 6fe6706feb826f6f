//! Core protocol types for provider invocations
//!
//! These are the provider-agnostic shapes every invocation is expressed in:
//! - Role-tagged prompt messages with optional tool-call payloads
//! - A closed set of recognized invocation parameters
//! - A normalized final result and a normalized stream chunk
//! - Usage counts where "unknown" is distinct from zero

use crate::providers::error::InvokeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Invocation mode of a vendor endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeMode {
    /// Multi-turn, role-preserving chat endpoint
    Chat,
    /// Single prompt string completion endpoint
    Completion,
}

impl InvokeMode {
    /// Wire name of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            InvokeMode::Chat => "chat",
            InvokeMode::Completion => "completion",
        }
    }

    /// Parse a mode name, returning `None` for anything unrecognized
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Some(InvokeMode::Chat),
            "completion" => Some(InvokeMode::Completion),
            _ => None,
        }
    }
}

impl fmt::Display for InvokeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function call information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function to call
    pub name: String,

    /// Arguments to the function (usually a JSON string)
    pub arguments: String,
}

/// Tool call requested by the assistant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,

    /// Type of tool (usually "function")
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,

    /// Function information
    pub function: FunctionCall,
}

impl ToolCall {
    /// Create a function tool call
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_type: default_tool_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// One turn of a conversation.
///
/// The sequence order is the turn order and is preserved by every request
/// builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum PromptMessage {
    /// System instructions that guide the model's behavior
    System { content: String },

    /// End-user input
    User { content: String },

    /// A previous model turn, possibly carrying tool calls
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },

    /// Result of a tool call, answering `tool_call_id`
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        PromptMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        PromptMessage::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        PromptMessage::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Assistant turn that requested tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        PromptMessage::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        PromptMessage::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// Text content of this turn
    pub fn content(&self) -> &str {
        match self {
            PromptMessage::System { content }
            | PromptMessage::User { content }
            | PromptMessage::Assistant { content, .. }
            | PromptMessage::Tool { content, .. } => content,
        }
    }

    /// Role name as used by OpenAI-style chat endpoints
    pub fn role(&self) -> &'static str {
        match self {
            PromptMessage::System { .. } => "system",
            PromptMessage::User { .. } => "user",
            PromptMessage::Assistant { .. } => "assistant",
            PromptMessage::Tool { .. } => "tool",
        }
    }

    /// Tool calls carried by an assistant turn
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            PromptMessage::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Function/tool specification offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema of the function arguments
    #[serde(default = "empty_schema")]
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Recognized invocation parameters.
///
/// Deserialization rejects unknown keys, so a misspelled option surfaces as a
/// `BadRequest` instead of being dropped on the floor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvokeParameters {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling parameter (0.0 to 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Stop sequences
    #[serde(default, alias = "stop_sequences", skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Tools offered to the model (chat mode only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,

    /// End-user identifier forwarded to the vendor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl InvokeParameters {
    /// Parse parameters from an untyped map, rejecting unrecognized options
    pub fn from_value(value: serde_json::Value) -> Result<Self, InvokeError> {
        serde_json::from_value(value).map_err(|e| InvokeError::BadRequest {
            message: format!("invalid invocation parameters: {}", e),
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Check value ranges of the recognized options
    pub fn validate(&self) -> Result<(), InvokeError> {
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(InvokeError::BadRequest {
                    message: format!("temperature must be between 0.0 and 2.0, got {}", temperature),
                });
            }
        }

        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(InvokeError::BadRequest {
                    message: format!("top_p must be between 0.0 and 1.0, got {}", top_p),
                });
            }
        }

        if self.max_tokens == Some(0) {
            return Err(InvokeError::BadRequest {
                message: "max_tokens must be greater than 0".to_string(),
            });
        }

        if self.stop.iter().any(|s| s.is_empty()) {
            return Err(InvokeError::BadRequest {
                message: "stop sequences must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Why the model stopped producing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCall,
    ContentFilter,
    Error,
}

impl FinishReason {
    /// Map a vendor finish/stop reason onto the normalized set
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" | "eos" => FinishReason::Stop,
            "length" | "max_tokens" | "model_length" => FinishReason::Length,
            "tool_calls" | "function_call" | "tool_use" | "tool_call" => FinishReason::ToolCall,
            "content_filter" | "refusal" | "safety" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            other => {
                tracing::debug!(reason = other, "unrecognized finish reason, treating as stop");
                FinishReason::Stop
            }
        }
    }
}

/// Token usage of one invocation.
///
/// `None` means the count is unknown, which is not the same as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none()
            && self.completion_tokens.is_none()
            && self.total_tokens.is_none()
    }

    /// Overlay the counts known in `other` onto `self`
    pub fn merge(&mut self, other: Usage) {
        if other.prompt_tokens.is_some() {
            self.prompt_tokens = other.prompt_tokens;
        }
        if other.completion_tokens.is_some() {
            self.completion_tokens = other.completion_tokens;
        }
        if other.total_tokens.is_some() {
            self.total_tokens = other.total_tokens;
        }
    }
}

/// Final normalized output of a non-streaming invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResult {
    /// Model that produced the output, as reported by the vendor
    pub model: String,

    /// Generated text
    pub content: String,

    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    pub finish_reason: FinishReason,

    pub usage: Usage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

/// Incremental piece of a streamed tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the tool call within the assistant turn
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fragment of the JSON arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One element of a normalized stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Zero-based position of this chunk in the stream
    pub index: usize,

    /// Text fragment
    pub delta: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    /// Present only on the terminal chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Accounted usage, present only on the terminal chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization_is_role_tagged() {
        let value = serde_json::to_value(PromptMessage::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));

        let tool: PromptMessage =
            serde_json::from_value(json!({"role": "tool", "content": "42", "tool_call_id": "c1"}))
                .unwrap();
        assert_eq!(tool, PromptMessage::tool("c1", "42"));
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let err = InvokeParameters::from_value(json!({"temperature": 0.2, "frequency_boost": 1}))
            .unwrap_err();
        assert!(matches!(err, InvokeError::BadRequest { .. }));
        assert!(err.to_string().contains("frequency_boost"));
    }

    #[test]
    fn test_stop_sequences_alias() {
        let params =
            InvokeParameters::from_value(json!({"stop_sequences": ["\n\n"], "stream": true}))
                .unwrap();
        assert_eq!(params.stop, vec!["\n\n".to_string()]);
        assert!(params.stream);
    }

    #[test]
    fn test_parameter_ranges() {
        assert!(InvokeParameters::default().with_temperature(2.5).validate().is_err());
        assert!(InvokeParameters::default().with_top_p(1.5).validate().is_err());
        assert!(InvokeParameters::default().with_max_tokens(0).validate().is_err());
        assert!(InvokeParameters::default()
            .with_temperature(0.7)
            .with_top_p(0.9)
            .with_max_tokens(64)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_vendor("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_vendor("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_vendor("max_tokens"), FinishReason::Length);
        assert_eq!(FinishReason::from_vendor("tool_calls"), FinishReason::ToolCall);
        assert_eq!(FinishReason::from_vendor("tool_use"), FinishReason::ToolCall);
        assert_eq!(
            FinishReason::from_vendor("content_filter"),
            FinishReason::ContentFilter
        );
    }

    #[test]
    fn test_usage_merge_keeps_unknowns() {
        let mut usage = Usage {
            prompt_tokens: Some(10),
            ..Default::default()
        };
        usage.merge(Usage {
            completion_tokens: Some(4),
            ..Default::default()
        });
        assert_eq!(usage.prompt_tokens, Some(10));
        assert_eq!(usage.completion_tokens, Some(4));
        assert_eq!(usage.total_tokens, None);
    }
}
