//! Protocol module for provider-agnostic invocation structures
//!
//! This module defines the canonical data model every provider adapter
//! translates to and from. These structures are:
//! - Provider-agnostic
//! - Shared by streaming and non-streaming paths
//! - Serializable for callers that persist or forward them

pub mod types;

pub use types::{
    FinishReason, FunctionCall, InvokeMode, InvokeParameters, InvokeResult, PromptMessage,
    StreamChunk, ToolCall, ToolCallDelta, ToolSpec, Usage,
};
