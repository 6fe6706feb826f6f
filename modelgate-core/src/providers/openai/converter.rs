//! Conversion between modelgate protocol and OpenAI format

use super::types::*;
use crate::protocol::{
    FinishReason, FunctionCall, InvokeResult, PromptMessage, ToolCall, ToolSpec,
};
use crate::providers::adapter::BuildContext;
use crate::providers::builder::completion_prompt;
use crate::providers::error::InvokeError;
use crate::providers::tokens::TokenAccountant;

/// Convert a build context to an OpenAI chat request
pub fn to_chat_request<'a>(
    context: &BuildContext<'a>,
    stream_usage: bool,
) -> OpenAIChatRequest<'a> {
    let parameters = context.parameters;
    OpenAIChatRequest {
        model: context.model,
        messages: context.messages.iter().map(to_openai_message).collect(),
        max_tokens: context.max_tokens,
        temperature: parameters.temperature,
        top_p: parameters.top_p,
        stop: &parameters.stop,
        stream: context.stream(),
        stream_options: stream_options(context, stream_usage),
        tools: parameters.tools.iter().map(to_openai_tool).collect(),
        user: parameters.user.as_deref(),
    }
}

/// Convert a build context to a legacy completion request
pub fn to_completion_request<'a>(
    context: &BuildContext<'a>,
    stream_usage: bool,
) -> OpenAICompletionRequest<'a> {
    let parameters = context.parameters;
    OpenAICompletionRequest {
        model: context.model,
        prompt: completion_prompt(context.messages),
        max_tokens: context.max_tokens,
        temperature: parameters.temperature,
        top_p: parameters.top_p,
        stop: &parameters.stop,
        stream: context.stream(),
        stream_options: stream_options(context, stream_usage),
        user: parameters.user.as_deref(),
    }
}

fn stream_options(context: &BuildContext<'_>, stream_usage: bool) -> Option<OpenAIStreamOptions> {
    (context.stream() && stream_usage).then_some(OpenAIStreamOptions {
        include_usage: true,
    })
}

fn to_openai_message(message: &PromptMessage) -> OpenAIMessage {
    let tool_calls = message.tool_calls();
    OpenAIMessage {
        role: message.role().to_string(),
        content: match message {
            // Tool-only assistant turns carry null content
            PromptMessage::Assistant { content, .. } if content.is_empty() && !tool_calls.is_empty() => None,
            other => Some(other.content().to_string()),
        },
        tool_calls: (!tool_calls.is_empty()).then(|| {
            tool_calls
                .iter()
                .map(|tc| OpenAIToolCall {
                    id: tc.id.clone(),
                    tool_type: tc.tool_type.clone(),
                    function: OpenAIFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect()
        }),
        tool_call_id: match message {
            PromptMessage::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
            _ => None,
        },
    }
}

fn to_openai_tool(tool: &ToolSpec) -> OpenAITool {
    OpenAITool {
        tool_type: "function",
        function: OpenAIFunctionDef {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

/// Convert an OpenAI chat response to an invocation result
pub fn from_chat_response(response: OpenAIChatResponse) -> Result<InvokeResult, InvokeError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(no_choices)?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            tool_type: tc.tool_type,
            function: FunctionCall {
                name: tc.function.name,
                arguments: tc.function.arguments,
            },
        })
        .collect();

    Ok(InvokeResult {
        model: response.model,
        content: choice.message.content.unwrap_or_default(),
        finish_reason: finish_reason(choice.finish_reason.as_deref(), !tool_calls.is_empty()),
        tool_calls,
        usage: response
            .usage
            .as_ref()
            .map(TokenAccountant::extract_usage)
            .unwrap_or_default(),
        system_fingerprint: response.system_fingerprint,
    })
}

/// Convert a legacy completion response to an invocation result
pub fn from_completion_response(
    response: OpenAICompletionResponse,
) -> Result<InvokeResult, InvokeError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(no_choices)?;

    Ok(InvokeResult {
        model: response.model,
        content: choice.text,
        tool_calls: Vec::new(),
        finish_reason: finish_reason(choice.finish_reason.as_deref(), false),
        usage: response
            .usage
            .as_ref()
            .map(TokenAccountant::extract_usage)
            .unwrap_or_default(),
        system_fingerprint: response.system_fingerprint,
    })
}

/// A missing reason reads as tool_call when tool calls came back, else stop
fn finish_reason(reason: Option<&str>, has_tool_calls: bool) -> FinishReason {
    match reason {
        Some(reason) => FinishReason::from_vendor(reason),
        None if has_tool_calls => FinishReason::ToolCall,
        None => FinishReason::Stop,
    }
}

fn no_choices() -> InvokeError {
    InvokeError::UnknownTransport {
        message: "response contained no choices".to_string(),
    }
}
