//! Conversion between modelgate protocol and Anthropic format

use super::types::*;
use crate::protocol::{FinishReason, InvokeResult, PromptMessage, ToolCall, ToolSpec};
use crate::providers::adapter::BuildContext;
use crate::providers::error::InvokeError;
use crate::providers::tokens::TokenAccountant;
use serde_json::Value;

/// Convert a build context to a Messages API request.
///
/// System turns move to the top-level `system` field, tool results become
/// user-side `tool_result` blocks, and consecutive turns of the same role are
/// merged so roles alternate.
pub fn to_anthropic_request<'a>(
    context: &BuildContext<'a>,
) -> Result<AnthropicRequest<'a>, InvokeError> {
    let mut system: Vec<&str> = Vec::new();
    let mut messages: Vec<AnthropicMessage> = Vec::new();

    for message in context.messages {
        let (role, blocks) = match message {
            PromptMessage::System { content } => {
                system.push(content);
                continue;
            }
            PromptMessage::User { content } => ("user", vec![text_block(content)]),
            PromptMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                if !content.is_empty() {
                    blocks.push(text_block(content));
                }
                for call in tool_calls {
                    blocks.push(tool_use_block(call)?);
                }
                ("assistant", blocks)
            }
            PromptMessage::Tool {
                content,
                tool_call_id,
            } => (
                "user",
                vec![ContentBlock::ToolResult {
                    tool_use_id: tool_call_id.clone(),
                    content: content.clone(),
                }],
            ),
        };

        if blocks.is_empty() {
            continue;
        }
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => messages.push(AnthropicMessage {
                role,
                content: blocks,
            }),
        }
    }

    if messages.is_empty() {
        return Err(InvokeError::BadRequest {
            message: "at least one user or assistant message is required".to_string(),
        });
    }

    let parameters = context.parameters;
    Ok(AnthropicRequest {
        model: context.model,
        system: (!system.is_empty()).then(|| system.join("\n")),
        messages,
        max_tokens: context.max_tokens,
        temperature: parameters.temperature,
        top_p: parameters.top_p,
        stop_sequences: parameters.stop.clone(),
        stream: context.stream(),
        tools: parameters.tools.iter().map(to_anthropic_tool).collect(),
        metadata: parameters.user.as_ref().map(|user| AnthropicMetadata {
            user_id: user.clone(),
        }),
    })
}

fn text_block(text: &str) -> ContentBlock {
    ContentBlock::Text {
        text: text.to_string(),
    }
}

fn tool_use_block(call: &ToolCall) -> Result<ContentBlock, InvokeError> {
    let arguments = call.function.arguments.trim();
    let input = if arguments.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(arguments).map_err(|_| InvokeError::BadRequest {
            message: format!("arguments of tool call '{}' are not valid JSON", call.id),
        })?
    };
    Ok(ContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input,
    })
}

fn to_anthropic_tool(tool: &ToolSpec) -> AnthropicTool {
    AnthropicTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters.clone(),
    }
}

/// Convert a Messages API response to an invocation result
pub fn from_anthropic_response(response: AnthropicResponse) -> InvokeResult {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::function(id, name, input.to_string()))
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Unsupported => {}
        }
    }

    let finish_reason = match response.stop_reason.as_deref() {
        Some(reason) => FinishReason::from_vendor(reason),
        None if !tool_calls.is_empty() => FinishReason::ToolCall,
        None => FinishReason::Stop,
    };

    InvokeResult {
        model: response.model,
        content,
        tool_calls,
        finish_reason,
        usage: response
            .usage
            .as_ref()
            .map(TokenAccountant::extract_usage)
            .unwrap_or_default(),
        system_fingerprint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InvokeMode, InvokeParameters};
    use serde_json::json;

    fn build(messages: &[PromptMessage], parameters: &InvokeParameters) -> Value {
        let context = BuildContext {
            mode: InvokeMode::Chat,
            model: "claude-3-5-haiku-latest",
            messages,
            parameters,
            max_tokens: 256,
        };
        serde_json::to_value(to_anthropic_request(&context).unwrap()).unwrap()
    }

    #[test]
    fn test_system_lifted_and_roles_merged() {
        let messages = vec![
            PromptMessage::system("Be brief."),
            PromptMessage::user("one"),
            PromptMessage::user("two"),
            PromptMessage::assistant("ok"),
        ];
        let body = build(&messages, &InvokeParameters::default().with_user("u-1"));

        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["content"].as_array().unwrap().len(), 2);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["metadata"], json!({"user_id": "u-1"}));
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_tool_round_trip_blocks() {
        let messages = vec![
            PromptMessage::user("weather?"),
            PromptMessage::assistant_with_tools(
                "",
                vec![ToolCall::function("toolu_1", "weather", r#"{"city":"Oslo"}"#)],
            ),
            PromptMessage::tool("toolu_1", "rainy"),
        ];
        let params = InvokeParameters::default()
            .with_tools(vec![ToolSpec::new("weather", json!({"type": "object"}))])
            .with_stop(vec!["END".to_string()]);
        let body = build(&messages, &params);

        assert_eq!(
            body["messages"][1]["content"][0],
            json!({"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "Oslo"}})
        );
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["tools"][0]["input_schema"], json!({"type": "object"}));
        assert_eq!(body["stop_sequences"], json!(["END"]));
    }

    #[test]
    fn test_system_only_is_rejected() {
        let messages = vec![PromptMessage::system("alone")];
        let params = InvokeParameters::default();
        let context = BuildContext {
            mode: InvokeMode::Chat,
            model: "claude",
            messages: &messages,
            parameters: &params,
            max_tokens: 16,
        };
        assert!(matches!(
            to_anthropic_request(&context),
            Err(InvokeError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_response_conversion() {
        let response: AnthropicResponse = serde_json::from_value(json!({
            "model": "claude-3-5-haiku-20241022",
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "Oslo"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 30, "output_tokens": 12}
        }))
        .unwrap();

        let result = from_anthropic_response(response);
        assert_eq!(result.content, "Checking.");
        assert_eq!(result.finish_reason, FinishReason::ToolCall);
        assert_eq!(result.tool_calls[0].function.arguments, r#"{"city":"Oslo"}"#);
        assert_eq!(result.usage.prompt_tokens, Some(30));
        assert_eq!(result.usage.completion_tokens, Some(12));
    }
}
