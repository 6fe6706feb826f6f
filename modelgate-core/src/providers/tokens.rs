//! Token accounting
//!
//! Prompt tokens are estimated locally before the call (characters divided
//! by a per-provider ratio, rounded up, plus a per-message framing overhead in
//! chat mode). After the call, vendor-reported usage is normalized and gaps
//! are filled: a missing prompt count takes the estimate, a missing
//! completion count stays unknown.

use crate::protocol::{InvokeMode, PromptMessage, ToolSpec, Usage};
use crate::providers::builder::completion_prompt;
use crate::providers::descriptor::TokenizerProfile;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAccountant {
    profile: TokenizerProfile,
}

impl TokenAccountant {
    pub fn new(profile: TokenizerProfile) -> Self {
        Self { profile }
    }

    /// Tokens for a piece of text: ⌈chars / chars_per_token⌉
    pub fn estimate_text(&self, text: &str) -> u32 {
        let chars = text.chars().count() as u64;
        let per_token = u64::from(self.profile.chars_per_token.max(1));
        chars.div_ceil(per_token).min(u64::from(u32::MAX)) as u32
    }

    /// Estimate prompt tokens; never below 1
    pub fn estimate(&self, messages: &[PromptMessage], mode: InvokeMode) -> u32 {
        self.estimate_with_tools(messages, mode, &[])
    }

    /// Estimate prompt tokens including offered tool specifications
    pub fn estimate_with_tools(
        &self,
        messages: &[PromptMessage],
        mode: InvokeMode,
        tools: &[ToolSpec],
    ) -> u32 {
        let message_tokens = match mode {
            InvokeMode::Completion => self.estimate_text(&completion_prompt(messages)),
            InvokeMode::Chat => messages
                .iter()
                .map(|m| self.message_tokens(m))
                .fold(0u32, u32::saturating_add),
        };

        let tool_tokens = tools
            .iter()
            .map(|tool| {
                let mut text = tool.name.clone();
                if let Some(description) = &tool.description {
                    text.push_str(description);
                }
                text.push_str(&tool.parameters.to_string());
                self.estimate_text(&text)
            })
            .fold(0u32, u32::saturating_add);

        message_tokens.saturating_add(tool_tokens).max(1)
    }

    fn message_tokens(&self, message: &PromptMessage) -> u32 {
        let mut tokens = self
            .estimate_text(message.content())
            .saturating_add(self.profile.per_message_overhead);
        for call in message.tool_calls() {
            tokens = tokens
                .saturating_add(self.estimate_text(&call.function.name))
                .saturating_add(self.estimate_text(&call.function.arguments));
        }
        tokens
    }

    /// Read usage from a vendor payload, or from the `usage` object inside it.
    ///
    /// Understands OpenAI (`prompt_tokens`/`completion_tokens`/`total_tokens`)
    /// and Anthropic (`input_tokens`/`output_tokens`) shapes.
    pub fn extract_usage(raw: &Value) -> Usage {
        let usage = match raw.get("usage") {
            Some(inner) if inner.is_object() => inner,
            _ => raw,
        };

        let count = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| usage.get(*k).and_then(Value::as_u64))
                .map(|v| v.min(u64::from(u32::MAX)) as u32)
        };

        Usage {
            prompt_tokens: count(&["prompt_tokens", "input_tokens"]),
            completion_tokens: count(&["completion_tokens", "output_tokens"]),
            total_tokens: count(&["total_tokens"]),
        }
    }

    /// Fill gaps in reported usage
    pub fn finalize(&self, reported: Usage, prompt_estimate: u32) -> Usage {
        let prompt_tokens = reported.prompt_tokens.or(Some(prompt_estimate));
        let completion_tokens = reported.completion_tokens;
        let total_tokens = reported.total_tokens.or_else(|| {
            completion_tokens.map(|c| c.saturating_add(prompt_tokens.unwrap_or(prompt_estimate)))
        });

        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}
