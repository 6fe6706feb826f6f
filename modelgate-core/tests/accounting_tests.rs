//! Property tests for token estimation and usage accounting

use modelgate_core::providers::TokenAccountant;
use modelgate_core::{InvokeMode, PromptMessage, Usage};
use proptest::prelude::*;
use serde_json::json;

fn conversation(turns: &[String]) -> Vec<PromptMessage> {
    turns
        .iter()
        .enumerate()
        .map(|(i, text)| {
            if i % 2 == 0 {
                PromptMessage::user(text.clone())
            } else {
                PromptMessage::assistant(text.clone())
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn estimate_grows_with_text(base in ".{0,200}", extra in ".{1,200}") {
        let accountant = TokenAccountant::default();
        let longer = format!("{}{}", base, extra);
        prop_assert!(accountant.estimate_text(&longer) >= accountant.estimate_text(&base));
    }

    #[test]
    fn estimate_grows_with_turns(
        turns in proptest::collection::vec("[a-z ]{0,80}", 1..8),
        next in "[a-z ]{0,80}",
    ) {
        let accountant = TokenAccountant::default();
        let mut longer = turns.clone();
        longer.push(next);

        for mode in [InvokeMode::Chat, InvokeMode::Completion] {
            let before = accountant.estimate(&conversation(&turns), mode);
            let after = accountant.estimate(&conversation(&longer), mode);
            prop_assert!(after >= before);
            prop_assert!(before >= 1);
        }
    }

    #[test]
    fn finalize_keeps_reported_counts(
        prompt in proptest::option::of(0u32..100_000),
        completion in proptest::option::of(0u32..100_000),
        estimate in 1u32..10_000,
    ) {
        let accountant = TokenAccountant::default();
        let reported = Usage { prompt_tokens: prompt, completion_tokens: completion, total_tokens: None };
        let usage = accountant.finalize(reported, estimate);

        prop_assert_eq!(usage.prompt_tokens, Some(prompt.unwrap_or(estimate)));
        prop_assert_eq!(usage.completion_tokens, completion);
        match completion {
            Some(c) => prop_assert_eq!(usage.total_tokens, Some(c + prompt.unwrap_or(estimate))),
            None => prop_assert_eq!(usage.total_tokens, None),
        }
    }
}

#[test]
fn test_extract_usage_from_both_vendors() {
    let openai = TokenAccountant::extract_usage(&json!({
        "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
    }));
    assert_eq!(openai.total_tokens, Some(12));

    let anthropic = TokenAccountant::extract_usage(&json!({"input_tokens": 9, "output_tokens": 3}));
    assert_eq!(anthropic.prompt_tokens, Some(9));
    assert_eq!(anthropic.completion_tokens, Some(3));
    assert_eq!(anthropic.total_tokens, None);
}

#[test]
fn test_tools_count_toward_prompt() {
    let accountant = TokenAccountant::default();
    let messages = [PromptMessage::user("What is the weather?")];
    let tools = [modelgate_core::ToolSpec::new(
        "get_weather",
        json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    )
    .with_description("Current weather for a city")];

    let without = accountant.estimate(&messages, InvokeMode::Chat);
    let with = accountant.estimate_with_tools(&messages, InvokeMode::Chat, &tools);
    assert!(with > without);
}
