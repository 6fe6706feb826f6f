//! Built-in provider descriptors
//!
//! Each provider pairs a descriptor with the adapter for its wire format.

use crate::credentials::{API_KEY, CONTEXT_SIZE, ENDPOINT_URL, MAX_TOKENS, MODE, TIMEOUT};
use crate::protocol::InvokeMode;
use crate::providers::anthropic::AnthropicAdapter;
use crate::providers::descriptor::{
    CredentialField, FieldKind, ParameterRules, ProviderDescriptor, TokenizerProfile,
};
use crate::providers::openai::OpenAiAdapter;
use crate::providers::registry::RegisteredProvider;
use crate::providers::retry::RetryPolicy;
use std::collections::BTreeSet;
use std::time::Duration;

pub const OPENAI_CHAT: &str = "openai_api_chat";
pub const OPENAI_COMPLETION: &str = "openai_api_completion";
pub const OPENAI_COMPATIBLE: &str = "openai_api_compatible";
pub const KIMI: &str = "kimi";
pub const ANTHROPIC: &str = "anthropic";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const KIMI_BASE_URL: &str = "https://api.moonshot.cn/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MODES: &[&str] = &["chat", "completion"];

fn modes(modes: &[InvokeMode]) -> BTreeSet<InvokeMode> {
    modes.iter().copied().collect()
}

/// Optional tuning fields every provider accepts
fn tuning_fields() -> [CredentialField; 3] {
    [
        CredentialField::optional(CONTEXT_SIZE, "Context size", FieldKind::Integer),
        CredentialField::optional(MAX_TOKENS, "Max tokens", FieldKind::Integer),
        CredentialField::optional(TIMEOUT, "Timeout (seconds)", FieldKind::Integer),
    ]
}

fn descriptor(
    id: &'static str,
    label: &'static str,
    supported: &[InvokeMode],
    default_base_url: &'static str,
    mut credential_schema: Vec<CredentialField>,
) -> ProviderDescriptor {
    credential_schema.extend(tuning_fields());
    ProviderDescriptor {
        id,
        label,
        supported_modes: modes(supported),
        credential_schema,
        default_base_url,
        default_timeout: DEFAULT_TIMEOUT,
        retry_policy: RetryPolicy::default(),
        parameter_rules: ParameterRules::default(),
        tokenizer: TokenizerProfile::default(),
    }
}

pub fn openai_chat() -> ProviderDescriptor {
    descriptor(
        OPENAI_CHAT,
        "OpenAI (chat)",
        &[InvokeMode::Chat],
        OPENAI_BASE_URL,
        vec![
            CredentialField::required(API_KEY, "API key", FieldKind::Secret),
            CredentialField::optional(ENDPOINT_URL, "API base URL", FieldKind::Url)
                .with_default(OPENAI_BASE_URL),
        ],
    )
}

pub fn openai_completion() -> ProviderDescriptor {
    let mut descriptor = descriptor(
        OPENAI_COMPLETION,
        "OpenAI (completion)",
        &[InvokeMode::Completion],
        OPENAI_BASE_URL,
        vec![
            CredentialField::required(API_KEY, "API key", FieldKind::Secret),
            CredentialField::optional(ENDPOINT_URL, "API base URL", FieldKind::Url)
                .with_default(OPENAI_BASE_URL),
        ],
    );
    descriptor.parameter_rules.supports_tools = false;
    descriptor
}

/// Any server speaking the OpenAI API; the caller states the endpoint and mode
pub fn openai_compatible() -> ProviderDescriptor {
    descriptor(
        OPENAI_COMPATIBLE,
        "OpenAI-compatible API",
        &[InvokeMode::Chat, InvokeMode::Completion],
        OPENAI_BASE_URL,
        vec![
            CredentialField::optional(API_KEY, "API key", FieldKind::Secret),
            CredentialField::required(ENDPOINT_URL, "API base URL", FieldKind::Url),
            CredentialField::required(MODE, "Endpoint mode", FieldKind::Select)
                .with_options(MODES)
                .with_default("chat"),
        ],
    )
}

pub fn kimi() -> ProviderDescriptor {
    let mut descriptor = descriptor(
        KIMI,
        "Kimi (Moonshot)",
        &[InvokeMode::Chat],
        KIMI_BASE_URL,
        vec![
            CredentialField::required(API_KEY, "API key", FieldKind::Secret),
            CredentialField::optional(ENDPOINT_URL, "API base URL", FieldKind::Url)
                .with_default(KIMI_BASE_URL),
        ],
    );
    descriptor.parameter_rules.default_context_size = 8192;
    descriptor
}

pub fn anthropic() -> ProviderDescriptor {
    let mut descriptor = descriptor(
        ANTHROPIC,
        "Anthropic",
        &[InvokeMode::Chat],
        ANTHROPIC_BASE_URL,
        vec![
            CredentialField::required(API_KEY, "API key", FieldKind::Secret),
            CredentialField::optional(ENDPOINT_URL, "API base URL", FieldKind::Url)
                .with_default(ANTHROPIC_BASE_URL),
        ],
    );
    descriptor.default_timeout = Duration::from_secs(120);
    descriptor
}

pub fn openai_chat_provider() -> RegisteredProvider {
    RegisteredProvider::new(openai_chat(), OpenAiAdapter::new().with_stream_usage(true))
}

pub fn openai_completion_provider() -> RegisteredProvider {
    RegisteredProvider::new(
        openai_completion(),
        OpenAiAdapter::new().with_stream_usage(true),
    )
}

pub fn openai_compatible_provider() -> RegisteredProvider {
    RegisteredProvider::new(openai_compatible(), OpenAiAdapter::new())
}

pub fn kimi_provider() -> RegisteredProvider {
    RegisteredProvider::new(kimi(), OpenAiAdapter::new())
}

pub fn anthropic_provider() -> RegisteredProvider {
    RegisteredProvider::new(anthropic(), AnthropicAdapter)
}

/// Every built-in provider, in registration order
pub fn all() -> Vec<RegisteredProvider> {
    vec![
        openai_chat_provider(),
        openai_completion_provider(),
        openai_compatible_provider(),
        kimi_provider(),
        anthropic_provider(),
    ]
}

