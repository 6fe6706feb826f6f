//! Provider descriptors
//!
//! A descriptor is the immutable, serializable description of one provider:
//! which modes it serves, which credential fields it needs, and the
//! defaults applied when the caller leaves something out.

use crate::protocol::InvokeMode;
use crate::providers::retry::RetryPolicy;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// Input kind of a credential field, for form rendering and static checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Secret,
    Text,
    Url,
    Integer,
    Select,
}

/// One entry of a provider's credential schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    #[serde(skip_serializing_if = "no_options")]
    pub options: &'static [&'static str],
}

impl CredentialField {
    pub const fn required(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: true,
            default: None,
            options: &[],
        }
    }

    pub const fn optional(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            default: None,
            options: &[],
        }
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn with_options(mut self, options: &'static [&'static str]) -> Self {
        self.options = options;
        self
    }
}

fn no_options(options: &&'static [&'static str]) -> bool {
    options.is_empty()
}

/// Defaults applied by the request builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterRules {
    /// Context window assumed when credentials carry no `context_size`
    pub default_context_size: u32,
    /// Upper bound for the derived `max_tokens`
    pub default_max_tokens: u32,
    /// Floor for the derived `max_tokens`
    pub min_response_tokens: u32,
    /// Tokens held back from the context window when deriving `max_tokens`
    pub context_reserve: u32,
    pub supports_tools: bool,
}

impl Default for ParameterRules {
    fn default() -> Self {
        Self {
            default_context_size: 4096,
            default_max_tokens: 2048,
            min_response_tokens: 100,
            context_reserve: 100,
            supports_tools: true,
        }
    }
}

/// Character-based token estimation profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenizerProfile {
    pub chars_per_token: u32,
    /// Role/framing tokens added per chat message
    pub per_message_overhead: u32,
}

impl Default for TokenizerProfile {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            per_message_overhead: 4,
        }
    }
}

/// Immutable description of a registered provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub supported_modes: BTreeSet<InvokeMode>,
    pub credential_schema: Vec<CredentialField>,
    pub default_base_url: &'static str,
    #[serde(with = "duration_secs")]
    pub default_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub parameter_rules: ParameterRules,
    pub tokenizer: TokenizerProfile,
}

impl ProviderDescriptor {
    pub fn supports(&self, mode: InvokeMode) -> bool {
        self.supported_modes.contains(&mode)
    }

    /// Look up a credential field by name
    pub fn field(&self, name: &str) -> Option<&CredentialField> {
        self.credential_schema.iter().find(|f| f.name == name)
    }

    pub fn default_context_size(&self) -> u32 {
        self.parameter_rules.default_context_size
    }

    pub fn default_max_tokens(&self) -> u32 {
        self.parameter_rules.default_max_tokens
    }

    /// The only mode, for single-mode providers
    pub fn sole_mode(&self) -> Option<InvokeMode> {
        if self.supported_modes.len() == 1 {
            self.supported_modes.iter().next().copied()
        } else {
            None
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}
