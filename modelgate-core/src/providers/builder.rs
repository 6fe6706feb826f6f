//! Request construction
//!
//! Turns a provider-agnostic invocation into a [`WireRequest`]: mode checks,
//! parameter validation, output budget derivation, endpoint resolution, and
//! finally the vendor body from the adapter.

use crate::config::ProviderOverride;
use crate::credentials::Credentials;
use crate::http::WireRequest;
use crate::protocol::{InvokeMode, InvokeParameters, PromptMessage};
use crate::providers::adapter::{BuildContext, ProviderAdapter};
use crate::providers::descriptor::ProviderDescriptor;
use crate::providers::error::InvokeError;
use crate::providers::tokens::TokenAccountant;
use std::time::Duration;
use tracing::debug;

/// Request ready for the transport, plus what the normalizer needs later
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub wire: WireRequest,
    pub prompt_estimate: u32,
}

pub struct RequestBuilder<'a> {
    descriptor: &'a ProviderDescriptor,
    adapter: &'a dyn ProviderAdapter,
    override_: Option<&'a ProviderOverride>,
    accountant: TokenAccountant,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(descriptor: &'a ProviderDescriptor, adapter: &'a dyn ProviderAdapter) -> Self {
        Self {
            descriptor,
            adapter,
            override_: None,
            accountant: TokenAccountant::new(descriptor.tokenizer),
        }
    }

    /// Apply deployment overrides for this provider
    pub fn with_override(mut self, override_: Option<&'a ProviderOverride>) -> Self {
        self.override_ = override_;
        self
    }

    pub fn accountant(&self) -> TokenAccountant {
        self.accountant
    }

    /// Build the wire request. Nothing here touches the network.
    pub fn build(
        &self,
        mode: InvokeMode,
        model: &str,
        messages: &[PromptMessage],
        parameters: &InvokeParameters,
        credentials: &Credentials,
    ) -> Result<BuiltRequest, InvokeError> {
        self.check_mode(mode, parameters, credentials)?;
        parameters.validate()?;

        if messages.is_empty() {
            return Err(InvokeError::BadRequest {
                message: "at least one prompt message is required".to_string(),
            });
        }
        if !parameters.tools.is_empty() && !self.descriptor.parameter_rules.supports_tools {
            return Err(InvokeError::BadRequest {
                message: format!("provider '{}' does not support tools", self.descriptor.id),
            });
        }

        let prompt_estimate =
            self.accountant
                .estimate_with_tools(messages, mode, &parameters.tools);
        let max_tokens = match parameters.max_tokens {
            Some(explicit) => explicit,
            None => self.derive_max_tokens(prompt_estimate, credentials)?,
        };

        let context = BuildContext {
            mode,
            model,
            messages,
            parameters,
            max_tokens,
        };
        let body = self.adapter.build_body(&context)?;

        let wire = WireRequest {
            provider_id: self.descriptor.id.to_string(),
            base_url: self.base_url(credentials),
            path: self.adapter.endpoint(mode),
            headers: self.adapter.extra_headers(),
            body,
            streaming: parameters.stream,
            timeout: self.timeout(credentials)?,
            auth: self.adapter.auth_scheme(),
        };

        debug!(
            provider = self.descriptor.id,
            mode = %mode,
            prompt_estimate,
            max_tokens,
            url = %wire.url(),
            "built wire request"
        );

        Ok(BuiltRequest {
            wire,
            prompt_estimate,
        })
    }

    fn check_mode(
        &self,
        mode: InvokeMode,
        parameters: &InvokeParameters,
        credentials: &Credentials,
    ) -> Result<(), InvokeError> {
        if !self.descriptor.supports(mode) {
            return Err(InvokeError::mode_mismatch(format!(
                "provider '{}' does not support {} mode",
                self.descriptor.id, mode
            )));
        }

        if let Some(declared) = credentials.mode()? {
            if declared != mode {
                return Err(InvokeError::mode_mismatch(format!(
                    "credentials declare a {} endpoint but {} mode was requested",
                    declared, mode
                )));
            }
        }

        if mode == InvokeMode::Completion && !parameters.tools.is_empty() {
            return Err(InvokeError::mode_mismatch(
                "tools are only available in chat mode",
            ));
        }

        Ok(())
    }

    /// min(cap, max(context - prompt - reserve, floor))
    fn derive_max_tokens(
        &self,
        prompt_estimate: u32,
        credentials: &Credentials,
    ) -> Result<u32, InvokeError> {
        let rules = &self.descriptor.parameter_rules;
        let context_size = credentials
            .context_size()?
            .unwrap_or(rules.default_context_size);
        let cap = credentials.max_tokens()?.unwrap_or(rules.default_max_tokens);

        let available = context_size
            .saturating_sub(prompt_estimate)
            .saturating_sub(rules.context_reserve);
        Ok(cap.min(available.max(rules.min_response_tokens)))
    }

    /// Credentials, then deployment override, then descriptor default
    fn base_url(&self, credentials: &Credentials) -> String {
        credentials
            .endpoint_url()
            .or_else(|| self.override_.and_then(|o| o.base_url.as_deref()))
            .unwrap_or(self.descriptor.default_base_url)
            .to_string()
    }

    fn timeout(&self, credentials: &Credentials) -> Result<Duration, InvokeError> {
        if let Some(timeout) = credentials.timeout()? {
            return Ok(timeout);
        }
        Ok(self
            .override_
            .and_then(|o| o.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(self.descriptor.default_timeout))
    }
}

/// Flatten a conversation into a single completion prompt.
///
/// System turns are prefixed with "System: ", user turns and non-empty
/// assistant turns are kept verbatim, tool turns are dropped, and the parts
/// are joined with a newline.
pub fn completion_prompt(messages: &[PromptMessage]) -> String {
    messages
        .iter()
        .filter_map(|message| match message {
            PromptMessage::System { content } => Some(format!("System: {}", content)),
            PromptMessage::User { content } => Some(content.clone()),
            PromptMessage::Assistant { content, .. } if !content.is_empty() => {
                Some(content.clone())
            }
            PromptMessage::Assistant { .. } | PromptMessage::Tool { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
