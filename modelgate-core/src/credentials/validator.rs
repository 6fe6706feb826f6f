//! Credential checks run before any live validation call

use super::{Credentials, API_KEY, CONTEXT_SIZE, ENDPOINT_URL, MAX_TOKENS, MODE, TIMEOUT};
use crate::config::validate_http_url;
use crate::protocol::{InvokeMode, InvokeParameters, PromptMessage};
use crate::providers::descriptor::{FieldKind, ProviderDescriptor};
use crate::providers::error::InvokeError;

/// Token budget of the live probe call
pub const PROBE_MAX_TOKENS: u32 = 5;

/// Check credentials against a descriptor's schema without touching the network.
///
/// Errors name the offending field but never include its value.
pub fn check_static(
    descriptor: &ProviderDescriptor,
    model: &str,
    credentials: &Credentials,
) -> Result<(), InvokeError> {
    if model.trim().is_empty() {
        return Err(InvokeError::validation("model", "model name is required"));
    }

    for field in &descriptor.credential_schema {
        let value = credentials.get_trimmed(field.name);
        if field.required && value.is_none() {
            return Err(InvokeError::validation(field.name, "is required"));
        }

        if let (Some(value), FieldKind::Select) = (value, field.kind) {
            if !field.options.is_empty() && !field.options.contains(&value) {
                return Err(InvokeError::validation(
                    field.name,
                    format!("must be one of: {}", field.options.join(", ")),
                ));
            }
        }
    }

    if let Some(url) = credentials.endpoint_url() {
        if validate_http_url(ENDPOINT_URL, url).is_err() {
            return Err(InvokeError::validation(
                ENDPOINT_URL,
                "must be an absolute http or https URL",
            ));
        }
    }

    for field in [CONTEXT_SIZE, MAX_TOKENS, TIMEOUT] {
        credentials.positive_integer(field)?;
    }

    if let Some(mode) = credentials.mode()? {
        if !descriptor.supports(mode) {
            return Err(InvokeError::validation(
                MODE,
                format!("provider '{}' does not support {} mode", descriptor.id, mode),
            ));
        }
    }

    Ok(())
}

/// Reject keys that no vendor could accept
pub fn check_key_shape(credentials: &Credentials) -> Result<(), InvokeError> {
    let Some(key) = credentials.api_key() else {
        return Ok(());
    };

    let malformed = key.trim().is_empty()
        || key
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || !c.is_ascii());

    if malformed {
        return Err(InvokeError::Auth {
            message: format!("{} is malformed", API_KEY),
        });
    }

    Ok(())
}

/// Mode used for the live probe: the declared one, else the provider's sole mode, else chat
pub fn probe_mode(descriptor: &ProviderDescriptor, credentials: &Credentials) -> InvokeMode {
    credentials
        .mode()
        .ok()
        .flatten()
        .or_else(|| descriptor.sole_mode())
        .unwrap_or(InvokeMode::Chat)
}

/// Messages and parameters of the minimal live call
pub fn probe_request(mode: InvokeMode) -> (Vec<PromptMessage>, InvokeParameters) {
    let messages = match mode {
        InvokeMode::Chat => vec![
            PromptMessage::system("You are a helpful assistant."),
            PromptMessage::user("Hello"),
        ],
        InvokeMode::Completion => vec![PromptMessage::user("Hello")],
    };
    let parameters = InvokeParameters::default().with_max_tokens(PROBE_MAX_TOKENS);
    (messages, parameters)
}

/// Map a failed probe onto the validation outcome
pub fn probe_failure(error: InvokeError) -> InvokeError {
    match error {
        InvokeError::Auth { .. } => error,
        other => InvokeError::validation("credentials", format!("validation call failed: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::builtin;

    #[test]
    fn test_missing_required_field() {
        let descriptor = builtin::openai_chat();
        let err = check_static(&descriptor, "gpt-4o-mini", &Credentials::new()).unwrap_err();
        assert!(matches!(err, InvokeError::Validation { ref field, .. } if field == API_KEY));
    }

    #[test]
    fn test_empty_model_rejected() {
        let descriptor = builtin::openai_chat();
        let creds = Credentials::with_api_key("sk-test");
        let err = check_static(&descriptor, "  ", &creds).unwrap_err();
        assert!(matches!(err, InvokeError::Validation { ref field, .. } if field == "model"));
    }

    #[test]
    fn test_bad_endpoint_url() {
        let descriptor = builtin::openai_compatible();
        let creds = Credentials::with_api_key("sk-test")
            .with(ENDPOINT_URL, "ftp://example.test")
            .with(MODE, "chat");
        let err = check_static(&descriptor, "m", &creds).unwrap_err();
        assert!(matches!(err, InvokeError::Validation { ref field, .. } if field == ENDPOINT_URL));
    }

    #[test]
    fn test_unsupported_mode() {
        let descriptor = builtin::openai_chat();
        let creds = Credentials::with_api_key("sk-test").with(MODE, "completion");
        let err = check_static(&descriptor, "gpt-4o-mini", &creds).unwrap_err();
        assert!(matches!(err, InvokeError::Validation { ref field, .. } if field == MODE));
    }

    #[test]
    fn test_malformed_key_is_auth() {
        for key in ["sk-abc def", "sk-abc\n", "sk-ключ", "   "] {
            let err = check_key_shape(&Credentials::with_api_key(key)).unwrap_err();
            assert!(matches!(err, InvokeError::Auth { .. }), "key {:?}", key);
        }
        assert!(check_key_shape(&Credentials::with_api_key("sk-abc123")).is_ok());
    }

    #[test]
    fn test_probe_failure_mapping() {
        let auth = InvokeError::Auth { message: "nope".into() };
        assert!(matches!(probe_failure(auth), InvokeError::Auth { .. }));

        let limited = InvokeError::RateLimit {
            message: "slow".into(),
            retry_after: None,
        };
        assert!(matches!(probe_failure(limited), InvokeError::Validation { .. }));
    }
}
