//! Caller-owned provider credentials
//!
//! Credentials are a flat field-name to value map supplied per invocation.
//! They are never persisted, and their `Debug` output redacts secret fields.

mod validator;

pub use validator::{
    check_key_shape, check_static, probe_failure, probe_mode, probe_request, PROBE_MAX_TOKENS,
};

use crate::config::redact_by_field_name;
use crate::protocol::InvokeMode;
use crate::providers::error::InvokeError;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

pub const API_KEY: &str = "api_key";
pub const ENDPOINT_URL: &str = "endpoint_url";
pub const MODE: &str = "mode";
pub const TIMEOUT: &str = "timeout";
pub const CONTEXT_SIZE: &str = "context_size";
pub const MAX_TOKENS: &str = "max_tokens";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    fields: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for the common single-key case
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::new().with(API_KEY, api_key)
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Field value with surrounding whitespace removed, treating blank as absent
    pub fn get_trimmed(&self, field: &str) -> Option<&str> {
        self.get(field).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.get(API_KEY)
    }

    pub fn endpoint_url(&self) -> Option<&str> {
        self.get_trimmed(ENDPOINT_URL)
    }

    /// Declared endpoint mode, if any
    pub fn mode(&self) -> Result<Option<InvokeMode>, InvokeError> {
        match self.get_trimmed(MODE) {
            None => Ok(None),
            Some(raw) => InvokeMode::parse(raw)
                .map(Some)
                .ok_or_else(|| InvokeError::validation(MODE, "must be 'chat' or 'completion'")),
        }
    }

    pub fn timeout(&self) -> Result<Option<Duration>, InvokeError> {
        Ok(self
            .positive_integer(TIMEOUT)?
            .map(|secs| Duration::from_secs(u64::from(secs))))
    }

    pub fn context_size(&self) -> Result<Option<u32>, InvokeError> {
        self.positive_integer(CONTEXT_SIZE)
    }

    pub fn max_tokens(&self) -> Result<Option<u32>, InvokeError> {
        self.positive_integer(MAX_TOKENS)
    }

    /// Parse an optional positive integer field; the error never echoes the value
    pub fn positive_integer(&self, field: &str) -> Result<Option<u32>, InvokeError> {
        match self.get_trimmed(field) {
            None => Ok(None),
            Some(raw) => match raw.parse::<u32>() {
                Ok(value) if value > 0 => Ok(Some(value)),
                _ => Err(InvokeError::validation(field, "must be a positive integer")),
            },
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted: BTreeMap<&str, String> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), redact_by_field_name(k, v)))
            .collect();
        f.debug_tuple("Credentials").field(&redacted).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let creds = Credentials::with_api_key("sk-live-very-secret")
            .with(ENDPOINT_URL, "https://example.test/v1");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("https://example.test/v1"));
    }

    #[test]
    fn test_numeric_fields() {
        let creds: Credentials = [(CONTEXT_SIZE, "8192"), (MAX_TOKENS, " 512 ")]
            .into_iter()
            .collect();
        assert_eq!(creds.context_size().unwrap(), Some(8192));
        assert_eq!(creds.max_tokens().unwrap(), Some(512));

        let bad = Credentials::new().with(CONTEXT_SIZE, "-4");
        let err = bad.context_size().unwrap_err();
        assert!(matches!(err, InvokeError::Validation { ref field, .. } if field == CONTEXT_SIZE));
        assert!(!err.to_string().contains("-4"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            Credentials::new().with(MODE, "Completion").mode().unwrap(),
            Some(InvokeMode::Completion)
        );
        assert_eq!(Credentials::new().mode().unwrap(), None);
        assert!(Credentials::new().with(MODE, "embeddings").mode().is_err());
    }
}
