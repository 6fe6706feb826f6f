//! Keeping vendor keys out of logs, Debug output, and error text

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

const REDACTED: &str = "[REDACTED]";

/// Substrings that mark a credential or config field as secret
const SENSITIVE_MARKERS: &[&str] = &[
    "api_key",
    "apikey",
    "secret",
    "token",
    "password",
    "credential",
    "authorization",
    "private",
];

/// Bearer-style API keys that vendors sometimes echo back in error messages
static KEY_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(sk|pk|sk-ant|rk)-[A-Za-z0-9_\-*]{8,}").expect("static regex is valid")
});

/// An API key as it appears in a config file.
///
/// Serializes as the plain value so configs survive a save/load cycle,
/// but never prints it.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Last four characters, enough to tell two keys apart in a log line
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() < 12 {
            return REDACTED.to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("...{}", tail)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Whether a field name denotes secret material
pub fn is_sensitive_name(field_name: &str) -> bool {
    let lower = field_name.to_ascii_lowercase();
    // "max_tokens" names a count, not a secret
    if lower.ends_with("_tokens") {
        return false;
    }
    SENSITIVE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// The value to show for a credential field in Debug output
pub fn redact_by_field_name(field_name: &str, value: &str) -> String {
    match is_sensitive_name(field_name) {
        true => REDACTED.to_string(),
        false => value.to_string(),
    }
}

/// Remove a known secret, and anything shaped like an API key, from free text
pub fn scrub(text: &str, secret: Option<&str>) -> String {
    let mut out = match secret {
        Some(secret) if secret.len() >= 4 => text.replace(secret, REDACTED),
        _ => text.to_string(),
    };
    if KEY_LIKE.is_match(&out) {
        out = KEY_LIKE.replace_all(&out, REDACTED).into_owned();
    }
    out
}
