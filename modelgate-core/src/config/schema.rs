//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use crate::providers::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported schema version
pub const CONFIG_VERSION: &str = "0.1";

/// Root configuration structure for the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Connection pool and timeout settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Default retry policy for all providers
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-provider overrides keyed by provider id
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub providers: HashMap<String, ProviderOverride>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Connection pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Maximum concurrent in-flight requests per provider+endpoint
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum idle keep-alive connections per host
    #[serde(default = "default_max_idle")]
    pub max_idle_connections: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Idle keep-alive timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Largest non-streaming response body accepted
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_idle_connections: default_max_idle(),
            connect_timeout_ms: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "modelgate_core=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Per-provider settings layered over the built-in descriptor
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderOverride {
    /// Replaces the descriptor's default base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Replaces the descriptor's default request timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Replaces the retry policy's total attempt count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Fallback API key when the caller's credentials carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,
}

fn default_max_connections() -> usize { 32 }
fn default_max_idle() -> usize { 16 }
fn default_connect_timeout() -> u64 { 10_000 }
fn default_idle_timeout() -> u64 { 90 }
fn default_max_response_bytes() -> usize { 10 * 1024 * 1024 }
fn default_log_level() -> String { "info".to_string() }

impl GatewayConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        if self.version != CONFIG_VERSION {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: CONFIG_VERSION.to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        self.transport.validate("transport")?;
        self.retry.validate("retry")?;

        if self.logging.level.trim().is_empty() {
            return Err(ValidationError::required("logging.level"));
        }

        for (id, provider) in &self.providers {
            provider.validate(&format!("providers.{}", id))?;
        }

        Ok(())
    }
}

impl TransportConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_connections == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_connections", path),
                "Must be greater than 0",
            ));
        }

        if self.max_idle_connections > self.max_connections {
            return Err(ValidationError::new(
                format!("{}.max_idle_connections", path),
                ValidationErrorKind::Incompatible {
                    message: "Cannot exceed max_connections".to_string(),
                },
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.connect_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.max_response_bytes == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_response_bytes", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl ProviderOverride {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if let Some(base_url) = &self.base_url {
            validate_http_url(&format!("{}.base_url", path), base_url)?;
        }

        if self.timeout_secs == Some(0) {
            return Err(ValidationError::out_of_range(
                format!("{}.timeout_secs", path),
                "Must be greater than 0",
            ));
        }

        if self.max_attempts == Some(0) {
            return Err(ValidationError::out_of_range(
                format!("{}.max_attempts", path),
                "Must be at least 1",
            ));
        }

        if matches!(&self.api_key, Some(key) if key.is_empty()) {
            return Err(ValidationError::required(format!("{}.api_key", path))
                .with_context("api_key may be omitted but not empty"));
        }

        Ok(())
    }
}

/// Check that a value parses as an absolute http(s) URL
pub fn validate_http_url(path: &str, value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(url) => Err(ValidationError::invalid_url(
            path,
            format!("URL scheme must be http or https, got: {}", url.scheme()),
        )),
        Err(e) => Err(ValidationError::invalid_url(path, e.to_string())),
    }
}
