//! Configuration module for the gateway
//!
//! This module provides the optional configuration file schema: transport
//! pool sizing, the default retry policy, logging, and per-provider overrides.
//! Files are YAML or JSON with `${ENV_VAR}` interpolation.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    validate_http_url, GatewayConfig, LogFormat, LoggingConfig, ProviderOverride,
    TransportConfig, CONFIG_VERSION,
};
pub use secrets::{is_sensitive_name, redact_by_field_name, scrub, SecretString};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_yaml(&content, &path.to_string_lossy())
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_json(&content, &path.to_string_lossy())
}

/// Load a configuration, picking the format from the file extension
pub fn load<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => load_from_yaml(path),
        Some("json") => load_from_json(path),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_string_lossy().to_string(),
        }),
    }
}

/// Parse a YAML configuration held in memory
pub fn from_yaml_str(content: &str) -> Result<GatewayConfig, ConfigError> {
    parse_yaml(content, "<inline>")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn parse_yaml(content: &str, origin: &str) -> Result<GatewayConfig, ConfigError> {
    let interpolated = env::interpolate_env_vars(content)?;

    let config: GatewayConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: origin.to_string(),
            format: "YAML",
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    finish(&config)?;
    Ok(config)
}

fn parse_json(content: &str, origin: &str) -> Result<GatewayConfig, ConfigError> {
    let interpolated = env::interpolate_env_vars(content)?;

    let config: GatewayConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: origin.to_string(),
            format: "JSON",
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    finish(&config)?;
    Ok(config)
}

fn finish(config: &GatewayConfig) -> Result<(), ConfigError> {
    ConfigValidator::new().validate(config)?;
    Ok(())
}
