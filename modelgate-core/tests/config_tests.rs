//! Integration tests for configuration loading and validation

use modelgate_core::config::{load, load_from_json, load_from_yaml, ConfigError, LogFormat};
use modelgate_core::Dispatcher;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a test config file
fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_valid_yaml_config() {
    std::env::set_var("MODELGATE_TEST_OPENAI_KEY", "sk-from-env-123456");

    let yaml = r#"
version: "0.1"
transport:
  max_connections: 8
  max_idle_connections: 4
retry:
  max_attempts: 5
  initial_delay_ms: 250
logging:
  level: modelgate_core=debug
  format: json
providers:
  openai_api_chat:
    api_key: ${MODELGATE_TEST_OPENAI_KEY}
    timeout_secs: 30
  kimi:
    base_url: https://kimi.proxy.test/v1
    max_attempts: 2
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);

    let config = load_from_yaml(path).unwrap();
    assert_eq!(config.version, "0.1");
    assert_eq!(config.transport.max_connections, 8);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.initial_delay_ms, 250);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(
        config.providers["openai_api_chat"]
            .api_key
            .as_ref()
            .unwrap()
            .expose_secret(),
        "sk-from-env-123456"
    );
    assert_eq!(config.providers["kimi"].max_attempts, Some(2));

    std::env::remove_var("MODELGATE_TEST_OPENAI_KEY");
}

#[test]
fn test_load_valid_json_config() {
    let json = r#"{
  "version": "0.1",
  "providers": {
    "anthropic": { "base_url": "https://anthropic.proxy.test/v1", "timeout_secs": 90 }
  }
}"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.json", json);

    let config = load_from_json(&path).unwrap();
    assert_eq!(config.providers["anthropic"].timeout_secs, Some(90));

    // Extension-based dispatch reaches the same loader
    let again = load(&path).unwrap();
    assert_eq!(again.providers.len(), 1);
}

#[test]
fn test_missing_version_field() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", "retry:\n  max_attempts: 2\n");

    let result = load_from_yaml(path);
    assert!(matches!(
        result,
        Err(ConfigError::ParseError { format: "YAML", .. })
    ));
}

#[test]
fn test_invalid_version() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", "version: \"2.0\"\n");

    match load_from_yaml(path) {
        Err(ConfigError::ValidationError(e)) => assert_eq!(e.field_path, "version"),
        other => panic!("expected version validation error, got {:?}", other),
    }
}

#[test]
fn test_missing_env_var() {
    let yaml = r#"
version: "0.1"
providers:
  openai_api_chat:
    api_key: ${MODELGATE_TEST_DEFINITELY_UNSET}
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);

    match load_from_yaml(path) {
        Err(ConfigError::EnvVarNotFound { var }) => {
            assert_eq!(var, "MODELGATE_TEST_DEFINITELY_UNSET")
        }
        other => panic!("expected missing env var, got {:?}", other),
    }
}

#[test]
fn test_invalid_override_url() {
    let yaml = r#"
version: "0.1"
providers:
  kimi:
    base_url: ftp://example.com
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);

    match load_from_yaml(path) {
        Err(ConfigError::ValidationError(e)) => assert_eq!(e.field_path, "providers.kimi.base_url"),
        other => panic!("expected url validation error, got {:?}", other),
    }
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.toml", "version = \"0.1\"");

    assert!(matches!(load(path), Err(ConfigError::UnsupportedFormat { .. })));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = load_from_yaml(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::IoError { .. })));
}

#[test]
fn test_dispatcher_rejects_unknown_provider_override() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(
        &dir,
        "gateway.yaml",
        "version: \"0.1\"\nproviders:\n  not_a_provider:\n    timeout_secs: 5\n",
    );

    let config = load_from_yaml(path).unwrap();
    match Dispatcher::from_config(&config) {
        Err(ConfigError::ValidationError(e)) => {
            assert_eq!(e.field_path, "providers.not_a_provider")
        }
        other => panic!("expected unknown provider error, got {:?}", other),
    }
}

#[test]
fn test_config_debug_redacts_api_key() {
    let yaml = r#"
version: "0.1"
providers:
  anthropic:
    api_key: sk-ant-very-secret-value
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);
    let config = load_from_yaml(path).unwrap();

    let debug = format!("{:?}", config);
    assert!(!debug.contains("sk-ant-very-secret-value"));
}

#[test]
fn test_env_value_is_substituted_once() {
    std::env::set_var("MODELGATE_TEST_TEMPLATED_KEY", "sk-${MODELGATE_TEST_NEVER_SET}");

    let yaml = r#"
version: "0.1"
providers:
  openai_api_chat:
    api_key: "${MODELGATE_TEST_TEMPLATED_KEY}"
"#;
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "gateway.yaml", yaml);

    let config = load_from_yaml(path).unwrap();
    assert_eq!(
        config.providers["openai_api_chat"]
            .api_key
            .as_ref()
            .unwrap()
            .expose_secret(),
        "sk-${MODELGATE_TEST_NEVER_SET}"
    );

    std::env::remove_var("MODELGATE_TEST_TEMPLATED_KEY");
}
