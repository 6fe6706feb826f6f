//! Errors raised while loading or validating a gateway configuration

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read gateway config '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {format} in '{path}' at {}:{}: {message}",
            .line.unwrap_or(0), .column.unwrap_or(0))]
    ParseError {
        path: String,
        format: &'static str,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error(transparent)]
    ValidationError(#[from] ValidationError),

    #[error("environment variable '{var}' referenced by the config is not set")]
    EnvVarNotFound { var: String },

    #[error("'{path}' is neither .yaml, .yml nor .json")]
    UnsupportedFormat { path: String },

    /// Logging could not be set up from the `logging` section
    #[error("logging setup failed: {message}")]
    Logging { message: String },
}

/// A rejected setting, addressed by its dotted path (e.g. "providers.kimi.base_url")
#[derive(Debug, Error)]
pub struct ValidationError {
    pub field_path: String,
    pub kind: ValidationErrorKind,
    /// Extra hint for the operator
    pub context: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config at '{}': {}", self.field_path, self.kind)?;
        if let Some(hint) = &self.context {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ValidationErrorKind {
    #[error("value is required")]
    RequiredFieldMissing,

    #[error("expected {expected}, got '{actual}'")]
    InvalidValue { expected: String, actual: String },

    #[error("{message}")]
    OutOfRange { message: String },

    #[error("conflicts with another setting: {message}")]
    Incompatible { message: String },

    #[error("not a usable endpoint URL: {message}")]
    InvalidUrl { message: String },

    #[error("unsupported config version '{actual}', this build reads '{expected}'")]
    InvalidVersion { expected: String, actual: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn required(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::RequiredFieldMissing)
    }

    pub fn invalid_value(
        field_path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::InvalidValue {
                expected: expected.into(),
                actual: actual.into(),
            },
        )
    }

    pub fn out_of_range(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::OutOfRange {
                message: message.into(),
            },
        )
    }

    pub fn invalid_url(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            field_path,
            ValidationErrorKind::InvalidUrl {
                message: message.into(),
            },
        )
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
