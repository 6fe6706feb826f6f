//! Tracing subscriber setup
//!
//! The library itself only emits `tracing` events; applications that want
//! them printed call [`init_tracing`] once at startup.

use crate::config::{ConfigError, LogFormat, LoggingConfig};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if the
/// level is not a valid filter directive or a global subscriber is already
/// installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| ConfigError::Logging {
            message: format!("logging.level '{}': {}", config.level, e),
        })?,
    };

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .try_init(),
    };
    installed.map_err(|e| ConfigError::Logging {
        message: format!("tracing subscriber already installed: {}", e),
    })?;

    tracing::debug!(level = %config.level, format = ?config.format, "tracing initialized");
    Ok(())
}
