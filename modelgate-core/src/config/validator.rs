//! Configuration validation utilities

use super::error::ValidationError;
use super::schema::GatewayConfig;
use std::collections::BTreeSet;

/// Configuration validator with rules that need context beyond the file itself
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Provider ids the overrides may refer to; `None` skips the check
    known_providers: Option<BTreeSet<String>>,
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `providers.<id>` overrides to the given ids
    pub fn with_known_providers<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_providers = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        config.validate()?;
        self.validate_provider_ids(config)?;

        Ok(())
    }

    fn validate_provider_ids(&self, config: &GatewayConfig) -> Result<(), ValidationError> {
        let Some(known) = &self.known_providers else {
            return Ok(());
        };

        for id in config.providers.keys() {
            if !known.contains(id) {
                let expected = known.iter().cloned().collect::<Vec<_>>().join(", ");
                return Err(ValidationError::invalid_value(
                    format!("providers.{}", id),
                    format!("one of [{}]", expected),
                    id.clone(),
                ));
            }
        }

        Ok(())
    }
}
