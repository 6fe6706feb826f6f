//! Provider registry
//!
//! Registration happens once, through [`RegistryBuilder`], before the
//! registry is shared. After that the registry is immutable, so lookups need
//! no locking and any number of callers may resolve concurrently.

use crate::providers::adapter::ProviderAdapter;
use crate::providers::builtin;
use crate::providers::descriptor::ProviderDescriptor;
use crate::providers::error::InvokeError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Registration failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("provider '{id}' is already registered")]
    Duplicate { id: String },
}

/// Descriptor plus the adapter for its wire format
#[derive(Clone)]
pub struct RegisteredProvider {
    pub descriptor: Arc<ProviderDescriptor>,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl RegisteredProvider {
    pub fn new(descriptor: ProviderDescriptor, adapter: impl ProviderAdapter + 'static) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            adapter: Arc::new(adapter),
        }
    }

    pub fn id(&self) -> &'static str {
        self.descriptor.id
    }
}

impl fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("id", &self.descriptor.id)
            .finish_non_exhaustive()
    }
}

/// Append-only registration
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    providers: Vec<RegisteredProvider>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the built-in providers
    pub fn with_builtins() -> Self {
        Self {
            providers: builtin::all(),
        }
    }

    pub fn register(mut self, provider: RegisteredProvider) -> Result<Self, RegistryError> {
        if self.providers.iter().any(|p| p.id() == provider.id()) {
            return Err(RegistryError::Duplicate {
                id: provider.id().to_string(),
            });
        }
        self.providers.push(provider);
        Ok(self)
    }

    pub fn build(self) -> ProviderRegistry {
        let index = self
            .providers
            .iter()
            .enumerate()
            .map(|(position, p)| (p.id(), position))
            .collect();
        ProviderRegistry {
            providers: self.providers,
            index,
        }
    }
}

/// Immutable set of providers
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
    index: HashMap<&'static str, usize>,
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry holding every built-in provider
    pub fn builtin() -> Self {
        RegistryBuilder::with_builtins().build()
    }

    /// Resolve a provider id, failing with `UnknownProvider`
    pub fn resolve(&self, id: &str) -> Result<&RegisteredProvider, InvokeError> {
        self.index
            .get(id)
            .map(|&position| &self.providers[position])
            .ok_or_else(|| InvokeError::UnknownProvider {
                provider: id.to_string(),
            })
    }

    pub fn descriptor(&self, id: &str) -> Result<&ProviderDescriptor, InvokeError> {
        self.resolve(id).map(|p| p.descriptor.as_ref())
    }

    /// All descriptors in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.iter().map(|p| p.descriptor.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.iter().map(RegisteredProvider::id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
