//! Provider abstraction
//!
//! This module implements the provider layer: descriptors and their registry,
//! request building, per-vendor wire adapters, failure classification, retry,
//! and token accounting.

pub mod adapter;
pub mod anthropic;
pub mod builder;
pub mod builtin;
pub mod classify;
pub mod descriptor;
pub mod error;
pub mod openai;
pub mod registry;
pub mod retry;
pub mod tokens;

pub use adapter::{BuildContext, ProviderAdapter};
pub use builder::{completion_prompt, BuiltRequest, RequestBuilder};
pub use classify::ErrorMapper;
pub use descriptor::{
    CredentialField, FieldKind, ParameterRules, ProviderDescriptor, TokenizerProfile,
};
pub use error::{ErrorKind, GatewayResult, InvokeError};
pub use registry::{ProviderRegistry, RegisteredProvider, RegistryBuilder, RegistryError};
pub use retry::{RetryExecutor, RetryOutcome, RetryPolicy};
pub use tokens::TokenAccountant;
