//! Modelgate Core Library
//!
//! Provider abstraction and invocation layer for LLM HTTP APIs. Callers name
//! a provider, a model, a mode and their credentials; the dispatcher turns
//! that into the vendor's wire format, sends it over a pooled transport with
//! classified errors and bounded retries, and hands back a normalized result
//! or a lazy stream of normalized chunks.
//!
//! ```no_run
//! use modelgate_core::{Credentials, Dispatcher, InvokeMode, InvokeRequest, PromptMessage};
//!
//! # async fn run() -> Result<(), modelgate_core::InvokeError> {
//! let dispatcher = Dispatcher::with_defaults();
//! let request = InvokeRequest::new("openai_api_chat", "gpt-4o-mini", InvokeMode::Chat)
//!     .with_credentials(Credentials::with_api_key("sk-..."))
//!     .with_message(PromptMessage::user("Hello"));
//! let result = dispatcher.invoke(request).await?.collect("gpt-4o-mini").await?;
//! println!("{}", result.content);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod http;
pub mod protocol;
pub mod providers;
pub mod streaming;
pub mod telemetry;

pub use credentials::Credentials;
pub use dispatcher::{Dispatcher, InvokeOutput, InvokeRequest};
pub use protocol::{
    FinishReason, InvokeMode, InvokeParameters, InvokeResult, PromptMessage, StreamChunk,
    ToolCall, ToolSpec, Usage,
};
pub use providers::{ErrorKind, GatewayResult, InvokeError, ProviderDescriptor, ProviderRegistry};
pub use streaming::ChunkStream;

/// Returns the version of the Modelgate Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
