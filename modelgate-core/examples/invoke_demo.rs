//! Invoke a provider from the command line
//!
//! Run with:
//!   OPENAI_API_KEY=sk-... cargo run --example invoke_demo -- openai_api_chat gpt-4o-mini "Hello"
//!
//! Set `MODELGATE_CONFIG` to a YAML or JSON gateway configuration to apply
//! transport, retry, logging, and per-provider settings.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use modelgate_core::config::{self, GatewayConfig};
use modelgate_core::telemetry::init_tracing;
use modelgate_core::{
    Credentials, Dispatcher, InvokeMode, InvokeOutput, InvokeRequest, PromptMessage,
};
use std::io::Write;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::var("MODELGATE_CONFIG") {
        Ok(path) => config::load(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => GatewayConfig::default(),
    };
    init_tracing(&config.logging)?;

    let mut args = std::env::args().skip(1);
    let (Some(provider), Some(model)) = (args.next(), args.next()) else {
        bail!("usage: invoke_demo <provider> <model> [prompt]");
    };
    let prompt = args.next().unwrap_or_else(|| "Say hello in five words.".to_string());

    let dispatcher = Dispatcher::from_config(&config)?;
    let descriptor = dispatcher.registry().descriptor(&provider)?;
    let mode = descriptor.sole_mode().unwrap_or(InvokeMode::Chat);

    let key_var = match provider.as_str() {
        "anthropic" => "ANTHROPIC_API_KEY",
        "kimi" => "MOONSHOT_API_KEY",
        _ => "OPENAI_API_KEY",
    };
    let mut credentials = Credentials::new();
    if let Ok(key) = std::env::var(key_var) {
        credentials.insert("api_key", key);
    }
    if let Ok(endpoint) = std::env::var("MODELGATE_ENDPOINT_URL") {
        credentials.insert("endpoint_url", endpoint);
        credentials.insert("mode", mode.as_str());
    }

    dispatcher
        .validate_credentials(&provider, &model, &credentials)
        .await
        .context("credentials rejected")?;
    println!("credentials accepted for {} ({})", descriptor.label, model);

    let request = InvokeRequest::new(&provider, &model, mode)
        .with_credentials(credentials)
        .with_messages(vec![
            PromptMessage::system("You are a concise assistant."),
            PromptMessage::user(prompt),
        ])
        .with_stream(true)
        .with_timeout(Duration::from_secs(60));

    match dispatcher.invoke(request).await? {
        InvokeOutput::Stream(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                write!(stdout, "{}", chunk.delta)?;
                stdout.flush()?;
                if let (Some(reason), Some(usage)) = (chunk.finish_reason, chunk.usage) {
                    println!();
                    println!("finish: {:?}, usage: {:?}", reason, usage);
                }
            }
        }
        InvokeOutput::Complete(result) => println!("{}", result.content),
    }

    dispatcher.shutdown().await;
    Ok(())
}
