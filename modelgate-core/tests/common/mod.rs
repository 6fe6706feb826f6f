//! Shared test doubles

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use modelgate_core::credentials::Credentials;
use modelgate_core::http::{
    FaultKind, RawResponse, RawStream, RequestOptions, Transport, TransportFault,
    TransportResponse, WireRequest,
};
use modelgate_core::providers::{ProviderRegistry, RetryPolicy};
use modelgate_core::Dispatcher;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted answer of the fake transport
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Raw(u16, String),
    /// SSE body delivered in the given pieces, then a clean close
    Sse(Vec<String>),
    /// SSE pieces, then a broken connection
    SseThenFault(Vec<String>),
    /// SSE pieces, then no further bytes ever
    SseThenHang(Vec<String>),
    Fault(FaultKind),
    /// Never answers
    Hang,
}

/// What the dispatcher handed to the transport
#[derive(Debug, Clone)]
pub struct Sent {
    pub url: String,
    pub body: Value,
    pub streaming: bool,
    pub api_key: Option<String>,
    pub attempt: u32,
}

/// In-memory transport answering from a script
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    /// Answer used once the script runs out
    repeat: Option<Reply>,
    calls: AtomicU32,
    sent: Mutex<Vec<Sent>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Answer every call the same way
    pub fn always(reply: Reply) -> Self {
        Self {
            repeat: Some(reply),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .expect("transport script exhausted")
    }
}

fn sse_stream(pieces: Vec<String>, tail: Option<Reply>) -> RawStream {
    let chunks = futures::stream::iter(
        pieces
            .into_iter()
            .map(|p| Ok::<_, TransportFault>(Bytes::from(p))),
    );
    let body: modelgate_core::http::ByteStream = match tail {
        None => Box::pin(chunks),
        Some(Reply::Hang) => Box::pin(futures::StreamExt::chain(chunks, futures::stream::pending())),
        Some(_) => Box::pin(futures::StreamExt::chain(
            chunks,
            futures::stream::once(async {
                Err(TransportFault::new(FaultKind::Io, "connection reset by peer"))
            }),
        )),
    };
    RawStream::new(body)
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &WireRequest,
        credentials: &Credentials,
        options: &RequestOptions,
    ) -> Result<TransportResponse, TransportFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(Sent {
            url: request.url(),
            body: request.body.clone(),
            streaming: request.streaming,
            api_key: credentials.api_key().map(str::to_string),
            attempt: options.attempt,
        });

        match self.next_reply() {
            Reply::Json(status, value) => Ok(TransportResponse::Complete(RawResponse::new(
                status,
                serde_json::to_vec(&value).unwrap(),
            ))),
            Reply::Raw(status, body) => {
                Ok(TransportResponse::Complete(RawResponse::new(status, body)))
            }
            Reply::Sse(pieces) => Ok(TransportResponse::Stream(sse_stream(pieces, None))),
            Reply::SseThenFault(pieces) => Ok(TransportResponse::Stream(sse_stream(
                pieces,
                Some(Reply::Fault(FaultKind::Io)),
            ))),
            Reply::SseThenHang(pieces) => {
                Ok(TransportResponse::Stream(sse_stream(pieces, Some(Reply::Hang))))
            }
            Reply::Fault(kind) => Err(TransportFault::new(kind, "scripted fault")),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportFault::new(FaultKind::Timeout, "hung"))
            }
        }
    }
}

/// Dispatcher over built-in providers and the given transport, with instant retries
pub fn dispatcher(transport: Arc<ScriptedTransport>, max_attempts: u32) -> Dispatcher {
    Dispatcher::new(Arc::new(ProviderRegistry::builtin()), transport)
        .with_retry_policy(RetryPolicy::immediate(max_attempts))
}

/// OpenAI chat completion body
pub fn chat_completion(content: &str) -> Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o-mini-2024-07-18",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
    })
}

/// SSE events of an OpenAI chat stream producing `parts`, with the sentinel
pub fn chat_stream_events(parts: &[&str]) -> Vec<String> {
    let mut events: Vec<String> = parts
        .iter()
        .map(|part| {
            format!(
                "data: {}\n\n",
                serde_json::json!({"choices": [{"index": 0, "delta": {"content": part}, "finish_reason": null}]})
            )
        })
        .collect();
    events.push(
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n".to_string(),
    );
    events.push(
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":5,\"total_tokens\":17}}\n\n"
            .to_string(),
    );
    events.push("data: [DONE]\n\n".to_string());
    events
}
