//! Stream normalization across vendors and chunk boundaries

use bytes::Bytes;
use futures::StreamExt;
use modelgate_core::http::{RawStream, TransportFault};
use modelgate_core::providers::anthropic::streaming::MessagesStreamDecoder;
use modelgate_core::providers::openai::streaming::{ChatStreamDecoder, CompletionStreamDecoder};
use modelgate_core::providers::{ErrorKind, TokenAccountant};
use modelgate_core::streaming::{
    self, ChunkStream, StreamContext, StreamDecoder,
};
use modelgate_core::{FinishReason, InvokeError, InvokeResult, ToolCall, Usage};
use std::time::Duration;
use test_case::test_case;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok, block_on};

const OPENAI_CHAT: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"The \"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"answer \"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"is 42.\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":20,\"completion_tokens\":6,\"total_tokens\":26}}\n\n",
    "data: [DONE]\n\n",
);

const ANTHROPIC_TOOL_USE: &str = concat!(
    "event: message_start\n",
    "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":30,\"output_tokens\":1}}}\n\n",
    "event: content_block_start\n",
    "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Checking.\"}}\n\n",
    "event: content_block_stop\n",
    "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
    "event: content_block_start\n",
    "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"get_weather\",\"input\":{}}}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\":\"}}\n\n",
    "event: ping\n",
    "data: {\"type\":\"ping\"}\n\n",
    "event: content_block_delta\n",
    "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"Paris\\\"}\"}}\n\n",
    "event: content_block_stop\n",
    "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
    "event: message_delta\n",
    "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":15}}\n\n",
    "event: message_stop\n",
    "data: {\"type\":\"message_stop\"}\n\n",
);

fn context() -> StreamContext {
    StreamContext {
        accountant: TokenAccountant::default(),
        prompt_estimate: 7,
        secret: Some("sk-live-secret-0001".to_string()),
    }
}

/// Deliver `body` in pieces of `size` bytes
fn raw_in_pieces(body: &str, size: usize) -> RawStream {
    let pieces: Vec<Result<Bytes, TransportFault>> = body
        .as_bytes()
        .chunks(size)
        .map(|piece| Ok(Bytes::copy_from_slice(piece)))
        .collect();
    RawStream::new(Box::pin(futures::stream::iter(pieces)))
}

fn normalize(body: &str, size: usize, decoder: impl StreamDecoder + 'static) -> ChunkStream {
    streaming::normalize(raw_in_pieces(body, size), Box::new(decoder), context())
}

#[test_case(1 ; "single bytes")]
#[test_case(3 ; "three bytes")]
#[test_case(17 ; "seventeen bytes")]
#[test_case(4096 ; "whole body")]
fn test_openai_chunk_boundaries_do_not_matter(size: usize) {
    let result = assert_ok!(block_on(streaming::collect(
        normalize(OPENAI_CHAT, size, ChatStreamDecoder),
        "gpt-4o",
    )));

    assert_eq!(result.content, "The answer is 42.");
    assert_eq!(result.finish_reason, FinishReason::Stop);
    assert_eq!(
        result.usage,
        Usage {
            prompt_tokens: Some(20),
            completion_tokens: Some(6),
            total_tokens: Some(26),
        }
    );
}

#[test]
fn test_crlf_framing() {
    let body = OPENAI_CHAT.replace("\n", "\r\n");
    let result = assert_ok!(block_on(streaming::collect(
        normalize(&body, 5, ChatStreamDecoder),
        "gpt-4o",
    )));
    assert_eq!(result.content, "The answer is 42.");
}

#[test]
fn test_chunks_are_indexed_and_only_last_is_terminal() {
    let chunks: Vec<_> = block_on(normalize(OPENAI_CHAT, 64, ChatStreamDecoder).collect());
    let chunks: Vec<_> = chunks.into_iter().map(Result::unwrap).collect();

    assert_eq!(chunks.len(), 4);
    for (position, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, position);
        assert_eq!(chunk.is_terminal(), position == chunks.len() - 1);
    }
    // Usage arrives after the finish event and still rides on the terminal chunk
    assert_eq!(chunks[3].usage.unwrap().total_tokens, Some(26));
}

#[test_case(1 ; "single bytes")]
#[test_case(64 ; "sixty four bytes")]
fn test_anthropic_tool_use_stream(size: usize) {
    let result = assert_ok!(block_on(streaming::collect(
        normalize(ANTHROPIC_TOOL_USE, size, MessagesStreamDecoder::new()),
        "claude-3-5-sonnet-latest",
    )));

    assert_eq!(result.content, "Checking.");
    assert_eq!(result.finish_reason, FinishReason::ToolCall);
    assert_eq!(
        result.tool_calls,
        vec![ToolCall::function("toolu_1", "get_weather", "{\"city\":\"Paris\"}")]
    );
    assert_eq!(result.usage.prompt_tokens, Some(30));
    assert_eq!(result.usage.completion_tokens, Some(15));
    assert_eq!(result.usage.total_tokens, Some(45));
}

#[test]
fn test_legacy_completion_stream() {
    let body = concat!(
        "data: {\"choices\":[{\"text\":\"Once\",\"index\":0,\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"text\":\" upon\",\"index\":0,\"finish_reason\":\"length\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let result = assert_ok!(block_on(streaming::collect(
        normalize(body, 8, CompletionStreamDecoder),
        "gpt-3.5-turbo-instruct",
    )));

    assert_eq!(result.content, "Once upon");
    assert_eq!(result.finish_reason, FinishReason::Length);
    // No usage reported: the prompt estimate fills in
    assert_eq!(result.usage.prompt_tokens, Some(7));
}

#[test]
fn test_malformed_event_after_data_is_incomplete() {
    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ok\"}}]}\n\n",
        "data: {not json\n\n",
    );
    let mut stream = normalize(body, 1024, ChatStreamDecoder);

    let first = block_on(stream.next()).unwrap();
    assert_eq!(assert_ok!(first).delta, "ok");
    let err = assert_err!(block_on(stream.next()).unwrap());
    assert_eq!(err.kind(), ErrorKind::StreamIncomplete);
    assert!(block_on(stream.next()).is_none());
}

#[test]
fn test_in_stream_error_scrubs_secret() {
    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"x\"}}]}\n\n",
        "data: {\"error\":{\"message\":\"key sk-live-secret-0001 revoked\",\"type\":\"invalid_api_key\"}}\n\n",
    );
    let mut stream = normalize(body, 1024, ChatStreamDecoder);
    block_on(stream.next());

    let err = assert_err!(block_on(stream.next()).unwrap());
    let message = err.to_string();
    assert!(!message.contains("sk-live-secret-0001"));
    match err {
        InvokeError::StreamIncomplete { cause, .. } => {
            assert_eq!(cause.unwrap().kind(), ErrorKind::Auth)
        }
        other => panic!("expected StreamIncomplete, got {:?}", other),
    }
}

#[test]
fn test_error_before_any_chunk_is_classified() {
    let body = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
    let mut stream = normalize(body, 1024, MessagesStreamDecoder::new());

    let err = assert_err!(block_on(stream.next()).unwrap());
    assert_eq!(err.kind(), ErrorKind::ServerUnavailable);
    assert!(err.is_retryable());
}

#[test]
fn test_from_result_replays_complete_answer() {
    let result = InvokeResult {
        model: "moonshot-v1-8k".to_string(),
        content: "Hello".to_string(),
        tool_calls: vec![ToolCall::function("call_1", "lookup", "{}")],
        finish_reason: FinishReason::ToolCall,
        usage: Usage {
            prompt_tokens: Some(3),
            completion_tokens: Some(1),
            total_tokens: Some(4),
        },
        system_fingerprint: None,
    };

    let replayed = assert_ok!(block_on(streaming::collect(
        streaming::from_result(result.clone()),
        "moonshot-v1-8k",
    )));
    assert_eq!(replayed, result);
}

#[tokio::test]
async fn test_deadline_cuts_stalled_stream() {
    let first = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"a\"}}]}\n\n";
    let body = futures::stream::iter(vec![Ok::<_, TransportFault>(Bytes::from(first))])
        .chain(futures::stream::pending());
    let raw = RawStream::new(Box::pin(body));

    let started = Instant::now();
    let mut stream = streaming::with_deadline(
        streaming::normalize(raw, Box::new(ChatStreamDecoder), context()),
        started + Duration::from_millis(100),
        started,
    );

    assert_eq!(stream.next().await.unwrap().unwrap().delta, "a");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, InvokeError::Timeout { .. }));
    assert!(stream.next().await.is_none());
}

#[test]
fn test_line_without_newline_is_cut_off() {
    let body = format!("data: {}", "x".repeat(2 * 1024 * 1024));
    let mut stream = normalize(&body, 64 * 1024, ChatStreamDecoder);

    let err = assert_err!(block_on(stream.next()).unwrap());
    assert_eq!(err.kind(), ErrorKind::UnknownTransport);
    assert!(block_on(stream.next()).is_none());
}
