use futures::StreamExt;
use sanrpc::codec::{CodecRegistry, CompressType, SerializeType};
use sanrpc::constants::DEFAULT_MAX_FRAME_BODY_SIZE;
use sanrpc::frame::FrameCodec;
use sanrpc::rpc::{RpcErrorInfo, RpcMessage};
use sanrpc_service::CallContext;
use sanrpc_service_caller::{RpcCallDispatcher, RpcCallerError, completion_channel};
use std::collections::HashSet;

fn dispatcher() -> RpcCallDispatcher {
    RpcCallDispatcher::new(CodecRegistry::shared())
}

/// Decodes the request that a dispatcher framed and builds the reply a
/// server would send for it.
fn reply_for(frame: &[u8], value: i64) -> RpcMessage {
    let (request, _) = FrameCodec::decode(frame, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();
    let mut response = RpcMessage::response_to(&request);
    response.payload = request.serialize_type().unwrap().encode(&value).unwrap();
    response
}

#[tokio::test]
async fn test_each_call_completes_exactly_once() {
    let dispatcher = dispatcher();
    let ctx = CallContext::new();
    let (done, mut completions) = completion_channel(64);

    let mut outbound = Vec::new();
    for i in 0..16i64 {
        let call = dispatcher
            .begin_call(&ctx, "Arith", "Add", &i, true, done.clone())
            .unwrap();
        outbound.push((call, i));
    }
    assert_eq!(dispatcher.pending_count(), 16);

    // Respond in reverse order; correlation must not depend on arrival order.
    for (call, i) in outbound.iter().rev() {
        assert!(dispatcher.handle_response(reply_for(&call.frame, i * 10)));
    }

    // Duplicate responses are ignored.
    let (first, _) = &outbound[0];
    assert!(!dispatcher.handle_response(reply_for(&first.frame, 0)));

    drop(done);
    let mut seen = HashSet::new();
    while let Some(completion) = completions.next().await {
        assert!(seen.insert(completion.sequence), "sequence delivered twice");
        let value: i64 = completion.decode().unwrap();
        assert_eq!(value % 10, 0);
    }

    assert_eq!(seen.len(), 16);
    assert_eq!(dispatcher.pending_count(), 0);
}

#[tokio::test]
async fn test_sequences_are_unique_while_pending() {
    let dispatcher = dispatcher();
    let ctx = CallContext::new();
    let (done, _completions) = completion_channel(128);

    let sequences: HashSet<u64> = (0..100)
        .map(|_| {
            dispatcher
                .begin_call(&ctx, "Echo", "Echo", &(), true, done.clone())
                .unwrap()
                .sequence
        })
        .collect();

    assert_eq!(sequences.len(), 100);
}

#[tokio::test]
async fn test_cancelled_call_ignores_late_response() {
    let dispatcher = dispatcher();
    let ctx = CallContext::new();
    let (done, mut completions) = completion_channel(4);

    let call = dispatcher
        .begin_call(&ctx, "Slow", "Wait", &1i64, true, done)
        .unwrap();

    assert!(dispatcher.fail_call(call.sequence, RpcCallerError::DeadlineExceeded));
    assert_eq!(dispatcher.pending_count(), 0);

    // The response shows up after the caller gave up.
    assert!(!dispatcher.handle_response(reply_for(&call.frame, 1)));

    let completion = completions.next().await.unwrap();
    assert!(matches!(
        completion.result,
        Err(RpcCallerError::DeadlineExceeded)
    ));
    assert!(completions.next().await.is_none(), "no second delivery");
}

#[tokio::test]
async fn test_error_response_carries_remote_error_and_metadata() {
    let dispatcher = dispatcher();
    let ctx = CallContext::new();
    let (done, mut completions) = completion_channel(1);

    let call = dispatcher
        .begin_call(&ctx, "Bank", "Withdraw", &500i64, true, done)
        .unwrap();
    let (request, _) = FrameCodec::decode(&call.frame, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();

    let mut response =
        RpcMessage::error_response_to(&request, RpcErrorInfo::business(3, "insufficient funds"));
    response
        .metadata
        .insert("balance".to_string(), "20".to_string());
    dispatcher.handle_response(response);

    let completion = completions.next().await.unwrap();
    assert_eq!(completion.response_metadata.get("balance").map(String::as_str), Some("20"));

    let err = completion.decode::<i64>().unwrap_err();
    assert!(err.is_service_error());
    assert!(!err.is_retryable());
    assert_eq!(err.remote_error().map(|e| e.code), Some(3));
}

#[tokio::test]
async fn test_oneway_calls_skip_the_pending_table() {
    let dispatcher = dispatcher();
    let ctx = CallContext::new();
    let (done, mut completions) = completion_channel(1);

    let call = dispatcher
        .begin_call(&ctx, "Log", "Append", &vec![1u8], false, done)
        .unwrap();
    assert_eq!(dispatcher.pending_count(), 0);

    let (request, _) = FrameCodec::decode(&call.frame, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();
    assert!(request.oneway);

    let sequence = call.sequence;
    dispatcher.complete_write(call, Ok(()));

    let completion = completions.next().await.unwrap();
    assert_eq!(completion.sequence, sequence);
    assert!(completion.result.is_ok());
}

#[tokio::test]
async fn test_heartbeat_has_no_payload() {
    let dispatcher = dispatcher();
    let (done, _completions) = completion_channel(1);

    let call = dispatcher
        .begin_call(&CallContext::new(), "", "", &(), true, done)
        .unwrap();
    let (request, _) = FrameCodec::decode(&call.frame, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();

    assert!(request.heartbeat);
    assert!(request.payload.is_empty());
}

#[tokio::test]
async fn test_large_arguments_are_compressed_and_replies_decompressed() {
    let dispatcher = dispatcher();
    let ctx = CallContext::new()
        .with_serialize_type(SerializeType::Json)
        .with_compress_type(CompressType::Gzip);
    let (done, mut completions) = completion_channel(1);

    let text = "compress me ".repeat(500);
    let call = dispatcher
        .begin_call(&ctx, "Echo", "Echo", &text, true, done)
        .unwrap();
    let (request, _) = FrameCodec::decode(&call.frame, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();
    assert_eq!(request.compress_type, u8::from(CompressType::Gzip));

    let registry = CodecRegistry::shared();
    let mut response = RpcMessage::response_to(&request);
    let (payload, applied) = registry
        .encode_payload(SerializeType::Json, CompressType::Gzip, &text)
        .unwrap();
    response.payload = payload;
    response.compress_type = applied.into();
    dispatcher.handle_response(response);

    let echoed: String = completions.next().await.unwrap().decode().unwrap();
    assert_eq!(echoed, text);
}

#[tokio::test]
async fn test_unsupported_codec_fails_synchronously() {
    let registry = CodecRegistry::builder()
        .without_serializer(SerializeType::Json)
        .build();
    let dispatcher = RpcCallDispatcher::new(std::sync::Arc::new(registry));
    let ctx = CallContext::new().with_serialize_type(SerializeType::Json);
    let (done, mut completions) = completion_channel(1);

    let call = dispatcher.begin_call(&ctx, "Arith", "Add", &1i64, true, done);
    assert!(call.is_none());
    assert_eq!(dispatcher.pending_count(), 0);

    let completion = completions.next().await.unwrap();
    assert!(matches!(completion.result, Err(RpcCallerError::Codec(_))));
}

#[tokio::test]
async fn test_shutdown_fails_pending_and_rejects_new_calls() {
    let dispatcher = dispatcher();
    let ctx = CallContext::new();
    let (done, mut completions) = completion_channel(8);

    for i in 0..3i64 {
        dispatcher
            .begin_call(&ctx, "Arith", "Add", &i, true, done.clone())
            .unwrap();
    }

    assert!(dispatcher.mark_shutdown());
    assert!(!dispatcher.mark_shutdown());
    assert_eq!(dispatcher.fail_all(|| RpcCallerError::Shutdown), 3);
    assert_eq!(dispatcher.pending_count(), 0);

    assert!(
        dispatcher
            .begin_call(&ctx, "Arith", "Add", &9i64, true, done.clone())
            .is_none()
    );

    drop(done);
    let mut failures = 0;
    while let Some(completion) = completions.next().await {
        assert!(matches!(completion.result, Err(RpcCallerError::Shutdown)));
        failures += 1;
    }
    assert_eq!(failures, 4);
}

#[tokio::test]
async fn test_mark_closing_reports_only_the_first_close() {
    let dispatcher = dispatcher();
    assert!(dispatcher.is_available());
    assert!(dispatcher.mark_closing());
    assert!(!dispatcher.mark_closing());
    assert!(dispatcher.is_closing());
    assert!(!dispatcher.is_available());
}

#[tokio::test]
async fn test_completion_delivery_never_blocks_the_dispatcher() {
    let dispatcher = dispatcher();
    let ctx = CallContext::new();
    let (done, mut completions) = completion_channel(0);

    let first = dispatcher
        .begin_call(&ctx, "Arith", "Add", &1i64, true, done.clone())
        .unwrap();
    let second = dispatcher
        .begin_call(&ctx, "Arith", "Add", &2i64, true, done.clone())
        .unwrap();

    // Nobody drains the channel while responses arrive.
    assert!(dispatcher.handle_response(reply_for(&first.frame, 1)));
    assert!(dispatcher.handle_response(reply_for(&second.frame, 2)));
    assert_eq!(dispatcher.pending_count(), 0);

    drop(done);
    let delivered: Vec<_> = completions.by_ref().collect().await;
    assert_eq!(delivered.len(), 2);
}
