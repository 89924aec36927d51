use example_sanrpc_service_definition::{Add, Divide, DivideArgs, DivideReply, Echo};
use sanrpc::codec::{CodecRegistry, CompressType, SerializeType};
use sanrpc::rpc::{RpcErrorKind, RpcMessage};
use sanrpc_service::{AUTH_METADATA_KEY, RpcErrorCode, RpcServiceError};
use sanrpc_service_endpoint::error::RpcServiceEndpointError;
use sanrpc_service_endpoint::{RpcHooks, RpcServiceEndpoint, RpcServiceEndpointInterface};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const PEER: &str = "127.0.0.1:40000";

fn request<T: Serialize + ?Sized>(
    sequence: u64,
    service: &str,
    method: &str,
    serialize_type: SerializeType,
    args: &T,
) -> RpcMessage {
    let mut request = RpcMessage::request(sequence, service, method);
    request.serialize_type = serialize_type.into();
    request.payload = serialize_type.encode(args).unwrap();
    request
}

fn decode<T: DeserializeOwned>(response: RpcMessage) -> T {
    assert!(!response.is_error(), "unexpected error: {:?}", response.error);
    CodecRegistry::shared()
        .decode_payload(response.serialize_type, response.compress_type, response.payload)
        .unwrap()
}

fn arith_endpoint() -> RpcServiceEndpoint {
    let mut endpoint = RpcServiceEndpoint::new();
    endpoint
        .register::<Add, _, _>(|_ctx, numbers| async move {
            let total: f64 = numbers.iter().sum();
            Ok(total)
        })
        .unwrap();
    endpoint
        .register::<Divide, _, _>(|_ctx, args: DivideArgs| async move {
            if args.divisor == 0 {
                return Err(RpcServiceError::new(400, "division by zero"));
            }
            Ok(DivideReply {
                quotient: args.dividend / args.divisor,
                remainder: args.dividend % args.divisor,
            })
        })
        .unwrap();
    endpoint
}

#[tokio::test]
async fn test_handler_registration() {
    let mut endpoint = RpcServiceEndpoint::new();
    let result1 = endpoint.register::<Echo, _, _>(|_, bytes| async move { Ok(bytes) });
    assert!(result1.is_ok());

    // Names are case-insensitive, so this collides with the first handler.
    let result2 = endpoint.register_fn("echo", "ECHO", |_, bytes: Vec<u8>| async move {
        Ok(bytes)
    });
    assert!(matches!(
        result2,
        Err(RpcServiceEndpointError::DuplicateHandler { .. })
    ));

    let result3 = endpoint.register_fn("", "Echo", |_, bytes: Vec<u8>| async move { Ok(bytes) });
    assert_eq!(result3, Err(RpcServiceEndpointError::EmptyName));
}

#[tokio::test]
async fn test_typed_dispatch_with_every_serializer() {
    let endpoint = arith_endpoint();

    for (sequence, serialize_type) in SerializeType::ALL.into_iter().enumerate() {
        if serialize_type == SerializeType::Raw {
            continue;
        }
        let response = endpoint
            .dispatch(
                PEER,
                request(sequence as u64, "arith", "add", serialize_type, &vec![1.0, 2.0, 3.0]),
            )
            .await
            .unwrap();

        assert_eq!(response.sequence, sequence as u64);
        assert_eq!(response.serialize_type, u8::from(serialize_type));
        assert_eq!(decode::<f64>(response), 6.0);
    }
}

#[tokio::test]
async fn test_unknown_service_and_method_have_distinct_codes() {
    let endpoint = arith_endpoint();

    let no_service = endpoint
        .dispatch(PEER, request(1, "Geometry", "Area", SerializeType::Json, &1))
        .await
        .unwrap();
    let no_method = endpoint
        .dispatch(PEER, request(2, "Arith", "Pow", SerializeType::Json, &1))
        .await
        .unwrap();

    assert_eq!(no_service.error.unwrap().code, i32::from(RpcErrorCode::NoService));
    let info = no_method.error.unwrap();
    assert_eq!(info.code, i32::from(RpcErrorCode::NoMethod));
    assert_eq!(info.kind, RpcErrorKind::Framework);
}

#[tokio::test]
async fn test_codec_failures_are_reported_per_call() {
    let endpoint = arith_endpoint();

    let mut unknown_codec = request(1, "Arith", "Add", SerializeType::Json, &vec![1.0]);
    unknown_codec.serialize_type = 77;
    let response = endpoint.dispatch(PEER, unknown_codec).await.unwrap();
    assert_eq!(
        response.error.unwrap().code,
        i32::from(RpcErrorCode::UnsupportedEncodeType)
    );

    let mut garbage = RpcMessage::request(2, "Arith", "Add");
    garbage.serialize_type = SerializeType::Json.into();
    garbage.payload = b"{not json".to_vec();
    let response = endpoint.dispatch(PEER, garbage).await.unwrap();
    assert_eq!(
        response.error.unwrap().code,
        i32::from(RpcErrorCode::DecodeDataFail)
    );
}

#[tokio::test]
async fn test_business_error_is_returned_verbatim() {
    let endpoint = arith_endpoint();
    let args = DivideArgs {
        dividend: 7,
        divisor: 0,
    };

    let response = endpoint
        .dispatch(PEER, request(9, "Arith", "Divide", SerializeType::Bitcode, &args))
        .await
        .unwrap();

    let info = response.error.unwrap();
    assert!(info.is_business());
    assert_eq!(info.code, 400);
    assert_eq!(info.message, "division by zero");
}

#[tokio::test]
async fn test_panicking_handler_only_fails_its_own_call() {
    let mut endpoint = arith_endpoint();
    endpoint
        .register_fn("Arith", "Explode", |_, _: ()| async move {
            if true {
                panic!("boom");
            }
            Ok(())
        })
        .unwrap();
    let endpoint = Arc::new(endpoint);

    let exploded = endpoint
        .dispatch(PEER, request(1, "Arith", "Explode", SerializeType::Json, &()))
        .await
        .unwrap();
    let info = exploded.error.unwrap();
    assert_eq!(info.code, i32::from(RpcErrorCode::Unknown));
    assert!(info.message.contains("boom"));

    // The endpoint keeps serving.
    let response = endpoint
        .dispatch(PEER, request(2, "Arith", "Add", SerializeType::Json, &vec![2.0, 2.0]))
        .await
        .unwrap();
    assert_eq!(decode::<f64>(response), 4.0);
}

#[tokio::test]
async fn test_oneway_runs_handler_without_response() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut endpoint = RpcServiceEndpoint::new();
    endpoint
        .register_fn("Log", "Append", {
            let calls = calls.clone();
            move |_, line: String| {
                let calls = calls.clone();
                async move {
                    assert_eq!(line, "hello");
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        })
        .unwrap();

    let mut oneway = request(5, "Log", "Append", SerializeType::Json, "hello");
    oneway.oneway = true;

    assert!(endpoint.dispatch(PEER, oneway).await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_heartbeat_is_echoed_without_lookup() {
    let endpoint = RpcServiceEndpoint::new();
    let heartbeat = RpcMessage::request(11, "", "");

    let response = endpoint.dispatch(PEER, heartbeat).await.unwrap();
    assert!(response.heartbeat);
    assert!(!response.is_error());
    assert_eq!(response.sequence, 11);
}

#[tokio::test]
async fn test_auth_hook_rejects_missing_token() {
    let mut endpoint = arith_endpoint();
    endpoint.set_hooks(RpcHooks::new().require_auth_token("s3cret"));

    let anonymous = endpoint
        .dispatch(PEER, request(1, "Arith", "Add", SerializeType::Json, &vec![1.0]))
        .await
        .unwrap();
    let info = anonymous.error.unwrap();
    assert!(info.is_business());
    assert_eq!(info.code, 401);

    let mut authed = request(2, "Arith", "Add", SerializeType::Json, &vec![1.0]);
    authed
        .metadata
        .insert(AUTH_METADATA_KEY.to_string(), "s3cret".to_string());
    let response = endpoint.dispatch(PEER, authed).await.unwrap();
    assert_eq!(decode::<f64>(response), 1.0);
}

#[tokio::test]
async fn test_handler_response_metadata_is_returned() {
    let mut endpoint = RpcServiceEndpoint::new();
    endpoint
        .register_fn("Echo", "Who", |ctx, _: ()| async move {
            ctx.set_response_metadata("served-by", "node-a");
            Ok(ctx.metadata_value("caller").unwrap_or_default().to_string())
        })
        .unwrap();

    let mut req = request(3, "Echo", "Who", SerializeType::Json, &());
    req.metadata.insert("caller".to_string(), "tests".to_string());
    let response = endpoint.dispatch(PEER, req).await.unwrap();

    assert_eq!(
        response.metadata.get("served-by").map(String::as_str),
        Some("node-a")
    );
    assert_eq!(decode::<String>(response), "tests");
}

#[tokio::test]
async fn test_compressed_request_gets_compressed_reply() {
    let mut endpoint = RpcServiceEndpoint::new();
    endpoint
        .register::<Echo, _, _>(|_, bytes| async move { Ok(bytes) })
        .unwrap();

    let registry = CodecRegistry::shared();
    let body = vec![7u8; 8 * 1024];
    let (payload, applied) = registry
        .encode_payload(SerializeType::Bitcode, CompressType::Gzip, &body)
        .unwrap();
    assert_eq!(applied, CompressType::Gzip);

    let mut req = RpcMessage::request(4, "Echo", "Echo");
    req.serialize_type = SerializeType::Bitcode.into();
    req.compress_type = applied.into();
    req.payload = payload;

    let response = endpoint.dispatch(PEER, req).await.unwrap();
    assert_eq!(response.compress_type, u8::from(CompressType::Gzip));
    assert_eq!(decode::<Vec<u8>>(response), body);
}
