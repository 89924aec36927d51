use rand::Rng;
use sanrpc::codec::{CompressType, SerializeType};
use sanrpc::constants::{DEFAULT_MAX_FRAME_BODY_SIZE, FRAME_HEADER_SIZE, FRAME_MAGIC};
use sanrpc::frame::{FrameCodec, FrameDecodeError};
use sanrpc::rpc::{RpcErrorInfo, RpcMessage, RpcMessageType, RpcStatusType};
use std::io::Cursor;

fn sample_request() -> RpcMessage {
    let mut message = RpcMessage::request(7, "Arith", "Add");
    message.serialize_type = SerializeType::Json.into();
    message.compress_type = CompressType::Gzip.into();
    message.oneway = true;
    message
        .metadata
        .insert("trace-id".to_string(), "abc-123".to_string());
    message.metadata.insert("__AUTH".to_string(), "token".to_string());
    message.payload = br#"{"a":2}"#.to_vec();
    message
}

#[test]
fn test_round_trip_preserves_every_field() {
    let request = sample_request();
    let frame = FrameCodec::encode(&request).unwrap();

    assert_eq!(&frame[0..4], &FRAME_MAGIC.to_be_bytes());
    assert_eq!(
        u32::from_be_bytes(frame[4..8].try_into().unwrap()) as usize,
        frame.len() - FRAME_HEADER_SIZE
    );

    let (decoded, consumed) = FrameCodec::decode(&frame, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();
    assert_eq!(consumed, frame.len());
    assert_eq!(decoded, request);
}

#[test]
fn test_round_trip_error_response() {
    let request = sample_request();
    let mut response =
        RpcMessage::error_response_to(&request, RpcErrorInfo::framework(122, "no method"));
    response
        .metadata
        .insert("server".to_string(), "node-1".to_string());

    let frame = FrameCodec::encode(&response).unwrap();
    let decoded = FrameCodec::read_from(&mut Cursor::new(frame), DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();

    assert_eq!(decoded.message_type, RpcMessageType::Response);
    assert_eq!(decoded.status_type, RpcStatusType::Error);
    assert_eq!(decoded, response);
}

#[test]
fn test_round_trip_random_payloads() {
    let mut rng = rand::rng();

    for sequence in 0..32u64 {
        let mut message = RpcMessage::request(sequence, "Blob", "Store");
        let len = rng.random_range(0..4096);
        message.payload = (0..len).map(|_| rng.random::<u8>()).collect();

        let frame = FrameCodec::encode(&message).unwrap();
        let (decoded, _) = FrameCodec::decode(&frame, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();
        assert_eq!(decoded, message, "payload of {} bytes was altered", len);
    }
}

#[test]
fn test_back_to_back_frames_decode_in_order() {
    let first = RpcMessage::request(1, "A", "one");
    let second = RpcMessage::request(2, "B", "two");

    let mut buf = FrameCodec::encode(&first).unwrap();
    buf.extend(FrameCodec::encode(&second).unwrap());

    let mut cursor = Cursor::new(buf);
    let a = FrameCodec::read_from(&mut cursor, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();
    let b = FrameCodec::read_from(&mut cursor, DEFAULT_MAX_FRAME_BODY_SIZE).unwrap();
    let end = FrameCodec::read_from(&mut cursor, DEFAULT_MAX_FRAME_BODY_SIZE);

    assert_eq!(a.sequence, 1);
    assert_eq!(b.sequence, 2);
    assert!(matches!(end, Err(FrameDecodeError::ConnectionClosed)));
}

#[test]
fn test_wrong_magic_is_rejected() {
    let mut frame = FrameCodec::encode(&sample_request()).unwrap();
    frame[0] ^= 0xFF;

    let result = FrameCodec::decode(&frame, DEFAULT_MAX_FRAME_BODY_SIZE);
    assert!(matches!(result, Err(FrameDecodeError::MagicMismatch(_))));
}

#[test]
fn test_truncated_frames_are_short_reads() {
    let frame = FrameCodec::encode(&sample_request()).unwrap();

    // Inside the header.
    let result = FrameCodec::read_from(&mut Cursor::new(&frame[..5]), DEFAULT_MAX_FRAME_BODY_SIZE);
    assert!(matches!(
        result,
        Err(FrameDecodeError::ShortRead { read: 5, expected: FRAME_HEADER_SIZE })
    ));

    // Inside the body.
    let cut = frame.len() - 3;
    let result = FrameCodec::read_from(&mut Cursor::new(&frame[..cut]), DEFAULT_MAX_FRAME_BODY_SIZE);
    assert!(matches!(result, Err(FrameDecodeError::ShortRead { .. })));

    let result = FrameCodec::decode(&frame[..cut], DEFAULT_MAX_FRAME_BODY_SIZE);
    assert!(matches!(result, Err(FrameDecodeError::ShortRead { .. })));
}

#[test]
fn test_garbage_body_fails_to_decode() {
    let garbage = [0xFFu8; 3];
    let mut frame = Vec::new();
    frame.extend(FRAME_MAGIC.to_be_bytes());
    frame.extend((garbage.len() as u32).to_be_bytes());
    frame.extend(garbage);

    let result = FrameCodec::decode(&frame, DEFAULT_MAX_FRAME_BODY_SIZE);
    assert!(matches!(result, Err(FrameDecodeError::BodyDecodeFailed(_))));
}

#[test]
fn test_oversized_body_is_rejected_before_reading() {
    let mut header = Vec::new();
    header.extend(FRAME_MAGIC.to_be_bytes());
    header.extend(1_000_000u32.to_be_bytes());

    let result = FrameCodec::read_from(&mut Cursor::new(header), 1024);
    assert!(matches!(
        result,
        Err(FrameDecodeError::BodyTooLarge { len: 1_000_000, max: 1024 })
    ));
}
