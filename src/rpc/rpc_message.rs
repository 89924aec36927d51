use crate::codec::{CodecError, CompressType, SerializeType};
use crate::rpc::{RpcErrorInfo, RpcMessageType, RpcStatusType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// String key/value pairs carried alongside a request or response.
pub type RpcMetadata = HashMap<String, String>;

/// The logical envelope exchanged by both ends of a connection.
///
/// Serialize and compress tags are stored as raw bytes so that a peer using a
/// codec this side does not know still decodes into a message; the unknown tag
/// is reported per call rather than tearing down the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcMessage {
    /// Correlates a response with its request; unique per connection while pending.
    pub sequence: u64,
    pub service_name: String,
    pub method_name: String,
    pub message_type: RpcMessageType,
    pub status_type: RpcStatusType,
    /// No response is expected or sent.
    pub oneway: bool,
    /// Liveness probe; service and method names are empty.
    pub heartbeat: bool,
    pub serialize_type: u8,
    pub compress_type: u8,
    pub metadata: RpcMetadata,
    pub payload: Vec<u8>,
    /// Present only on responses whose status is `Error`.
    pub error: Option<RpcErrorInfo>,
}

impl RpcMessage {
    /// Builds a request; an empty service and method marks it as a heartbeat.
    pub fn request(sequence: u64, service_name: &str, method_name: &str) -> Self {
        Self {
            sequence,
            service_name: service_name.to_string(),
            method_name: method_name.to_string(),
            heartbeat: service_name.is_empty() && method_name.is_empty(),
            ..Default::default()
        }
    }

    /// Builds a successful response echoing the request's correlation fields.
    pub fn response_to(request: &RpcMessage) -> Self {
        Self {
            sequence: request.sequence,
            service_name: request.service_name.clone(),
            method_name: request.method_name.clone(),
            message_type: RpcMessageType::Response,
            heartbeat: request.heartbeat,
            serialize_type: request.serialize_type,
            compress_type: CompressType::None.into(),
            ..Default::default()
        }
    }

    /// Builds an error response for `request`.
    pub fn error_response_to(request: &RpcMessage, error: RpcErrorInfo) -> Self {
        Self {
            status_type: RpcStatusType::Error,
            error: Some(error),
            ..Self::response_to(request)
        }
    }

    pub fn is_request(&self) -> bool {
        self.message_type == RpcMessageType::Request
    }

    pub fn is_error(&self) -> bool {
        self.status_type == RpcStatusType::Error
    }

    pub fn serialize_type(&self) -> Result<SerializeType, CodecError> {
        SerializeType::try_from(self.serialize_type)
            .map_err(|_| CodecError::UnsupportedSerializeType(self.serialize_type))
    }

    pub fn compress_type(&self) -> Result<CompressType, CodecError> {
        CompressType::try_from(self.compress_type)
            .map_err(|_| CodecError::UnsupportedCompressType(self.compress_type))
    }

    /// Service names are matched case-insensitively.
    pub fn normalized_service_name(&self) -> String {
        self.service_name.to_lowercase()
    }

    pub fn normalized_method_name(&self) -> String {
        self.method_name.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_service_and_method_is_heartbeat() {
        assert!(RpcMessage::request(1, "", "").heartbeat);
        assert!(!RpcMessage::request(1, "Arith", "").heartbeat);
    }

    #[test]
    fn error_response_keeps_correlation() {
        let mut request = RpcMessage::request(42, "Arith", "Add");
        request.serialize_type = SerializeType::Json.into();

        let response = RpcMessage::error_response_to(&request, RpcErrorInfo::business(7, "nope"));

        assert_eq!(response.sequence, 42);
        assert_eq!(response.message_type, RpcMessageType::Response);
        assert!(response.is_error());
        assert_eq!(response.serialize_type, u8::from(SerializeType::Json));
        assert_eq!(response.error.map(|e| e.code), Some(7));
    }
}
