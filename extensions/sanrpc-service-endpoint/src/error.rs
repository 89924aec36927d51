use sanrpc::codec::CodecError;
use sanrpc::rpc::RpcErrorInfo;
use sanrpc_service::{RpcErrorCode, RpcServiceError};
use thiserror::Error;

/// Errors raised while building a service endpoint.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RpcServiceEndpointError {
    #[error("a handler for {service}.{method} is already registered")]
    DuplicateHandler { service: String, method: String },

    /// Empty names are reserved for heartbeats.
    #[error("service and method names must not be empty")]
    EmptyName,
}

/// Failure of a single handler invocation.
#[derive(Debug, Error)]
pub enum RpcHandlerError {
    /// The request payload could not be decoded into the argument type.
    #[error("decode request: {0}")]
    Decode(CodecError),

    /// The reply could not be encoded.
    #[error("encode reply: {0}")]
    Encode(CodecError),

    /// The handler ran and returned an application error.
    #[error(transparent)]
    Service(#[from] RpcServiceError),
}

impl From<RpcHandlerError> for RpcErrorInfo {
    fn from(err: RpcHandlerError) -> Self {
        match err {
            RpcHandlerError::Decode(err) => RpcErrorCode::DecodeDataFail.to_error_info(err.to_string()),
            RpcHandlerError::Encode(err) => RpcErrorCode::EncodeDataFail.to_error_info(err.to_string()),
            RpcHandlerError::Service(err) => err.into(),
        }
    }
}
