use sanrpc::rpc::RpcErrorInfo;
use thiserror::Error;

/// An application-level error returned by a service method.
///
/// It is sent back verbatim as a `Business` error and is never retried by the
/// failover layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("code:{code}, msg:{message}")]
pub struct RpcServiceError {
    pub code: i32,
    pub message: String,
}

impl RpcServiceError {
    /// Code used when a handler reports a bare message.
    pub const UNSPECIFIED_CODE: i32 = -1;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&str> for RpcServiceError {
    fn from(message: &str) -> Self {
        Self::new(Self::UNSPECIFIED_CODE, message)
    }
}

impl From<String> for RpcServiceError {
    fn from(message: String) -> Self {
        Self::new(Self::UNSPECIFIED_CODE, message)
    }
}

impl From<RpcServiceError> for RpcErrorInfo {
    fn from(err: RpcServiceError) -> Self {
        RpcErrorInfo::business(err.code, err.message)
    }
}
