use sanrpc::codec::CodecError;
use sanrpc::frame::FrameEncodeError;
use sanrpc::rpc::RpcErrorInfo;
use sanrpc_selector::SelectorError;
use std::io;
use thiserror::Error;

/// Represents errors that can occur during an RPC call from the perspective of the caller.
#[derive(Debug, Error)]
pub enum RpcCallerError {
    /// A transport-level or I/O error occurred during the call.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The client is closing or its connection has been lost.
    #[error("connection is shut down")]
    Shutdown,

    /// The arguments or reply could not be converted with the negotiated codec.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The request could not be framed.
    #[error(transparent)]
    Frame(#[from] FrameEncodeError),

    /// The remote side executed the request and answered with an error.
    #[error("remote error: {0}")]
    Remote(RpcErrorInfo),

    /// The call's deadline elapsed before a reply arrived.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller abandoned the call.
    #[error("call cancelled")]
    Cancelled,

    /// No node could be chosen for the call.
    #[error(transparent)]
    Select(#[from] SelectorError),
}

impl RpcCallerError {
    /// Whether the remote service produced this error.
    pub fn is_service_error(&self) -> bool {
        matches!(self, RpcCallerError::Remote(_))
    }

    /// Whether trying again, possibly on another node, may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcCallerError::Io(_) | RpcCallerError::Shutdown)
    }

    pub fn remote_error(&self) -> Option<&RpcErrorInfo> {
        match self {
            RpcCallerError::Remote(info) => Some(info),
            _ => None,
        }
    }
}
