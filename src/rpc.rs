mod rpc_error_info;
mod rpc_message;
mod rpc_message_type;
mod rpc_status_type;

pub use rpc_error_info::{RpcErrorInfo, RpcErrorKind};
pub use rpc_message::{RpcMessage, RpcMetadata};
pub use rpc_message_type::RpcMessageType;
pub use rpc_status_type::RpcStatusType;
