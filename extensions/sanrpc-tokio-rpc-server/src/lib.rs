mod error;
pub use error::RpcServerError;

mod rpc_server;
pub use rpc_server::*;

mod server_config;
pub use server_config::RpcServerConfig;

mod server_state;
pub use server_state::RpcServerState;

pub mod utils;

pub use sanrpc_service_endpoint::{
    RpcHooks, RpcRequestContext, RpcServiceEndpoint, RpcServiceEndpointInterface,
};
