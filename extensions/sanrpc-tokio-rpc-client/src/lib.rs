mod client_config;
pub use client_config::RpcClientConfig;

mod connector;
pub use connector::*;

mod rpc_client;
pub use rpc_client::RpcClient;

mod xclient;
pub use xclient::XClient;
