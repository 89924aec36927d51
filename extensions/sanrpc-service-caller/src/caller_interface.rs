use crate::RpcCallerError;
use sanrpc_service::CallContext;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Anything able to perform a request/response call by service and method name.
///
/// Implemented by single-connection clients as well as failover clients, so
/// typed call sites stay agnostic of how a node is reached.
#[async_trait::async_trait]
pub trait RpcServiceCallerInterface: Send + Sync {
    async fn call_rpc<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static;
}
