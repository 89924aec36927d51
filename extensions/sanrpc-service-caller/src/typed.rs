use crate::{RpcCallerError, RpcServiceCallerInterface};
use sanrpc_service::{CallContext, RpcMethod};

/// Adds `Method::call(&client, ...)` to every [`RpcMethod`].
#[async_trait::async_trait]
pub trait RpcCallTyped: RpcMethod {
    async fn call<C>(
        rpc_client: &C,
        ctx: &mut CallContext,
        input: Self::Input,
    ) -> Result<Self::Output, RpcCallerError>
    where
        C: RpcServiceCallerInterface + ?Sized;
}

/// Blanket implementation of the `RpcCallTyped` trait for any type
/// that also implements `RpcMethod`.
///
/// This enables `.call()` usage on any RPC method type without requiring
/// a manual implementation for each one.
#[async_trait::async_trait]
impl<T> RpcCallTyped for T
where
    T: RpcMethod + Send + Sync + 'static,
{
    async fn call<C>(
        rpc_client: &C,
        ctx: &mut CallContext,
        input: Self::Input,
    ) -> Result<Self::Output, RpcCallerError>
    where
        C: RpcServiceCallerInterface + ?Sized,
    {
        rpc_client
            .call_rpc(ctx, T::SERVICE_NAME, T::METHOD_NAME, &input)
            .await
    }
}
