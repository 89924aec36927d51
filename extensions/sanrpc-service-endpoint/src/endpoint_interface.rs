use crate::{RpcHandler, RpcHooks, RpcRequestContext};
use futures::FutureExt;
use sanrpc::codec::CodecRegistry;
use sanrpc::rpc::{RpcErrorInfo, RpcMessage};
use sanrpc_service::RpcErrorCode;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait RpcServiceEndpointInterface: Send + Sync {
    /// Resolves a handler, matching names case-insensitively.
    ///
    /// Fails with `NoService` when the service is unknown and `NoMethod` when
    /// only the method is.
    fn lookup(&self, service_name: &str, method_name: &str) -> Result<RpcHandler, RpcErrorCode>;

    fn codec_registry(&self) -> &Arc<CodecRegistry>;

    fn hooks(&self) -> &RpcHooks;

    /// Serves one decoded request.
    ///
    /// Heartbeats are echoed without a lookup. Every failure (unknown
    /// service, codec trouble, handler error, handler panic) becomes an error
    /// response for this request only.
    ///
    /// # Returns
    ///
    /// The response to write, or `None` for oneway requests.
    async fn dispatch(&self, peer: &str, mut request: RpcMessage) -> Option<RpcMessage> {
        if request.heartbeat {
            tracing::trace!("Heartbeat {} from {}", request.sequence, peer);
            return (!request.oneway).then(|| RpcMessage::response_to(&request));
        }

        let ctx = RpcRequestContext::new(peer, &request);
        let payload = std::mem::take(&mut request.payload);
        let outcome = self.invoke(&ctx, &request, payload).await;

        if request.oneway {
            if let Err(info) = outcome {
                tracing::debug!(
                    "Oneway call {}.{} from {} failed: {}",
                    request.service_name,
                    request.method_name,
                    peer,
                    info
                );
            }
            return None;
        }

        let mut response = match outcome {
            Ok((payload, compress_type)) => {
                let mut response = RpcMessage::response_to(&request);
                response.payload = payload;
                response.compress_type = compress_type;
                response
            }
            Err(info) => RpcMessage::error_response_to(&request, info),
        };
        response.metadata = ctx.take_response_metadata();
        Some(response)
    }

    /// Runs the handler for `request` and encodes its reply.
    ///
    /// Returns the reply payload together with the compress tag applied to it.
    async fn invoke(
        &self,
        ctx: &RpcRequestContext,
        request: &RpcMessage,
        payload: Vec<u8>,
    ) -> Result<(Vec<u8>, u8), RpcErrorInfo> {
        self.hooks().run_pre_dispatch(ctx, request)?;

        let handler = self
            .lookup(&request.service_name, &request.method_name)
            .map_err(|code| {
                code.to_error_info(format!("{}.{}", request.service_name, request.method_name))
            })?;

        let registry = self.codec_registry();
        let unsupported = |err: sanrpc::codec::CodecError| {
            RpcErrorCode::UnsupportedEncodeType.to_error_info(err.to_string())
        };
        let serialize_type = registry.serializer(request.serialize_type).map_err(unsupported)?;
        let compress_type = request.compress_type().map_err(unsupported)?;
        if !registry.supports_compress_type(compress_type) {
            return Err(unsupported(sanrpc::codec::CodecError::UnsupportedCompressType(
                request.compress_type,
            )));
        }

        let args = registry
            .decompress_payload(request.compress_type, payload)
            .map_err(|err| RpcErrorCode::DecodeDataFail.to_error_info(err.to_string()))?;

        let call_ctx = ctx.clone();
        let outcome = AssertUnwindSafe(async move { handler(call_ctx, args, serialize_type).await })
            .catch_unwind()
            .await;

        let reply = match outcome {
            Ok(result) => result?,
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(
                    "Handler {}.{} panicked serving {} (sequence {}): {}\n{}",
                    request.service_name,
                    request.method_name,
                    ctx.peer,
                    request.sequence,
                    message,
                    Backtrace::force_capture()
                );
                return Err(RpcErrorCode::Unknown.to_error_info(format!("handler panicked: {message}")));
            }
        };

        let (payload, applied) = registry
            .compress_payload(compress_type, reply)
            .map_err(|err| RpcErrorCode::EncodeDataFail.to_error_info(err.to_string()))?;
        Ok((payload, applied.into()))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
