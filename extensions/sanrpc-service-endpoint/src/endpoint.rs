use crate::error::{RpcHandlerError, RpcServiceEndpointError};
use crate::{RpcHooks, RpcRequestContext, RpcServiceEndpointInterface};
use sanrpc::codec::{CodecRegistry, SerializeType};
use sanrpc_service::{RpcErrorCode, RpcMethod, RpcServiceError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::{future::Future, pin::Pin, sync::Arc};

pub type RpcHandlerFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, RpcHandlerError>> + Send>>;

/// Type-erased invoker: decodes the payload with the request's serializer,
/// runs the bound method and encodes its reply.
pub type RpcHandler =
    Arc<dyn Fn(RpcRequestContext, Vec<u8>, SerializeType) -> RpcHandlerFuture + Send + Sync>;

/// A concrete service endpoint: the table of registered handlers plus the
/// codecs and hooks used to serve them.
///
/// The table is filled through `&mut self` during setup and is read-only once
/// the endpoint is shared with a server behind an `Arc`.
pub struct RpcServiceEndpoint {
    services: HashMap<String, HashMap<String, RpcHandler>>,
    codec_registry: Arc<CodecRegistry>,
    hooks: RpcHooks,
}

impl Default for RpcServiceEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcServiceEndpoint {
    /// Creates an empty endpoint using the shared codec registry.
    pub fn new() -> Self {
        Self::with_codec_registry(CodecRegistry::shared())
    }

    pub fn with_codec_registry(codec_registry: Arc<CodecRegistry>) -> Self {
        Self {
            services: HashMap::new(),
            codec_registry,
            hooks: RpcHooks::default(),
        }
    }

    pub fn set_hooks(&mut self, hooks: RpcHooks) {
        self.hooks = hooks;
    }

    /// Registers a handler for a typed method definition.
    pub fn register<M, F, Fut>(&mut self, handler: F) -> Result<(), RpcServiceEndpointError>
    where
        M: RpcMethod,
        F: Fn(RpcRequestContext, M::Input) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Output, RpcServiceError>> + Send + 'static,
    {
        self.register_fn(M::SERVICE_NAME, M::METHOD_NAME, handler)
    }

    /// Registers a handler by name, with the argument and reply types taken
    /// from the handler signature.
    pub fn register_fn<A, R, F, Fut>(
        &mut self,
        service_name: &str,
        method_name: &str,
        handler: F,
    ) -> Result<(), RpcServiceEndpointError>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(RpcRequestContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcServiceError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let invoker = move |ctx: RpcRequestContext, payload: Vec<u8>, serialize_type: SerializeType| {
            let handler = handler.clone();
            Box::pin(async move {
                let args: A = serialize_type
                    .decode(&payload)
                    .map_err(RpcHandlerError::Decode)?;
                let reply = handler(ctx, args).await?;
                serialize_type.encode(&reply).map_err(RpcHandlerError::Encode)
            }) as RpcHandlerFuture
        };

        self.register_raw(service_name, method_name, Arc::new(invoker))
    }

    /// Registers an already type-erased handler.
    pub fn register_raw(
        &mut self,
        service_name: &str,
        method_name: &str,
        handler: RpcHandler,
    ) -> Result<(), RpcServiceEndpointError> {
        if service_name.is_empty() || method_name.is_empty() {
            return Err(RpcServiceEndpointError::EmptyName);
        }

        let methods = self.services.entry(service_name.to_lowercase()).or_default();
        match methods.entry(method_name.to_lowercase()) {
            Entry::Occupied(_) => Err(RpcServiceEndpointError::DuplicateHandler {
                service: service_name.to_string(),
                method: method_name.to_string(),
            }),
            Entry::Vacant(entry) => {
                tracing::debug!("Registered handler {}.{}", service_name, method_name);
                entry.insert(handler);
                Ok(())
            }
        }
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }
}

impl RpcServiceEndpointInterface for RpcServiceEndpoint {
    fn lookup(&self, service_name: &str, method_name: &str) -> Result<RpcHandler, RpcErrorCode> {
        let methods = self
            .services
            .get(&service_name.to_lowercase())
            .ok_or(RpcErrorCode::NoService)?;
        methods
            .get(&method_name.to_lowercase())
            .cloned()
            .ok_or(RpcErrorCode::NoMethod)
    }

    fn codec_registry(&self) -> &Arc<CodecRegistry> {
        &self.codec_registry
    }

    fn hooks(&self) -> &RpcHooks {
        &self.hooks
    }
}
