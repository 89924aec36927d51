use crate::RpcRequestContext;
use sanrpc::rpc::RpcMessage;
use sanrpc_service::{AUTH_METADATA_KEY, RpcServiceError};
use std::fmt;
use std::io;
use std::sync::Arc;

pub type ConnectionHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type PostReadHook = Arc<dyn Fn(&str, &RpcMessage) + Send + Sync>;
pub type PreDispatchHook =
    Arc<dyn Fn(&RpcRequestContext, &RpcMessage) -> Result<(), RpcServiceError> + Send + Sync>;
pub type PreWriteHook = Arc<dyn Fn(&str, &mut RpcMessage) + Send + Sync>;
pub type PostWriteHook = Arc<dyn Fn(&str, &RpcMessage, Option<&io::Error>) + Send + Sync>;

/// Ordered hook stages run around request processing.
///
/// Each stage is a list of plain functions invoked in registration order.
/// Connection-level stages receive the peer address.
#[derive(Clone, Default)]
pub struct RpcHooks {
    pre_read: Vec<ConnectionHook>,
    post_read: Vec<PostReadHook>,
    pre_dispatch: Vec<PreDispatchHook>,
    pre_write: Vec<PreWriteHook>,
    post_write: Vec<PostWriteHook>,
    post_close: Vec<ConnectionHook>,
}

impl fmt::Debug for RpcHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcHooks")
            .field("pre_read", &self.pre_read.len())
            .field("post_read", &self.post_read.len())
            .field("pre_dispatch", &self.pre_dispatch.len())
            .field("pre_write", &self.pre_write.len())
            .field("post_write", &self.post_write.len())
            .field("post_close", &self.post_close.len())
            .finish()
    }
}

impl RpcHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before each frame is read from a connection.
    pub fn on_pre_read<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.pre_read.push(Arc::new(hook));
        self
    }

    /// Runs after a frame was decoded into a message.
    pub fn on_post_read<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &RpcMessage) + Send + Sync + 'static,
    {
        self.post_read.push(Arc::new(hook));
        self
    }

    /// Runs before the handler; an error rejects the request with a business error.
    pub fn on_pre_dispatch<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RpcRequestContext, &RpcMessage) -> Result<(), RpcServiceError> + Send + Sync + 'static,
    {
        self.pre_dispatch.push(Arc::new(hook));
        self
    }

    /// Rejects requests whose `__AUTH` metadata does not equal `token`.
    pub fn require_auth_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.on_pre_dispatch(move |ctx, _| match ctx.metadata_value(AUTH_METADATA_KEY) {
            Some(presented) if presented == token => Ok(()),
            _ => Err(RpcServiceError::new(401, "invalid auth token")),
        })
    }

    /// Runs before a response is framed; the hook may edit it.
    pub fn on_pre_write<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &mut RpcMessage) + Send + Sync + 'static,
    {
        self.pre_write.push(Arc::new(hook));
        self
    }

    pub fn on_post_write<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &RpcMessage, Option<&io::Error>) + Send + Sync + 'static,
    {
        self.post_write.push(Arc::new(hook));
        self
    }

    /// Runs once a connection has been torn down.
    pub fn on_post_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.post_close.push(Arc::new(hook));
        self
    }

    pub fn run_pre_read(&self, peer: &str) {
        self.pre_read.iter().for_each(|hook| hook(peer));
    }

    pub fn run_post_read(&self, peer: &str, message: &RpcMessage) {
        self.post_read.iter().for_each(|hook| hook(peer, message));
    }

    /// Stops at the first hook that rejects the request.
    pub fn run_pre_dispatch(
        &self,
        ctx: &RpcRequestContext,
        request: &RpcMessage,
    ) -> Result<(), RpcServiceError> {
        self.pre_dispatch.iter().try_for_each(|hook| hook(ctx, request))
    }

    pub fn run_pre_write(&self, peer: &str, response: &mut RpcMessage) {
        self.pre_write.iter().for_each(|hook| hook(peer, response));
    }

    pub fn run_post_write(&self, peer: &str, response: &RpcMessage, err: Option<&io::Error>) {
        self.post_write.iter().for_each(|hook| hook(peer, response, err));
    }

    pub fn run_post_close(&self, peer: &str) {
        self.post_close.iter().for_each(|hook| hook(peer));
    }
}
