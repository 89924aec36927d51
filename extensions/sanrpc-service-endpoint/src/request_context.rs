use parking_lot::Mutex;
use sanrpc::rpc::{RpcMessage, RpcMetadata};
use std::sync::Arc;

/// What a handler knows about the request it is serving.
///
/// Clones share the same response metadata, so a handler can hand the context
/// to helpers that add entries.
#[derive(Debug, Clone)]
pub struct RpcRequestContext {
    /// Remote address of the connection the request arrived on.
    pub peer: String,
    pub sequence: u64,
    pub service_name: String,
    pub method_name: String,
    pub metadata: RpcMetadata,
    response_metadata: Arc<Mutex<RpcMetadata>>,
}

impl RpcRequestContext {
    pub fn new(peer: impl Into<String>, request: &RpcMessage) -> Self {
        Self {
            peer: peer.into(),
            sequence: request.sequence,
            service_name: request.service_name.clone(),
            method_name: request.method_name.clone(),
            metadata: request.metadata.clone(),
            response_metadata: Arc::new(Mutex::new(RpcMetadata::new())),
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Adds an entry to the metadata sent back with the response.
    pub fn set_response_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.response_metadata.lock().insert(key.into(), value.into());
    }

    pub(crate) fn take_response_metadata(&self) -> RpcMetadata {
        std::mem::take(&mut *self.response_metadata.lock())
    }
}
