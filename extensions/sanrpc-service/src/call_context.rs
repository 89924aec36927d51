use sanrpc::codec::{CompressType, SerializeType};
use sanrpc::rpc::RpcMetadata;
use std::time::{Duration, Instant};

/// Per-call settings passed explicitly through the call chain.
///
/// Request metadata travels to the server; metadata set by the server's
/// handler is merged into `response_metadata` once the call completes.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub metadata: RpcMetadata,
    pub response_metadata: RpcMetadata,
    pub serialize_type: SerializeType,
    pub compress_type: CompressType,
    /// Logical deadline for the whole call, independent of per-I/O timeouts.
    pub deadline: Option<Instant>,
    /// Key used by hash-based selectors to pin a call to a node.
    pub routing_key: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_serialize_type(mut self, serialize_type: SerializeType) -> Self {
        self.serialize_type = serialize_type;
        self
    }

    pub fn with_compress_type(mut self, compress_type: CompressType) -> Self {
        self.compress_type = compress_type;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    /// Time left before the deadline; `None` when the call is unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    pub fn merge_response_metadata(&mut self, metadata: RpcMetadata) {
        self.response_metadata.extend(metadata);
    }
}
