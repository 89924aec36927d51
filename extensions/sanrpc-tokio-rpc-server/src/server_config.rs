use sanrpc::constants::DEFAULT_MAX_FRAME_BODY_SIZE;
use sanrpc_service::constants::{DEFAULT_PIPELINE_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_POLL_INTERVAL};
use std::time::Duration;

/// Tunables for [`RpcServer`](crate::RpcServer).
///
/// Codecs and hooks belong to the service endpoint the server is built from.
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    /// Bound on each frame read; idle connections are dropped when it elapses.
    pub read_timeout: Option<Duration>,
    /// Bound on each frame write.
    pub write_timeout: Option<Duration>,
    /// Capacity of the per-connection inbound and outbound queues.
    pub pipeline_queue_capacity: usize,
    /// How often a graceful shutdown checks for drained requests.
    pub shutdown_poll_interval: Duration,
    pub max_frame_body_size: usize,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            pipeline_queue_capacity: DEFAULT_PIPELINE_QUEUE_CAPACITY,
            shutdown_poll_interval: DEFAULT_SHUTDOWN_POLL_INTERVAL,
            max_frame_body_size: DEFAULT_MAX_FRAME_BODY_SIZE,
        }
    }
}

impl RpcServerConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_pipeline_queue_capacity(mut self, capacity: usize) -> Self {
        self.pipeline_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_shutdown_poll_interval(mut self, interval: Duration) -> Self {
        self.shutdown_poll_interval = interval;
        self
    }

    pub fn with_max_frame_body_size(mut self, max: usize) -> Self {
        self.max_frame_body_size = max;
        self
    }
}
