use sanrpc::codec::CodecRegistry;
use sanrpc::constants::DEFAULT_MAX_FRAME_BODY_SIZE;
use sanrpc_service::constants::{
    DEFAULT_BACKUP_LATENCY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RETRIES,
};
use std::sync::Arc;
use std::time::Duration;

/// Settings shared by [`RpcClient`](crate::RpcClient) and [`XClient`](crate::XClient).
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub connect_timeout: Duration,
    /// Bound on each frame read. An idle connection fails once it elapses,
    /// so pair it with heartbeats.
    pub read_timeout: Option<Duration>,
    /// Bound on each frame write.
    pub write_timeout: Option<Duration>,
    pub heartbeat: bool,
    /// Interval between heartbeats; also the deadline of each heartbeat call.
    pub heartbeat_interval: Duration,
    /// Extra attempts made by the `Failover` and `Failtry` modes.
    pub retries: usize,
    /// How long `Failbackup` waits on the first node before asking a second one.
    pub backup_latency: Duration,
    /// Enables TCP keepalive probes on client sockets.
    pub tcp_keepalive: bool,
    pub max_frame_body_size: usize,
    pub codec_registry: Arc<CodecRegistry>,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            write_timeout: None,
            heartbeat: false,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            retries: DEFAULT_RETRIES,
            backup_latency: DEFAULT_BACKUP_LATENCY,
            tcp_keepalive: true,
            max_frame_body_size: DEFAULT_MAX_FRAME_BODY_SIZE,
            codec_registry: CodecRegistry::shared(),
        }
    }
}

impl RpcClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Turns on heartbeats sent every `interval`.
    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat = true;
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backup_latency(mut self, latency: Duration) -> Self {
        self.backup_latency = latency;
        self
    }

    pub fn with_tcp_keepalive(mut self, enabled: bool) -> Self {
        self.tcp_keepalive = enabled;
        self
    }

    pub fn with_codec_registry(mut self, codec_registry: Arc<CodecRegistry>) -> Self {
        self.codec_registry = codec_registry;
        self
    }
}
