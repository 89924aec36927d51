use std::time::Duration;

/// Metadata key under which callers attach an authentication token.
pub const AUTH_METADATA_KEY: &str = "__AUTH";

/// Time allowed for establishing a connection to a node.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of attempts made by the retrying fail modes.
pub const DEFAULT_RETRIES: usize = 3;

/// Delay before a `Failbackup` call sends its second request.
pub const DEFAULT_BACKUP_LATENCY: Duration = Duration::from_millis(10);

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of the bounded queues joining the server's read, dispatch and
/// write stages.
///
/// This is a count of *messages*, not bytes. A full `out` queue stalls the
/// unit of work that is trying to deliver its response, which in turn holds
/// back a slow writer's peers without dropping anything.
pub const DEFAULT_PIPELINE_QUEUE_CAPACITY: usize = 10;

/// Interval at which a shutting-down server re-checks its in-flight counter.
pub const DEFAULT_SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Buffer of a caller-provided completion channel when one is created for it.
pub const DEFAULT_COMPLETION_BUFFER_SIZE: usize = 10;
