/// How a failover client reacts when a call against a node fails.
///
/// Only transport-level failures are retried; an error returned by the remote
/// service is always handed straight back to the caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Return the first error.
    #[default]
    Failfast,
    /// Select another node and retry, up to the configured number of attempts.
    Failover,
    /// Retry the same node, up to the configured number of attempts.
    Failtry,
    /// Send a second request to another node if the first is slow and take
    /// whichever succeeds first.
    Failbackup,
}
