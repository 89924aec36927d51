use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Server lifecycle: `Running -> ShuttingDown -> Closed`.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum RpcServerState {
    Running = 0,
    /// No new connections are accepted; in-flight requests are draining.
    ShuttingDown = 1,
    Closed = 2,
}
