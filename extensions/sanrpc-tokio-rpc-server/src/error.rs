use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcServerError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// `serve` was called on a server that is shutting down or closed.
    #[error("server is not running")]
    NotRunning,

    /// The shutdown deadline passed with requests still in flight; the
    /// remaining connections were closed forcibly.
    #[error("shutdown timed out with {in_flight} requests in flight")]
    ShutdownTimedOut { in_flight: usize },
}
