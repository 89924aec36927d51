use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("no server available")]
    NoServerAvailable,

    /// A hash-based selector was asked to route a call without a key.
    #[error("routing key required for consistent hash selection")]
    MissingRoutingKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("invalid node address `{0}`")]
    InvalidAddress(String),

    #[error("service `{0}` is unknown to discovery")]
    UnknownService(String),
}
