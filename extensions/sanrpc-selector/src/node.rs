use crate::DiscoveryError;
use crate::constants::{DEFAULT_NETWORK, DEFAULT_NODE_WEIGHT};
use std::fmt;

/// An addressable backend instance.
///
/// Nodes are immutable values; a discovery update replaces the whole node set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub network: String,
    pub address: String,
    pub weight: u32,
    /// Raw query-string metadata as published by discovery, e.g. `weight=3&zone=b`.
    pub metadata: String,
}

impl Node {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
            weight: DEFAULT_NODE_WEIGHT,
            metadata: String::new(),
        }
    }

    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(DEFAULT_NETWORK, address)
    }

    /// Parses `[network@]address[?metadata]`.
    ///
    /// A `weight` entry in the metadata sets the node weight; a missing or
    /// zero weight falls back to the default.
    pub fn parse(text: &str) -> Result<Self, DiscoveryError> {
        let text = text.trim();
        let (key, metadata) = text.split_once('?').unwrap_or((text, ""));
        let (network, address) = split_key(key);

        if address.is_empty() || network.is_empty() {
            return Err(DiscoveryError::InvalidAddress(text.to_string()));
        }

        Ok(Self::new(network, address).with_metadata(metadata))
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        if let Some(weight) = self.metadata_value("weight").and_then(|w| w.parse::<u32>().ok()) {
            self.weight = weight.max(1);
        }
        self
    }

    /// Looks up one `key=value` pair in the metadata query string.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Connection cache key, `network@address`.
    pub fn key(&self) -> String {
        format!("{}@{}", self.network, self.address)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.network, self.address)
    }
}

/// Splits a `network@address` key, defaulting the network to `tcp`.
pub fn split_key(key: &str) -> (&str, &str) {
    match key.split_once('@') {
        Some((network, address)) => (network, address),
        None => (DEFAULT_NETWORK, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_network_address_and_weight() {
        let node = Node::parse("tcp@127.0.0.1:8972?weight=5&zone=b").unwrap();
        assert_eq!(node.network, "tcp");
        assert_eq!(node.address, "127.0.0.1:8972");
        assert_eq!(node.weight, 5);
        assert_eq!(node.metadata_value("zone"), Some("b"));
        assert_eq!(node.key(), "tcp@127.0.0.1:8972");
    }

    #[test]
    fn defaults_network_and_weight() {
        let node = Node::parse("10.0.0.1:9000").unwrap();
        assert_eq!(node.network, "tcp");
        assert_eq!(node.weight, 1);

        let zero = Node::parse("unix@/tmp/rpc.sock?weight=0").unwrap();
        assert_eq!(zero.network, "unix");
        assert_eq!(zero.weight, 1);
    }

    #[test]
    fn rejects_empty_addresses() {
        assert!(Node::parse("tcp@").is_err());
        assert!(Node::parse("").is_err());
    }
}
