use std::time::Duration;

/// Network used when a node address carries no `network@` prefix.
pub const DEFAULT_NETWORK: &str = "tcp";

/// Weight of a node that does not declare one.
pub const DEFAULT_NODE_WEIGHT: u32 = 1;

/// Virtual points placed on the hash ring per physical node.
pub const DEFAULT_HASH_REPLICAS: usize = 100;

/// Age after which a round-robin cursor is reset even if its node list did
/// not change size.
pub const DEFAULT_ROUND_ROBIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
