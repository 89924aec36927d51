use crate::constants::DEFAULT_HASH_REPLICAS;
use crate::selector::NodeSnapshot;
use crate::{Node, Selector, SelectorError};
use parking_lot::Mutex;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// Sorted ring of `(hash, node index)` points.
#[derive(Debug)]
struct HashRing {
    source: Arc<Vec<Node>>,
    points: Vec<(u64, usize)>,
}

impl HashRing {
    fn build(source: Arc<Vec<Node>>, replicas: usize) -> Self {
        let mut points = Vec::with_capacity(source.len() * replicas);
        for (index, node) in source.iter().enumerate() {
            for replica in 0..replicas {
                let hash = xxh3_64(format!("{replica}{}", node.address).as_bytes());
                points.push((hash, index));
            }
        }
        points.sort_unstable();

        Self { source, points }
    }

    /// Index of the node owning the first point clockwise from the key's
    /// hash, wrapping to the start.
    fn locate(&self, routing_key: &str) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let hash = xxh3_64(routing_key.as_bytes());
        let position = self.points.partition_point(|(point, _)| *point < hash);
        let (_, index) = self.points[position % self.points.len()];
        Some(index)
    }

    /// Same endpoints in the same order; weights and metadata may differ.
    fn same_members(&self, nodes: &[Node]) -> bool {
        self.source.len() == nodes.len()
            && self
                .source
                .iter()
                .zip(nodes)
                .all(|(a, b)| a.network == b.network && a.address == b.address)
    }
}

/// Routes each routing key to the same node for as long as that node exists.
///
/// Each node owns [`DEFAULT_HASH_REPLICAS`] points on a 64-bit ring. Removing
/// a node only remaps the keys that were routed to it.
pub struct ConsistentHashSelector {
    nodes: NodeSnapshot,
    replicas: usize,
    ring: Mutex<Option<Arc<HashRing>>>,
}

impl Default for ConsistentHashSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistentHashSelector {
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_HASH_REPLICAS)
    }

    pub fn with_replicas(replicas: usize) -> Self {
        Self {
            nodes: NodeSnapshot::default(),
            replicas: replicas.max(1),
            ring: Mutex::new(None),
        }
    }

    /// Returns the ring for `nodes`, rebuilding it only when membership changed.
    fn ring_for(&self, nodes: Arc<Vec<Node>>) -> Arc<HashRing> {
        let mut ring = self.ring.lock();
        match ring.as_ref() {
            Some(current) if Arc::ptr_eq(&current.source, &nodes) => current.clone(),
            Some(current) if current.same_members(&nodes) => current.clone(),
            _ => {
                tracing::debug!("Rebuilding hash ring for {} nodes", nodes.len());
                let rebuilt = Arc::new(HashRing::build(nodes, self.replicas));
                *ring = Some(rebuilt.clone());
                rebuilt
            }
        }
    }
}

impl Selector for ConsistentHashSelector {
    fn select(&self, _service_name: &str, routing_key: Option<&str>) -> Result<Node, SelectorError> {
        let nodes = self.nodes.load();
        if nodes.is_empty() {
            return Err(SelectorError::NoServerAvailable);
        }
        let routing_key = routing_key.ok_or(SelectorError::MissingRoutingKey)?;

        // A reused ring may have been built from an older snapshot, so the
        // node itself is taken from the current one.
        self.ring_for(nodes.clone())
            .locate(routing_key)
            .and_then(|index| nodes.get(index))
            .cloned()
            .ok_or(SelectorError::NoServerAvailable)
    }

    fn update_nodes(&self, nodes: Vec<Node>) {
        self.nodes.store(nodes);
    }

    fn nodes(&self) -> Arc<Vec<Node>> {
        self.nodes.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_a_routing_key() {
        let selector = ConsistentHashSelector::new();
        selector.update_nodes(vec![Node::tcp("a:1")]);
        assert_eq!(
            selector.select("Arith", None),
            Err(SelectorError::MissingRoutingKey)
        );
    }

    #[test]
    fn empty_set_has_no_server() {
        let selector = ConsistentHashSelector::new();
        assert_eq!(
            selector.select("Arith", Some("user-1")),
            Err(SelectorError::NoServerAvailable)
        );
    }

    #[test]
    fn same_key_same_node() {
        let selector = ConsistentHashSelector::new();
        selector.update_nodes(vec![Node::tcp("a:1"), Node::tcp("b:2"), Node::tcp("c:3")]);

        let first = selector.select("Arith", Some("user-42")).unwrap();
        for _ in 0..50 {
            assert_eq!(selector.select("Arith", Some("user-42")).unwrap(), first);
        }
    }

    #[test]
    fn weight_changes_do_not_rebuild_the_ring() {
        let selector = ConsistentHashSelector::new();
        selector.update_nodes(vec![Node::tcp("a:1"), Node::tcp("b:2")]);
        selector.select("Arith", Some("k")).unwrap();
        let before = selector.ring.lock().clone().unwrap();

        selector.update_nodes(vec![Node::tcp("a:1").with_weight(4), Node::tcp("b:2")]);
        selector.select("Arith", Some("k")).unwrap();
        let after = selector.ring.lock().clone().unwrap();

        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn reused_ring_returns_current_node_values() {
        let selector = ConsistentHashSelector::new();
        selector.update_nodes(vec![Node::tcp("a:1")]);
        assert_eq!(selector.select("Arith", Some("k")).unwrap().weight, 1);

        selector.update_nodes(vec![Node::tcp("a:1").with_weight(7)]);
        assert_eq!(selector.select("Arith", Some("k")).unwrap().weight, 7);
    }

    #[test]
    fn network_change_rebuilds_the_ring() {
        let selector = ConsistentHashSelector::new();
        selector.update_nodes(vec![Node::tcp("/tmp/a.sock")]);
        selector.select("Arith", Some("k")).unwrap();
        let before = selector.ring.lock().clone().unwrap();

        selector.update_nodes(vec![Node::new("unix", "/tmp/a.sock")]);
        let node = selector.select("Arith", Some("k")).unwrap();
        let after = selector.ring.lock().clone().unwrap();

        assert_eq!(node.network, "unix");
        assert!(!Arc::ptr_eq(&before, &after));
    }
}
