use crate::constants::DEFAULT_ROUND_ROBIN_REFRESH_INTERVAL;
use crate::selector::NodeSnapshot;
use crate::{Node, Selector, SelectorError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Cursor {
    len: usize,
    next: usize,
    started_at: Instant,
}

impl Cursor {
    fn new(len: usize) -> Self {
        Self {
            len,
            next: 0,
            started_at: Instant::now(),
        }
    }
}

/// Cycles through the node set, keeping one cursor per service.
///
/// A cursor restarts from the first node when the node count changes or when
/// it is older than the refresh interval.
pub struct RoundRobinSelector {
    nodes: NodeSnapshot,
    cursors: Mutex<HashMap<String, Cursor>>,
    refresh_interval: Duration,
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::with_refresh_interval(DEFAULT_ROUND_ROBIN_REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(refresh_interval: Duration) -> Self {
        Self {
            nodes: NodeSnapshot::default(),
            cursors: Mutex::new(HashMap::new()),
            refresh_interval,
        }
    }
}

impl Selector for RoundRobinSelector {
    fn select(&self, service_name: &str, _routing_key: Option<&str>) -> Result<Node, SelectorError> {
        let nodes = self.nodes.load();
        let len = nodes.len();
        if len == 0 {
            return Err(SelectorError::NoServerAvailable);
        }

        let mut cursors = self.cursors.lock();
        let cursor = cursors
            .entry(service_name.to_string())
            .or_insert_with(|| Cursor::new(len));

        if cursor.len != len || cursor.started_at.elapsed() >= self.refresh_interval {
            *cursor = Cursor::new(len);
        }

        let index = cursor.next % len;
        cursor.next = (index + 1) % len;
        Ok(nodes[index].clone())
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

    fn addresses(selector: &RoundRobinSelector, service: &str, n: usize) -> Vec<String> {
        (0..n)
            .map(|_| selector.select(service, None).unwrap().address)
            .collect()
    }

    #[test]
    fn cycles_in_order() {
        let selector = RoundRobinSelector::new();
        selector.update_nodes(vec![Node::tcp("a"), Node::tcp("b"), Node::tcp("c")]);

        assert_eq!(
            addresses(&selector, "Arith", 7),
            ["a", "b", "c", "a", "b", "c", "a"]
        );
    }

    #[test]
    fn services_have_independent_cursors() {
        let selector = RoundRobinSelector::new();
        selector.update_nodes(vec![Node::tcp("a"), Node::tcp("b")]);

        assert_eq!(addresses(&selector, "Arith", 1), ["a"]);
        assert_eq!(addresses(&selector, "Echo", 1), ["a"]);
        assert_eq!(addresses(&selector, "Arith", 1), ["b"]);
    }

    #[test]
    fn resets_when_node_count_changes() {
        let selector = RoundRobinSelector::new();
        selector.update_nodes(vec![Node::tcp("a"), Node::tcp("b"), Node::tcp("c")]);
        assert_eq!(addresses(&selector, "Arith", 2), ["a", "b"]);

        selector.update_nodes(vec![Node::tcp("x"), Node::tcp("y")]);
        assert_eq!(addresses(&selector, "Arith", 3), ["x", "y", "x"]);
    }

    #[test]
    fn resets_after_refresh_interval() {
        let selector = RoundRobinSelector::with_refresh_interval(Duration::ZERO);
        selector.update_nodes(vec![Node::tcp("a"), Node::tcp("b")]);

        assert_eq!(addresses(&selector, "Arith", 3), ["a", "a", "a"]);
    }
}
