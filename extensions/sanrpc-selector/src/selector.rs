use crate::{
    ConsistentHashSelector, Node, RandomSelector, RoundRobinSelector, SelectorError,
    WeightedRoundRobinSelector,
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Chooses one node per call.
///
/// Implementations hold the current node set and must be safe to call from
/// many tasks at once. `update_nodes` replaces the set wholesale; a `select`
/// running concurrently observes either the old or the new set, never a mix.
pub trait Selector: Send + Sync {
    /// Picks a node for one call to `service_name`.
    ///
    /// `routing_key` is only consulted by hash-based strategies.
    fn select(&self, service_name: &str, routing_key: Option<&str>) -> Result<Node, SelectorError>;

    fn update_nodes(&self, nodes: Vec<Node>);

    /// Snapshot of the node set currently used for selection.
    fn nodes(&self) -> Arc<Vec<Node>>;

    /// Feedback from the client after a transport failure on `node`.
    fn mark_failed(&self, _node: &Node) {}
}

/// Built-in selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    #[default]
    RandomSelect,
    RoundRobin,
    WeightedRoundRobin,
    ConsistentHash,
}

impl SelectMode {
    /// Creates a selector for this mode, seeded with `nodes`.
    pub fn new_selector(self, nodes: Vec<Node>) -> Arc<dyn Selector> {
        let selector: Arc<dyn Selector> = match self {
            SelectMode::RandomSelect => Arc::new(RandomSelector::new()),
            SelectMode::RoundRobin => Arc::new(RoundRobinSelector::new()),
            SelectMode::WeightedRoundRobin => Arc::new(WeightedRoundRobinSelector::new()),
            SelectMode::ConsistentHash => Arc::new(ConsistentHashSelector::new()),
        };
        selector.update_nodes(nodes);
        selector
    }
}

/// Atomically swappable node set shared by the selector implementations.
#[derive(Debug, Default)]
pub(crate) struct NodeSnapshot {
    nodes: RwLock<Arc<Vec<Node>>>,
}

impl NodeSnapshot {
    pub(crate) fn load(&self) -> Arc<Vec<Node>> {
        self.nodes.read().clone()
    }

    pub(crate) fn store(&self, nodes: Vec<Node>) {
        *self.nodes.write() = Arc::new(nodes);
    }
}
