use crate::selector::NodeSnapshot;
use crate::{Node, Selector, SelectorError};
use rand::Rng;
use std::sync::Arc;

/// Picks a node uniformly at random on every call.
#[derive(Debug, Default)]
pub struct RandomSelector {
    nodes: NodeSnapshot,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RandomSelector {
    fn select(&self, _service_name: &str, _routing_key: Option<&str>) -> Result<Node, SelectorError> {
        let nodes = self.nodes.load();
        if nodes.is_empty() {
            return Err(SelectorError::NoServerAvailable);
        }
        let index = rand::rng().random_range(0..nodes.len());
        Ok(nodes[index].clone())
    }

    fn update_nodes(&self, nodes: Vec<Node>) {
        self.nodes.store(nodes);
    }

    fn nodes(&self) -> Arc<Vec<Node>> {
        self.nodes.load()
    }
}
