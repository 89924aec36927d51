use crate::selector::NodeSnapshot;
use crate::{Node, Selector, SelectorError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct WeightedEntry {
    node: Node,
    weight: i64,
    effective_weight: i64,
    current_weight: i64,
}

#[derive(Debug)]
struct WeightedState {
    source: Arc<Vec<Node>>,
    entries: Vec<WeightedEntry>,
}

impl WeightedState {
    fn new(source: Arc<Vec<Node>>) -> Self {
        let entries = source
            .iter()
            .map(|node| {
                let weight = i64::from(node.weight.max(1));
                WeightedEntry {
                    node: node.clone(),
                    weight,
                    effective_weight: weight,
                    current_weight: 0,
                }
            })
            .collect();
        Self { source, entries }
    }

    /// One round of smooth weighted round robin.
    fn next(&mut self) -> Option<Node> {
        let mut total = 0;
        let mut best: Option<(usize, i64)> = None;

        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.current_weight += entry.effective_weight;
            total += entry.effective_weight;

            // Nodes demoted by a failure climb back one step per round.
            if entry.effective_weight < entry.weight {
                entry.effective_weight += 1;
            }

            // Strictly greater: ties go to the earlier node.
            if best.is_none_or(|(_, current)| entry.current_weight > current) {
                best = Some((index, entry.current_weight));
            }
        }

        let (index, _) = best?;
        let winner = &mut self.entries[index];
        winner.current_weight -= total;
        Some(winner.node.clone())
    }
}

/// Smooth weighted round robin (the nginx algorithm).
///
/// Over any window of `sum(weights)` consecutive selections each node is
/// picked exactly `weight` times, and heavy nodes are interleaved with light
/// ones instead of being picked in bursts.
#[derive(Debug, Default)]
pub struct WeightedRoundRobinSelector {
    nodes: NodeSnapshot,
    states: Mutex<HashMap<String, WeightedState>>,
}

impl WeightedRoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for WeightedRoundRobinSelector {
    fn select(&self, service_name: &str, _routing_key: Option<&str>) -> Result<Node, SelectorError> {
        let nodes = self.nodes.load();
        if nodes.is_empty() {
            return Err(SelectorError::NoServerAvailable);
        }

        let mut states = self.states.lock();
        let state = states
            .entry(service_name.to_string())
            .or_insert_with(|| WeightedState::new(nodes.clone()));

        if !Arc::ptr_eq(&state.source, &nodes) {
            if *state.source == *nodes {
                state.source = nodes;
            } else {
                *state = WeightedState::new(nodes);
            }
        }

        state.next().ok_or(SelectorError::NoServerAvailable)
    }

    fn update_nodes(&self, nodes: Vec<Node>) {
        self.nodes.store(nodes);
    }

    fn nodes(&self) -> Arc<Vec<Node>> {
        self.nodes.load()
    }

    fn mark_failed(&self, node: &Node) {
        let mut states = self.states.lock();
        for state in states.values_mut() {
            for entry in state.entries.iter_mut().filter(|e| e.node == *node) {
                entry.effective_weight = 1;
            }
        }
    }
}
