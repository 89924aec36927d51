use rand::Rng;
use sanrpc_selector::{Node, SelectMode, Selector};
use std::collections::HashMap;
use std::sync::Arc;

fn cluster(n: usize) -> Vec<Node> {
    (0..n).map(|i| Node::tcp(format!("10.0.0.{i}:8972"))).collect()
}

fn random_keys(n: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| format!("user-{}", rng.random::<u64>()))
        .collect()
}

fn route_all(selector: &Arc<dyn Selector>, keys: &[String]) -> HashMap<String, String> {
    keys.iter()
        .map(|key| {
            let node = selector.select("Arith", Some(key)).unwrap();
            (key.clone(), node.address)
        })
        .collect()
}

#[test]
fn test_consistent_hash_removal_only_remaps_keys_of_the_removed_node() {
    let nodes = cluster(5);
    let selector = SelectMode::ConsistentHash.new_selector(nodes.clone());
    let keys = random_keys(2_000);
    let before = route_all(&selector, &keys);

    let removed = nodes[2].address.clone();
    let remaining: Vec<Node> = nodes
        .iter()
        .filter(|n| n.address != removed)
        .cloned()
        .collect();
    selector.update_nodes(remaining);
    let after = route_all(&selector, &keys);

    for key in &keys {
        if before[key] != removed {
            assert_eq!(before[key], after[key], "key {key} moved without cause");
        } else {
            assert_ne!(after[key], removed);
        }
    }

    // Re-adding the node restores the original routing.
    selector.update_nodes(nodes);
    assert_eq!(route_all(&selector, &keys), before);
}

#[test]
fn test_consistent_hash_spreads_keys_over_all_nodes() {
    let selector = SelectMode::ConsistentHash.new_selector(cluster(4));
    let routed = route_all(&selector, &random_keys(4_000));

    let mut per_node: HashMap<&str, usize> = HashMap::new();
    for address in routed.values() {
        *per_node.entry(address).or_default() += 1;
    }
    assert_eq!(per_node.len(), 4);
    assert!(per_node.values().all(|count| *count > 400));
}

#[test]
fn test_weighted_round_robin_window_counts_match_weights() {
    let weights = [("a", 3u32), ("b", 2), ("c", 1)];
    let nodes: Vec<Node> = weights
        .iter()
        .map(|(address, weight)| Node::tcp(*address).with_weight(*weight))
        .collect();
    let selector = SelectMode::WeightedRoundRobin.new_selector(nodes);
    let window: u32 = weights.iter().map(|(_, w)| w).sum();

    for _ in 0..5 {
        let mut counts: HashMap<String, u32> = HashMap::new();
        let mut previous: Option<String> = None;
        for _ in 0..window {
            let address = selector.select("Arith", None).unwrap().address;
            // The heaviest node has half the total weight, so it never needs
            // to be picked twice in a row.
            assert_ne!(previous.as_deref(), Some(address.as_str()));
            *counts.entry(address.clone()).or_default() += 1;
            previous = Some(address);
        }
        for (address, weight) in weights {
            assert_eq!(counts.get(address).copied().unwrap_or(0), weight);
        }
    }
}

#[test]
fn test_round_robin_visits_every_node_once_per_cycle() {
    let nodes = cluster(4);
    let selector = SelectMode::RoundRobin.new_selector(nodes.clone());

    for _ in 0..3 {
        let mut seen: Vec<String> = (0..nodes.len())
            .map(|_| selector.select("Echo", None).unwrap().address)
            .collect();
        seen.sort();
        let mut expected: Vec<String> = nodes.iter().map(|n| n.address.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }
}

#[test]
fn test_concurrent_updates_never_expose_a_mixed_set() {
    let first = cluster(3);
    let second: Vec<Node> = (0..3).map(|i| Node::tcp(format!("192.168.1.{i}:1"))).collect();
    let selector = SelectMode::RandomSelect.new_selector(first.clone());

    std::thread::scope(|scope| {
        let updater = selector.clone();
        let (a, b) = (first.clone(), second.clone());
        scope.spawn(move || {
            for i in 0..500 {
                updater.update_nodes(if i % 2 == 0 { b.clone() } else { a.clone() });
            }
        });

        for _ in 0..2_000 {
            let snapshot = selector.nodes();
            assert!(*snapshot == first || *snapshot == second);
            let node = selector.select("Arith", None).unwrap();
            assert!(first.contains(&node) || second.contains(&node));
        }
    });
}
