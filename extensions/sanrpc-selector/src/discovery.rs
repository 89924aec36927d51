use crate::{DiscoveryError, Node};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use parking_lot::{Mutex, RwLock};

/// Stream of full node sets pushed by a [`Discovery`] source.
pub type NodeWatch = UnboundedReceiver<Vec<Node>>;

/// Source of the nodes that serve a service.
pub trait Discovery: Send + Sync {
    /// Current nodes for `service_name`.
    fn list(&self, service_name: &str) -> Result<Vec<Node>, DiscoveryError>;

    /// Subscribes to node set changes. Sources that never change return `None`.
    fn watch(&self) -> Option<NodeWatch> {
        None
    }

    /// Stops pushing updates to every watcher.
    fn close(&self) {}
}

/// Fixed, in-process node list that can still be updated by hand.
///
/// Every service resolves to the same list.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    nodes: RwLock<Vec<Node>>,
    watchers: Mutex<Vec<UnboundedSender<Vec<Node>>>>,
}

impl StaticDiscovery {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Builds a discovery from a comma separated list such as
    /// `tcp@10.0.0.1:8972,tcp@10.0.0.2:8972?weight=2`.
    pub fn parse(list: &str) -> Result<Self, DiscoveryError> {
        let nodes = list
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(Node::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(nodes))
    }

    /// Replaces the node list and pushes it to every live watcher.
    pub fn update(&self, nodes: Vec<Node>) {
        *self.nodes.write() = nodes.clone();

        let mut watchers = self.watchers.lock();
        watchers.retain(|tx| tx.unbounded_send(nodes.clone()).is_ok());
        tracing::debug!(
            "Pushed {} nodes to {} discovery watchers",
            nodes.len(),
            watchers.len()
        );
    }
}

impl Discovery for StaticDiscovery {
    fn list(&self, _service_name: &str) -> Result<Vec<Node>, DiscoveryError> {
        Ok(self.nodes.read().clone())
    }

    fn watch(&self) -> Option<NodeWatch> {
        let (tx, rx) = mpsc::unbounded();
        self.watchers.lock().push(tx);
        Some(rx)
    }

    fn close(&self) {
        self.watchers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn parses_comma_separated_nodes() {
        let discovery = StaticDiscovery::parse("tcp@a:1, b:2?weight=3 ,").unwrap();
        let nodes = discovery.list("Arith").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].address, "b:2");
        assert_eq!(nodes[1].weight, 3);
    }

    #[tokio::test]
    async fn watchers_receive_updates_until_closed() {
        let discovery = StaticDiscovery::new(vec![Node::tcp("a:1")]);
        let mut watch = discovery.watch().unwrap();

        discovery.update(vec![Node::tcp("b:2"), Node::tcp("c:3")]);
        let pushed = watch.next().await.unwrap();
        assert_eq!(pushed.len(), 2);
        assert_eq!(discovery.list("Echo").unwrap(), pushed);

        discovery.close();
        assert!(watch.next().await.is_none());
    }
}
