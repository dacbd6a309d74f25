use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use crate::node::Node;
use crate::selection::{self, Selection, SelectionMethod};
use rpcbalancer_common::protocol::error::{BalancerError, Result};

/// Structural state guarded by the pool lock.
#[derive(Default)]
struct Registry {
    /// Registration index to node; ascending order is failover priority.
    nodes: BTreeMap<usize, Arc<Node>>,
    /// Round-robin cursor. Holds each registered node exactly once, and is
    /// only populated when the pool uses round-robin.
    rotation: VecDeque<Arc<Node>>,
}

/// Registered nodes, the fallback and the selection policy.
///
/// Nodes are registered once at startup and never removed; afterwards the
/// pool is shared behind an `Arc` and only node health changes.
pub struct NodePool {
    method: SelectionMethod,
    registry: RwLock<Registry>,
    fallback: Option<Arc<Node>>,
}

impl NodePool {
    pub fn new(method: SelectionMethod) -> Self {
        Self {
            method,
            registry: RwLock::new(Registry::default()),
            fallback: None,
        }
    }

    /// Registers `node` under `id`. Startup only.
    pub fn add_node(&self, node: Node, id: usize) -> Result<Arc<Node>> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.nodes.contains_key(&id) {
            return Err(BalancerError::Config(format!(
                "node id {} is already registered",
                id
            )));
        }

        let node = Arc::new(node);
        registry.nodes.insert(id, node.clone());
        if self.method == SelectionMethod::RoundRobin {
            registry.rotation.push_back(node.clone());
        }
        Ok(node)
    }

    /// Installs the fallback node. It is never part of the regular registry.
    pub fn set_fallback(&mut self, node: Node) -> Arc<Node> {
        let node = Arc::new(node);
        self.fallback = Some(node.clone());
        node
    }

    pub fn fallback(&self) -> Option<&Arc<Node>> {
        self.fallback.as_ref()
    }

    pub fn selection_method(&self) -> SelectionMethod {
        self.method
    }

    pub fn node_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .nodes
            .len()
    }

    /// Regular nodes in registration order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .nodes
            .values()
            .cloned()
            .collect()
    }

    /// Picks a healthy node with the configured policy, or the fallback.
    pub fn select_node(&self) -> Selection {
        self.select_node_excluding(&HashSet::new())
    }

    /// Like [`select_node`](Self::select_node), but never returns a regular
    /// node whose URI is in `excluded`.
    pub fn select_node_excluding(&self, excluded: &HashSet<String>) -> Selection {
        let usable = |node: &Node| node.is_healthy() && !excluded.contains(node.uri());

        let picked = match self.method {
            SelectionMethod::Failover => {
                let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
                selection::failover(registry.nodes.values(), usable)
            }
            SelectionMethod::RoundRobin => {
                let mut registry =
                    self.registry.write().unwrap_or_else(PoisonError::into_inner);
                selection::round_robin(&mut registry.rotation, usable)
            }
            SelectionMethod::Random => {
                let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
                let nodes: Vec<_> = registry.nodes.values().collect();
                selection::random(&nodes, usable)
            }
        };

        match (picked, &self.fallback) {
            (Some(node), _) => Selection::Node(node),
            (None, Some(fallback)) => Selection::Fallback(fallback.clone()),
            (None, None) => Selection::Exhausted,
        }
    }
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePool")
            .field("method", &self.method)
            .field("nodes", &self.nodes())
            .field("fallback", &self.fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcbalancer_metrics::BalancerMetrics;

    fn metrics() -> Arc<BalancerMetrics> {
        Arc::new(BalancerMetrics::new().unwrap())
    }

    fn pool_with(method: SelectionMethod, count: usize, fallback: bool) -> NodePool {
        let metrics = metrics();
        let mut pool = NodePool::new(method);
        for i in 0..count {
            let node = Node::new(format!("http://node{}", i), metrics.clone()).unwrap();
            pool.add_node(node, i).unwrap();
        }
        if fallback {
            pool.set_fallback(Node::new("http://fallback", metrics).unwrap());
        }
        pool
    }

    fn uri(selection: &Selection) -> &str {
        selection.node().unwrap().uri()
    }

    #[test]
    fn test_pool_creation() {
        let pool = NodePool::new(SelectionMethod::Random);
        assert_eq!(pool.node_count(), 0);
        assert!(pool.fallback().is_none());
        assert_eq!(pool.selection_method(), SelectionMethod::Random);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let metrics = metrics();
        let pool = NodePool::new(SelectionMethod::Failover);
        pool.add_node(Node::new("http://a", metrics.clone()).unwrap(), 0).unwrap();
        let err = pool
            .add_node(Node::new("http://b", metrics).unwrap(), 0)
            .unwrap_err();
        assert!(matches!(err, BalancerError::Config(_)));
        assert_eq!(pool.node_count(), 1);
    }

    #[test]
    fn test_nodes_in_registration_order() {
        let metrics = metrics();
        let pool = NodePool::new(SelectionMethod::Failover);
        pool.add_node(Node::new("http://second", metrics.clone()).unwrap(), 2).unwrap();
        pool.add_node(Node::new("http://first", metrics).unwrap(), 1).unwrap();

        let uris: Vec<_> = pool.nodes().iter().map(|n| n.uri().to_string()).collect();
        assert_eq!(uris, vec!["http://first", "http://second"]);
    }

    #[test]
    fn test_failover_prefers_lowest_index() {
        let pool = pool_with(SelectionMethod::Failover, 3, true);
        for _ in 0..5 {
            let selection = pool.select_node();
            assert!(!selection.is_fallback());
            assert_eq!(uri(&selection), "http://node0");
        }
    }

    #[test]
    fn test_sole_unhealthy_node_yields_fallback() {
        let pool = pool_with(SelectionMethod::Failover, 1, true);
        assert_eq!(uri(&pool.select_node()), "http://node0");

        pool.nodes()[0].set_healthy(false);
        let selection = pool.select_node();
        assert!(matches!(selection, Selection::Fallback(_)));
        assert_eq!(uri(&selection), "http://fallback");
    }

    #[test]
    fn test_empty_registry_yields_fallback() {
        for method in [SelectionMethod::Failover, SelectionMethod::RoundRobin, SelectionMethod::Random] {
            let pool = pool_with(method, 0, true);
            assert!(matches!(pool.select_node(), Selection::Fallback(_)));
        }
    }

    #[test]
    fn test_exhausted_without_fallback() {
        let pool = pool_with(SelectionMethod::Failover, 2, false);
        pool.nodes().iter().for_each(|n| n.set_healthy(false));
        assert!(matches!(pool.select_node(), Selection::Exhausted));
    }

    #[test]
    fn test_selection_is_healthy_or_fallback() {
        for method in [SelectionMethod::Failover, SelectionMethod::RoundRobin, SelectionMethod::Random] {
            let pool = pool_with(method, 4, true);
            pool.nodes()[1].set_healthy(false);
            pool.nodes()[3].set_healthy(false);
            for _ in 0..20 {
                match pool.select_node() {
                    Selection::Node(node) => assert!(node.is_healthy()),
                    Selection::Fallback(node) => assert_eq!(node.uri(), "http://fallback"),
                    Selection::Exhausted => panic!("fallback is configured"),
                }
            }
        }
    }

    #[test]
    fn test_round_robin_visits_each_node_once() {
        let pool = pool_with(SelectionMethod::RoundRobin, 3, true);
        let picked: Vec<_> = (0..3)
            .map(|_| uri(&pool.select_node()).to_string())
            .collect();
        assert_eq!(picked, vec!["http://node0", "http://node1", "http://node2"]);
        assert_eq!(uri(&pool.select_node()), "http://node0");
    }

    #[test]
    fn test_round_robin_skips_unhealthy() {
        let pool = pool_with(SelectionMethod::RoundRobin, 3, true);
        pool.nodes()[1].set_healthy(false);
        let picked: Vec<_> = (0..4)
            .map(|_| uri(&pool.select_node()).to_string())
            .collect();
        assert_eq!(
            picked,
            vec!["http://node0", "http://node2", "http://node0", "http://node2"]
        );
    }

    #[test]
    fn test_rotation_only_populated_for_round_robin() {
        let pool = pool_with(SelectionMethod::Failover, 3, false);
        assert!(pool.registry.read().unwrap().rotation.is_empty());

        let pool = pool_with(SelectionMethod::RoundRobin, 3, false);
        assert_eq!(pool.registry.read().unwrap().rotation.len(), 3);
    }

    #[test]
    fn test_random_without_healthy_nodes_always_fallback() {
        let pool = pool_with(SelectionMethod::Random, 5, true);
        pool.nodes().iter().for_each(|n| n.set_healthy(false));
        for _ in 0..100 {
            let selection = pool.select_node();
            assert!(matches!(selection, Selection::Fallback(_)));
            assert_eq!(uri(&selection), "http://fallback");
        }
    }

    #[test]
    fn test_random_eventually_covers_all_nodes() {
        let pool = pool_with(SelectionMethod::Random, 3, false);
        let seen: HashSet<_> = (0..200)
            .map(|_| uri(&pool.select_node()).to_string())
            .collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_exclusion_set_skips_tried_nodes() {
        for method in [SelectionMethod::Failover, SelectionMethod::RoundRobin, SelectionMethod::Random] {
            let pool = pool_with(method, 2, true);
            let mut excluded = HashSet::new();
            excluded.insert("http://node0".to_string());
            for _ in 0..10 {
                assert_eq!(uri(&pool.select_node_excluding(&excluded)), "http://node1");
            }

            excluded.insert("http://node1".to_string());
            assert!(matches!(
                pool.select_node_excluding(&excluded),
                Selection::Fallback(_)
            ));
        }
    }

    #[test]
    fn test_fallback_health_is_not_consulted() {
        let mut pool = pool_with(SelectionMethod::Failover, 0, false);
        let fallback = pool.set_fallback(Node::new("http://fallback", metrics()).unwrap());
        fallback.set_healthy(false);
        assert!(matches!(pool.select_node(), Selection::Fallback(_)));
    }

    #[test]
    fn test_concurrent_round_robin_keeps_ring_intact() {
        let pool = Arc::new(pool_with(SelectionMethod::RoundRobin, 4, true));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        let _ = pool.select_node();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let registry = pool.registry.read().unwrap();
        let uris: HashSet<_> = registry.rotation.iter().map(|n| n.uri().to_string()).collect();
        assert_eq!(registry.rotation.len(), 4);
        assert_eq!(uris.len(), 4);
    }
}
