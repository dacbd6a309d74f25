//! Node selection policies.
//!
//! The three algorithms share one shape: walk candidate nodes in some order
//! and return the first one the caller considers usable (healthy and not
//! already tried by this request). Returning `None` tells the pool to fall
//! back. None of them ever looks at the fallback node.

use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::node::Node;
use rpcbalancer_common::protocol::error::BalancerError;

/// Policy used by the pool to pick a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMethod {
    /// First healthy node in registration order.
    #[default]
    Failover,
    /// Rotate through nodes, skipping unhealthy ones.
    RoundRobin,
    /// Fresh random order on every call.
    Random,
}

impl FromStr for SelectionMethod {
    type Err = BalancerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "failover" => Ok(SelectionMethod::Failover),
            "roundrobin" | "round_robin" | "round-robin" => Ok(SelectionMethod::RoundRobin),
            "random" => Ok(SelectionMethod::Random),
            other => Err(BalancerError::Config(format!(
                "unknown selection method '{}' (expected failover, roundrobin or random)",
                other
            ))),
        }
    }
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionMethod::Failover => "failover",
            SelectionMethod::RoundRobin => "roundrobin",
            SelectionMethod::Random => "random",
        };
        f.write_str(name)
    }
}

/// Outcome of asking the pool for a node.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A healthy regular node.
    Node(Arc<Node>),
    /// No regular node was usable; this is the configured fallback.
    Fallback(Arc<Node>),
    /// No regular node was usable and no fallback is configured.
    Exhausted,
}

impl Selection {
    pub fn node(&self) -> Option<&Arc<Node>> {
        match self {
            Selection::Node(node) | Selection::Fallback(node) => Some(node),
            Selection::Exhausted => None,
        }
    }

    /// `true` for both `Fallback` and `Exhausted`.
    pub fn is_fallback(&self) -> bool {
        !matches!(self, Selection::Node(_))
    }
}

/// Scans `nodes` in the order given (ascending registration index).
pub(crate) fn failover<'a, I, F>(nodes: I, usable: F) -> Option<Arc<Node>>
where
    I: IntoIterator<Item = &'a Arc<Node>>,
    F: Fn(&Node) -> bool,
{
    nodes.into_iter().find(|node| usable(node)).cloned()
}

/// Rotates the cursor once per call, at most once per node.
///
/// Every inspected node goes back to the tail, usable or not, so the ring
/// keeps exactly one entry per node. The caller holds the structural write
/// lock, which makes each pop+push atomic with respect to other selectors.
pub(crate) fn round_robin<F>(rotation: &mut VecDeque<Arc<Node>>, usable: F) -> Option<Arc<Node>>
where
    F: Fn(&Node) -> bool,
{
    for _ in 0..rotation.len() {
        let node = rotation.pop_front()?;
        rotation.push_back(node.clone());
        if usable(&node) {
            return Some(node);
        }
    }
    None
}

/// Shuffles an index permutation per call and scans it.
pub(crate) fn random<F>(nodes: &[&Arc<Node>], usable: F) -> Option<Arc<Node>>
where
    F: Fn(&Node) -> bool,
{
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.shuffle(&mut thread_rng());
    order
        .into_iter()
        .map(|i| nodes[i])
        .find(|node| usable(node))
        .cloned()
}
