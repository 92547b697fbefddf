//! Registry of the local cluster's nodes.
//!
//! The node set is published as an immutable snapshot; every change builds a
//! new snapshot and swaps it in, so request threads can route against it
//! without holding a lock while they select replicas.

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coverage;
use crate::keyspace::{KeyRange, KeySpace};
use crate::selector::{ReplicaSelector, Replicas};
use crate::topology::{NodeAddr, NodeTopology};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of copies every entry should have. Advisory: replica
    /// selection never truncates its result to this number.
    pub replication_factor: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            replication_factor: 3,
        }
    }
}

pub type NodeSnapshot = Arc<[Arc<NodeTopology>]>;

/// LocalCluster keeps track of all nodes of the cluster this process belongs to
/// and answers which of them hold a given key.
pub struct LocalCluster {
    config: ClusterConfig,
    selector: ReplicaSelector,
    nodes: RwLock<NodeSnapshot>,
}

impl LocalCluster {
    pub fn new(keyspace: KeySpace, config: ClusterConfig) -> LocalCluster {
        LocalCluster {
            config,
            selector: ReplicaSelector::new(keyspace),
            nodes: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub fn keyspace(&self) -> KeySpace {
        self.selector.keyspace()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Current node set. The returned snapshot never changes underneath the
    /// caller.
    pub fn snapshot(&self) -> NodeSnapshot {
        self.nodes.read().clone()
    }

    pub fn get(&self, address: &NodeAddr) -> Option<Arc<NodeTopology>> {
        self.snapshot()
            .iter()
            .find(|n| n.address() == address)
            .cloned()
    }

    /// Replace the whole node set.
    ///
    /// # Panics
    ///
    /// If a node uses a different key space than the cluster.
    pub fn update(&self, nodes: Vec<NodeTopology>) {
        for node in &nodes {
            self.check_keyspace(node);
        }
        let snapshot: Vec<Arc<NodeTopology>> = nodes.into_iter().map(Arc::new).collect();
        info!(nodes = snapshot.len(), "replacing local cluster topology");
        *self.nodes.write() = Arc::from(snapshot);
    }

    /// Add a node, or replace the node with the same address.
    pub fn upsert(&self, node: NodeTopology) {
        self.check_keyspace(&node);
        debug!(node = %node, "publishing node topology");
        self.modify(|nodes| {
            nodes.retain(|n| n.address() != node.address());
            nodes.push(Arc::new(node));
            true
        });
    }

    /// Returns the removed node, if it was known.
    pub fn remove(&self, address: &NodeAddr) -> Option<Arc<NodeTopology>> {
        let mut removed = None;
        self.modify(|nodes| {
            if let Some(idx) = nodes.iter().position(|n| n.address() == address) {
                removed = Some(nodes.remove(idx));
            }
            removed.is_some()
        });
        if removed.is_some() {
            info!(node = %address, "node left the local cluster");
        }
        removed
    }

    /// Change the enabled state of a node. Returns `false` for unknown nodes.
    pub fn set_disabled(&self, address: &NodeAddr, disabled: bool) -> bool {
        let mut found = false;
        self.modify(|nodes| {
            if let Some(slot) = nodes.iter_mut().find(|n| n.address() == address) {
                found = true;
                if slot.is_disabled() != disabled {
                    *slot = Arc::new(slot.with_disabled(disabled));
                    return true;
                }
            }
            false
        });
        if found {
            debug!(node = %address, disabled, "node state changed");
        }
        found
    }

    /// Update the ranges of a known node. Returns `true` if they changed.
    pub fn update_ranges(&self, address: &NodeAddr, active: KeyRange, passive: KeyRange) -> bool {
        self.modify(|nodes| match nodes.iter_mut().find(|n| n.address() == address) {
            Some(slot) => {
                let updated = slot.with_ranges(active, passive);
                self.check_keyspace(&updated);
                let changed = updated != **slot;
                *slot = Arc::new(updated);
                changed
            }
            None => false,
        })
    }

    /// Nodes holding `key`, most preferred first.
    pub fn replicas<K: Hash + ?Sized>(&self, key: &K) -> Replicas<Arc<NodeTopology>> {
        let snapshot = self.snapshot();
        self.selector.select_key(key, snapshot.iter().cloned())
    }

    /// Nodes holding ring position `position`, most preferred first.
    pub fn replicas_for_hash(&self, position: u32) -> Replicas<Arc<NodeTopology>> {
        let snapshot = self.snapshot();
        Replicas {
            position,
            nodes: self.selector.select(position, snapshot.iter().cloned()),
        }
    }

    /// Whether fewer enabled nodes than the configured replication factor
    /// hold `key`.
    pub fn is_under_replicated<K: Hash + ?Sized>(&self, key: &K) -> bool {
        self.replicas(key)
            .is_under_replicated(self.config.replication_factor)
    }

    pub fn coverage(&self) -> u32 {
        coverage::coverage(self.snapshot().iter().map(|node| &**node))
    }

    pub fn gaps(&self) -> Vec<KeyRange> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return vec![self.keyspace().full_range()];
        }
        coverage::gaps(snapshot.iter().map(|node| &**node))
    }

    pub fn is_fully_covered(&self) -> bool {
        self.coverage() == self.keyspace().length()
    }

    /// Copy-on-write update; `change` returns whether it modified the list.
    fn modify<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut Vec<Arc<NodeTopology>>) -> bool,
    {
        let mut guard = self.nodes.write();
        let mut nodes = guard.to_vec();
        let changed = change(&mut nodes);
        if changed {
            *guard = Arc::from(nodes);
        }
        changed
    }

    fn check_keyspace(&self, node: &NodeTopology) {
        assert_eq!(
            node.total_range().keyspace(),
            self.keyspace(),
            "node {} does not belong to key space {}",
            node.address(),
            self.keyspace()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ks() -> KeySpace {
        KeySpace::new(360).unwrap()
    }

    fn node(host: &str, start: u32, length: u32) -> NodeTopology {
        let range = ks().range(start, length);
        NodeTopology::new(NodeAddr::new(host, 9090), range, range)
    }

    fn cluster() -> LocalCluster {
        let cluster = LocalCluster::new(ks(), ClusterConfig::default());
        cluster.update(vec![
            node("10.0.0.1", 0, 120),
            node("10.0.0.2", 90, 60),
            node("10.0.0.3", 300, 90),
        ]);
        cluster
    }

    fn hosts(replicas: &Replicas<Arc<NodeTopology>>) -> Vec<String> {
        replicas
            .nodes
            .iter()
            .map(|n| n.address().host().to_string())
            .collect()
    }

    #[test]
    fn empty_cluster() {
        let cluster = LocalCluster::new(ks(), ClusterConfig::default());
        assert!(cluster.replicas("foo").is_empty());
        assert_eq!(cluster.coverage(), 0);
        assert_eq!(cluster.gaps(), vec![ks().full_range()]);
    }

    #[test]
    fn routes_by_position() {
        let cluster = cluster();
        assert_eq!(hosts(&cluster.replicas_for_hash(100)), vec!["10.0.0.2", "10.0.0.1"]);
        assert_eq!(hosts(&cluster.replicas_for_hash(10)), vec!["10.0.0.1", "10.0.0.3"]);
        assert!(cluster.replicas_for_hash(180).is_empty());
    }

    #[test]
    fn disabling_reorders_but_keeps_node() {
        let cluster = cluster();
        let addr = NodeAddr::new("10.0.0.2", 9090);

        assert!(cluster.set_disabled(&addr, true));
        assert_eq!(hosts(&cluster.replicas_for_hash(100)), vec!["10.0.0.1", "10.0.0.2"]);

        assert!(cluster.set_disabled(&addr, false));
        assert_eq!(hosts(&cluster.replicas_for_hash(100)), vec!["10.0.0.2", "10.0.0.1"]);

        assert!(!cluster.set_disabled(&NodeAddr::new("10.9.9.9", 1), true));
    }

    #[test]
    fn snapshots_are_not_affected_by_later_changes() {
        let cluster = cluster();
        let before = cluster.snapshot();

        cluster.upsert(node("10.0.0.4", 100, 200));
        cluster.remove(&NodeAddr::new("10.0.0.1", 9090));

        assert_eq!(before.len(), 3);
        assert_eq!(cluster.snapshot().len(), 3);
        assert!(cluster.get(&NodeAddr::new("10.0.0.1", 9090)).is_none());
        assert!(cluster.get(&NodeAddr::new("10.0.0.4", 9090)).is_some());
    }

    #[test]
    fn coverage_and_gaps() {
        let cluster = cluster();
        assert_eq!(cluster.coverage(), 210);
        assert_eq!(cluster.gaps(), vec![ks().range(150, 150)]);
        assert!(!cluster.is_fully_covered());

        cluster.upsert(node("10.0.0.4", 100, 200));
        assert_eq!(cluster.coverage(), 360);
        assert!(cluster.is_fully_covered());
    }

    #[test]
    fn range_updates() {
        let cluster = cluster();
        let addr = NodeAddr::new("10.0.0.2", 9090);
        assert!(!cluster.update_ranges(&addr, ks().range(90, 60), ks().range(90, 60)));
        assert!(cluster.update_ranges(&addr, ks().range(90, 60), ks().range(90, 210)));
        assert_eq!(cluster.coverage(), 360);
    }

    #[test]
    fn under_replication_uses_config() {
        let cluster = LocalCluster::new(
            ks(),
            ClusterConfig {
                replication_factor: 2,
            },
        );
        let full = ks().full_range();
        cluster.update(vec![
            NodeTopology::new(NodeAddr::new("a", 1), full, full),
            NodeTopology::new(NodeAddr::new("b", 1), full, full),
        ]);
        assert!(!cluster.is_under_replicated("entry"));

        cluster.set_disabled(&NodeAddr::new("b", 1), true);
        assert!(cluster.is_under_replicated("entry"));
        assert_eq!(cluster.replicas("entry").nodes.len(), 2);
    }
}
