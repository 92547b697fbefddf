//! Ordering of the nodes that hold a key.
//!
//! Client-side routing and server-side replica fan-out must both go through
//! [`ReplicaSelector::select`] so that they agree on who the primary is.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::hash::Hash;

use crate::keyspace::KeySpace;
use crate::topology::{NodeTopology, topology_of};

/// Nodes holding a ring position, most preferred first.
///
/// An empty list is not an error: it means the ring has a coverage gap at
/// `position` and the caller decides whether that is fatal.
#[derive(Clone, Debug, PartialEq)]
pub struct Replicas<T> {
    pub position: u32,
    pub nodes: Vec<T>,
}

impl<T> Replicas<T>
where
    T: Borrow<NodeTopology>,
{
    /// The node that should serve the request first.
    pub fn primary(&self) -> Option<&T> {
        self.nodes.first()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of enabled nodes holding the position.
    pub fn enabled_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !topology_of(*n).is_disabled())
            .count()
    }

    /// Whether fewer enabled nodes than `replication_factor` hold the
    /// position. The selection itself is never truncated to the factor.
    pub fn is_under_replicated(&self, replication_factor: usize) -> bool {
        self.enabled_count() < replication_factor
    }
}

/// Picks and orders the nodes whose total range covers a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplicaSelector {
    keyspace: KeySpace,
}

impl ReplicaSelector {
    pub fn new(keyspace: KeySpace) -> ReplicaSelector {
        ReplicaSelector { keyspace }
    }

    pub fn keyspace(&self) -> KeySpace {
        self.keyspace
    }

    /// Hash `key` onto the ring and select the nodes holding it.
    pub fn select_key<K, I, T>(&self, key: &K, nodes: I) -> Replicas<T>
    where
        K: Hash + ?Sized,
        I: IntoIterator<Item = T>,
        T: Borrow<NodeTopology>,
    {
        let position = self.keyspace.hash(key);
        Replicas {
            position,
            nodes: self.select(position, nodes),
        }
    }

    /// Nodes whose total range contains `key_hash`, most preferred first.
    ///
    /// Enabled nodes always come before disabled ones. Within each group a
    /// node is preferred the closer `key_hash` lies to the start of its
    /// active range: that node owns the key as primary, while nodes for
    /// which the key sits deep inside their range mostly hold it as a
    /// passive copy. Remaining ties are broken by address, so the result
    /// does not depend on input order.
    ///
    /// # Panics
    ///
    /// If a node's ranges belong to a different key space.
    pub fn select<I, T>(&self, key_hash: u32, nodes: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
        T: Borrow<NodeTopology>,
    {
        let mut matching: Vec<(u32, T)> = nodes
            .into_iter()
            .filter(|node| {
                let total = topology_of(node).total_range();
                assert_eq!(
                    total.keyspace(),
                    self.keyspace,
                    "node {} belongs to a different key space",
                    topology_of(node).address()
                );
                total.contains(key_hash)
            })
            .map(|node| {
                let distance = self
                    .keyspace
                    .clockwise(topology_of(&node).active_range().start(), key_hash);
                (distance, node)
            })
            .collect();

        matching.sort_by(|(d1, a), (d2, b)| {
            preference(*d1, topology_of(a), *d2, topology_of(b))
        });
        matching.into_iter().map(|(_, node)| node).collect()
    }
}

fn preference(d1: u32, a: &NodeTopology, d2: u32, b: &NodeTopology) -> Ordering {
    a.is_disabled()
        .cmp(&b.is_disabled())
        .then(d1.cmp(&d2))
        .then_with(|| a.address().cmp(b.address()))
}
