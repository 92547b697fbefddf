//! Folding probe responses into one view of the remote cluster.
//!
//! One aggregator belongs to exactly one bootstrap round and is only touched
//! by that round, so updates are applied one at a time without locking. The
//! ordering guarantee between direct and gossiped data comes from the
//! timestamp rule in [`RemoteClusterAggregator::apply_indirect`].

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use super::fetcher::FetchError;
use super::{ClusterStatus, NodeState, RemoteCluster, RemoteClusterNode};
use crate::keyspace::{KeyRange, KeySpace};
use crate::topology::{NodeAddr, NodeTopology};

/// A successful status probe together with its timing.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResponse {
    pub status: ClusterStatus,
    pub request_sent: u64,
    pub response_received: u64,
}

#[derive(Debug)]
pub struct RemoteClusterAggregator {
    keyspace: KeySpace,
    nodes: HashMap<NodeAddr, RemoteClusterNode>,
}

impl RemoteClusterAggregator {
    pub fn new(keyspace: KeySpace) -> RemoteClusterAggregator {
        RemoteClusterAggregator {
            keyspace,
            nodes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, address: &NodeAddr) -> Option<&RemoteClusterNode> {
        self.nodes.get(address)
    }

    /// Apply everything a probe of `endpoint` returned: the responder's own
    /// state as a direct update, then its local peers as gossip.
    ///
    /// A response describing a different key space is rejected as a whole
    /// and nothing is applied.
    pub fn apply_response(
        &mut self,
        endpoint: &NodeAddr,
        response: ProbeResponse,
    ) -> Result<(), FetchError> {
        let ProbeResponse {
            status,
            request_sent,
            response_received,
        } = response;

        if !status.local.is_in(self.keyspace) {
            return Err(FetchError::Malformed(format!(
                "node {} reports ranges outside key space {}",
                status.local.address, self.keyspace
            )));
        }

        self.apply_direct(endpoint, &status, request_sent, response_received);
        for peer in &status.local_peers {
            self.apply_indirect(endpoint, peer);
        }
        Ok(())
    }

    /// Record what a node said about itself. Direct data is authoritative
    /// and always overwrites what is stored.
    ///
    /// # Panics
    ///
    /// If the status uses a different key space, see
    /// [`apply_response`](Self::apply_response) for the checked variant.
    pub fn apply_direct(
        &mut self,
        endpoint: &NodeAddr,
        status: &ClusterStatus,
        request_sent: u64,
        response_received: u64,
    ) {
        let state = &status.local;
        let address = resolve_address(&state.address, endpoint);
        let node = self.nodes.entry(address).or_insert_with_key(|address| {
            RemoteClusterNode::new(address.clone(), state.active_range, state.passive_range)
        });

        if node.update_ranges(state.active_range, state.passive_range) {
            debug!(
                node = %node.address(),
                total = %node.total_range(),
                "remote node ranges changed"
            );
        }
        node.set_disabled(state.disabled);
        node.set_last_request_sent(request_sent);
        node.set_last_response_received(response_received);
        node.set_last_node_update_fetched(state.last_updated);
        node.set_last_cluster_update_fetched(status.cluster_last_updated);
        node.set_last_cluster_update_available(
            node.last_cluster_update_available()
                .max(status.cluster_last_updated),
        );
    }

    /// Record what `prober` said about one of its cluster peers.
    ///
    /// Only applied when the gossiped timestamp is strictly newer than what
    /// is stored for that node; returns whether it was applied. Entries
    /// from a different key space are skipped.
    pub fn apply_indirect(&mut self, prober: &NodeAddr, peer: &NodeState) -> bool {
        if !peer.is_in(self.keyspace) {
            debug!(
                peer = %peer.address,
                via = %prober,
                "skipping gossip from a different key space"
            );
            return false;
        }

        let address = resolve_address(&peer.address, prober);
        match self.nodes.get_mut(&address) {
            Some(node) if peer.last_updated <= node.last_node_update_fetched() => {
                debug!(
                    node = %address,
                    via = %prober,
                    gossiped = peer.last_updated,
                    stored = node.last_node_update_fetched(),
                    "ignoring stale gossip"
                );
                false
            }
            Some(node) => {
                node.update_ranges(peer.active_range, peer.passive_range);
                node.set_disabled(peer.disabled);
                node.set_last_node_update_fetched(peer.last_updated);
                true
            }
            None => {
                let mut node =
                    RemoteClusterNode::new(address.clone(), peer.active_range, peer.passive_range);
                node.set_disabled(peer.disabled);
                node.set_last_node_update_fetched(peer.last_updated);
                debug!(node = %address, via = %prober, "discovered remote node through gossip");
                self.nodes.insert(address, node);
                true
            }
        }
    }

    /// Keep the nodes overlapping `local` and rank them, most preferred
    /// first. `None` when nothing overlaps, which is a normal state while
    /// the clusters do not share any part of the key space yet.
    pub fn into_remote_cluster(
        self,
        local: &NodeTopology,
        valid_until: u64,
    ) -> Option<RemoteCluster> {
        let local_total = *local.total_range();
        let mut overlapping: Vec<RemoteClusterNode> = self
            .nodes
            .into_values()
            .filter(|node| node.total_range().overlaps(&local_total))
            .collect();

        if overlapping.is_empty() {
            return None;
        }

        overlapping.sort_by(|a, b| compare_candidates(&local_total, a, b));
        Some(RemoteCluster::new(valid_until, local.clone(), overlapping))
    }
}

/// Preference order of remote peers for a local node with range `local`:
///
/// 1. a peer whose total range equals `local` exactly,
/// 2. smaller clockwise distance from `local`'s start to the peer's start,
/// 3. smaller total range,
/// 4. address.
pub fn compare_candidates(
    local: &KeyRange,
    a: &RemoteClusterNode,
    b: &RemoteClusterNode,
) -> Ordering {
    let exact_a = a.total_range() == local;
    let exact_b = b.total_range() == local;

    exact_b
        .cmp(&exact_a)
        .then_with(|| {
            local
                .clockwise_distance(a.total_range())
                .cmp(&local.clockwise_distance(b.total_range()))
        })
        .then_with(|| a.total_range().length().cmp(&b.total_range().length()))
        .then_with(|| a.address().cmp(b.address()))
}

/// A node calling itself `localhost` (or similar) lives on the host we
/// reached it through.
fn resolve_address(reported: &NodeAddr, via: &NodeAddr) -> NodeAddr {
    if reported.is_local_reference() {
        reported.with_host(via.host())
    } else {
        reported.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ks() -> KeySpace {
        KeySpace::new(360).unwrap()
    }

    fn state(host: &str, start: u32, length: u32, last_updated: u64) -> NodeState {
        let range = ks().range(start, length);
        NodeState::new(NodeAddr::new(host, 9090), range, range, last_updated)
    }

    fn probe(status: ClusterStatus) -> ProbeResponse {
        ProbeResponse {
            status,
            request_sent: 100,
            response_received: 110,
        }
    }

    fn remote(host: &str, start: u32, length: u32) -> RemoteClusterNode {
        let range = ks().range(start, length);
        RemoteClusterNode::new(NodeAddr::new(host, 9090), range, range)
    }

    #[test]
    fn direct_update_records_timestamps() {
        let mut agg = RemoteClusterAggregator::new(ks());
        let endpoint = NodeAddr::new("r1", 9090);
        agg.apply_response(&endpoint, probe(ClusterStatus::new(state("r1", 0, 90, 50), 70)))
            .unwrap();

        let node = agg.get(&endpoint).unwrap();
        assert_eq!(node.last_request_sent(), 100);
        assert_eq!(node.last_response_received(), 110);
        assert_eq!(node.last_node_update_fetched(), 50);
        assert_eq!(node.last_cluster_update_fetched(), 70);
        assert_eq!(node.last_cluster_update_available(), 70);
    }

    #[test]
    fn direct_update_overwrites_newer_gossip() {
        let mut agg = RemoteClusterAggregator::new(ks());
        let r1 = NodeAddr::new("r1", 9090);
        let r2 = NodeAddr::new("r2", 9090);

        assert!(agg.apply_indirect(&r1, &state("r2", 0, 180, 500)));
        agg.apply_direct(&r2, &ClusterStatus::new(state("r2", 0, 90, 400), 1), 1, 2);

        let node = agg.get(&r2).unwrap();
        assert_eq!(*node.total_range(), ks().range(0, 90));
        assert_eq!(node.last_node_update_fetched(), 400);
    }

    #[test]
    fn stale_gossip_is_ignored() {
        let mut agg = RemoteClusterAggregator::new(ks());
        let r1 = NodeAddr::new("r1", 9090);
        let r2 = NodeAddr::new("r2", 9090);
        agg.apply_direct(&r2, &ClusterStatus::new(state("r2", 0, 90, 400), 1), 1, 2);

        assert!(!agg.apply_indirect(&r1, &state("r2", 0, 180, 300)));
        assert!(!agg.apply_indirect(&r1, &state("r2", 0, 180, 400)));
        assert_eq!(*agg.get(&r2).unwrap().total_range(), ks().range(0, 90));

        assert!(agg.apply_indirect(&r1, &state("r2", 0, 180, 401)));
        assert_eq!(*agg.get(&r2).unwrap().total_range(), ks().range(0, 180));
    }

    #[test]
    fn local_references_resolve_to_prober_host() {
        let mut agg = RemoteClusterAggregator::new(ks());
        let prober = NodeAddr::new("10.2.0.7", 9090);
        let mut peer = state("localhost", 90, 90, 10);
        peer.address = NodeAddr::new("localhost", 9191);

        assert!(agg.apply_indirect(&prober, &peer));
        assert!(agg.get(&NodeAddr::new("10.2.0.7", 9191)).is_some());
        assert!(agg.get(&NodeAddr::new("localhost", 9191)).is_none());
    }

    #[test]
    fn remote_peers_are_not_gossip() {
        let mut agg = RemoteClusterAggregator::new(ks());
        let endpoint = NodeAddr::new("r1", 9090);
        let mut status = ClusterStatus::new(state("r1", 0, 90, 1), 1);
        status.local_peers.push(state("r2", 90, 90, 1));
        status.remote_peers.push(state("ours", 0, 360, 1));

        agg.apply_response(&endpoint, probe(status)).unwrap();
        assert_eq!(agg.len(), 2);
        assert!(agg.get(&NodeAddr::new("ours", 9090)).is_none());
    }

    #[test]
    fn foreign_key_space_is_malformed() {
        let mut agg = RemoteClusterAggregator::new(ks());
        let other = KeySpace::new(1024).unwrap().range(0, 10);
        let status = ClusterStatus::new(NodeState::new(NodeAddr::new("r1", 1), other, other, 1), 1);

        let result = agg.apply_response(&NodeAddr::new("r1", 1), probe(status));
        assert!(matches!(result, Err(FetchError::Malformed(_))));
        assert!(agg.is_empty());
    }

    #[test]
    fn exact_match_ranks_first() {
        let local_range = ks().range(90, 90);
        let local = NodeTopology::new(NodeAddr::new("local", 1), local_range, local_range);

        let mut agg = RemoteClusterAggregator::new(ks());
        let via = NodeAddr::new("seed", 9090);
        agg.apply_indirect(&via, &state("starts-right-here", 90, 60, 1));
        agg.apply_indirect(&via, &state("exact", 90, 90, 1));
        agg.apply_indirect(&via, &state("before", 60, 60, 1));
        agg.apply_indirect(&via, &state("disjoint", 200, 100, 1));

        let cluster = agg.into_remote_cluster(&local, 5_000).unwrap();
        let hosts: Vec<&str> = cluster
            .remote_nodes()
            .iter()
            .map(|n| n.address().host())
            .collect();
        assert_eq!(hosts, vec!["exact", "starts-right-here", "before"]);
        assert_eq!(cluster.valid_until(), 5_000);
        assert_eq!(cluster.local(), &local);
    }

    #[test]
    fn ranking_tie_breakers() {
        let local = ks().range(0, 120);
        // same clockwise distance: smaller range first
        assert_eq!(
            compare_candidates(&local, &remote("a", 30, 60), &remote("b", 30, 90)),
            Ordering::Less
        );
        // same distance and length: address decides
        assert_eq!(
            compare_candidates(&local, &remote("b", 30, 60), &remote("a", 30, 60)),
            Ordering::Greater
        );
        // distance beats length
        assert_eq!(
            compare_candidates(&local, &remote("a", 10, 300), &remote("b", 30, 10)),
            Ordering::Less
        );
        // exact match beats distance 0
        assert_eq!(
            compare_candidates(&local, &remote("z", 0, 60), &remote("y", 0, 120)),
            Ordering::Greater
        );
    }

    #[test]
    fn nothing_overlapping() {
        let local_range = ks().range(0, 90);
        let local = NodeTopology::new(NodeAddr::new("local", 1), local_range, local_range);
        let mut agg = RemoteClusterAggregator::new(ks());
        agg.apply_indirect(&NodeAddr::new("seed", 1), &state("far", 180, 90, 1));
        assert!(agg.into_remote_cluster(&local, 1).is_none());
    }
}
