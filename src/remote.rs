//! Topology of a different ("remote") cluster used for disaster-recovery
//! replication.
//!
//! [`PeerBootstrap`] probes a few seed endpoints of the remote cluster,
//! folds in what their responses gossip about the other remote nodes and
//! ranks the nodes whose ranges overlap the local node. The outcome is an
//! immutable [`RemoteCluster`] snapshot that [`RemoteClusterTracker`]
//! publishes for the synchronization loop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keyspace::{KeyRange, KeySpace};
use crate::topology::{NodeAddr, NodeTopology};

pub mod aggregator;
pub mod bootstrap;
pub mod clock;
pub mod fetcher;
pub mod tracker;

pub use aggregator::{ProbeResponse, RemoteClusterAggregator};
pub use bootstrap::{BootstrapConfig, PeerBootstrap, resolve_seeds};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fetcher::{FetchError, StatusFetcher};
pub use tracker::RemoteClusterTracker;

/// State of one node as reported over the wire.
///
/// Fields this version does not know about are kept in `unrecognized` so a
/// parse/serialize round trip does not lose them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub address: NodeAddr,
    pub active_range: KeyRange,
    pub passive_range: KeyRange,
    #[serde(default)]
    pub disabled: bool,
    /// Epoch millis of the last change to this node's state.
    pub last_updated: u64,
    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, Value>,
}

impl NodeState {
    pub fn new(
        address: NodeAddr,
        active_range: KeyRange,
        passive_range: KeyRange,
        last_updated: u64,
    ) -> NodeState {
        NodeState {
            address,
            active_range,
            passive_range,
            disabled: false,
            last_updated,
            unrecognized: BTreeMap::new(),
        }
    }

    /// Whether both ranges belong to `keyspace`.
    pub fn is_in(&self, keyspace: KeySpace) -> bool {
        self.active_range.keyspace() == keyspace && self.passive_range.keyspace() == keyspace
    }
}

/// Response of a node's cluster status endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// The responding node itself.
    pub local: NodeState,
    /// Version (epoch millis) of the cluster-wide information the node has.
    pub cluster_last_updated: u64,
    /// Nodes of the responder's own cluster; used as gossip.
    #[serde(default)]
    pub local_peers: Vec<NodeState>,
    /// Nodes the responder knows in *other* clusters. Never used as gossip:
    /// from our side these may well be our own nodes.
    #[serde(default)]
    pub remote_peers: Vec<NodeState>,
    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, Value>,
}

impl ClusterStatus {
    pub fn new(local: NodeState, cluster_last_updated: u64) -> ClusterStatus {
        ClusterStatus {
            local,
            cluster_last_updated,
            local_peers: vec![],
            remote_peers: vec![],
            unrecognized: BTreeMap::new(),
        }
    }
}

/// What we know about one node of the remote cluster, plus when we learned it.
///
/// All timestamps are epoch millis; zero means "never".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteClusterNode {
    topology: NodeTopology,
    last_request_sent: u64,
    last_response_received: u64,
    last_node_update_fetched: u64,
    last_cluster_update_fetched: u64,
    last_cluster_update_available: u64,
}

impl RemoteClusterNode {
    pub fn new(address: NodeAddr, active: KeyRange, passive: KeyRange) -> RemoteClusterNode {
        RemoteClusterNode {
            topology: NodeTopology::new(address, active, passive),
            last_request_sent: 0,
            last_response_received: 0,
            last_node_update_fetched: 0,
            last_cluster_update_fetched: 0,
            last_cluster_update_available: 0,
        }
    }

    pub fn address(&self) -> &NodeAddr {
        self.topology.address()
    }

    pub fn topology(&self) -> &NodeTopology {
        &self.topology
    }

    pub fn active_range(&self) -> &KeyRange {
        self.topology.active_range()
    }

    pub fn passive_range(&self) -> &KeyRange {
        self.topology.passive_range()
    }

    pub fn total_range(&self) -> &KeyRange {
        self.topology.total_range()
    }

    /// Returns `true` if the ranges actually changed.
    pub fn update_ranges(&mut self, active: KeyRange, passive: KeyRange) -> bool {
        self.topology.update_ranges(active, passive)
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.topology.set_disabled(disabled);
    }

    pub fn last_request_sent(&self) -> u64 {
        self.last_request_sent
    }

    pub fn last_response_received(&self) -> u64 {
        self.last_response_received
    }

    /// Freshest timestamp of this node's own state, direct or gossiped.
    pub fn last_node_update_fetched(&self) -> u64 {
        self.last_node_update_fetched
    }

    pub fn last_cluster_update_fetched(&self) -> u64 {
        self.last_cluster_update_fetched
    }

    pub fn last_cluster_update_available(&self) -> u64 {
        self.last_cluster_update_available
    }

    pub fn set_last_request_sent(&mut self, timestamp: u64) {
        self.last_request_sent = timestamp;
    }

    pub fn set_last_response_received(&mut self, timestamp: u64) {
        self.last_response_received = timestamp;
    }

    pub fn set_last_node_update_fetched(&mut self, timestamp: u64) {
        self.last_node_update_fetched = timestamp;
    }

    pub fn set_last_cluster_update_fetched(&mut self, timestamp: u64) {
        self.last_cluster_update_fetched = timestamp;
    }

    pub fn set_last_cluster_update_available(&mut self, timestamp: u64) {
        self.last_cluster_update_available = timestamp;
    }
}

/// Ranked view of the remote cluster from the local node's point of view.
///
/// Never modified after creation; a refresh produces a new instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteCluster {
    valid_until: u64,
    local: NodeTopology,
    remote_nodes: Vec<RemoteClusterNode>,
}

impl RemoteCluster {
    pub fn new(
        valid_until: u64,
        local: NodeTopology,
        remote_nodes: Vec<RemoteClusterNode>,
    ) -> RemoteCluster {
        RemoteCluster {
            valid_until,
            local,
            remote_nodes,
        }
    }

    pub fn valid_until(&self) -> u64 {
        self.valid_until
    }

    /// Whether the snapshot may still be used at `now` (epoch millis).
    pub fn is_still_valid(&self, now: u64) -> bool {
        now < self.valid_until
    }

    pub fn local(&self) -> &NodeTopology {
        &self.local
    }

    /// Overlapping remote nodes, most preferred peer first.
    pub fn remote_nodes(&self) -> &[RemoteClusterNode] {
        &self.remote_nodes
    }

    pub fn preferred(&self) -> Option<&RemoteClusterNode> {
        self.remote_nodes.first()
    }
}
