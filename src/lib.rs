//! Topology layer of a replicated key/value cluster.
//!
//! Entry keys are hashed onto a fixed-size ring (`[0, N)`). Every node owns an
//! active arc of the ring, which it serves as primary, and a passive arc,
//! which it holds as backup. From that this crate answers:
//!
//! - which nodes hold a key, most preferred first ([`ReplicaSelector`]),
//!     enabled nodes before disabled ones
//! - how much of the ring is covered at all, and where the gaps are ([`coverage`])
//! - which node of a *remote* cluster the local node should synchronize with
//!     ([`remote::PeerBootstrap`], [`remote::RemoteClusterTracker`])
//!
//! Ring math, coverage and selection are pure functions over immutable
//! snapshots and can be called from any number of threads. The local node
//! set lives in a [`LocalCluster`], which publishes a new snapshot on every
//! change.
//!
//! ```
//! use ring_topology::{ClusterConfig, KeySpace, LocalCluster, NodeAddr, NodeTopology};
//!
//! let ring = KeySpace::new(360).unwrap();
//! let cluster = LocalCluster::new(ring, ClusterConfig::default());
//! cluster.update(vec![
//!     NodeTopology::new(NodeAddr::new("10.0.0.1", 9090), ring.range(0, 120), ring.range(0, 120)),
//!     NodeTopology::new(NodeAddr::new("10.0.0.2", 9090), ring.range(90, 60), ring.range(90, 60)),
//! ]);
//!
//! let replicas = cluster.replicas_for_hash(100);
//! assert_eq!(replicas.nodes[0].address().host(), "10.0.0.2");
//! assert_eq!(cluster.coverage(), 150);
//! ```

pub mod cluster;
pub mod coverage;
pub mod error;
pub mod keyspace;
pub mod remote;
pub mod selector;
pub mod shutdown;
pub mod topology;

pub use cluster::{ClusterConfig, LocalCluster, NodeSnapshot};
pub use error::TopologyError;
pub use keyspace::{DefaultHashBuilder, KeyRange, KeySpace};
pub use remote::{RemoteCluster, RemoteClusterNode};
pub use selector::{ReplicaSelector, Replicas};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use topology::{NodeAddr, NodeTopology};
