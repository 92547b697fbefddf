use pretty_assertions::assert_eq;
use serde_json::json;

use ring_topology::remote::{BootstrapConfig, ClusterStatus, NodeState};
use ring_topology::{
    ClusterConfig, KeySpace, NodeAddr, NodeTopology, RemoteCluster, RemoteClusterNode,
};

fn ks() -> KeySpace {
    KeySpace::new(360).unwrap()
}

#[test]
fn test_cluster_status_roundtrip() {
    let mut local = NodeState::new(
        NodeAddr::new("10.1.0.1", 9090),
        ks().range(300, 90),
        ks().range(270, 150),
        1_700_000_000_123,
    );
    local.disabled = true;
    let mut status = ClusterStatus::new(local, 1_700_000_000_456);
    status.local_peers.push(NodeState::new(
        NodeAddr::new("localhost", 9191),
        ks().range(0, 120),
        ks().range(0, 180),
        1_699_999_999_999,
    ));
    status.remote_peers.push(NodeState::new(
        NodeAddr::new("10.0.0.1", 9090),
        ks().full_range(),
        ks().full_range(),
        1,
    ));
    status.unrecognized.insert("version".to_string(), json!("2.4.1"));

    let serialized = serde_json::to_string(&status).expect("Serialization failed");
    let deserialized: ClusterStatus =
        serde_json::from_str(&serialized).expect("Deserialization failed");

    assert_eq!(status, deserialized);
    assert_eq!(deserialized.local.active_range.end(), 30);
    assert_eq!(deserialized.unrecognized["version"], json!("2.4.1"));
}

#[test]
fn test_remote_cluster_roundtrip() {
    let local = NodeTopology::new(NodeAddr::new("l", 9090), ks().range(0, 120), ks().range(0, 120));
    let mut peer = RemoteClusterNode::new(
        NodeAddr::new("r1", 9090),
        ks().range(330, 60),
        ks().range(300, 120),
    );
    peer.set_last_request_sent(10);
    peer.set_last_response_received(20);
    peer.set_last_node_update_fetched(30);
    peer.set_last_cluster_update_fetched(40);
    peer.set_last_cluster_update_available(50);
    let original = RemoteCluster::new(60_000, local, vec![peer]);

    let serialized = serde_json::to_string(&original).expect("Serialization failed");
    let deserialized: RemoteCluster =
        serde_json::from_str(&serialized).expect("Deserialization failed");

    assert_eq!(original, deserialized);
    let node = &deserialized.remote_nodes()[0];
    assert_eq!(*node.total_range(), ks().range(300, 120));
    assert_eq!(
        (
            node.last_request_sent(),
            node.last_response_received(),
            node.last_node_update_fetched(),
            node.last_cluster_update_fetched(),
            node.last_cluster_update_available(),
        ),
        (10, 20, 30, 40, 50)
    );
}

#[test]
fn test_invalid_ranges_are_rejected() {
    let bad = json!({
        "address": "10.1.0.1:9090",
        "active_range": {"keyspace": 360, "start": 360, "length": 10},
        "passive_range": {"keyspace": 360, "start": 0, "length": 10},
        "last_updated": 1
    });
    assert!(serde_json::from_value::<NodeState>(bad).is_err());

    let bad_address = json!({
        "address": "no-port",
        "active_range": {"keyspace": 360, "start": 0, "length": 10},
        "passive_range": {"keyspace": 360, "start": 0, "length": 10},
        "last_updated": 1
    });
    assert!(serde_json::from_value::<NodeState>(bad_address).is_err());
}

#[test]
fn test_configs_fill_defaults() {
    let cluster: ClusterConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cluster, ClusterConfig::default());
    assert_eq!(cluster.replication_factor, 3);

    let bootstrap: BootstrapConfig =
        serde_json::from_value(json!({"max_wait": {"secs": 5, "nanos": 0}})).unwrap();
    assert_eq!(bootstrap.max_wait.as_secs(), 5);
    assert_eq!(bootstrap.snapshot_ttl, BootstrapConfig::default().snapshot_ttl);
}
