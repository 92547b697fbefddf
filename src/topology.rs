//! Per-node coverage of the ring.

use std::borrow::Borrow;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};
use crate::keyspace::KeyRange;

/// Network address identifying a node.
///
/// Ordering compares the host as a string, then the port as a number, so
/// `h:9090` sorts before `h:10000`. It is used wherever a deterministic
/// tie-break between nodes is needed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddr {
    host: String,
    port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> NodeAddr {
        NodeAddr {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the host only makes sense from the node's own point of view
    /// (`localhost`, a loopback or an unspecified address).
    pub fn is_local_reference(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        match self.host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
            Err(_) => false,
        }
    }

    /// Same port, different host.
    pub fn with_host(&self, host: &str) -> NodeAddr {
        NodeAddr::new(host, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TopologyError::InvalidAddress(s.to_string());
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(NodeAddr::new(host, port))
    }
}

impl TryFrom<String> for NodeAddr {
    type Error = TopologyError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<NodeAddr> for String {
    fn from(addr: NodeAddr) -> String {
        addr.to_string()
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Coverage of one cluster member.
///
/// `active` is the arc the node serves as primary owner, `passive` the arc
/// it holds as backup. `total` is always `active ∪ passive` and is
/// re-derived whenever either range changes.
///
/// Instances are treated as immutable snapshots by readers; publishers build
/// a modified copy ([`with_ranges`](Self::with_ranges),
/// [`with_disabled`](Self::with_disabled)) and swap it in.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(try_from = "NodeTopologyRepr", into = "NodeTopologyRepr")]
pub struct NodeTopology {
    address: NodeAddr,
    active: KeyRange,
    passive: KeyRange,
    total: KeyRange,
    disabled: bool,
}

impl NodeTopology {
    /// # Panics
    ///
    /// If `active` and `passive` belong to different key spaces.
    pub fn new(address: NodeAddr, active: KeyRange, passive: KeyRange) -> NodeTopology {
        NodeTopology {
            address,
            active,
            passive,
            total: active.union(&passive),
            disabled: false,
        }
    }

    pub fn address(&self) -> &NodeAddr {
        &self.address
    }

    pub fn active_range(&self) -> &KeyRange {
        &self.active
    }

    pub fn passive_range(&self) -> &KeyRange {
        &self.passive
    }

    pub fn total_range(&self) -> &KeyRange {
        &self.total
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Replace both ranges; returns `true` if anything changed.
    pub fn update_ranges(&mut self, active: KeyRange, passive: KeyRange) -> bool {
        if self.active == active && self.passive == passive {
            return false;
        }
        self.active = active;
        self.passive = passive;
        self.total = active.union(&passive);
        true
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn with_ranges(&self, active: KeyRange, passive: KeyRange) -> NodeTopology {
        let mut copy = self.clone();
        copy.update_ranges(active, passive);
        copy
    }

    pub fn with_disabled(&self, disabled: bool) -> NodeTopology {
        NodeTopology {
            disabled,
            ..self.clone()
        }
    }
}

/// Views anything borrowing a [`NodeTopology`] (owned, `&`, `Arc`) as one.
pub(crate) fn topology_of<T: Borrow<NodeTopology>>(node: &T) -> &NodeTopology {
    <T as Borrow<NodeTopology>>::borrow(node)
}

impl fmt::Display for NodeTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} active={} passive={}{}",
            self.address,
            self.active,
            self.passive,
            if self.disabled { " (disabled)" } else { "" }
        )
    }
}

// `total` is derived, so it is not trusted from the wire.
#[derive(Serialize, Deserialize)]
struct NodeTopologyRepr {
    address: NodeAddr,
    active: KeyRange,
    passive: KeyRange,
    #[serde(default)]
    disabled: bool,
}

impl TryFrom<NodeTopologyRepr> for NodeTopology {
    type Error = TopologyError;

    fn try_from(repr: NodeTopologyRepr) -> Result<Self> {
        let expected = repr.active.keyspace();
        let actual = repr.passive.keyspace();
        if expected != actual {
            return Err(TopologyError::KeyspaceMismatch {
                expected: expected.length(),
                actual: actual.length(),
            });
        }
        let mut node = NodeTopology::new(repr.address, repr.active, repr.passive);
        node.disabled = repr.disabled;
        Ok(node)
    }
}

impl From<NodeTopology> for NodeTopologyRepr {
    fn from(node: NodeTopology) -> Self {
        NodeTopologyRepr {
            address: node.address,
            active: node.active,
            passive: node.passive,
            disabled: node.disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::KeySpace;
    use pretty_assertions::assert_eq;

    fn ks() -> KeySpace {
        KeySpace::new(360).unwrap()
    }

    #[test]
    fn parse_addresses() {
        let addr: NodeAddr = "10.0.0.1:9090".parse().unwrap();
        assert_eq!(addr, NodeAddr::new("10.0.0.1", 9090));
        assert_eq!(addr.to_string(), "10.0.0.1:9090");

        let v6: NodeAddr = "[::1]:7000".parse().unwrap();
        assert_eq!(v6.host(), "[::1]");
        assert!(v6.is_local_reference());

        assert!("no-port".parse::<NodeAddr>().is_err());
        assert!(":80".parse::<NodeAddr>().is_err());
        assert!("host:99999".parse::<NodeAddr>().is_err());
    }

    #[test]
    fn ordering_is_host_then_numeric_port() {
        let mut addrs = vec![
            NodeAddr::new("h", 10000),
            NodeAddr::new("b", 1),
            NodeAddr::new("h", 9090),
        ];
        addrs.sort();
        assert_eq!(
            addrs,
            vec![
                NodeAddr::new("b", 1),
                NodeAddr::new("h", 9090),
                NodeAddr::new("h", 10000),
            ]
        );
    }

    #[test]
    fn local_references() {
        assert!(NodeAddr::new("localhost", 1).is_local_reference());
        assert!(NodeAddr::new("127.0.0.1", 1).is_local_reference());
        assert!(NodeAddr::new("0.0.0.0", 1).is_local_reference());
        assert!(!NodeAddr::new("10.1.2.3", 1).is_local_reference());
        assert!(!NodeAddr::new("db-3.example.org", 1).is_local_reference());
    }

    #[test]
    fn total_range_is_union() {
        let node = NodeTopology::new(
            NodeAddr::new("a", 1),
            ks().range(30, 60),
            ks().range(0, 120),
        );
        assert_eq!(*node.total_range(), ks().range(0, 120));
        assert!(node.total_range().contains_range(node.active_range()));
        assert!(node.total_range().contains_range(node.passive_range()));
    }

    #[test]
    fn update_ranges_rederives_total() {
        let mut node = NodeTopology::new(
            NodeAddr::new("a", 1),
            ks().range(0, 60),
            ks().range(0, 60),
        );
        assert!(!node.update_ranges(ks().range(0, 60), ks().range(0, 60)));
        assert!(node.update_ranges(ks().range(0, 60), ks().range(330, 60)));
        assert_eq!(*node.total_range(), ks().range(330, 90));
    }

    #[test]
    fn copies_leave_original_untouched() {
        let node = NodeTopology::new(
            NodeAddr::new("a", 1),
            ks().range(0, 60),
            ks().range(0, 60),
        );
        let disabled = node.with_disabled(true);
        assert!(!node.is_disabled());
        assert!(disabled.is_disabled());

        let grown = node.with_ranges(ks().range(0, 60), ks().range(0, 90));
        assert_eq!(node.total_range().length(), 60);
        assert_eq!(grown.total_range().length(), 90);
    }

    #[test]
    fn serde_rederives_total() {
        let json = r#"{"address":"h:1","active":{"keyspace":360,"start":30,"length":60},"passive":{"keyspace":360,"start":0,"length":120}}"#;
        let node: NodeTopology = serde_json::from_str(json).unwrap();
        assert_eq!(*node.total_range(), ks().range(0, 120));
        assert!(!node.is_disabled());
    }

    #[test]
    fn serde_rejects_mixed_key_spaces() {
        let json = r#"{"address":"h:1","active":{"keyspace":360,"start":0,"length":60},"passive":{"keyspace":1024,"start":0,"length":120}}"#;
        let err = serde_json::from_str::<NodeTopology>(json).unwrap_err();
        assert!(err.to_string().contains("key space mismatch"), "{err}");
    }
}
