//! Node identities, the unit the crawler scans, dedups and persists
//!
//! A node is the full `(host, port, pruning_seed, rpc_port)` tuple. The
//! bootstrap node carries no optional fields while peers learned from the
//! network carry whatever the remote advertised, so the same host:port can
//! appear under two identities. They are deliberately not merged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// On-disk form of a node: `[host, port, pruning_seed|null, rpc_port|null]`
type NodeTuple = (String, u16, Option<u32>, Option<u16>);

/// Identity of a single P2P node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "NodeTuple", into = "NodeTuple")]
pub struct NodeIdentity {
    pub host: String,
    pub port: u16,
    pub pruning_seed: Option<u32>,
    pub rpc_port: Option<u16>,
}

impl NodeIdentity {
    /// A node known only by address, such as the bootstrap node
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            pruning_seed: None,
            rpc_port: None,
        }
    }

    /// A node as advertised by a peer
    pub fn with_details(
        host: impl Into<String>,
        port: u16,
        pruning_seed: Option<u32>,
        rpc_port: Option<u16>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            pruning_seed,
            rpc_port,
        }
    }
}

impl From<NodeTuple> for NodeIdentity {
    fn from((host, port, pruning_seed, rpc_port): NodeTuple) -> Self {
        Self {
            host,
            port,
            pruning_seed,
            rpc_port,
        }
    }
}

impl From<NodeIdentity> for NodeTuple {
    fn from(node: NodeIdentity) -> Self {
        (node.host, node.port, node.pruning_seed, node.rpc_port)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_serializes_as_four_element_array() {
        let node = NodeIdentity::new("10.0.0.1", 18080);
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, r#"["10.0.0.1",18080,null,null]"#);

        let peer = NodeIdentity::with_details("10.0.0.2", 18080, Some(385), Some(18089));
        let json = serde_json::to_string(&peer).unwrap();
        assert_eq!(json, r#"["10.0.0.2",18080,385,18089]"#);
    }

    #[test]
    fn test_deserializes_from_array() {
        let node: NodeIdentity = serde_json::from_str(r#"["1.2.3.4",28080,null,18081]"#).unwrap();
        assert_eq!(node.host, "1.2.3.4");
        assert_eq!(node.port, 28080);
        assert_eq!(node.pruning_seed, None);
        assert_eq!(node.rpc_port, Some(18081));
    }

    #[test]
    fn test_rejects_wrong_shape() {
        assert!(serde_json::from_str::<NodeIdentity>(r#"["1.2.3.4",28080]"#).is_err());
        assert!(serde_json::from_str::<NodeIdentity>(r#"["1.2.3.4",70000,null,null]"#).is_err());
        assert!(serde_json::from_str::<NodeIdentity>(r#"{"host":"1.2.3.4"}"#).is_err());
    }

    #[test]
    fn test_optional_fields_make_distinct_identities() {
        let bootstrap = NodeIdentity::new("176.9.0.187", 18080);
        let advertised = NodeIdentity::with_details("176.9.0.187", 18080, Some(0), None);
        assert_ne!(bootstrap, advertised);

        let set: HashSet<_> = [bootstrap.clone(), advertised, bootstrap].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display_is_host_port() {
        let node = NodeIdentity::with_details("example.org", 18080, Some(1), Some(2));
        assert_eq!(node.to_string(), "example.org:18080");
    }
}
