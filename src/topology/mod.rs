//! Canonical cluster topology: node records, reachability, and control-plane
//! selection over a resolved snapshot.
//!
//! A topology is rebuilt from the node source on every orchestration cycle
//! and treated as read-only once constructed. Selection re-scans on every
//! call, because membership and power state can change between cycles.

pub mod resolver;

use std::fmt;

use serde::Serialize;

use crate::error::TopologyError;

/// How to open a remote session to one node.
///
/// The variant split carries the invariant directly: a direct session has no
/// proxy fields, a proxied one always has both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reachability {
    /// Connect straight to `address:port`. Also used behind a load
    /// balancer, where the NAT hop is the balancer's business.
    Direct { address: String, port: u16 },
    /// Connect to `address:port` through a jump host.
    Proxied {
        address: String,
        port: u16,
        proxy_address: String,
        proxy_port: u16,
    },
}

impl Reachability {
    /// The session target address (the private address when proxied).
    pub fn address(&self) -> &str {
        match self {
            Self::Direct { address, .. } | Self::Proxied { address, .. } => address,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Direct { port, .. } | Self::Proxied { port, .. } => *port,
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { address, port } => write!(f, "{address}:{port}"),
            Self::Proxied {
                address,
                port,
                proxy_address,
                proxy_port,
            } => write!(f, "{proxy_address}:{proxy_port}->{address}:{port}"),
        }
    }
}

/// One node of the resolved topology.
///
/// `allow_workloads` is `Some` only for control-plane nodes; workers allow
/// workloads implicitly and must not carry an explicit override (enforced
/// during resolution). The trailing identity fields are informational only.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    pub index: usize,
    pub control_plane: bool,
    pub allow_workloads: Option<bool>,
    pub running: bool,
    pub reachability: Reachability,
    pub source_group: Option<String>,
    pub vm_id: Option<String>,
    pub name: Option<String>,
    pub hostname_label: Option<String>,
    pub mac_address: Option<String>,
}

/// Where the kubeadm control-plane endpoint comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlPlaneTarget {
    /// A load balancer fronting the control plane. The live session node is
    /// re-derived by scanning the records on every selection.
    Endpoint { address: String },
    /// A fixed node whose reachability address doubles as the endpoint.
    NodeIndex { index: usize },
}

/// Result of control-plane selection: the endpoint string handed to the
/// init/join scripts, and the index of the node used for control-plane
/// sessions when one is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlane {
    pub endpoint: String,
    pub session: Option<usize>,
}

/// Resolved, invariant-checked snapshot of the whole cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterTopology {
    pub nodes: Vec<NodeRecord>,
    /// Cluster-external address, when the node source has one.
    pub public_address: Option<String>,
    /// CIDR handed to the install/init/join scripts.
    pub network_prefix: String,
    pub control_plane: ControlPlaneTarget,
    /// Whether install scripts run with the image-generalize flag
    /// (cloud-provisioned sources) or not (static hosts).
    pub generalize: bool,
}

impl ClusterTopology {
    /// Re-derives the control-plane endpoint and live session node.
    ///
    /// First running control-plane node wins the scan; there is no load
    /// preference. A statically designated node that is not running yields
    /// no session node, so dependent operations fail fast instead of
    /// attempting an unreachable target.
    pub fn select_control_plane(&self) -> Result<ControlPlane, TopologyError> {
        match &self.control_plane {
            ControlPlaneTarget::Endpoint { address } => {
                let session = self
                    .nodes
                    .iter()
                    .find(|n| n.control_plane && n.running)
                    .map(|n| n.index);
                Ok(ControlPlane {
                    endpoint: address.clone(),
                    session,
                })
            }
            ControlPlaneTarget::NodeIndex { index } => {
                let node = self.nodes.get(*index).ok_or(TopologyError::ControlPlaneIndex {
                    index: *index,
                    nodes: self.nodes.len(),
                })?;
                let session = node.running.then_some(*index);
                Ok(ControlPlane {
                    endpoint: node.reachability.address().to_string(),
                    session,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn node(index: usize, control_plane: bool, running: bool) -> NodeRecord {
        NodeRecord {
            index,
            control_plane,
            allow_workloads: control_plane.then_some(false),
            running,
            reachability: Reachability::Direct {
                address: format!("10.0.0.{}", index + 1),
                port: 22,
            },
            source_group: None,
            vm_id: None,
            name: None,
            hostname_label: None,
            mac_address: None,
        }
    }

    pub fn topology(nodes: Vec<NodeRecord>, control_plane: ControlPlaneTarget) -> ClusterTopology {
        ClusterTopology {
            nodes,
            public_address: None,
            network_prefix: "10.244.0.0/16".to_string(),
            control_plane,
            generalize: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn reachability_display() {
        let direct = Reachability::Direct {
            address: "203.0.113.10".into(),
            port: 50001,
        };
        assert_eq!(direct.to_string(), "203.0.113.10:50001");

        let proxied = Reachability::Proxied {
            address: "10.1.0.4".into(),
            port: 22,
            proxy_address: "203.0.113.10".into(),
            proxy_port: 22,
        };
        assert_eq!(proxied.to_string(), "203.0.113.10:22->10.1.0.4:22");
        assert_eq!(proxied.address(), "10.1.0.4");
        assert_eq!(proxied.port(), 22);
    }

    #[test]
    fn endpoint_mode_scans_for_first_running_control_plane() {
        // Three control-plane members, only position 1 running.
        let topo = topology(
            vec![node(0, true, false), node(1, true, true), node(2, true, true)],
            ControlPlaneTarget::Endpoint {
                address: "203.0.113.10".into(),
            },
        );
        let cp = topo.select_control_plane().unwrap();
        assert_eq!(cp.endpoint, "203.0.113.10");
        assert_eq!(cp.session, Some(1));
    }

    #[test]
    fn endpoint_mode_with_no_live_control_plane_yields_no_session() {
        let topo = topology(
            vec![node(0, true, false), node(1, false, true)],
            ControlPlaneTarget::Endpoint {
                address: "203.0.113.10".into(),
            },
        );
        let cp = topo.select_control_plane().unwrap();
        assert_eq!(cp.session, None);
    }

    #[test]
    fn static_index_uses_node_address_as_endpoint() {
        let topo = topology(
            vec![node(0, false, true), node(1, true, true)],
            ControlPlaneTarget::NodeIndex { index: 1 },
        );
        let cp = topo.select_control_plane().unwrap();
        assert_eq!(cp.endpoint, "10.0.0.2");
        assert_eq!(cp.session, Some(1));
    }

    #[test]
    fn static_index_on_stopped_node_fails_fast() {
        let topo = topology(
            vec![node(0, true, false)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let cp = topo.select_control_plane().unwrap();
        // Endpoint still derivable for display, but no session node.
        assert_eq!(cp.endpoint, "10.0.0.1");
        assert_eq!(cp.session, None);
    }

    #[test]
    fn static_index_out_of_range_is_an_error() {
        let topo = topology(vec![node(0, true, true)], ControlPlaneTarget::NodeIndex { index: 3 });
        assert!(matches!(
            topo.select_control_plane(),
            Err(TopologyError::ControlPlaneIndex { index: 3, nodes: 1 })
        ));
    }

    #[test]
    fn selection_is_idempotent_on_an_unchanged_topology() {
        let topo = topology(
            vec![node(0, false, true), node(1, true, true), node(2, true, true)],
            ControlPlaneTarget::Endpoint {
                address: "203.0.113.10".into(),
            },
        );
        let first = topo.select_control_plane().unwrap();
        let second = topo.select_control_plane().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.session, Some(1));
    }
}
