//! Topology resolution — merges raw provisioner inventory (or a static node
//! list) into one ordered, invariant-checked [`ClusterTopology`].
//!
//! Resolution is deterministic for identical inputs and all-or-nothing: any
//! cardinality mismatch or role violation aborts the whole resolve, naming
//! the node and the rule that failed.

use tracing::{debug, info};

use crate::config::{CloudConfig, StaticConfig};
use crate::error::TopologyError;
use crate::provision::{NicRecord, Provisioner};
use crate::topology::{ClusterTopology, ControlPlaneTarget, NodeRecord, Reachability};

const SSH_PORT: u16 = 22;

fn is_running(power_state: &str) -> bool {
    power_state.trim().eq_ignore_ascii_case("running")
}

/// Resolve a topology from cloud inventory.
///
/// Node order is fixed: the standalone public VM first (when the deployment
/// has no load balancer), then each group's members in declaration order.
pub fn resolve_cloud<P: Provisioner + ?Sized>(
    cloud: &CloudConfig,
    provisioner: &P,
) -> Result<ClusterTopology, TopologyError> {
    let public_address = provisioner.public_address()?;
    let mut nodes: Vec<NodeRecord> = Vec::new();

    if !cloud.use_load_balancer {
        if let Some(vm_cfg) = &cloud.public_vm {
            let vm = provisioner.vm(&vm_cfg.name)?;
            let nic = provisioner.nic(&vm_cfg.nic)?;
            if nic.ip_configurations.len() != 1 {
                return Err(TopologyError::IpConfigCardinality {
                    node: vm_cfg.name.clone(),
                    count: nic.ip_configurations.len(),
                });
            }
            let power_state = provisioner.vm_power_state(&vm_cfg.name)?;
            debug!(vm = %vm_cfg.name, %power_state, "resolved public VM");
            nodes.push(NodeRecord {
                index: 0,
                control_plane: true,
                allow_workloads: Some(vm_cfg.allow_workloads),
                running: is_running(&power_state),
                reachability: Reachability::Direct {
                    address: public_address.clone(),
                    port: SSH_PORT,
                },
                source_group: None,
                vm_id: None,
                name: Some(vm.name),
                hostname_label: vm.computer_name,
                mac_address: nic.mac_address.clone(),
            });
        }
    }

    for group in &cloud.groups {
        if !group.control_plane && group.allow_workloads.is_some() {
            return Err(TopologyError::WorkloadOverride {
                node: group.name.clone(),
            });
        }

        let members = provisioner.group_members(&group.name)?;
        let nics = provisioner.group_nics(&group.name)?;

        for vm in members {
            let label = format!("{}/{}", group.name, vm.name);

            let vm_nics: Vec<&NicRecord> = nics
                .iter()
                .filter(|n| n.vm_id.as_deref() == Some(vm.id.as_str()))
                .collect();
            if vm_nics.len() != 1 {
                return Err(TopologyError::NicCardinality {
                    node: label,
                    count: vm_nics.len(),
                });
            }
            let nic = vm_nics[0];

            if nic.ip_configurations.len() != 1 {
                return Err(TopologyError::IpConfigCardinality {
                    node: label,
                    count: nic.ip_configurations.len(),
                });
            }
            let private_address = &nic.ip_configurations[0].private_address;

            let reachability = if cloud.use_load_balancer {
                let mappings = provisioner.nat_mappings(&group.name, private_address)?;
                if mappings.len() != 1 {
                    return Err(TopologyError::NatMappingCardinality {
                        node: label,
                        address: private_address.clone(),
                        count: mappings.len(),
                    });
                }
                // The load balancer itself performs the hop.
                Reachability::Direct {
                    address: public_address.clone(),
                    port: mappings[0].frontend_port,
                }
            } else {
                Reachability::Proxied {
                    address: private_address.clone(),
                    port: SSH_PORT,
                    proxy_address: public_address.clone(),
                    proxy_port: SSH_PORT,
                }
            };

            let power_state = provisioner.member_power_state(&group.name, &vm.id)?;
            debug!(node = %label, %power_state, %reachability, "resolved group member");

            nodes.push(NodeRecord {
                index: nodes.len(),
                control_plane: group.control_plane,
                allow_workloads: group
                    .control_plane
                    .then(|| group.allow_workloads.unwrap_or(false)),
                running: is_running(&power_state),
                reachability,
                source_group: Some(group.name.clone()),
                vm_id: Some(vm.id),
                name: Some(vm.name),
                hostname_label: vm.computer_name,
                mac_address: nic.mac_address.clone(),
            });
        }
    }

    let control_plane = if cloud.use_load_balancer {
        ControlPlaneTarget::Endpoint {
            address: public_address.clone(),
        }
    } else {
        // The public VM is always node 0 and the fixed endpoint.
        ControlPlaneTarget::NodeIndex { index: 0 }
    };
    if let ControlPlaneTarget::NodeIndex { index } = control_plane {
        if index >= nodes.len() {
            return Err(TopologyError::ControlPlaneIndex {
                index,
                nodes: nodes.len(),
            });
        }
    }

    info!(nodes = nodes.len(), load_balancer = cloud.use_load_balancer, "resolved cloud topology");
    Ok(ClusterTopology {
        nodes,
        public_address: Some(public_address),
        network_prefix: cloud.network_prefix.clone(),
        control_plane,
        generalize: true,
    })
}

/// Resolve a topology from a fixed host list in the settings.
pub fn resolve_static(cfg: &StaticConfig) -> Result<ClusterTopology, TopologyError> {
    let mut nodes = Vec::with_capacity(cfg.nodes.len());
    for (index, node) in cfg.nodes.iter().enumerate() {
        if !node.control_plane && node.allow_workloads.is_some() {
            return Err(TopologyError::WorkloadOverride {
                node: node.address.clone(),
            });
        }
        nodes.push(NodeRecord {
            index,
            control_plane: node.control_plane,
            allow_workloads: node
                .control_plane
                .then(|| node.allow_workloads.unwrap_or(false)),
            running: node.running,
            reachability: Reachability::Direct {
                address: node.address.clone(),
                port: SSH_PORT,
            },
            source_group: None,
            vm_id: None,
            name: None,
            hostname_label: None,
            mac_address: None,
        });
    }

    if cfg.control_plane_index >= nodes.len() {
        return Err(TopologyError::ControlPlaneIndex {
            index: cfg.control_plane_index,
            nodes: nodes.len(),
        });
    }

    info!(nodes = nodes.len(), "resolved static topology");
    Ok(ClusterTopology {
        nodes,
        public_address: None,
        network_prefix: cfg.network_prefix.clone(),
        control_plane: ControlPlaneTarget::NodeIndex {
            index: cfg.control_plane_index,
        },
        generalize: false,
    })
}
