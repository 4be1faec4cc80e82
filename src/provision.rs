//! Inventory boundary — raw VM, NIC, and NAT-mapping records as the
//! provisioner reports them, before any topology merging.
//!
//! The [`Provisioner`] trait is the seam between this tool and whatever
//! deployed the infrastructure. [`FileProvisioner`] reads a YAML snapshot
//! exported by that tooling, so operating a cloud cluster needs no cloud SDK
//! here. All reads are treated as externally owned and possibly failing;
//! nothing ever mutates provisioner state.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

#[cfg(test)]
use mockall::automock;

use crate::error::ProvisionError;

/// One member VM of a group, as reported by the provisioner.
#[derive(Debug, Clone, Deserialize)]
pub struct VmInstance {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub computer_name: Option<String>,
}

/// A network interface with its IP configurations.
#[derive(Debug, Clone, Deserialize)]
pub struct NicRecord {
    #[serde(default)]
    pub vm_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub ip_configurations: Vec<IpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpConfig {
    pub private_address: String,
}

/// A load balancer's inbound NAT translation for one private address.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NatMapping {
    pub frontend_port: u16,
    #[serde(default)]
    pub backend_port: u16,
}

/// Read-only inventory source. Implementations own the raw records; the
/// topology resolver owns the merging and its cardinality invariants.
#[cfg_attr(test, automock)]
pub trait Provisioner {
    /// The cluster's single public address (load-balancer frontend or the
    /// public VM's address).
    fn public_address(&self) -> Result<String, ProvisionError>;

    /// Member VMs of a group, in source-defined order.
    fn group_members(&self, group: &str) -> Result<Vec<VmInstance>, ProvisionError>;

    /// All NICs attached to a group, unjoined.
    fn group_nics(&self, group: &str) -> Result<Vec<NicRecord>, ProvisionError>;

    /// Inbound NAT port mappings for one private address behind the load
    /// balancer.
    fn nat_mappings(
        &self,
        group: &str,
        private_address: &str,
    ) -> Result<Vec<NatMapping>, ProvisionError>;

    /// Raw power state string of a group member ("running", "deallocated", ...).
    fn member_power_state(&self, group: &str, instance_id: &str)
        -> Result<String, ProvisionError>;

    /// A standalone VM by name.
    fn vm(&self, name: &str) -> Result<VmInstance, ProvisionError>;

    /// Raw power state of a standalone VM.
    fn vm_power_state(&self, name: &str) -> Result<String, ProvisionError>;

    /// A standalone NIC by name.
    fn nic(&self, name: &str) -> Result<NicRecord, ProvisionError>;
}

// ── File-backed snapshot ───────────────────────────────────

fn default_power_state() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct MemberInventory {
    #[serde(flatten)]
    vm: VmInstance,
    #[serde(default = "default_power_state")]
    power_state: String,
}

#[derive(Debug, Default, Deserialize)]
struct GroupInventory {
    #[serde(default)]
    members: Vec<MemberInventory>,
    #[serde(default)]
    nics: Vec<NicRecord>,
    /// Keyed by private address.
    #[serde(default)]
    nat_mappings: BTreeMap<String, Vec<NatMapping>>,
}

#[derive(Debug, Default, Deserialize)]
struct InventorySnapshot {
    #[serde(default)]
    public_address: Option<String>,
    #[serde(default)]
    groups: BTreeMap<String, GroupInventory>,
    #[serde(default)]
    vms: BTreeMap<String, MemberInventory>,
    #[serde(default)]
    nics: BTreeMap<String, NicRecord>,
}

/// [`Provisioner`] over a YAML inventory snapshot on disk.
pub struct FileProvisioner {
    snapshot: InventorySnapshot,
}

impl FileProvisioner {
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProvisionError(format!("reading {}: {e}", path.display())))?;
        let snapshot: InventorySnapshot = serde_yaml::from_str(&raw)
            .map_err(|e| ProvisionError(format!("parsing {}: {e}", path.display())))?;
        Ok(Self { snapshot })
    }

    fn group(&self, group: &str) -> Result<&GroupInventory, ProvisionError> {
        self.snapshot
            .groups
            .get(group)
            .ok_or_else(|| ProvisionError(format!("unknown group '{group}' in inventory")))
    }
}

impl Provisioner for FileProvisioner {
    fn public_address(&self) -> Result<String, ProvisionError> {
        self.snapshot
            .public_address
            .clone()
            .ok_or_else(|| ProvisionError("inventory has no public_address".to_string()))
    }

    fn group_members(&self, group: &str) -> Result<Vec<VmInstance>, ProvisionError> {
        Ok(self.group(group)?.members.iter().map(|m| m.vm.clone()).collect())
    }

    fn group_nics(&self, group: &str) -> Result<Vec<NicRecord>, ProvisionError> {
        Ok(self.group(group)?.nics.clone())
    }

    fn nat_mappings(
        &self,
        group: &str,
        private_address: &str,
    ) -> Result<Vec<NatMapping>, ProvisionError> {
        Ok(self
            .group(group)?
            .nat_mappings
            .get(private_address)
            .cloned()
            .unwrap_or_default())
    }

    fn member_power_state(
        &self,
        group: &str,
        instance_id: &str,
    ) -> Result<String, ProvisionError> {
        self.group(group)?
            .members
            .iter()
            .find(|m| m.vm.id == instance_id)
            .map(|m| m.power_state.clone())
            .ok_or_else(|| {
                ProvisionError(format!("unknown instance '{instance_id}' in group '{group}'"))
            })
    }

    fn vm(&self, name: &str) -> Result<VmInstance, ProvisionError> {
        self.snapshot
            .vms
            .get(name)
            .map(|m| m.vm.clone())
            .ok_or_else(|| ProvisionError(format!("unknown VM '{name}' in inventory")))
    }

    fn vm_power_state(&self, name: &str) -> Result<String, ProvisionError> {
        self.snapshot
            .vms
            .get(name)
            .map(|m| m.power_state.clone())
            .ok_or_else(|| ProvisionError(format!("unknown VM '{name}' in inventory")))
    }

    fn nic(&self, name: &str) -> Result<NicRecord, ProvisionError> {
        self.snapshot
            .nics
            .get(name)
            .cloned()
            .ok_or_else(|| ProvisionError(format!("unknown NIC '{name}' in inventory")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"
public_address: 203.0.113.10
groups:
  workers:
    members:
      - id: "3"
        name: workers_3
        computer_name: wrk000003
        power_state: running
    nics:
      - vm_id: "3"
        mac_address: "00-0D-3A-00-00-01"
        ip_configurations:
          - private_address: 10.1.0.4
    nat_mappings:
      10.1.0.4:
        - frontend_port: 50001
          backend_port: 22
vms:
  pubvm:
    id: pubvm
    name: pubvm
    power_state: deallocated
nics:
  pubvm-nic:
    mac_address: "00-0D-3A-00-00-09"
    ip_configurations:
      - private_address: 10.1.0.5
"#;

    fn provisioner() -> FileProvisioner {
        let snapshot = serde_yaml::from_str(SNAPSHOT).unwrap();
        FileProvisioner { snapshot }
    }

    #[test]
    fn reads_group_inventory() {
        let p = provisioner();
        assert_eq!(p.public_address().unwrap(), "203.0.113.10");

        let members = p.group_members("workers").unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "workers_3");

        let nics = p.group_nics("workers").unwrap();
        assert_eq!(nics[0].ip_configurations[0].private_address, "10.1.0.4");

        let mappings = p.nat_mappings("workers", "10.1.0.4").unwrap();
        assert_eq!(mappings[0].frontend_port, 50001);

        assert_eq!(p.member_power_state("workers", "3").unwrap(), "running");
    }

    #[test]
    fn missing_nat_mapping_is_empty_not_error() {
        let p = provisioner();
        assert!(p.nat_mappings("workers", "10.1.0.99").unwrap().is_empty());
    }

    #[test]
    fn unknown_group_fails() {
        let p = provisioner();
        assert!(p.group_members("ghosts").is_err());
    }

    #[test]
    fn reads_standalone_vm_and_nic() {
        let p = provisioner();
        assert_eq!(p.vm("pubvm").unwrap().name, "pubvm");
        assert_eq!(p.vm_power_state("pubvm").unwrap(), "deallocated");
        assert_eq!(
            p.nic("pubvm-nic").unwrap().ip_configurations[0].private_address,
            "10.1.0.5"
        );
    }
}
