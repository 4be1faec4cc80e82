//! Settings and credentials, loaded once at startup into immutable values
//! that get passed into the resolver and orchestrator. No ambient globals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Credentials live in their own file so settings can be shared freely.
    pub credentials_path: PathBuf,

    #[serde(default)]
    pub cloud: Option<CloudConfig>,

    #[serde(default, rename = "static")]
    pub static_nodes: Option<StaticConfig>,

    /// Named manifest bundles available to `install-runtime` and `apply`.
    #[serde(default)]
    pub bundles: BTreeMap<String, Bundle>,

    /// Directory holding the install/init shell scripts pushed to nodes.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,

    /// Bundle staged by the `install-runtime` operation.
    #[serde(default = "default_install_bundle")]
    pub install_bundle: String,

    /// Fixed interval between `kubectl apply` attempts.
    #[serde(default = "default_apply_retry_secs")]
    pub apply_retry_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct CloudConfig {
    pub use_load_balancer: bool,
    /// Virtual-network CIDR, handed to the node scripts.
    pub network_prefix: String,
    /// Inventory snapshot consumed by the file provisioner.
    pub inventory: PathBuf,
    /// Required when `use_load_balancer` is false; that VM becomes node 0
    /// and the control-plane endpoint.
    #[serde(default)]
    pub public_vm: Option<PublicVmConfig>,
    /// VM groups in declaration order; order determines node indices.
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Deserialize)]
pub struct PublicVmConfig {
    pub name: String,
    pub nic: String,
    #[serde(default)]
    pub allow_workloads: bool,
}

#[derive(Debug, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub control_plane: bool,
    /// Only valid on control-plane groups; workers allow workloads
    /// implicitly. Violations abort topology resolution.
    #[serde(default)]
    pub allow_workloads: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StaticConfig {
    pub network_prefix: String,
    /// Index of the fixed control-plane endpoint node.
    pub control_plane_index: usize,
    pub nodes: Vec<StaticNodeConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct StaticNodeConfig {
    pub address: String,
    #[serde(default)]
    pub control_plane: bool,
    #[serde(default)]
    pub allow_workloads: Option<bool>,
    /// Declared power state; there is no provisioner to ask in static mode.
    #[serde(default = "default_true")]
    pub running: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub test_pods: Vec<String>,
    #[serde(default)]
    pub test_endpoints: Vec<TestEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestEndpoint {
    pub port_and_path: String,
    pub status: u16,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub ssh_public_key_path: PathBuf,
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_install_bundle() -> String {
    "install-runtime".to_string()
}

fn default_apply_retry_secs() -> u64 {
    5
}

impl Settings {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("kubewright").join("settings.yaml"))
    }

    /// Load settings from the given path (or the default location), with
    /// `KUBEWRIGHT_*` environment overrides layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let settings: Settings = Figment::new()
            .merge(Yaml::file(&path))
            .merge(Env::prefixed("KUBEWRIGHT_").split("__"))
            .extract()
            .with_context(|| format!("loading settings from {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        match (&self.cloud, &self.static_nodes) {
            (Some(_), Some(_)) => {
                bail!("settings configure both a cloud and a static node source; pick one")
            }
            (None, None) => {
                bail!("settings configure no node source; add a `cloud` or `static` section")
            }
            (Some(cloud), None) => {
                if cloud.use_load_balancer && cloud.public_vm.is_some() {
                    bail!("public_vm is only valid when use_load_balancer is false");
                }
                if !cloud.use_load_balancer && cloud.public_vm.is_none() {
                    bail!("a public_vm is required when use_load_balancer is false");
                }
                Ok(())
            }
            (None, Some(_)) => Ok(()),
        }
    }
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let credentials =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_cloud_settings() {
        let file = write_settings(
            r#"
credentials_path: /tmp/creds.yaml
cloud:
  use_load_balancer: true
  network_prefix: 10.1.0.0/16
  inventory: /tmp/inventory.yaml
  groups:
    - name: cp-pool
      control_plane: true
      allow_workloads: false
    - name: workers
bundles:
  nginx:
    files: [manifests/nginx.yaml]
    test_pods: [nginx]
    test_endpoints:
      - port_and_path: "30080/"
        status: 200
"#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();
        let cloud = settings.cloud.as_ref().unwrap();
        assert!(cloud.use_load_balancer);
        assert_eq!(cloud.groups.len(), 2);
        assert_eq!(cloud.groups[1].allow_workloads, None);
        assert_eq!(settings.bundles["nginx"].test_endpoints[0].status, 200);
        assert_eq!(settings.apply_retry_secs, 5);
    }

    #[test]
    fn loads_static_settings() {
        let file = write_settings(
            r#"
credentials_path: /tmp/creds.yaml
static:
  network_prefix: 192.168.1.0/24
  control_plane_index: 0
  nodes:
    - address: 192.168.1.10
      control_plane: true
      allow_workloads: true
    - address: 192.168.1.11
"#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();
        let static_cfg = settings.static_nodes.as_ref().unwrap();
        assert_eq!(static_cfg.control_plane_index, 0);
        assert!(static_cfg.nodes[1].running);
        assert!(!static_cfg.nodes[1].control_plane);
    }

    #[test]
    fn rejects_both_node_sources() {
        let file = write_settings(
            r#"
credentials_path: /tmp/creds.yaml
cloud:
  use_load_balancer: true
  network_prefix: 10.1.0.0/16
  inventory: /tmp/inventory.yaml
  groups: []
static:
  network_prefix: 192.168.1.0/24
  control_plane_index: 0
  nodes: []
"#,
        );
        assert!(Settings::load(Some(file.path())).is_err());
    }

    #[test]
    fn rejects_missing_public_vm_without_load_balancer() {
        let file = write_settings(
            r#"
credentials_path: /tmp/creds.yaml
cloud:
  use_load_balancer: false
  network_prefix: 10.1.0.0/16
  inventory: /tmp/inventory.yaml
  groups: []
"#,
        );
        assert!(Settings::load(Some(file.path())).is_err());
    }
}
