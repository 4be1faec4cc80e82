//! Operation orchestrator — validates preconditions against node roles and
//! sequences remote lifecycle operations over a resolved topology.
//!
//! Each invocation is its own small state machine
//! (`Idle → Validating → Executing → Completed | Failed`); nothing is
//! persisted across invocations, and the control plane is re-selected at
//! call time because liveness can change between cycles. A failed
//! precondition moves straight to `Failed` without touching the remote
//! channel.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use tracing::{debug, info, warn};

use crate::config::{Bundle, Credentials, Settings};
use crate::error::{OrchestrateError, RemoteError};
use crate::remote::RemoteChannel;
use crate::topology::{ClusterTopology, ControlPlane, NodeRecord};

/// Script pushed and run by `install-runtime`.
pub const INSTALL_SCRIPT: &str = "install_kube.sh";
/// Script pushed and run by `init` and `join`.
pub const INIT_SCRIPT: &str = "init_node.sh";

/// The closed set of node-lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Append public key material to the node's authorized_keys.
    InstallKeys,
    /// Idempotent cluster-runtime teardown (`kubeadm reset -f`).
    Reset,
    /// Push the runtime bundle + install script and run it.
    InstallRuntime,
    /// Bootstrap the control plane (`kubeadm init` via script).
    Init,
    /// Join a node using fresh credentials read off the live control plane.
    Join,
    /// Stage a manifest bundle on the control plane and `kubectl apply` it
    /// until the cluster API accepts it.
    Apply { bundle: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InstallKeys => "install-keys",
            Self::Reset => "reset",
            Self::InstallRuntime => "install-runtime",
            Self::Init => "init",
            Self::Join => "join",
            Self::Apply { .. } => "apply",
        }
    }

    fn broadcastable(&self) -> bool {
        matches!(self, Self::InstallKeys | Self::Reset)
    }
}

/// What an operation runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Node(usize),
    /// The live control-plane session node, whichever that is right now.
    ControlPlane,
    /// Every node, sequentially in index order.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpState {
    Idle,
    Validating,
    Executing,
    Completed,
    Failed,
}

/// External stop signal for the `apply` polling loop.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A validated execution plan: target indices in order, plus the
/// control-plane selection made for this invocation.
struct Plan {
    targets: Vec<usize>,
    control_plane: ControlPlane,
}

pub struct Orchestrator<'a, C: RemoteChannel + ?Sized> {
    channel: &'a C,
    settings: &'a Settings,
    credentials: &'a Credentials,
    cancel: CancelFlag,
}

impl<'a, C: RemoteChannel + ?Sized> Orchestrator<'a, C> {
    pub fn new(
        settings: &'a Settings,
        credentials: &'a Credentials,
        channel: &'a C,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            channel,
            settings,
            credentials,
            cancel,
        }
    }

    /// Run one operation against one target (or all nodes).
    ///
    /// The topology snapshot must be freshly resolved by the caller; it is
    /// read-only here and discarded after the invocation.
    pub fn execute(
        &self,
        topology: &ClusterTopology,
        target: Target,
        op: &Operation,
    ) -> Result<(), OrchestrateError> {
        let mut state = OpState::Idle;
        transition(&mut state, OpState::Validating, op);

        let plan = match self.validate(topology, target, op) {
            Ok(plan) => plan,
            Err(e) => {
                transition(&mut state, OpState::Failed, op);
                warn!(op = op.name(), error = %e, "precondition failed");
                return Err(e);
            }
        };

        transition(&mut state, OpState::Executing, op);
        for &index in &plan.targets {
            if let Err(e) = self.run_on(topology, &plan, index, op) {
                transition(&mut state, OpState::Failed, op);
                warn!(op = op.name(), node = index, error = %e, "operation failed");
                return Err(e);
            }
        }

        transition(&mut state, OpState::Completed, op);
        info!(op = op.name(), targets = plan.targets.len(), "operation completed");
        Ok(())
    }

    fn validate(
        &self,
        topology: &ClusterTopology,
        target: Target,
        op: &Operation,
    ) -> Result<Plan, OrchestrateError> {
        // Always re-derived, never cached from a previous cycle.
        let control_plane = topology.select_control_plane()?;
        let nodes = topology.nodes.len();

        let targets = match target {
            Target::All => {
                if !op.broadcastable() {
                    return Err(OrchestrateError::BroadcastUnsupported { op: op.name() });
                }
                (0..nodes).collect()
            }
            Target::Node(index) => {
                if index >= nodes {
                    return Err(OrchestrateError::InvalidTarget { index, nodes });
                }
                vec![index]
            }
            Target::ControlPlane => {
                let index = control_plane
                    .session
                    .ok_or(OrchestrateError::NoControlPlane)?;
                vec![index]
            }
        };

        for &index in &targets {
            let node = &topology.nodes[index];
            match op {
                Operation::Init => {
                    if !node.control_plane {
                        return Err(OrchestrateError::NotControlPlane { op: "init", index });
                    }
                }
                Operation::Join => {
                    if !node.control_plane && node.allow_workloads == Some(true) {
                        return Err(OrchestrateError::WorkerOverride { index });
                    }
                    // Token and certificate reads need a live control plane.
                    if control_plane.session.is_none() {
                        return Err(OrchestrateError::NoControlPlane);
                    }
                }
                Operation::Apply { bundle } => {
                    if !self.settings.bundles.contains_key(bundle) {
                        return Err(OrchestrateError::UnknownBundle(bundle.clone()));
                    }
                }
                Operation::InstallRuntime => {
                    if !self.settings.bundles.contains_key(&self.settings.install_bundle) {
                        return Err(OrchestrateError::UnknownBundle(
                            self.settings.install_bundle.clone(),
                        ));
                    }
                }
                Operation::InstallKeys | Operation::Reset => {}
            }
        }

        Ok(Plan {
            targets,
            control_plane,
        })
    }

    fn run_on(
        &self,
        topology: &ClusterTopology,
        plan: &Plan,
        index: usize,
        op: &Operation,
    ) -> Result<(), OrchestrateError> {
        let node = &topology.nodes[index];
        println!(
            "{} {} on node {} ({})",
            ">>".blue().bold(),
            op.name(),
            index,
            node.reachability
        );
        match op {
            Operation::InstallKeys => self.install_keys(node),
            Operation::Reset => self.reset(node),
            Operation::InstallRuntime => self.install_runtime(topology, node),
            Operation::Init => self.init(topology, plan, node),
            Operation::Join => self.join(topology, plan, node),
            Operation::Apply { bundle } => self.apply(topology, plan, bundle),
        }
    }

    fn install_keys(&self, node: &NodeRecord) -> Result<(), OrchestrateError> {
        self.channel.run_with_input(
            &node.reachability,
            "mkdir -p $HOME/.ssh && cat >> $HOME/.ssh/authorized_keys",
            &self.credentials.ssh_public_key_path,
        )?;
        println!("{} installed key on {}", "ok".green().bold(), node.reachability);
        Ok(())
    }

    fn reset(&self, node: &NodeRecord) -> Result<(), OrchestrateError> {
        let command = format!("echo {} | sudo -S kubeadm reset -f", self.credentials.password);
        self.channel.run(&node.reachability, &command, false)?;
        println!("{} reset {}", "ok".green().bold(), node.reachability);
        Ok(())
    }

    fn install_runtime(
        &self,
        topology: &ClusterTopology,
        node: &NodeRecord,
    ) -> Result<(), OrchestrateError> {
        let bundle_name = &self.settings.install_bundle;
        let bundle = self.bundle(bundle_name)?;
        self.stage_bundle(node, bundle_name, bundle)?;

        let pods = bundle
            .test_pods
            .iter()
            .map(|p| format!("{p}\n"))
            .collect::<String>();
        self.push_generated(node, "TestPodNames.txt", &pods)?;

        let endpoints = bundle
            .test_endpoints
            .iter()
            .map(|e| format!("{}\t{}\n", e.port_and_path, e.status))
            .collect::<String>();
        self.push_generated(node, "TestEndpoints.txt", &endpoints)?;

        let script = self.settings.scripts_dir.join(INSTALL_SCRIPT);
        self.channel.copy(&node.reachability, &script, INSTALL_SCRIPT)?;

        let generalize = if topology.generalize { "generalize" } else { "not-generalize" };
        let command = format!(
            "bash $HOME/{INSTALL_SCRIPT} {} {} {}",
            self.credentials.password, generalize, topology.network_prefix
        );
        self.channel.run(&node.reachability, &command, false)?;
        println!("{} runtime installed on {}", "ok".green().bold(), node.reachability);
        Ok(())
    }

    fn init(
        &self,
        topology: &ClusterTopology,
        plan: &Plan,
        node: &NodeRecord,
    ) -> Result<(), OrchestrateError> {
        let script = self.settings.scripts_dir.join(INIT_SCRIPT);
        self.channel.copy(&node.reachability, &script, INIT_SCRIPT)?;

        let allow_workloads = node.allow_workloads.unwrap_or(false);
        let command = format!(
            "bash $HOME/{INIT_SCRIPT} {} init {} {} {}",
            self.credentials.password,
            plan.control_plane.endpoint,
            allow_workloads,
            topology.network_prefix
        );
        self.channel.run(&node.reachability, &command, false)?;
        println!("{} control plane initialized on {}", "ok".green().bold(), node.reachability);
        Ok(())
    }

    fn join(
        &self,
        topology: &ClusterTopology,
        plan: &Plan,
        node: &NodeRecord,
    ) -> Result<(), OrchestrateError> {
        let cp_index = plan
            .control_plane
            .session
            .ok_or(OrchestrateError::NoControlPlane)?;
        let cp_node = &topology.nodes[cp_index];

        info!(control_plane = cp_index, target = node.index, "reading join credentials");
        let join_command = self
            .channel
            .run(
                &cp_node.reachability,
                "kubeadm token create --print-join-command",
                true,
            )?
            .unwrap_or_default();

        // Certificate keys expire; mint a fresh one for every join.
        let cert_command = format!(
            "echo {} | sudo -S kubeadm init phase upload-certs --upload-certs 2>/dev/null | tail -1",
            self.credentials.password
        );
        let certificate_key = self
            .channel
            .run(&cp_node.reachability, &cert_command, true)?
            .unwrap_or_default();

        let script = self.settings.scripts_dir.join(INIT_SCRIPT);
        self.channel.copy(&node.reachability, &script, INIT_SCRIPT)?;

        let allow_workloads = node.allow_workloads.unwrap_or(false);
        let command = format!(
            "bash $HOME/{INIT_SCRIPT} {} join '{}' {} {} {} {} {}",
            self.credentials.password,
            join_command,
            certificate_key,
            plan.control_plane.endpoint,
            node.control_plane,
            allow_workloads,
            topology.network_prefix
        );
        self.channel.run(&node.reachability, &command, false)?;
        println!(
            "{} joined {} via control-plane node {}",
            "ok".green().bold(),
            node.reachability,
            cp_index
        );
        Ok(())
    }

    fn apply(
        &self,
        topology: &ClusterTopology,
        plan: &Plan,
        bundle_name: &str,
    ) -> Result<(), OrchestrateError> {
        let cp_index = plan
            .control_plane
            .session
            .ok_or(OrchestrateError::NoControlPlane)?;
        let node = &topology.nodes[cp_index];
        let bundle = self.bundle(bundle_name)?;
        let dir = self.stage_bundle(node, bundle_name, bundle)?;

        let command = format!("kubectl apply -f $HOME/{dir}");
        let interval = Duration::from_secs(self.settings.apply_retry_secs);
        let mut attempt: u32 = 1;
        loop {
            info!(attempt, node = cp_index, bundle = bundle_name, "applying manifests");
            match self.channel.run(&node.reachability, &command, false) {
                Ok(_) => {
                    println!(
                        "{} applied bundle '{}' on node {} (attempt {})",
                        "ok".green().bold(),
                        bundle_name,
                        cp_index,
                        attempt
                    );
                    return Ok(());
                }
                // The cluster API not being ready yet is expected; keep
                // polling. A transport failure still aborts.
                Err(RemoteError::CommandFailed { .. }) => {
                    println!(
                        "{} apply attempt {} failed, retrying in {}s",
                        "!!".yellow().bold(),
                        attempt,
                        self.settings.apply_retry_secs
                    );
                    if self.cancel.is_cancelled() {
                        return Err(OrchestrateError::Cancelled);
                    }
                    thread::sleep(interval);
                    if self.cancel.is_cancelled() {
                        return Err(OrchestrateError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn bundle(&self, name: &str) -> Result<&Bundle, OrchestrateError> {
        self.settings
            .bundles
            .get(name)
            .ok_or_else(|| OrchestrateError::UnknownBundle(name.to_string()))
    }

    /// Wipe and recreate the node's staging directory for the bundle, then
    /// copy its files over. Returns the remote directory path under `$HOME`.
    fn stage_bundle(
        &self,
        node: &NodeRecord,
        name: &str,
        bundle: &Bundle,
    ) -> Result<String, OrchestrateError> {
        let dir = format!("configurations/{name}/");
        self.channel
            .run(&node.reachability, &format!("rm -rf $HOME/{dir}"), false)?;
        self.channel
            .run(&node.reachability, &format!("mkdir -p $HOME/{dir}"), false)?;
        for file in &bundle.files {
            let base = file
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .ok_or_else(|| OrchestrateError::Artifact {
                    path: file.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "bundle entry has no file name",
                    ),
                })?;
            self.channel
                .copy(&node.reachability, file, &format!("{dir}{base}"))?;
        }
        Ok(dir)
    }

    /// Write generated text to a temp file and push it to the node.
    fn push_generated(
        &self,
        node: &NodeRecord,
        remote_name: &str,
        contents: &str,
    ) -> Result<(), OrchestrateError> {
        let stage = |source: std::io::Error| OrchestrateError::Artifact {
            path: PathBuf::from(remote_name),
            source,
        };
        let mut tmp = tempfile::NamedTempFile::new().map_err(stage)?;
        tmp.write_all(contents.as_bytes()).map_err(stage)?;
        tmp.flush().map_err(stage)?;
        self.channel.copy(&node.reachability, tmp.path(), remote_name)?;
        Ok(())
    }
}

fn transition(state: &mut OpState, next: OpState, op: &Operation) {
    debug!(op = op.name(), from = ?*state, to = ?next, "state change");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestEndpoint;
    use crate::remote::MockRemoteChannel;
    use crate::topology::test_support::{node, topology};
    use crate::topology::ControlPlaneTarget;
    use std::collections::BTreeMap;
    use std::io::ErrorKind;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn settings() -> Settings {
        let mut bundles = BTreeMap::new();
        bundles.insert(
            "install-runtime".to_string(),
            Bundle {
                files: vec![],
                test_pods: vec!["nginx".to_string()],
                test_endpoints: vec![TestEndpoint {
                    port_and_path: "30080/".to_string(),
                    status: 200,
                }],
            },
        );
        bundles.insert("nginx".to_string(), Bundle::default());
        Settings {
            credentials_path: "/tmp/creds.yaml".into(),
            cloud: None,
            static_nodes: None,
            bundles,
            scripts_dir: "scripts".into(),
            install_bundle: "install-runtime".to_string(),
            apply_retry_secs: 0,
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "operator".to_string(),
            password: "hunter2".to_string(),
            ssh_public_key_path: "/tmp/id_ed25519.pub".into(),
        }
    }

    fn command_failed() -> RemoteError {
        RemoteError::CommandFailed {
            program: "ssh",
            session: "10.0.0.1:22".to_string(),
            status: ExitStatus::from_raw(256),
            stderr: String::new(),
        }
    }

    fn fixtures() -> (Settings, Credentials) {
        (settings(), credentials())
    }

    #[test]
    fn join_without_live_control_plane_makes_no_remote_calls() {
        // Worker present, only control-plane node powered off (Scenario C).
        let topo = topology(
            vec![node(0, true, false), node(1, false, true)],
            ControlPlaneTarget::Endpoint {
                address: "203.0.113.10".into(),
            },
        );
        let channel = MockRemoteChannel::new();
        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        let err = orchestrator
            .execute(&topo, Target::Node(1), &Operation::Join)
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::NoControlPlane));
        // MockRemoteChannel has no expectations; any call would panic.
    }

    #[test]
    fn join_rejects_worker_with_explicit_workload_override() {
        // The resolver never emits this shape, so build the record by hand.
        let mut worker = node(1, false, true);
        worker.allow_workloads = Some(true);
        let topo = topology(
            vec![node(0, true, true), worker],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let channel = MockRemoteChannel::new();
        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        let err = orchestrator
            .execute(&topo, Target::Node(1), &Operation::Join)
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::WorkerOverride { index: 1 }));
    }

    #[test]
    fn init_on_worker_fails_precondition() {
        let topo = topology(
            vec![node(0, true, true), node(1, false, true)],
            ControlPlaneTarget::Endpoint {
                address: "203.0.113.10".into(),
            },
        );
        let channel = MockRemoteChannel::new();
        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        let err = orchestrator
            .execute(&topo, Target::Node(1), &Operation::Init)
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::NotControlPlane { index: 1, .. }));
    }

    #[test]
    fn init_cannot_broadcast() {
        let topo = topology(
            vec![node(0, true, true)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let channel = MockRemoteChannel::new();
        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        let err = orchestrator
            .execute(&topo, Target::All, &Operation::Init)
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::BroadcastUnsupported { op: "init" }));
    }

    #[test]
    fn invalid_node_index_fails_before_any_remote_call() {
        let topo = topology(
            vec![node(0, true, true)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let channel = MockRemoteChannel::new();
        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        let err = orchestrator
            .execute(&topo, Target::Node(7), &Operation::Reset)
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::InvalidTarget { index: 7, nodes: 1 }));
    }

    #[test]
    fn broadcast_installs_keys_on_every_node_in_index_order() {
        let topo = topology(
            vec![node(0, true, true), node(1, false, true), node(2, false, true)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let mut channel = MockRemoteChannel::new();
        let mut seq = mockall::Sequence::new();
        for expected in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            channel
                .expect_run_with_input()
                .withf(move |reach, command, _| {
                    reach.address() == expected && command.contains("authorized_keys")
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _| Ok(()));
        }
        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        orchestrator
            .execute(&topo, Target::All, &Operation::InstallKeys)
            .unwrap();
    }

    #[test]
    fn join_reads_credentials_from_the_live_control_plane() {
        // Control plane is node 1 (node 0 stopped); target worker is node 2.
        let topo = topology(
            vec![node(0, true, false), node(1, true, true), node(2, false, true)],
            ControlPlaneTarget::Endpoint {
                address: "203.0.113.10".into(),
            },
        );
        let mut channel = MockRemoteChannel::new();
        channel
            .expect_run()
            .withf(|reach, command, capture| {
                reach.address() == "10.0.0.2" && command.contains("token create") && *capture
            })
            .times(1)
            .returning(|_, _, _| Ok(Some("kubeadm join 203.0.113.10:6443 --token t".into())));
        channel
            .expect_run()
            .withf(|reach, command, capture| {
                reach.address() == "10.0.0.2" && command.contains("upload-certs") && *capture
            })
            .times(1)
            .returning(|_, _, _| Ok(Some("deadbeef".into())));
        channel
            .expect_copy()
            .withf(|reach, _, remote| reach.address() == "10.0.0.3" && remote == INIT_SCRIPT)
            .times(1)
            .returning(|_, _, _| Ok(()));
        channel
            .expect_run()
            .withf(|reach, command, capture| {
                reach.address() == "10.0.0.3"
                    && command.contains("join 'kubeadm join")
                    && command.contains("deadbeef")
                    && command.contains("203.0.113.10")
                    && !*capture
            })
            .times(1)
            .returning(|_, _, _| Ok(None));

        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        orchestrator
            .execute(&topo, Target::Node(2), &Operation::Join)
            .unwrap();
    }

    #[test]
    fn apply_retries_until_the_cluster_api_accepts() {
        // Scenario D: two rejections, then success; every attempt visible.
        let topo = topology(
            vec![node(0, true, true)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let mut channel = MockRemoteChannel::new();
        channel
            .expect_run()
            .withf(|_, command, _| command.starts_with("rm -rf") || command.starts_with("mkdir"))
            .times(2)
            .returning(|_, _, _| Ok(None));
        let mut attempts = 0;
        channel
            .expect_run()
            .withf(|_, command, _| command.contains("kubectl apply"))
            .times(3)
            .returning(move |_, _, _| {
                attempts += 1;
                if attempts < 3 {
                    Err(command_failed())
                } else {
                    Ok(None)
                }
            });

        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        orchestrator
            .execute(
                &topo,
                Target::ControlPlane,
                &Operation::Apply {
                    bundle: "nginx".to_string(),
                },
            )
            .unwrap();
    }

    #[test]
    fn apply_aborts_on_transport_failure() {
        let topo = topology(
            vec![node(0, true, true)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let mut channel = MockRemoteChannel::new();
        channel
            .expect_run()
            .withf(|_, command, _| command.starts_with("rm -rf") || command.starts_with("mkdir"))
            .times(2)
            .returning(|_, _, _| Ok(None));
        channel
            .expect_run()
            .withf(|_, command, _| command.contains("kubectl apply"))
            .times(1)
            .returning(|_, _, _| {
                Err(RemoteError::Spawn {
                    program: "ssh",
                    source: std::io::Error::new(ErrorKind::NotFound, "ssh missing"),
                })
            });

        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        let err = orchestrator
            .execute(
                &topo,
                Target::ControlPlane,
                &Operation::Apply {
                    bundle: "nginx".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::Remote(RemoteError::Spawn { .. })));
    }

    #[test]
    fn cancelled_apply_stops_retrying() {
        let topo = topology(
            vec![node(0, true, true)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let mut channel = MockRemoteChannel::new();
        channel
            .expect_run()
            .withf(|_, command, _| command.starts_with("rm -rf") || command.starts_with("mkdir"))
            .times(2)
            .returning(|_, _, _| Ok(None));
        channel
            .expect_run()
            .withf(|_, command, _| command.contains("kubectl apply"))
            .times(1)
            .returning(|_, _, _| Err(command_failed()));

        let (settings, credentials) = fixtures();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let orchestrator = Orchestrator::new(&settings, &credentials, &channel, cancel);

        let err = orchestrator
            .execute(
                &topo,
                Target::ControlPlane,
                &Operation::Apply {
                    bundle: "nginx".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::Cancelled));
    }

    #[test]
    fn unknown_bundle_fails_validation() {
        let topo = topology(
            vec![node(0, true, true)],
            ControlPlaneTarget::NodeIndex { index: 0 },
        );
        let channel = MockRemoteChannel::new();
        let (settings, credentials) = fixtures();
        let orchestrator =
            Orchestrator::new(&settings, &credentials, &channel, CancelFlag::new());

        let err = orchestrator
            .execute(
                &topo,
                Target::ControlPlane,
                &Operation::Apply {
                    bundle: "missing".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, OrchestrateError::UnknownBundle(ref b) if b == "missing"));
    }
}
