//! Error taxonomy: configuration and invariant violations are fatal before
//! any remote action; remote failures carry the command and session context.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failure reported by a [`Provisioner`](crate::provision::Provisioner) read.
#[derive(Error, Debug)]
#[error("provisioner: {0}")]
pub struct ProvisionError(pub String);

/// Invariant violations raised while resolving the cluster topology.
///
/// Any of these aborts the resolve call outright — a partially built
/// topology is never returned.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("node '{node}': found {count} NICs, expected exactly 1")]
    NicCardinality { node: String, count: usize },

    #[error("node '{node}': NIC has {count} IP configurations, expected exactly 1")]
    IpConfigCardinality { node: String, count: usize },

    #[error("node '{node}': {count} NAT port mappings for {address}, expected exactly 1")]
    NatMappingCardinality {
        node: String,
        address: String,
        count: usize,
    },

    #[error("node '{node}': allow_workloads is set but the node is not a control-plane node")]
    WorkloadOverride { node: String },

    #[error("control-plane index {index} out of range, topology has {nodes} nodes")]
    ControlPlaneIndex { index: usize, nodes: usize },

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// Remote-channel failures. `Spawn` means the transport itself broke;
/// `CommandFailed` means the remote command ran and exited non-zero.
/// The `apply` polling loop retries only the latter.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{program} to {session} exited with {status}")]
    CommandFailed {
        program: &'static str,
        session: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("reading local artifact {path}: {source}")]
    LocalArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures raised by the operation orchestrator, precondition checks
/// included. A precondition failure is reported without any remote call.
#[derive(Error, Debug)]
pub enum OrchestrateError {
    #[error("no reachable control-plane node")]
    NoControlPlane,

    #[error("invalid node index {index}, topology has {nodes} nodes")]
    InvalidTarget { index: usize, nodes: usize },

    #[error("'{op}' requires a control-plane node, node {index} is a worker")]
    NotControlPlane { op: &'static str, index: usize },

    #[error("'{op}' cannot broadcast to all nodes")]
    BroadcastUnsupported { op: &'static str },

    #[error("node {index}: allow_workloads must not be set on a worker (it is implicit)")]
    WorkerOverride { index: usize },

    #[error("unknown bundle '{0}'")]
    UnknownBundle(String),

    #[error("staging {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
