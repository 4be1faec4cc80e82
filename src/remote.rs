//! Remote channel — the ssh/scp transport behind every node operation.
//!
//! Bastion hopping is expressed entirely through [`Reachability`]; a proxied
//! descriptor turns into an OpenSSH `-J` jump. The orchestrator never learns
//! transport details beyond this trait.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::RemoteError;
use crate::topology::Reachability;

#[cfg_attr(test, automock)]
pub trait RemoteChannel {
    /// Runs `command` on the node. With `capture`, returns trimmed stdout;
    /// otherwise output goes straight to the operator's terminal.
    fn run(
        &self,
        reach: &Reachability,
        command: &str,
        capture: bool,
    ) -> Result<Option<String>, RemoteError>;

    /// Runs `command` with the local file `input` piped to stdin.
    fn run_with_input(
        &self,
        reach: &Reachability,
        command: &str,
        input: &Path,
    ) -> Result<(), RemoteError>;

    /// Copies a local file to `$HOME/<remote_name>` on the node.
    fn copy(
        &self,
        reach: &Reachability,
        local: &Path,
        remote_name: &str,
    ) -> Result<(), RemoteError>;
}

/// [`RemoteChannel`] shelling out to the OpenSSH client tools.
pub struct SshChannel {
    username: String,
}

impl SshChannel {
    pub fn new(username: String) -> Self {
        Self { username }
    }

    fn ssh_args(&self, reach: &Reachability) -> Vec<String> {
        let mut args = Vec::new();
        if let Reachability::Proxied {
            proxy_address,
            proxy_port,
            ..
        } = reach
        {
            args.push("-J".to_string());
            args.push(format!("{}@{proxy_address}:{proxy_port}", self.username));
        }
        args.push("-p".to_string());
        args.push(reach.port().to_string());
        args.push("-t".to_string());
        args.push(format!("{}@{}", self.username, reach.address()));
        args
    }

    fn scp_args(&self, reach: &Reachability, local: &Path, remote_name: &str) -> Vec<String> {
        // -O forces the legacy scp protocol; the node images ship no sftp
        // server.
        let mut args = vec!["-O".to_string()];
        if let Reachability::Proxied {
            proxy_address,
            proxy_port,
            ..
        } = reach
        {
            args.push("-J".to_string());
            args.push(format!("{}@{proxy_address}:{proxy_port}", self.username));
        }
        args.push("-P".to_string());
        args.push(reach.port().to_string());
        args.push(local.display().to_string());
        args.push(format!(
            "{}@{}:$HOME/{remote_name}",
            self.username,
            reach.address()
        ));
        args
    }
}

impl RemoteChannel for SshChannel {
    fn run(
        &self,
        reach: &Reachability,
        command: &str,
        capture: bool,
    ) -> Result<Option<String>, RemoteError> {
        debug!(session = %reach, command, capture, "running remote command");
        let mut cmd = Command::new("ssh");
        cmd.args(self.ssh_args(reach)).arg(command);

        if capture {
            let output = cmd.output().map_err(|e| RemoteError::Spawn {
                program: "ssh",
                source: e,
            })?;
            if !output.status.success() {
                return Err(RemoteError::CommandFailed {
                    program: "ssh",
                    session: reach.to_string(),
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
                });
            }
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            ))
        } else {
            let status = cmd.status().map_err(|e| RemoteError::Spawn {
                program: "ssh",
                source: e,
            })?;
            if !status.success() {
                return Err(RemoteError::CommandFailed {
                    program: "ssh",
                    session: reach.to_string(),
                    status,
                    stderr: String::new(),
                });
            }
            Ok(None)
        }
    }

    fn run_with_input(
        &self,
        reach: &Reachability,
        command: &str,
        input: &Path,
    ) -> Result<(), RemoteError> {
        debug!(session = %reach, command, input = %input.display(), "running remote command with stdin");
        let file = File::open(input).map_err(|e| RemoteError::LocalArtifact {
            path: input.to_path_buf(),
            source: e,
        })?;
        let status = Command::new("ssh")
            .args(self.ssh_args(reach))
            .arg(command)
            .stdin(Stdio::from(file))
            .status()
            .map_err(|e| RemoteError::Spawn {
                program: "ssh",
                source: e,
            })?;
        if !status.success() {
            return Err(RemoteError::CommandFailed {
                program: "ssh",
                session: reach.to_string(),
                status,
                stderr: String::new(),
            });
        }
        Ok(())
    }

    fn copy(
        &self,
        reach: &Reachability,
        local: &Path,
        remote_name: &str,
    ) -> Result<(), RemoteError> {
        debug!(session = %reach, local = %local.display(), remote_name, "copying file");
        let status = Command::new("scp")
            .args(self.scp_args(reach, local, remote_name))
            .status()
            .map_err(|e| RemoteError::Spawn {
                program: "scp",
                source: e,
            })?;
        if !status.success() {
            return Err(RemoteError::CommandFailed {
                program: "scp",
                session: reach.to_string(),
                status,
                stderr: String::new(),
            });
        }
        Ok(())
    }
}
