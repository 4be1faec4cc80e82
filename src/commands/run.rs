//! `kubewright run` — execute one lifecycle operation and exit.

use std::time::Instant;

use anyhow::{bail, Result};
use clap::ValueEnum;
use colored::Colorize;

use crate::commands::{resolve_topology, CommandContext};
use crate::ops::{CancelFlag, Operation, Orchestrator, Target};
use crate::remote::SshChannel;

/// Operation names accepted on the command line. `apply` has its own
/// subcommand because it takes a bundle argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OpName {
    InstallKeys,
    Reset,
    InstallRuntime,
    Init,
    Join,
}

impl From<OpName> for Operation {
    fn from(name: OpName) -> Self {
        match name {
            OpName::InstallKeys => Operation::InstallKeys,
            OpName::Reset => Operation::Reset,
            OpName::InstallRuntime => Operation::InstallRuntime,
            OpName::Init => Operation::Init,
            OpName::Join => Operation::Join,
        }
    }
}

pub fn run(ctx: &CommandContext, op: OpName, node: Option<usize>, all: bool) -> Result<()> {
    let target = select_target(op, node, all)?;
    execute(ctx, target, &Operation::from(op), CancelFlag::new())
}

/// Only `init` may default to the control-plane node. `join` against it
/// would read credentials from the very node being joined, so node-scoped
/// operations demand an explicit target.
fn select_target(op: OpName, node: Option<usize>, all: bool) -> Result<Target> {
    match (node, all) {
        (Some(_), true) => bail!("--node and --all are mutually exclusive"),
        (Some(index), false) => Ok(Target::Node(index)),
        (None, true) => Ok(Target::All),
        (None, false) => match op {
            OpName::Init => Ok(Target::ControlPlane),
            OpName::InstallRuntime | OpName::Join => {
                bail!("'{}' requires --node <index>", Operation::from(op).name())
            }
            OpName::InstallKeys | OpName::Reset => {
                bail!(
                    "'{}' requires --node <index> or --all",
                    Operation::from(op).name()
                )
            }
        },
    }
}

pub(crate) fn execute(
    ctx: &CommandContext,
    target: Target,
    op: &Operation,
    cancel: CancelFlag,
) -> Result<()> {
    let topology = resolve_topology(&ctx.settings)?;
    let channel = SshChannel::new(ctx.credentials.username.clone());
    let orchestrator = Orchestrator::new(&ctx.settings, &ctx.credentials, &channel, cancel);

    let started = Instant::now();
    orchestrator.execute(&topology, target, op)?;
    println!(
        "{} {} finished in {:.1}s",
        "::".blue().bold(),
        op.name(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
