//! `kubewright apply` — stage a manifest bundle on the control plane and
//! apply it until the cluster accepts it.

use anyhow::Result;

use crate::commands::CommandContext;
use crate::ops::{CancelFlag, Operation, Target};

pub fn run(ctx: &CommandContext, bundle: String) -> Result<()> {
    super::run::execute(
        ctx,
        Target::ControlPlane,
        &Operation::Apply { bundle },
        CancelFlag::new(),
    )
}
