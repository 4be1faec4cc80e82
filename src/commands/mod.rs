//! CLI subcommand implementations.

pub mod apply;
pub mod run;
pub mod shell;
pub mod status;

use std::path::Path;

use anyhow::{bail, Result};

use crate::config::{Credentials, Settings};
use crate::provision::FileProvisioner;
use crate::topology::{resolver, ClusterTopology};

/// Everything a subcommand needs that is loaded once at startup.
pub struct CommandContext {
    pub settings: Settings,
    pub credentials: Credentials,
}

pub fn load_context(settings_path: Option<&Path>) -> Result<CommandContext> {
    let settings = Settings::load(settings_path)?;
    let credentials = Credentials::load(&settings.credentials_path)?;
    Ok(CommandContext {
        settings,
        credentials,
    })
}

/// Resolve a fresh topology snapshot from whichever node source the
/// settings configure.
pub fn resolve_topology(settings: &Settings) -> Result<ClusterTopology> {
    if let Some(cloud) = &settings.cloud {
        let provisioner = FileProvisioner::load(&cloud.inventory)?;
        Ok(resolver::resolve_cloud(cloud, &provisioner)?)
    } else if let Some(static_cfg) = &settings.static_nodes {
        Ok(resolver::resolve_static(static_cfg)?)
    } else {
        // Settings::load validates this, but keep the error honest.
        bail!("no node source configured")
    }
}
