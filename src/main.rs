mod commands;
mod config;
mod error;
mod ops;
mod provision;
mod remote;
mod topology;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kubewright",
    version,
    about = "Resolve cluster topology and orchestrate kubeadm node lifecycles"
)]
struct Cli {
    /// Path to settings.yaml (default: ~/.config/kubewright/settings.yaml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the topology and print every node with its reachability
    Status {
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Run one lifecycle operation and exit
    Run {
        /// Operation to run
        operation: commands::run::OpName,

        /// Target node index (default: the live control-plane node)
        #[arg(long)]
        node: Option<usize>,

        /// Target every node in index order
        #[arg(long)]
        all: bool,
    },

    /// Stage a manifest bundle on the control plane and apply it
    Apply {
        /// Bundle name from the settings `bundles` map
        bundle: String,
    },

    /// Interactive operation shell
    Shell,
}

fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let ctx = commands::load_context(cli.settings.as_deref())?;

    match cli.command {
        Commands::Status { format } => commands::status::run(&ctx, &format),
        Commands::Run {
            operation,
            node,
            all,
        } => commands::run::run(&ctx, operation, node, all),
        Commands::Apply { bundle } => commands::apply::run(&ctx, bundle),
        Commands::Shell => commands::shell::run(&ctx),
    }
}
