//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// webapp-operator - keeps WebApp declarations converged
#[derive(Parser, Debug)]
#[command(name = "webapp-operator")]
#[command(version)]
#[command(about = "Convergence controller for WebApp declarations")]
#[command(
    long_about = "Keeps every WebApp declaration backed by a workload and a network exposure, and reports rollout status back onto the declaration."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller until interrupted
    Run {
        /// Config file (TOML, or JSON with a .json extension)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// WebApp manifests to declare at startup
        #[arg(short, long)]
        manifest: Vec<PathBuf>,

        /// Number of reconciler workers (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print the workload and exposure each manifest would produce
    Render {
        /// WebApp manifests to render
        #[arg(short, long, required = true)]
        manifest: Vec<PathBuf>,
    },
}
