//! # webapp-operator
//!
//! Entry point for the WebApp convergence controller.
//!
//! ## Run
//!
//! 1. **Configuration** - defaults, then the config file, then
//!    `WEBAPP_OPERATOR_*` variables, then command-line flags
//! 2. **Logging** - `RUST_LOG` if set, otherwise the configured filter
//! 3. **Seeding** - WebApps from the given manifests are declared in the store
//! 4. **Controller** - workers and the rollout simulator run until Ctrl+C
//!
//! ## Render
//!
//! Prints the workload and exposure each manifest would produce, without
//! starting anything.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use webapp_core::{Scheme, Shutdown};
use webapp_operator::cli::{Cli, Commands};
use webapp_operator::operator::shutdown_on_signal;
use webapp_operator::{ManifestLoader, Operator, OperatorConfig, render};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            manifest,
            workers,
        } => run(config.as_deref(), &manifest, workers).await,
        Commands::Render { manifest } => render_manifests(&manifest),
    }
}

async fn run(config_path: Option<&Path>, manifests: &[PathBuf], workers: Option<usize>) -> Result<()> {
    let config = load_config(config_path, workers)?;
    init_tracing(&config.log);
    info!(?config, "Configuration loaded");

    let scheme = Scheme::webapp_operator();
    let webapps = ManifestLoader::new(&scheme)?
        .load_all(manifests)
        .context("Failed to load manifests")?;

    let operator = Operator::new(&config).context("Failed to build operator")?;
    let seeded = operator.seed(webapps).await.context("Failed to seed WebApps")?;
    info!(seeded, "Manifests declared");

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(signal::ctrl_c(), shutdown.clone()));

    operator.run(shutdown).await.context("Operator failed")?;
    info!("Shutdown complete");
    Ok(())
}

fn render_manifests(manifests: &[PathBuf]) -> Result<()> {
    init_tracing("warn");

    let scheme = Scheme::webapp_operator();
    let webapps = ManifestLoader::new(&scheme)?
        .load_all(manifests)
        .context("Failed to load manifests")?;
    let output = render(&webapps, &scheme).context("Failed to render dependents")?;
    print!("{output}");
    Ok(())
}

fn load_config(path: Option<&Path>, workers: Option<usize>) -> Result<OperatorConfig> {
    let config = match path {
        Some(path) => OperatorConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => OperatorConfig::default(),
    };
    let config = config.with_env().context("Invalid environment override")?;
    let config = match workers {
        Some(workers) => config.workers(workers),
        None => config,
    };
    config.validate()?;
    Ok(config)
}

/// Initialize tracing, preferring `RUST_LOG` over `default_filter`.
///
/// Logs go to stderr so `render` output stays clean.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
