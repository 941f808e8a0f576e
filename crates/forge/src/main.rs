//! forge: bootstrap an organization's infrastructure
//!
//! # Usage
//!
//! ```bash
//! # Infra repository pushed to GitHub, plus a Jenkins instance
//! forge --workspace ~/acme create --app upstream:github --app ci:jenkins
//!
//! # Keep the infra repository local
//! forge create --app ci:jenkins --infra-upstream none
//!
//! # Drivers from a custom directory, parameters from a file
//! FORGE_DRIVERS_PATH=/opt/forge/drivers forge create --config drivers.toml
//! ```

mod cli;
mod config;

use anyhow::Result;
use clap::Parser;
use orchestration::{GitManager, Orchestrator, Session};
use tracing::{error, info};

use cli::{Cli, Command};
use config::ForgeConfig;

/// Prefix of every commit forge writes to the infra repository
const COMMIT_PREFIX: &str = "[forge]";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let result = match &cli.command {
        Command::Create(args) => {
            let config = ForgeConfig::default().create_config(&cli, args)?;
            create(config).await
        }
    };

    if let Err(e) = result {
        error!("{}", e.with_suggestion());
        std::process::exit(1);
    }
    Ok(())
}

async fn create(config: orchestration::CreateConfig) -> orchestration::ForgeResult<()> {
    let workspace = config.open_workspace()?;
    info!(
        organization = %workspace.organization,
        workspace = %workspace.path().display(),
        infra = %workspace.infra.name,
        "Forge create starting"
    );

    let drivers = config.build_registry()?;
    let repo = GitManager::new(workspace.infra_path(), COMMIT_PREFIX);
    let session = Session::new(workspace, drivers).with_requested_upstream(config.infra_upstream);

    Orchestrator::new(session, repo).create().await
}
