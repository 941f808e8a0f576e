use anyhow::{Context, Result};
use orchestration::CreateConfig;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{Cli, CreateArgs};

/// Seconds a driver gets to answer, matching the plugin default
const DEFAULT_PLUGIN_TIMEOUT_SECS: u64 = 32;

/// Settings taken from the environment, overridden by the command line.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// None = current directory
    pub workspace: Option<PathBuf>,
    /// None = resolve driver executables through PATH
    pub drivers_path: Option<PathBuf>,
    pub plugin_timeout: Duration,
    pub config_file: Option<PathBuf>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::var("FORGE_WORKSPACE").ok().map(PathBuf::from),
            drivers_path: std::env::var("FORGE_DRIVERS_PATH").ok().map(PathBuf::from),
            plugin_timeout: Duration::from_secs(
                std::env::var("FORGE_PLUGIN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_PLUGIN_TIMEOUT_SECS),
            ),
            config_file: std::env::var("FORGE_CONFIG").ok().map(PathBuf::from),
        }
    }
}

impl ForgeConfig {
    /// Merge the command line into the environment settings.
    pub fn create_config(self, cli: &Cli, args: &CreateArgs) -> Result<CreateConfig> {
        let workspace = match cli.workspace.clone().or(self.workspace) {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to read the current directory")?,
        };
        let workspace = if workspace.is_absolute() {
            workspace
        } else {
            std::env::current_dir()
                .context("Failed to read the current directory")?
                .join(workspace)
        };

        Ok(CreateConfig {
            workspace,
            organization: cli.organization.clone(),
            infra: cli.infra.clone(),
            infra_upstream: args.infra_upstream.clone(),
            apps: args.apps.clone(),
            config_file: args.config.clone().or(self.config_file),
            drivers_path: args.drivers_path.clone().or(self.drivers_path),
            plugin_timeout: args
                .plugin_timeout
                .map(Duration::from_secs)
                .unwrap_or(self.plugin_timeout),
        })
    }
}
