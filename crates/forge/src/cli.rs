//! Command line surface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Bootstrap an organization's infra repository and application drivers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    /// Workspace directory (overrides FORGE_WORKSPACE)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Organization name, defaults to the workspace directory name
    #[arg(long, global = true)]
    pub organization: Option<String>,

    /// Infra repository name, defaults to `<organization>-infra`
    #[arg(long, global = true)]
    pub infra: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the infra repository and the sources of every application
    Create(CreateArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Instance owning the infra repository upstream, or 'none'
    #[arg(long)]
    pub infra_upstream: Option<String>,

    /// Application as `<type>:<driver>[:<instance>]`, repeatable
    #[arg(long = "app", value_name = "TYPE:DRIVER[:INSTANCE]")]
    pub apps: Vec<String>,

    /// Driver parameter file (overrides FORGE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding forge-<driver> executables (overrides FORGE_DRIVERS_PATH)
    #[arg(long)]
    pub drivers_path: Option<PathBuf>,

    /// Seconds a driver gets to answer (overrides FORGE_PLUGIN_TIMEOUT_SECS)
    #[arg(long)]
    pub plugin_timeout: Option<u64>,
}
