//! Forge orchestration library
//!
//! Bootstraps the infrastructure of an organization:
//! - Resolves which upstream driver owns the infra repository remote
//! - Guarantees the infra repository exists locally, restoring it from an
//!   existing upstream when needed
//! - Runs the create pipeline (create, commit, push, maintain) of every driver
//! - Stops every driver service and saves the workspace record on exit
//!
//! # Usage
//!
//! ```no_run
//! # async fn run() -> orchestration::ForgeResult<()> {
//! use orchestration::{CreateConfig, GitManager, Orchestrator, Session};
//! # let config: CreateConfig = unimplemented!();
//! let workspace = config.open_workspace()?;
//! let repo = GitManager::new(workspace.infra_path(), "[forge]");
//! let session = Session::new(workspace, config.build_registry()?)
//!     .with_requested_upstream(config.infra_upstream.clone());
//! Orchestrator::new(session, repo).create().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod create;
pub mod driver;
pub mod error;
pub mod git_manager;
pub mod infra;
pub mod lifecycle;
pub mod plugin;
pub mod session;
pub mod state_machine;
pub mod upstream;
pub mod workspace;

pub use config::{CreateConfig, DriverConfigFile};
pub use create::{Orchestrator, Release};
pub use driver::{AppSpec, Driver, DriverCategory, DriverOptions, DriverRegistry, NO_UPSTREAM};
pub use error::{ForgeError, ForgeResult, Outcome, ResourceConflict};
pub use git_manager::{GitManager, InfraRepo};
pub use plugin::{PluginData, PluginRepo, PluginResult, PluginService, ProcessPlugin};
pub use session::Session;
pub use state_machine::{InfraState, InfraStateMachine};
pub use workspace::{ResolvedUpstream, Workspace};
