//! Plugin service contract
//!
//! A driver is backed by a service process. The orchestrator only sees it
//! through [`PluginService`]; the concrete transport lives in [`process`].

pub mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ForgeResult, CONFLICT_STATE_CODE};

pub use process::ProcessPlugin;

/// Repository as described by a driver result or the workspace record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRepo {
    /// Repository name
    #[serde(default)]
    pub name: String,
    /// Whether the repository exists on the upstream service
    #[serde(default)]
    pub exist: bool,
    /// Remote URL to push to / clone from
    #[serde(default)]
    pub upstream: String,
}

impl PluginRepo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Payload of a driver action result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginData {
    /// Human readable status block
    #[serde(default)]
    pub status: String,
    /// Repositories the driver knows about, keyed by name
    #[serde(default)]
    pub repos: BTreeMap<String, PluginRepo>,
    /// Options to reuse at maintain time
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Generated files, relative to the driver source path
    #[serde(default)]
    pub files: Vec<String>,
    /// Error reported by the driver, empty on success
    #[serde(default)]
    pub error_message: String,
}

/// Structured output of one driver action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResult {
    #[serde(default = "default_state_code")]
    pub state_code: u16,
    #[serde(default)]
    pub data: PluginData,
}

fn default_state_code() -> u16 {
    200
}

impl PluginResult {
    /// Successful result carrying `data`
    pub fn ok(data: PluginData) -> Self {
        Self {
            state_code: default_state_code(),
            data,
        }
    }

    /// Conflict result: the remote resource already exists
    pub fn conflict(message: impl Into<String>, repos: BTreeMap<String, PluginRepo>) -> Self {
        Self {
            state_code: CONFLICT_STATE_CODE,
            data: PluginData {
                error_message: message.into(),
                repos,
                ..PluginData::default()
            },
        }
    }

    /// Whether the driver refused because the resource already exists
    pub fn is_conflict(&self) -> bool {
        self.state_code == CONFLICT_STATE_CODE
    }

    /// Whether the driver reported a failure other than a conflict
    pub fn is_failure(&self) -> bool {
        !self.is_conflict() && (self.state_code >= 400 || !self.data.error_message.is_empty())
    }

    /// Repository entry for `name`, if the driver described it
    pub fn repo(&self, name: &str) -> Option<&PluginRepo> {
        self.data.repos.get(name)
    }
}

/// Connection to a driver's backing service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PluginService: Send {
    /// Bind the connection to a workspace root
    fn init(&mut self, workspace: &Path) -> ForgeResult<()>;

    /// Directory where the driver writes its generated source files
    fn set_source_path(&mut self, path: PathBuf);

    /// Workspace directory exposed to the driver
    fn set_workspace_path(&mut self, path: PathBuf);

    /// Directory holding the service socket
    fn set_socket_path(&mut self, path: PathBuf);

    /// Start the service. Starting a running service is a no-op.
    async fn start_service(&mut self) -> ForgeResult<()>;

    /// Run one action with its parameter mapping
    async fn run_action(
        &mut self,
        action: &str,
        args: &BTreeMap<String, String>,
    ) -> ForgeResult<PluginResult>;

    /// Stop the service. Stopping a stopped service is a no-op.
    async fn stop_service(&mut self) -> ForgeResult<()>;
}
