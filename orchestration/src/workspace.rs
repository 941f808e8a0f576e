//! Workspace record
//!
//! Local, per-organization data that is not kept in any git repository:
//! which infra repository the workspace holds and which upstream owns it.
//! Persisted as JSON in a fixed file inside the workspace directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::driver::{DriverCategory, NO_UPSTREAM};
use crate::error::{ForgeError, ForgeResult};
use crate::plugin::PluginRepo;

/// Workspace record file name
pub const WORKSPACE_FILE: &str = "forge.json";

/// Which driver instance owns the infra repository remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResolvedUpstream {
    /// Not decided yet
    #[default]
    Unresolved,
    /// Explicitly disabled with `--infra-upstream none`
    Disabled,
    /// Owned by the named driver instance
    Instance(String),
}

impl ResolvedUpstream {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    pub fn instance(&self) -> Option<&str> {
        match self {
            Self::Instance(name) => Some(name),
            _ => None,
        }
    }
}

impl From<String> for ResolvedUpstream {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Self::Unresolved,
            NO_UPSTREAM => Self::Disabled,
            _ => Self::Instance(value),
        }
    }
}

impl From<ResolvedUpstream> for String {
    fn from(value: ResolvedUpstream) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ResolvedUpstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => Ok(()),
            Self::Disabled => f.write_str(NO_UPSTREAM),
            Self::Instance(name) => f.write_str(name),
        }
    }
}

/// Workspace data saved at create time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    /// Organization name
    #[serde(default)]
    pub organization: String,
    /// Driver implementing the infra upstream
    #[serde(default)]
    pub driver: String,
    /// Infra upstream instance
    #[serde(default)]
    pub instance: ResolvedUpstream,
    /// Infra repository
    #[serde(default)]
    pub infra: PluginRepo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    path: PathBuf,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Workspace directory name
    pub fn name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn file(&self) -> PathBuf {
        self.path.join(WORKSPACE_FILE)
    }

    /// Local clone of the infra repository
    pub fn infra_path(&self) -> PathBuf {
        self.path.join(&self.infra.name)
    }

    /// Where drivers of `category` write their source files
    pub fn source_path(&self, category: &DriverCategory) -> PathBuf {
        self.infra_path().join("apps").join(category.as_str())
    }

    /// Directory holding the driver service sockets
    pub fn socket_path(&self) -> PathBuf {
        self.path.join("lib")
    }

    /// Create the workspace directory if missing.
    pub fn ensure_exists(&self) -> ForgeResult<&Path> {
        if !self.path.is_dir() {
            std::fs::create_dir_all(&self.path).map_err(|e| {
                ForgeError::workspace(
                    &self.path,
                    format!("unable to create initial workspace tree: {e}"),
                )
            })?;
        }
        Ok(&self.path)
    }

    /// Load a previous run's record. Returns `false` when there is none.
    pub fn load(&mut self) -> ForgeResult<bool> {
        let file = self.file();
        if !file.exists() {
            debug!(file = %file.display(), "Workspace record not found, nothing loaded");
            return Ok(false);
        }

        let content = std::fs::read_to_string(&file)
            .map_err(|e| ForgeError::workspace(&file, format!("unable to read: {e}")))?;
        let mut loaded: Workspace = serde_json::from_str(&content)
            .map_err(|e| ForgeError::workspace(&file, format!("unable to load: {e}")))?;
        loaded.path = std::mem::take(&mut self.path);
        *self = loaded;

        debug!(file = %file.display(), "Workspace record loaded");
        Ok(true)
    }

    /// Write the record, creating the workspace directory if needed.
    pub fn save(&mut self) -> ForgeResult<()> {
        self.ensure_exists()?;
        let file = self.file();

        self.updated_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&file, json)
            .map_err(|e| ForgeError::workspace(&file, format!("unable to create/update: {e}")))?;

        debug!(file = %file.display(), "Workspace record saved");
        Ok(())
    }
}
