//! Driver configuration
//!
//! Declares which applications an organization uses and how to reach their
//! drivers. Read from an optional TOML file and merged with command line
//! `--app` values.
//!
//! ```toml
//! [[apps]]
//! type = "upstream"
//! driver = "github"
//!
//! [drivers.github]
//! command = "forge-github --api https://github.example.com"
//!
//! [drivers.github.common]
//! owner = "acme"
//!
//! [drivers.github.create]
//! private = "true"
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::driver::{ActionParams, AppSpec, Driver, DriverRegistry};
use crate::error::{ForgeError, ForgeResult};
use crate::plugin::{PluginRepo, ProcessPlugin};
use crate::workspace::Workspace;

/// Prefix of driver executables
pub const DRIVER_EXECUTABLE_PREFIX: &str = "forge-";

/// Per-instance driver settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DriverConfig {
    /// Command line starting the driver, split like a shell would
    #[serde(default)]
    pub command: Option<String>,
    #[serde(flatten)]
    pub params: ActionParams,
}

/// Content of the driver parameter file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DriverConfigFile {
    #[serde(default)]
    pub apps: Vec<AppSpec>,
    /// Keyed by instance name
    #[serde(default)]
    pub drivers: BTreeMap<String, DriverConfig>,
}

impl DriverConfigFile {
    pub fn load(path: &Path) -> ForgeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForgeError::config(format!("unable to read '{}': {e}", path.display()))
        })?;
        let file = Self::parse(&content)?;
        debug!(file = %path.display(), apps = file.apps.len(), "Driver parameter file loaded");
        Ok(file)
    }

    pub fn parse(content: &str) -> ForgeResult<Self> {
        let file: Self = toml::from_str(content)?;
        for app in &file.apps {
            app.validate()?;
        }
        Ok(file)
    }

    /// Apps from the file followed by the `--app` values.
    pub fn app_specs(&self, cli_apps: &[String]) -> ForgeResult<Vec<AppSpec>> {
        let mut apps = self.apps.clone();
        for spec in cli_apps {
            apps.push(AppSpec::parse(spec)?);
        }

        let mut seen = BTreeSet::new();
        for app in &apps {
            if !seen.insert(app.instance_name()) {
                return Err(ForgeError::config(format!(
                    "driver instance '{}' is declared more than once",
                    app.instance_name()
                )));
            }
        }
        Ok(apps)
    }

    /// Command line of the driver behind `app`.
    ///
    /// A `command` from the file wins. Otherwise the executable is
    /// `forge-<driver>`, looked up in `drivers_path` when given.
    pub fn driver_command(
        &self,
        app: &AppSpec,
        drivers_path: Option<&Path>,
    ) -> ForgeResult<Vec<String>> {
        if let Some(command) = self
            .drivers
            .get(app.instance_name())
            .and_then(|d| d.command.as_deref())
        {
            let words = shlex::split(command).ok_or_else(|| {
                ForgeError::config(format!(
                    "invalid command for '{}': {command}",
                    app.instance_name()
                ))
            })?;
            if words.is_empty() {
                return Err(ForgeError::config(format!(
                    "empty command for '{}'",
                    app.instance_name()
                )));
            }
            return Ok(words);
        }

        let executable = format!("{DRIVER_EXECUTABLE_PREFIX}{}", app.driver);
        let program = match drivers_path {
            Some(dir) => dir.join(executable).display().to_string(),
            None => executable,
        };
        Ok(vec![program])
    }

    pub fn params(&self, instance: &str) -> ActionParams {
        self.drivers
            .get(instance)
            .map(|d| d.params.clone())
            .unwrap_or_default()
    }
}

/// Everything needed to set up a create run.
#[derive(Debug, Clone)]
pub struct CreateConfig {
    pub workspace: PathBuf,
    pub organization: Option<String>,
    pub infra: Option<String>,
    pub infra_upstream: Option<String>,
    pub apps: Vec<String>,
    pub config_file: Option<PathBuf>,
    pub drivers_path: Option<PathBuf>,
    pub plugin_timeout: Duration,
}

impl CreateConfig {
    /// Load the workspace record and apply organization/infra names.
    ///
    /// Names default to the workspace directory name and `<organization>-infra`.
    /// A name that differs from the one already recorded is rejected.
    pub fn open_workspace(&self) -> ForgeResult<Workspace> {
        let mut workspace = Workspace::new(&self.workspace);
        let loaded = workspace.load()?;

        let organization = match (&self.organization, loaded) {
            (Some(name), true) if name != &workspace.organization => {
                return Err(ForgeError::config(format!(
                    "organization '{name}' does not match '{}' recorded in the workspace",
                    workspace.organization
                )))
            }
            (_, true) => workspace.organization.clone(),
            (Some(name), false) => name.clone(),
            (None, false) => workspace.name().ok_or_else(|| {
                ForgeError::config("unable to derive an organization name from the workspace path")
            })?,
        };

        let infra = match (&self.infra, loaded) {
            (Some(name), true) if name != &workspace.infra.name => {
                return Err(ForgeError::config(format!(
                    "infra repository '{name}' does not match '{}' recorded in the workspace",
                    workspace.infra.name
                )))
            }
            (_, true) => workspace.infra.clone(),
            (Some(name), false) => PluginRepo::new(name),
            (None, false) => PluginRepo::new(format!("{organization}-infra")),
        };

        workspace.organization = organization;
        workspace.infra = infra;
        Ok(workspace)
    }

    /// Build the driver registry, one process-backed plugin per app.
    pub fn build_registry(&self) -> ForgeResult<DriverRegistry> {
        let file = match &self.config_file {
            Some(path) => DriverConfigFile::load(path)?,
            None => DriverConfigFile::default(),
        };

        let mut registry = DriverRegistry::new();
        for app in file.app_specs(&self.apps)? {
            let command = file.driver_command(&app, self.drivers_path.as_deref())?;
            let plugin = ProcessPlugin::new(app.instance_name(), command)?
                .with_timeout(self.plugin_timeout);
            let driver = Driver::new(&app, Box::new(plugin)).with_params(file.params(app.instance_name()));
            registry.register(driver)?;
        }
        Ok(registry)
    }
}
