//! Session context shared by the orchestration components.
//!
//! One `Session` lives for one invocation and owns every registered driver.
//! Components take it by reference; each documents the fields it touches.

use crate::driver::{DriverOptions, DriverRegistry, NO_UPSTREAM};
use crate::workspace::Workspace;

/// State of one orchestration run.
#[derive(Debug)]
pub struct Session {
    pub organization: String,
    pub drivers: DriverRegistry,
    /// Value of `--infra-upstream`, if given
    pub requested_upstream: Option<String>,
    /// Remote URL of the infra repository, once known
    pub infra_upstream: Option<String>,
    /// Content of the infra repository README
    pub infra_readme: String,
    pub workspace: Workspace,
    pub driver_options: DriverOptions,
}

impl Session {
    /// Build a session around a loaded (or fresh) workspace record.
    pub fn new(workspace: Workspace, drivers: DriverRegistry) -> Self {
        let organization = workspace.organization.clone();
        let infra_upstream = Some(workspace.infra.upstream.clone()).filter(|url| !url.is_empty());
        Self {
            infra_readme: format!("Infrastructure Repository for the organization {organization}"),
            organization,
            drivers,
            requested_upstream: None,
            infra_upstream,
            workspace,
            driver_options: DriverOptions::new(),
        }
    }

    pub fn with_requested_upstream(mut self, requested: Option<String>) -> Self {
        self.requested_upstream = requested;
        self
    }

    /// Whether the user asked for no upstream at all
    pub fn upstream_disabled(&self) -> bool {
        self.requested_upstream.as_deref() == Some(NO_UPSTREAM)
    }

    pub fn infra_name(&self) -> &str {
        &self.workspace.infra.name
    }

    /// Record the infra repository remote, in the session and the workspace record.
    pub fn set_infra_upstream(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.workspace.infra.upstream = url.clone();
        self.workspace.infra.exist = true;
        self.infra_upstream = Some(url);
    }
}
