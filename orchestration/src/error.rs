//! Orchestration error types
//!
//! Fatal conditions are `ForgeError` values. The recoverable "resource already
//! exists" condition is not an error: it travels as [`Outcome::Conflict`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for orchestration operations
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Driver state code reporting that the remote resource already exists.
pub const CONFLICT_STATE_CODE: u16 = 419;

/// Details of a resource a driver refused to create because it already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConflict {
    /// Driver instance that reported the conflict
    pub driver: String,
    /// Action that was refused
    pub action: String,
    /// Message returned by the driver
    pub message: String,
}

impl std::fmt::Display for ResourceConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "driver '{}' aborted '{}': {}",
            self.driver, self.action, self.message
        )
    }
}

/// Non-fatal result of a step that may meet an already existing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    /// Step completed
    Done,
    /// The driver reported the remote resource already exists
    Conflict(ResourceConflict),
}

impl Outcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Errors that can occur while bootstrapping the infra repository
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Several upstream drivers and none selected
    #[error(
        "--infra-upstream missing with multiple upstreams defined. Please select the appropriate \
         upstream for your infra repository or 'none'."
    )]
    AmbiguousUpstream { candidates: Vec<String> },

    /// No upstream-owning driver, but the user did not opt out of an upstream
    #[error(
        "Your workspace is empty and you did not identify where '{infra}' should be pushed (git upstream). \
         To fix this, you have several options:\n\
         You can confirm that you do not want to configure any upstream with '--infra-upstream none'.\n\
         Or you should define the upstream service with '--app upstream:<UpstreamDriver>[:<InstanceName>]'.\n\
         If you set multiple upstream instances, you will need to connect the appropriate one to the \
         infra repo with '--infra-upstream <InstanceName>'."
    )]
    MissingUpstream { infra: String },

    /// Resolved instance is not in the driver registry
    #[error("Unable to find driver instance '{instance}' in loaded drivers list.")]
    UnknownDriverInstance { instance: String },

    /// Driver result lacks an expected repository entry
    #[error("Unable to find repository '{repo}' in the result of driver '{driver}'")]
    ResultInconsistency { repo: String, driver: String },

    /// Infra repository could not be rebuilt from its upstream
    #[error("Unable to rebuild your workspace from the upstream '{repo}'. {reason}")]
    RestoreFailed { repo: String, reason: String },

    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    GitError { operation: String, message: String },

    /// Driver service could not be started or an action call failed
    #[error("Driver '{driver}' failed: {message}")]
    DriverError { driver: String, message: String },

    /// `--app` value is not `<type>:<driver>[:<instance>]`
    #[error("Invalid application definition '{spec}': {message}")]
    InvalidAppSpec { spec: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Workspace record could not be read or written
    #[error("Workspace error at {path}: {message}")]
    WorkspaceError { path: PathBuf, message: String },

    /// Infra existence check failed
    #[error("Failed to ensure infra exists. {source}")]
    InfraCheck {
        #[source]
        source: Box<ForgeError>,
    },

    /// A secondary driver create pipeline failed
    #[error("Failed to create '{instance}' source files. {source}")]
    DriverCreate {
        instance: String,
        #[source]
        source: Box<ForgeError>,
    },

    /// Infra state machine refused a transition
    #[error("Invalid infra state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Driver parameter file could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ForgeError {
    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GitError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a driver error
    pub fn driver(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DriverError {
            driver: driver.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a workspace error
    pub fn workspace(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::WorkspaceError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a restore error
    pub fn restore(repo: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RestoreFailed {
            repo: repo.into(),
            reason: reason.into(),
        }
    }

    /// Innermost cause, skipping the context wrappers
    pub fn root(&self) -> &ForgeError {
        match self {
            Self::InfraCheck { source } | Self::DriverCreate { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::GitError { message, .. } => {
                let lower = message.to_lowercase();
                lower.contains("lock")
                    || lower.contains("timeout")
                    || lower.contains("timed out")
                    || lower.contains("connection")
                    || lower.contains("another git process")
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Get recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self.root() {
            Self::AmbiguousUpstream { .. } => Some(
                "Pass '--infra-upstream <InstanceName>' naming one of the upstream instances, \
                 or '--infra-upstream none' to keep the infra repository local.",
            ),
            Self::MissingUpstream { .. } => None,
            Self::UnknownDriverInstance { .. } => Some(
                "The workspace references an instance that is not declared. Declare it with \
                 '--app upstream:<driver>:<instance>' or remove forge.json to start over.",
            ),
            Self::ResultInconsistency { .. } => Some(
                "The driver did not describe the infra repository. Check the driver version \
                 and its logs.",
            ),
            Self::RestoreFailed { .. } => Some(
                "The upstream refused to create the infra repository but it cannot be cloned \
                 either. Check the repository on the upstream service and your credentials.",
            ),
            Self::GitError { operation, message } => {
                let lower = message.to_lowercase();
                if lower.contains("lock") || lower.contains("another git process") {
                    Some(
                        "Git lock file conflict. Wait a moment and retry, or remove stale lock: \
                         rm -f .git/index.lock",
                    )
                } else if lower.contains("remote") && operation.contains("origin") {
                    Some("The infra repository already tracks another upstream. Check: git remote -v")
                } else if operation.contains("push") {
                    Some("Check the upstream URL and your push credentials: git push -v")
                } else {
                    Some("Check git status and repository state: git status")
                }
            }
            Self::DriverError { .. } => Some(
                "Check that the driver executable is installed (FORGE_DRIVERS_PATH) and \
                 answers within the plugin timeout (FORGE_PLUGIN_TIMEOUT_SECS).",
            ),
            Self::InvalidAppSpec { .. } => {
                Some("Use '--app <type>:<driver>[:<instance>]', for example '--app ci:jenkins'.")
            }
            Self::ConfigError { .. } => Some(
                "Check the command line and the driver parameter file. Organization and infra \
                 names cannot change on an existing workspace.",
            ),
            Self::WorkspaceError { .. } => Some(
                "The workspace record may be corrupted. Fix or remove forge.json in the \
                 workspace directory.",
            ),
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Some("File or directory not found. Check the path exists.")
                }
                std::io::ErrorKind::PermissionDenied => {
                    Some("Permission denied. Check file permissions: ls -la <path>")
                }
                _ => Some("IO error occurred. Check disk space and file permissions."),
            },
            Self::Json(_) => Some("JSON parsing failed. Validate the file syntax."),
            Self::Toml(_) => Some("Driver parameter file is not valid TOML."),
            Self::InvalidStateTransition { .. } => None,
            Self::InfraCheck { .. } | Self::DriverCreate { .. } => None,
        }
    }

    /// Get error with recovery suggestion formatted
    pub fn with_suggestion(&self) -> String {
        match self.recovery_suggestion() {
            Some(suggestion) => format!("{}\n\nRecovery: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
