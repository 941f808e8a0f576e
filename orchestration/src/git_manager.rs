//! Git manager for the infra repository
//!
//! Converges the local infra repository with its (optional) upstream and
//! records driver output as commits.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::error::{ForgeError, ForgeResult};

/// Retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds
const RETRY_BASE_DELAY_MS: u64 = 100;

const REMOTE: &str = "origin";
const README: &str = "README.md";

/// Backoff before retry `attempt`: 100ms, 200ms, 400ms, etc.
fn retry_delay_ms(attempt: u32) -> u64 {
    RETRY_BASE_DELAY_MS.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
}

/// Git operations the orchestrator needs on the infra repository.
pub trait InfraRepo {
    /// Make sure the directory is a git repository
    fn ensure_initialized(&self) -> ForgeResult<()>;

    /// Make sure the repository has at least one commit and, when `upstream`
    /// is given, tracks it as `origin`. Existing remote history is adopted.
    fn ensure_synced(&self, upstream: Option<&str>, readme: &str) -> ForgeResult<()>;

    /// Stage paths, relative to the repository root
    fn stage(&self, paths: &[PathBuf]) -> ForgeResult<()>;

    /// Commit staged content, returning the new commit hash
    fn commit(&self, message: &str) -> ForgeResult<String>;

    /// Push the current branch to `origin`
    fn push(&self) -> ForgeResult<()>;
}

/// Git state manager
pub struct GitManager {
    working_dir: PathBuf,
    commit_prefix: String,
    identity: Option<(String, String)>,
}

impl GitManager {
    /// Create manager for working directory
    pub fn new(working_dir: impl AsRef<Path>, commit_prefix: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            commit_prefix: commit_prefix.into(),
            identity: None,
        }
    }

    /// Commit as this author instead of the user's git configuration
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run git command and return output
    fn run_git(&self, args: &[&str]) -> ForgeResult<String> {
        let mut cmd = Command::new("git");
        if let Some((name, email)) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={name}"))
                .arg("-c")
                .arg(format!("user.email={email}"));
        }
        let output = cmd
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| ForgeError::git("execute", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ForgeError::git(args.join(" "), stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run git command with automatic retry for transient failures
    ///
    /// Uses exponential backoff, see [`retry_delay_ms`].
    fn run_git_with_retry(&self, args: &[&str]) -> ForgeResult<String> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            match self.run_git(args) {
                Ok(output) => return Ok(output),
                Err(e) => {
                    if e.is_retryable() && attempt < MAX_RETRIES {
                        let delay = retry_delay_ms(attempt);
                        debug!(attempt, delay_ms = delay, "git {} failed, retrying: {e}", args[0]);
                        std::thread::sleep(std::time::Duration::from_millis(delay));
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ForgeError::git("retry", "Max retries exceeded")))
    }

    /// Whether the working directory is the root of a git repository
    pub fn is_repository(&self) -> bool {
        self.working_dir.join(".git").exists()
    }

    /// Whether HEAD points to a commit
    pub fn has_commits(&self) -> bool {
        self.run_git(&["rev-parse", "--verify", "--quiet", "HEAD"])
            .is_ok()
    }

    /// Get current commit hash (short)
    pub fn current_commit(&self) -> ForgeResult<String> {
        self.run_git(&["rev-parse", "--short", "HEAD"])
    }

    /// Number of commits reachable from HEAD
    pub fn commit_count(&self) -> ForgeResult<usize> {
        if !self.has_commits() {
            return Ok(0);
        }
        let output = self.run_git(&["rev-list", "--count", "HEAD"])?;
        output
            .parse()
            .map_err(|_| ForgeError::git("count", "Failed to parse commit count"))
    }

    /// URL of `origin`, if configured
    pub fn remote_url(&self) -> Option<String> {
        self.run_git(&["remote", "get-url", REMOTE]).ok()
    }

    fn ensure_remote(&self, upstream: &str) -> ForgeResult<()> {
        match self.remote_url() {
            None => {
                self.run_git(&["remote", "add", REMOTE, upstream])?;
                info!(upstream, "Infra repository remote set");
                Ok(())
            }
            Some(current) if current == upstream => Ok(()),
            Some(current) => Err(ForgeError::git(
                format!("remote {REMOTE}"),
                format!("remote '{REMOTE}' is '{current}', expected '{upstream}'"),
            )),
        }
    }

    /// Branch of `origin` to adopt, if the remote has any history
    fn remote_branch(&self) -> ForgeResult<Option<String>> {
        let output = self.run_git(&[
            "for-each-ref",
            "--format=%(refname:short)",
            &format!("refs/remotes/{REMOTE}"),
        ])?;
        let branches: Vec<&str> = output
            .lines()
            .map(str::trim)
            .filter(|b| !b.is_empty() && !b.ends_with("/HEAD") && *b != REMOTE)
            .collect();

        let preferred = ["main", "master"]
            .iter()
            .map(|name| format!("{REMOTE}/{name}"))
            .find(|candidate| branches.contains(&candidate.as_str()));
        Ok(preferred.or_else(|| branches.first().map(|b| b.to_string())))
    }

    fn adopt_remote_history(&self) -> ForgeResult<bool> {
        self.run_git_with_retry(&["fetch", REMOTE])?;
        let Some(remote_branch) = self.remote_branch()? else {
            return Ok(false);
        };
        let local_branch = remote_branch
            .strip_prefix(&format!("{REMOTE}/"))
            .unwrap_or(&remote_branch)
            .to_string();
        self.run_git(&["checkout", "-B", &local_branch, "--track", &remote_branch])?;
        info!(branch = %remote_branch, "Infra repository restored from upstream");
        Ok(true)
    }

    fn create_first_commit(&self, readme: &str) -> ForgeResult<()> {
        std::fs::write(self.working_dir.join(README), format!("{readme}\n"))?;
        self.run_git(&["add", README])?;
        let message = format!("{} Initial infra repository", self.commit_prefix);
        self.run_git_with_retry(&["commit", "-m", message.trim()])?;
        info!(dir = %self.working_dir.display(), "Infra repository first commit created");
        Ok(())
    }
}

impl InfraRepo for GitManager {
    fn ensure_initialized(&self) -> ForgeResult<()> {
        if self.is_repository() {
            debug!(dir = %self.working_dir.display(), "Infra repository already initialized");
            return Ok(());
        }
        std::fs::create_dir_all(&self.working_dir)?;
        self.run_git(&["init"])?;
        info!(dir = %self.working_dir.display(), "Infra repository initialized");
        Ok(())
    }

    fn ensure_synced(&self, upstream: Option<&str>, readme: &str) -> ForgeResult<()> {
        self.ensure_initialized()?;

        if let Some(upstream) = upstream {
            self.ensure_remote(upstream)?;
        }
        if self.has_commits() {
            return Ok(());
        }
        if upstream.is_some() && self.adopt_remote_history()? {
            return Ok(());
        }
        self.create_first_commit(readme)
    }

    fn stage(&self, paths: &[PathBuf]) -> ForgeResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_git_with_retry(&args)?;
        Ok(())
    }

    fn commit(&self, message: &str) -> ForgeResult<String> {
        let message = format!("{} {}", self.commit_prefix, message);
        self.run_git_with_retry(&["commit", "--allow-empty", "-m", message.trim()])?;
        self.current_commit()
    }

    fn push(&self) -> ForgeResult<()> {
        self.run_git_with_retry(&["push", "-u", REMOTE, "HEAD"])?;
        Ok(())
    }
}
