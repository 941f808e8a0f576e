//! Process-backed plugin service
//!
//! The driver runs as a long-lived child process speaking newline-delimited
//! JSON over stdin/stdout. Every exchange is bounded by the connection timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use super::{PluginResult, PluginService};
use crate::error::{ForgeError, ForgeResult};

/// Default time a driver gets to answer
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(32);

/// First line a driver writes once it is ready to serve actions.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHello {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    args: &'a BTreeMap<String, String>,
}

struct RunningService {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Driver service backed by a child process.
pub struct ProcessPlugin {
    instance: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
    workspace: Option<PathBuf>,
    source_path: Option<PathBuf>,
    workspace_path: Option<PathBuf>,
    socket_path: Option<PathBuf>,
    service: Option<RunningService>,
}

impl ProcessPlugin {
    /// Plugin for `instance`, launched as `command[0] command[1..] service ...`.
    pub fn new(instance: impl Into<String>, command: Vec<String>) -> ForgeResult<Self> {
        let instance = instance.into();
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| ForgeError::driver(&instance, "empty driver command"))?;
        Ok(Self {
            instance,
            program,
            args: parts.collect(),
            timeout: DEFAULT_TIMEOUT,
            workspace: None,
            source_path: None,
            workspace_path: None,
            socket_path: None,
            service: None,
        })
    }

    /// Override the connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.service.is_some()
    }

    fn socket_file(&self) -> Option<PathBuf> {
        self.socket_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.sock", self.instance)))
    }

    async fn handshake(&mut self) -> ForgeResult<ServiceHello> {
        let line = self.read_line("service hello").await?;
        serde_json::from_str(&line).map_err(|e| {
            ForgeError::driver(&self.instance, format!("invalid service hello '{line}': {e}"))
        })
    }

    async fn read_line(&mut self, what: &str) -> ForgeResult<String> {
        let timeout = self.timeout;
        let instance = self.instance.clone();
        let service = self
            .service
            .as_mut()
            .ok_or_else(|| ForgeError::driver(&instance, "service is not started"))?;

        match tokio::time::timeout(timeout, service.stdout.next_line()).await {
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Ok(None)) => Err(ForgeError::driver(
                &instance,
                format!("service exited while waiting for {what}"),
            )),
            Ok(Err(e)) => Err(ForgeError::driver(
                &instance,
                format!("failed to read {what}: {e}"),
            )),
            Err(_) => Err(ForgeError::driver(
                &instance,
                format!("no {what} after {}s", timeout.as_secs()),
            )),
        }
    }
}

#[async_trait]
impl PluginService for ProcessPlugin {
    fn init(&mut self, workspace: &Path) -> ForgeResult<()> {
        if !workspace.is_dir() {
            return Err(ForgeError::driver(
                &self.instance,
                format!("workspace '{}' is not a directory", workspace.display()),
            ));
        }
        self.workspace = Some(workspace.to_path_buf());
        Ok(())
    }

    fn set_source_path(&mut self, path: PathBuf) {
        self.source_path = Some(path);
    }

    fn set_workspace_path(&mut self, path: PathBuf) {
        self.workspace_path = Some(path);
    }

    fn set_socket_path(&mut self, path: PathBuf) {
        self.socket_path = Some(path);
    }

    async fn start_service(&mut self) -> ForgeResult<()> {
        if self.service.is_some() {
            return Ok(());
        }

        for dir in [&self.source_path, &self.socket_path].into_iter().flatten() {
            std::fs::create_dir_all(dir)?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("service")
            .arg("--instance")
            .arg(&self.instance);
        if let Some(path) = &self.workspace_path {
            cmd.arg("--workspace").arg(path);
        }
        if let Some(path) = &self.source_path {
            cmd.arg("--source").arg(path);
        }
        if let Some(path) = self.socket_file() {
            cmd.arg("--socket").arg(path);
        }
        if let Some(dir) = &self.workspace {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ForgeError::driver(
                &self.instance,
                format!("unable to start '{}': {e}", self.program),
            )
        })?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ForgeError::driver(&self.instance, "service stdout not captured"))?;

        self.service = Some(RunningService {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        });

        let hello = match self.handshake().await {
            Ok(hello) => hello,
            Err(e) => {
                if let Some(mut service) = self.service.take() {
                    let _ = service.child.kill().await;
                }
                return Err(e);
            }
        };
        debug!(
            instance = %self.instance,
            service = %hello.name,
            version = hello.version.as_deref().unwrap_or("unknown"),
            "Driver service started"
        );
        Ok(())
    }

    async fn run_action(
        &mut self,
        action: &str,
        args: &BTreeMap<String, String>,
    ) -> ForgeResult<PluginResult> {
        let mut request = serde_json::to_string(&ActionRequest { action, args })?;
        request.push('\n');

        let instance = self.instance.clone();
        let stdin = self
            .service
            .as_mut()
            .and_then(|service| service.stdin.as_mut())
            .ok_or_else(|| ForgeError::driver(&instance, "service is not started"))?;
        stdin
            .write_all(request.as_bytes())
            .await
            .map_err(|e| ForgeError::driver(&instance, format!("failed to send '{action}': {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ForgeError::driver(&instance, format!("failed to send '{action}': {e}")))?;

        let line = self.read_line(&format!("'{action}' result")).await?;
        serde_json::from_str(&line).map_err(|e| {
            ForgeError::driver(&instance, format!("invalid '{action}' result: {e}"))
        })
    }

    async fn stop_service(&mut self) -> ForgeResult<()> {
        let Some(mut service) = self.service.take() else {
            return Ok(());
        };

        // Closing stdin asks the service to exit.
        drop(service.stdin.take());
        match tokio::time::timeout(self.timeout, service.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(instance = %self.instance, %status, "Driver service stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ForgeError::driver(
                &self.instance,
                format!("failed to wait for service: {e}"),
            )),
            Err(_) => {
                warn!(instance = %self.instance, "Driver service did not exit, killing it");
                service.child.kill().await.map_err(|e| {
                    ForgeError::driver(&self.instance, format!("failed to kill service: {e}"))
                })
            }
        }
    }
}
