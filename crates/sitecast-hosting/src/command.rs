//! External command execution and hosting-engine feature installation.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{HostingError, HostingResult};
use crate::progress::{ProgressInfo, ProgressSink};

/// Default timeout for short engine commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs external programs.
pub struct CommandRunner;

impl CommandRunner {
    /// Run a command to completion and capture its output.
    pub async fn run_simple(
        program: &Path,
        args: &[String],
        timeout: Duration,
    ) -> HostingResult<Output> {
        debug!(program = %program.display(), ?args, "running command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        tokio::select! {
            result = child => result.map_err(|e| {
                HostingError::command(format!("failed to spawn {}: {e}", program.display()))
            }),
            _ = tokio::time::sleep(timeout) => Err(HostingError::command(format!(
                "{} timed out after {timeout:?}",
                program.display()
            ))),
        }
    }

    /// Run a command, forwarding each stdout/stderr line to a progress sink.
    ///
    /// There is no timeout: installation steps can legitimately run for a
    /// long time, and callers that want a deadline wrap the future.
    pub async fn run_with_progress(
        program: &Path,
        args: &[String],
        stage: &str,
        progress: &dyn ProgressSink,
    ) -> HostingResult<std::process::ExitStatus> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HostingError::command(format!("failed to spawn {}: {e}", program.display()))
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(bool, String)>();
        let stdout_tx = tx.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = stdout_tx.send((false, line));
                }
            }
        });
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = tx.send((true, line));
                }
            }
        });

        while let Some((is_err, line)) = rx.recv().await {
            if is_err {
                progress.report(ProgressInfo::warning(stage, 50, line));
            } else {
                progress.report(ProgressInfo::info(stage, 50, line));
            }
        }

        let _ = stdout_task.await;
        let _ = stderr_task.await;

        child
            .wait()
            .await
            .map_err(|e| HostingError::command(format!("failed to wait for command: {e}")))
    }
}

/// Installs the hosting engine when it is missing.
#[async_trait]
pub trait FeatureInstaller: Send + Sync {
    async fn install(&self, progress: &dyn ProgressSink) -> HostingResult<()>;
}

/// Installs the engine by running a package-management command.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The Windows optional-feature command enabling the web server role.
    pub fn windows_features() -> Self {
        Self::new(
            "dism.exe",
            [
                "/online",
                "/enable-feature",
                "/featurename:IIS-WebServerRole",
                "/featurename:IIS-WebServer",
                "/featurename:IIS-ManagementConsole",
                "/all",
                "/norestart",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }
}

#[async_trait]
impl FeatureInstaller for CommandInstaller {
    async fn install(&self, progress: &dyn ProgressSink) -> HostingResult<()> {
        progress.report(ProgressInfo::info(
            "install",
            0,
            format!("installing hosting engine via {}", self.program),
        ));

        let status = CommandRunner::run_with_progress(
            Path::new(&self.program),
            &self.args,
            "install",
            progress,
        )
        .await
        .map_err(|e| HostingError::EngineInstallFailed {
            exit_code: None,
            message: e.to_string(),
        })?;

        if !status.success() {
            warn!(program = %self.program, code = ?status.code(), "engine installation failed");
            return Err(HostingError::EngineInstallFailed {
                exit_code: status.code(),
                message: format!("{} exited with {status}", self.program),
            });
        }

        progress.report(ProgressInfo::info("install", 100, "hosting engine installed"));
        Ok(())
    }
}

/// Render command output for error messages, preferring stderr.
pub(crate) fn describe_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };
    format!("exit {:?}: {text}", output.status.code())
}
