//! Command execution for the watchdog
//!
//! Handles:
//! - Shell command execution with timeout (`sh -c` / `cmd /C`)
//! - The configured reboot command, chosen per OS and run verbatim
//! - Dry-run mode that only reports what would have been executed

use crate::config::RebootConfig;
use crate::error::{Result, WatchdogError};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

/// Upper bound for the reboot command itself (it normally only schedules the reboot)
pub const REBOOT_COMMAND_TIMEOUT_SECS: u32 = 60;

/// Command execution result
#[derive(Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
}

/// Cross-platform command executor
pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute shell command with timeout
    pub async fn execute_shell_command(command: &str, timeout_secs: u32) -> ExecutionResult {
        debug!("Executing shell command: {} (timeout: {}s)", command, timeout_secs);

        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = AsyncCommand::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = AsyncCommand::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        };
        match Self::run(&mut cmd, command, timeout_secs).await {
            Ok((output, exit_code)) => ExecutionResult {
                success: exit_code == 0,
                output,
                error: None,
                exit_code: Some(exit_code),
            },
            Err(e) => ExecutionResult {
                success: false,
                output: String::new(),
                error: Some(e.to_string()),
                exit_code: None,
            },
        }
    }

    async fn run(
        cmd: &mut AsyncCommand,
        command: &str,
        timeout_secs: u32,
    ) -> Result<(String, i32)> {
        let output = tokio::time::timeout(
            Duration::from_secs(u64::from(timeout_secs)),
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| WatchdogError::Command {
            command: command.to_string(),
            details: format!("timed out after {timeout_secs}s"),
        })?
        .map_err(|e| WatchdogError::Command {
            command: command.to_string(),
            details: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined_output = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\nSTDERR:\n{}", stdout, stderr)
        };

        let exit_code = output.status.code().unwrap_or(-1);

        Ok((combined_output, exit_code))
    }
}

/// Something that can restart the local machine
pub trait Rebooter {
    async fn reboot(&mut self) -> ExecutionResult;
}

/// Runs the configured reboot command through the shell
pub struct ShellRebooter {
    command: String,
    dry_run: bool,
}

impl ShellRebooter {
    pub fn new(command: impl Into<String>, dry_run: bool) -> Self {
        Self {
            command: command.into(),
            dry_run,
        }
    }

    pub fn for_current_os(config: &RebootConfig, dry_run: bool) -> Self {
        Self::new(config.command_for_current_os(), dry_run)
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Rebooter for ShellRebooter {
    async fn reboot(&mut self) -> ExecutionResult {
        if self.dry_run {
            info!("Dry run, not executing reboot command: {}", self.command);
            return ExecutionResult {
                success: true,
                output: format!("dry run: {}", self.command),
                error: None,
                exit_code: None,
            };
        }

        info!("Executing reboot command: {}", self.command);
        let result =
            CommandExecutor::execute_shell_command(&self.command, REBOOT_COMMAND_TIMEOUT_SECS)
                .await;
        if !result.success {
            warn!(
                "Reboot command failed (exit code: {:?}): {}",
                result.exit_code,
                result.error.as_deref().unwrap_or(result.output.trim())
            );
        }
        result
    }
}
