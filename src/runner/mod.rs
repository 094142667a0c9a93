//! Command execution: the single place stagebot touches the host.
//!
//! Every filesystem, package-manager, database, web-server, and TLS side
//! effect of a lifecycle operation goes through a [`CommandRunner`]. Three
//! implementations exist:
//!
//! | Runner          | Where commands run                                   |
//! |-----------------|------------------------------------------------------|
//! | `ShellRunner`   | locally, `sh -c` in the target directory             |
//! | `SshRunner`     | on the remote host, `cd <dir> && <cmd>` over `ssh`   |
//! | `DryRunRunner`  | nowhere; commands are recorded and reported          |
//!
//! All runners bound each command with a timeout and map failures onto
//! [`StagingError::Execution`], [`StagingError::TimedOut`], or
//! [`StagingError::Spawn`].

pub mod dry_run;
pub mod quote;
pub mod ssh;

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::config::Config;
use crate::errors::{Result, StagingError};

pub use dry_run::DryRunRunner;
pub use quote::{quote, quote_path, write_file_command};
pub use ssh::SshRunner;

/// Abstraction over external command execution.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` under a shell with `dir` as working directory.
    /// Returns captured stdout on success.
    async fn run(&self, command: &str, dir: &Path) -> Result<String>;

    /// Run commands in order, stopping at the first failure.
    async fn run_all(&self, commands: &[String], dir: &Path) -> Result<()> {
        for command in commands {
            self.run(command, dir).await?;
        }
        Ok(())
    }

    /// Whether `path` exists as a directory on the target host.
    async fn dir_exists(&self, path: &Path) -> bool;
}

/// Runs commands locally through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, dir: &Path) -> Result<String> {
        debug!(command, dir = %dir.display(), "Executing");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(dir);
        execute(cmd, command, self.timeout).await
    }

    async fn dir_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }
}

/// Spawn a prepared command, wait for it with a timeout, and map the result.
///
/// `shown` is the human-readable command used in errors and logs.
pub(crate) async fn execute(mut cmd: Command, shown: &str, limit: Duration) -> Result<String> {
    let child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| StagingError::Spawn {
            command: shown.to_string(),
            source,
        })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| StagingError::Spawn {
            command: shown.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(StagingError::TimedOut {
                command: shown.to_string(),
                timeout_secs: limit.as_secs(),
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut captured = stdout;
        if !stderr.trim().is_empty() {
            if !captured.is_empty() && !captured.ends_with('\n') {
                captured.push('\n');
            }
            captured.push_str(&stderr);
        }
        return Err(StagingError::Execution {
            command: shown.to_string(),
            exit_status: output.status.code(),
            output: captured,
        });
    }

    debug!(command = shown, "Command succeeded");
    Ok(stdout)
}

/// Build the runner selected by configuration: remote over SSH when the
/// remote target is configured, local shell otherwise.
pub fn from_config(config: &Config) -> Arc<dyn CommandRunner> {
    let limit = Duration::from_secs(config.staging.command_timeout_secs);
    match &config.remote {
        Some(remote) => Arc::new(SshRunner::new(remote.clone(), limit)),
        None => Arc::new(ShellRunner::new(limit)),
    }
}
