use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::CommandRunner;
use crate::errors::{Result, StagingError};

/// A command executed (or refused) by a [`DryRunRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub command: String,
    pub dir: PathBuf,
}

#[derive(Debug, Default)]
struct DryRunState {
    commands: Vec<RecordedCommand>,
    created: HashSet<PathBuf>,
    removed: HashSet<PathBuf>,
}

/// Records commands instead of executing them.
///
/// Directory creation (`mkdir -p <dir>`) and removal (`rm -rf <dir>`) are
/// tracked so that `dir_exists` reflects what the recorded plan would have
/// done; any other path falls back to the real filesystem.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    state: Mutex<DryRunState>,
    failing: Vec<String>,
    outputs: Vec<(String, String)>,
    delay: Option<Duration>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command containing `needle`.
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.failing.push(needle.into());
        self
    }

    /// Answer commands containing `needle` with `output`.
    pub fn respond(mut self, needle: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.push((needle.into(), output.into()));
        self
    }

    /// Pause before answering each command.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Treat `dir` as already present.
    pub fn with_existing_dir(self, dir: impl Into<PathBuf>) -> Self {
        self.lock().created.insert(dir.into());
        self
    }

    /// Snapshot of every command seen so far, in order.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.lock().commands.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DryRunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Extract the directory argument of `mkdir -p <dir>` / `rm -rf <dir>`.
fn directory_argument<'a>(command: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = command.strip_prefix(prefix)?.trim();
    Some(rest.trim_matches('\''))
}

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(&self, command: &str, dir: &Path) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        info!(command, dir = %dir.display(), "[dry-run]");

        {
            let mut state = self.lock();
            state.commands.push(RecordedCommand {
                command: command.to_string(),
                dir: dir.to_path_buf(),
            });
        }

        if self.failing.iter().any(|needle| command.contains(needle.as_str())) {
            return Err(StagingError::Execution {
                command: command.to_string(),
                exit_status: Some(1),
                output: "simulated failure".to_string(),
            });
        }

        let mut state = self.lock();
        if let Some(created) = directory_argument(command, "mkdir -p ") {
            let path = PathBuf::from(created);
            state.removed.remove(&path);
            state.created.insert(path);
        } else if let Some(removed) = directory_argument(command, "rm -rf ") {
            let path = PathBuf::from(removed);
            state.created.remove(&path);
            state.removed.insert(path);
        }

        let output = self
            .outputs
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }

    async fn dir_exists(&self, path: &Path) -> bool {
        {
            let state = self.lock();
            if state.created.contains(path) {
                return true;
            }
            if state.removed.contains(path) {
                return false;
            }
        }
        tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_commands_in_order() {
        let runner = DryRunRunner::new();
        runner.run("git fetch", Path::new("/srv/a")).await.unwrap();
        runner.run("git pull", Path::new("/srv/a")).await.unwrap();
        let commands: Vec<String> = runner.commands().into_iter().map(|c| c.command).collect();
        assert_eq!(commands, vec!["git fetch", "git pull"]);
    }

    #[tokio::test]
    async fn test_tracks_created_and_removed_directories() {
        let runner = DryRunRunner::new();
        let dir = Path::new("/nonexistent-root/feature-x");
        assert!(!runner.dir_exists(dir).await);

        runner.run("mkdir -p /nonexistent-root/feature-x", Path::new("/")).await.unwrap();
        assert!(runner.dir_exists(dir).await);

        runner.run("rm -rf /nonexistent-root/feature-x", Path::new("/")).await.unwrap();
        assert!(!runner.dir_exists(dir).await);
    }

    #[tokio::test]
    async fn test_quoted_directory_argument() {
        let runner = DryRunRunner::new();
        runner.run("mkdir -p '/tmp/a b'", Path::new("/")).await.unwrap();
        assert!(runner.dir_exists(Path::new("/tmp/a b")).await);
    }

    #[tokio::test]
    async fn test_fail_on_and_respond() {
        let runner = DryRunRunner::new()
            .fail_on("npm run build")
            .respond("git status", "Your branch can be fast-forwarded.");
        assert!(runner.run("npm run build:prod", Path::new("/")).await.is_err());
        let status = runner.run("git status", Path::new("/")).await.unwrap();
        assert!(status.contains("fast-forwarded"));
        // Failed commands are still recorded.
        assert_eq!(runner.commands().len(), 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_real_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let runner = DryRunRunner::new();
        assert!(runner.dir_exists(dir.path()).await);
    }
}
