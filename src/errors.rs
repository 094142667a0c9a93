//! Typed error hierarchy for stagebot.
//!
//! `StagingError` covers every failure a lifecycle operation, the command
//! runner, or the webhook ingress can produce. Binary-level glue wraps these
//! in `anyhow` with context.

use std::path::PathBuf;

use thiserror::Error;

/// One failed track of the parallel install phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFailure {
    pub track: String,
    pub message: String,
}

impl std::fmt::Display for TrackFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.track, self.message)
    }
}

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Command `{command}` failed with exit status {}: {}", display_status(.exit_status), .output.trim())]
    Execution {
        command: String,
        exit_status: Option<i32>,
        output: String,
    },

    #[error("Command `{command}` timed out after {timeout_secs} seconds")]
    TimedOut { command: String, timeout_secs: u64 },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing configuration: {0}")]
    Environment(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Install phase failed: {}", join_failures(.failures))]
    InstallFailed { failures: Vec<TrackFailure> },

    #[error("Refusing to remove {}: path is not below root {}", .dir.display(), .root.display())]
    RemoveRefused { dir: PathBuf, root: PathBuf },

    #[error("Failed to acquire lock at {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn display_status(status: &Option<i32>) -> String {
    status
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

fn join_failures(failures: &[TrackFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T, E = StagingError> = std::result::Result<T, E>;
