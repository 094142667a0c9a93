//! Progress reporting for lifecycle operations.
//!
//! A lifecycle operation reports `(message, percent)` milestones to a
//! [`ProgressSink`]; the dispatcher additionally reports outcome
//! [`Notice`]s. Several backends (process log, chat, pull-request comment)
//! subscribe through a [`Broadcaster`], which fans each update out to all of
//! them concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

/// One pipeline milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub message: String,
    /// 0-100.
    pub percent: u8,
}

impl ProgressReport {
    pub fn new(message: impl Into<String>, percent: u8) -> Self {
        Self {
            message: message.into(),
            percent: percent.min(100),
        }
    }
}

/// Outcome notifications emitted around lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    DeployStarted,
    Deployed { url: String },
    DeployFailed { error: String },
    Updated { url: String },
    UpdateFailed { error: String },
    /// The instance exists and there was nothing to pull.
    UpToDate,
    Removed,
    RemoveFailed { error: String },
    /// A removal was requested for an instance that does not exist.
    NotDeployed,
    /// The dispatcher could not act on an event at all.
    Rejected { error: String },
}

impl Notice {
    /// Human-readable text, without branch prefix.
    pub fn text(&self) -> String {
        match self {
            Notice::DeployStarted => "Starting deploy to staging server...".to_string(),
            Notice::Deployed { url } => format!("Staging server deployed at {}", url),
            Notice::DeployFailed { error } => format!("Could not create staging server: {}", error),
            Notice::Updated { url } => format!("Staging server updated at {}", url),
            Notice::UpdateFailed { error } => format!("Could not update staging server: {}", error),
            Notice::UpToDate => "Did not update: branch is up to date with origin".to_string(),
            Notice::Removed => "Staging server deleted".to_string(),
            Notice::RemoveFailed { error } => format!("Could not remove staging server: {}", error),
            Notice::NotDeployed => "No staging server deployed".to_string(),
            Notice::Rejected { error } => format!("Could not handle event: {}", error),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Notice::DeployFailed { .. }
                | Notice::UpdateFailed { .. }
                | Notice::RemoveFailed { .. }
                | Notice::Rejected { .. }
        )
    }
}

/// Receiver of progress milestones and outcome notices.
///
/// Backends must not fail the operation they observe: delivery errors are
/// logged inside the sink.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn progress(&self, report: &ProgressReport);

    async fn notice(&self, _notice: &Notice) {}
}

/// Fans updates out to every registered sink.
#[derive(Clone, Default)]
pub struct Broadcaster {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ProgressSink for Broadcaster {
    async fn progress(&self, report: &ProgressReport) {
        join_all(self.sinks.iter().map(|sink| sink.progress(report))).await;
    }

    async fn notice(&self, notice: &Notice) {
        join_all(self.sinks.iter().map(|sink| sink.notice(notice))).await;
    }
}

/// Process-log backend.
#[derive(Debug, Clone)]
pub struct LogSink {
    branch: String,
}

impl LogSink {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
        }
    }
}

#[async_trait]
impl ProgressSink for LogSink {
    async fn progress(&self, report: &ProgressReport) {
        info!(branch = %self.branch, percent = report.percent, "{}", report.message);
    }

    async fn notice(&self, notice: &Notice) {
        if notice.is_failure() {
            warn!(branch = %self.branch, "{}", notice.text());
        } else {
            info!(branch = %self.branch, "{}", notice.text());
        }
    }
}

/// Convenience for reporting a milestone through any sink.
pub async fn report(sink: &dyn ProgressSink, message: &str, percent: u8) {
    sink.progress(&ProgressReport::new(message, percent)).await;
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(ProgressReport::new("x", 250).percent, 100);
    }

    #[test]
    fn test_notice_text() {
        let notice = Notice::Deployed {
            url: "https://a.staging.example.org".to_string(),
        };
        assert_eq!(
            notice.text(),
            "Staging server deployed at https://a.staging.example.org"
        );
        assert!(!notice.is_failure());
        assert!(Notice::RemoveFailed { error: "x".into() }.is_failure());
        let rejected = Notice::Rejected {
            error: "Invalid input: branch".into(),
        };
        assert!(rejected.is_failure());
        assert_eq!(rejected.text(), "Could not handle event: Invalid input: branch");
    }

    #[tokio::test]
    async fn test_broadcaster_reaches_every_sink() {
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(RecordingSink::default());
        let broadcaster = Broadcaster::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(LogSink::new("main")));
        assert_eq!(broadcaster.len(), 3);

        report(&broadcaster, "Cloning repository", 10).await;
        broadcaster.notice(&Notice::DeployStarted).await;

        for sink in [&first, &second] {
            assert_eq!(sink.reports(), vec![ProgressReport::new("Cloning repository", 10)]);
            assert_eq!(sink.notices(), vec![Notice::DeployStarted]);
        }
    }

    #[tokio::test]
    async fn test_empty_broadcaster_is_noop() {
        let broadcaster = Broadcaster::new();
        assert!(broadcaster.is_empty());
        report(&broadcaster, "nothing", 0).await;
    }
}
