use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::github::GithubClient;
use crate::progress::{Notice, ProgressReport, ProgressSink};

/// Keeps a single progress comment on the pull request up to date.
///
/// The comment is created on [`Notice::DeployStarted`]; progress before that
/// (updates of an existing instance) does not touch the pull request.
pub struct PrCommentSink {
    client: GithubClient,
    pr_number: u64,
    comment_id: Mutex<Option<i64>>,
}

impl PrCommentSink {
    pub fn new(client: GithubClient, pr_number: u64) -> Self {
        Self {
            client,
            pr_number,
            comment_id: Mutex::new(None),
        }
    }

    pub fn progress_body(report: &ProgressReport) -> String {
        format!(
            "Deploying this pull request to the staging server... {} %\n{}",
            report.percent, report.message
        )
    }

    async fn edit(&self, body: &str) {
        let Some(id) = *self.comment_id.lock().await else {
            return;
        };
        if let Err(err) = self.client.edit_comment(id, body).await {
            warn!(pr = self.pr_number, "Failed to edit PR comment: {:#}", err);
        }
    }
}

#[async_trait]
impl ProgressSink for PrCommentSink {
    async fn progress(&self, report: &ProgressReport) {
        self.edit(&Self::progress_body(report)).await;
    }

    async fn notice(&self, notice: &Notice) {
        match notice {
            Notice::DeployStarted => {
                match self.client.create_comment(self.pr_number, &notice.text()).await {
                    Ok(id) => *self.comment_id.lock().await = Some(id),
                    Err(err) => warn!(pr = self.pr_number, "Failed to create PR comment: {:#}", err),
                }
            }
            Notice::Rejected { .. } => {
                if let Err(err) = self.client.create_comment(self.pr_number, &notice.text()).await {
                    warn!(pr = self.pr_number, "Failed to create PR comment: {:#}", err);
                }
            }
            Notice::Deployed { .. } => self.edit(&notice.text()).await,
            Notice::DeployFailed { .. } => {
                let Some(id) = self.comment_id.lock().await.take() else {
                    return;
                };
                if let Err(err) = self.client.delete_comment(id).await {
                    warn!(pr = self.pr_number, "Failed to delete PR comment: {:#}", err);
                }
            }
            _ => {}
        }
    }
}
