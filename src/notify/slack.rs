use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::config::SlackSettings;
use crate::progress::{Notice, ProgressReport, ProgressSink};

/// Incoming-webhook message body.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SlackMessage {
    pub channel: String,
    pub text: String,
    pub username: String,
    pub icon_emoji: String,
}

/// Posts plain messages to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    endpoint: String,
    settings: SlackSettings,
}

impl SlackClient {
    pub fn new(endpoint: impl Into<String>, settings: SlackSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            settings,
        })
    }

    pub fn message(&self, text: impl Into<String>) -> SlackMessage {
        SlackMessage {
            channel: self.settings.channel.clone(),
            text: text.into(),
            username: self.settings.username.clone(),
            icon_emoji: self.settings.icon_emoji.clone(),
        }
    }

    pub async fn send(&self, text: &str) -> Result<()> {
        self.http
            .post(&self.endpoint)
            .json(&self.message(text))
            .send()
            .await
            .context("Failed to post to Slack")?
            .error_for_status()
            .context("Slack rejected the message")?;
        Ok(())
    }
}

/// Chat backend: one message per milestone and per notice.
#[derive(Debug, Clone)]
pub struct SlackSink {
    client: SlackClient,
    branch: String,
}

impl SlackSink {
    pub fn new(client: SlackClient, branch: impl Into<String>) -> Self {
        Self {
            client,
            branch: branch.into(),
        }
    }

    fn progress_text(&self, report: &ProgressReport) -> String {
        format!("{}: {} {} %", self.branch, report.message, report.percent)
    }

    fn notice_text(&self, notice: &Notice) -> String {
        format!("{}: {}", self.branch, notice.text())
    }

    async fn post(&self, text: String) {
        if let Err(err) = self.client.send(&text).await {
            warn!(branch = %self.branch, "Slack notification failed: {:#}", err);
        }
    }
}

#[async_trait]
impl ProgressSink for SlackSink {
    async fn progress(&self, report: &ProgressReport) {
        self.post(self.progress_text(report)).await;
    }

    async fn notice(&self, notice: &Notice) {
        // Unchanged branches are not worth a channel message.
        if matches!(notice, Notice::UpToDate) {
            return;
        }
        self.post(self.notice_text(notice)).await;
    }
}
