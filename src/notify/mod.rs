//! Notification backends and their per-branch assembly.
//!
//! | Backend          | Enabled when                                  |
//! |------------------|-----------------------------------------------|
//! | process log      | always                                        |
//! | Slack            | `SLACK_ENDPOINT` is set                       |
//! | PR comment       | `GITHUB_ACCESS_TOKEN` is set and a PR number is known |

pub mod pr_comment;
pub mod slack;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::github::GithubClient;
use crate::progress::{Broadcaster, LogSink};

pub use pr_comment::PrCommentSink;
pub use slack::{SlackClient, SlackMessage, SlackSink};

/// Builds the set of sinks an operation on `branch` reports to.
pub trait NotifierFactory: Send + Sync {
    fn for_branch(&self, branch: &str, pr_number: Option<u64>) -> Broadcaster;
}

/// Production wiring from configuration.
#[derive(Debug, Clone, Default)]
pub struct Notifiers {
    slack: Option<SlackClient>,
    github: Option<GithubClient>,
}

impl Notifiers {
    pub fn from_config(config: &Config) -> Result<Self> {
        let slack = config
            .secrets
            .slack_endpoint
            .as_ref()
            .map(|endpoint| SlackClient::new(endpoint.clone(), config.slack.clone()))
            .transpose()?;
        let github = config
            .secrets
            .access_token
            .as_ref()
            .map(|token| GithubClient::new(&config.github, Some(token.clone())))
            .transpose()?;
        Ok(Self { slack, github })
    }

    /// The chat client, for messages not tied to a branch.
    pub fn slack(&self) -> Option<&SlackClient> {
        self.slack.as_ref()
    }

    /// Log and Slack only, as used by one-shot CLI commands.
    pub fn without_pull_requests(mut self) -> Self {
        self.github = None;
        self
    }
}

impl NotifierFactory for Notifiers {
    fn for_branch(&self, branch: &str, pr_number: Option<u64>) -> Broadcaster {
        let mut sinks = Broadcaster::new().with(Arc::new(LogSink::new(branch)));
        if let Some(slack) = &self.slack {
            sinks.push(Arc::new(SlackSink::new(slack.clone(), branch)));
        }
        if let (Some(github), Some(pr)) = (&self.github, pr_number) {
            sinks.push(Arc::new(PrCommentSink::new(github.clone(), pr)));
        }
        sinks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(slack: bool, token: bool) -> Config {
        let mut config = Config::default();
        if slack {
            config.secrets.slack_endpoint = Some("http://localhost/hook".to_string());
        }
        if token {
            config.secrets.access_token = Some("ghp_x".to_string());
        }
        config
    }

    #[test]
    fn test_log_only_by_default() {
        let notifiers = Notifiers::from_config(&config(false, false)).unwrap();
        assert_eq!(notifiers.for_branch("main", Some(1)).len(), 1);
    }

    #[test]
    fn test_all_backends() {
        let notifiers = Notifiers::from_config(&config(true, true)).unwrap();
        assert_eq!(notifiers.for_branch("main", Some(1)).len(), 3);
        // No PR number, no comment sink.
        assert_eq!(notifiers.for_branch("main", None).len(), 2);
    }

    #[test]
    fn test_without_pull_requests() {
        let notifiers = Notifiers::from_config(&config(true, true))
            .unwrap()
            .without_pull_requests();
        assert_eq!(notifiers.for_branch("main", Some(1)).len(), 2);
    }
}
