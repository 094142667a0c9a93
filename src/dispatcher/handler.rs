use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{Envelope, Handler};
use crate::config::StagingSettings;
use crate::events::{Event, Intent};
use crate::notify::NotifierFactory;
use crate::progress::{Notice, ProgressSink};
use crate::runner::CommandRunner;
use crate::staging::{
    BranchLocks, Instance, StagingServer, deploy_or_update, remove_if_present, update_if_behind,
};

/// Routes classified events to the lifecycle workflows.
pub struct EventHandler {
    settings: Arc<StagingSettings>,
    runner: Arc<dyn CommandRunner>,
    locks: BranchLocks,
    notifiers: Arc<dyn NotifierFactory>,
}

impl EventHandler {
    pub fn new(
        settings: Arc<StagingSettings>,
        runner: Arc<dyn CommandRunner>,
        notifiers: Arc<dyn NotifierFactory>,
    ) -> Self {
        let locks = BranchLocks::new(settings.lock_dir.clone());
        Self {
            settings,
            runner,
            locks,
            notifiers,
        }
    }
}

#[async_trait]
impl Handler for EventHandler {
    async fn handle(&self, envelope: &Envelope) {
        let event = &envelope.event;
        let branch = match event {
            Event::Ignored { kind, reason } => {
                info!(kind = %kind, "Ignoring event: {}", reason);
                return;
            }
            other => match other.branch() {
                Some(branch) => branch,
                None => return,
            },
        };

        let pr_number = match event {
            Event::PullRequest { number, .. } => Some(*number),
            _ => None,
        };
        let sinks = self.notifiers.for_branch(branch, pr_number);

        let instance = match Instance::new(branch, &self.settings) {
            Ok(instance) => instance,
            Err(err) => {
                warn!(branch, "Refusing event: {}", err);
                sinks
                    .notice(&Notice::Rejected {
                        error: err.to_string(),
                    })
                    .await;
                return;
            }
        };

        let _lease = match self.locks.acquire(instance.safe_branch()).await {
            Ok(lease) => lease,
            Err(err) => {
                error!(branch, "Could not lock branch: {}", err);
                sinks
                    .notice(&Notice::Rejected {
                        error: err.to_string(),
                    })
                    .await;
                return;
            }
        };

        let server = StagingServer::new(instance, self.settings.clone(), self.runner.clone());

        let result = match event.intent() {
            Intent::DeployOrUpdate => deploy_or_update(&server, &sinks).await,
            Intent::UpdateIfBehind => update_if_behind(&server, &sinks).await,
            Intent::Remove => remove_if_present(&server, &sinks).await,
            Intent::Ignore => return,
        };

        match result {
            Ok(outcome) => debug!(branch, ?outcome, "Event handled"),
            Err(err) => error!(branch, "Event failed: {}", err),
        }
    }
}
