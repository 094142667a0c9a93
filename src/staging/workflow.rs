//! Composite operations shared by the webhook dispatcher and the CLI.
//!
//! These wrap the lifecycle primitives with the existence guards and the
//! outcome notices, and apply the compensating remove after a failed deploy.

use tracing::{info, warn};

use super::server::StagingServer;
use crate::errors::Result;
use crate::progress::{Notice, ProgressSink};

/// What a composite operation ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Deployed,
    Updated,
    UpToDate,
    Removed,
    /// No instance was present, nothing was done.
    Absent,
}

/// Deploy an absent instance, or update a present one that is behind.
pub async fn deploy_or_update(server: &StagingServer, sink: &dyn ProgressSink) -> Result<Outcome> {
    if server.exists().await {
        return update_if_behind(server, sink).await;
    }

    sink.notice(&Notice::DeployStarted).await;
    match server.deploy(sink).await {
        Ok(()) => {
            sink.notice(&Notice::Deployed {
                url: server.instance().url(),
            })
            .await;
            Ok(Outcome::Deployed)
        }
        Err(err) => {
            sink.notice(&Notice::DeployFailed {
                error: err.to_string(),
            })
            .await;
            // A half-provisioned directory would otherwise look deployed.
            if let Err(cleanup) = server.remove().await {
                warn!(
                    branch = %server.instance().branch(),
                    "Cleanup after failed deploy did not complete: {}", cleanup
                );
            }
            Err(err)
        }
    }
}

/// Update a present instance if its remote branch moved. Never deploys.
pub async fn update_if_behind(server: &StagingServer, sink: &dyn ProgressSink) -> Result<Outcome> {
    if !server.exists().await {
        info!(branch = %server.instance().branch(), "No staging server to update");
        return Ok(Outcome::Absent);
    }
    if !server.can_be_fast_forwarded().await {
        sink.notice(&Notice::UpToDate).await;
        return Ok(Outcome::UpToDate);
    }

    match server.update(sink).await {
        Ok(()) => {
            sink.notice(&Notice::Updated {
                url: server.instance().url(),
            })
            .await;
            Ok(Outcome::Updated)
        }
        Err(err) => {
            sink.notice(&Notice::UpdateFailed {
                error: err.to_string(),
            })
            .await;
            Err(err)
        }
    }
}

/// Remove a present instance.
pub async fn remove_if_present(server: &StagingServer, sink: &dyn ProgressSink) -> Result<Outcome> {
    if !server.exists().await {
        sink.notice(&Notice::NotDeployed).await;
        return Ok(Outcome::Absent);
    }

    match server.remove().await {
        Ok(()) => {
            sink.notice(&Notice::Removed).await;
            Ok(Outcome::Removed)
        }
        Err(err) => {
            sink.notice(&Notice::RemoveFailed {
                error: err.to_string(),
            })
            .await;
            Err(err)
        }
    }
}
