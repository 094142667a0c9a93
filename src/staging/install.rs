//! The parallel dependency-installation phase.
//!
//! Tracks write disjoint parts of the checkout (different package managers,
//! different build outputs), so they run concurrently. The phase joins all of
//! them, and fails if any one failed, listing every failed track.

use std::path::Path;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::InstallTrack;
use crate::errors::{Result, StagingError, TrackFailure};
use crate::runner::CommandRunner;

/// Run every track that applies to `branch` concurrently in `dir`, then the
/// `post_install` commands once all tracks have succeeded.
pub async fn run_install_phase(
    runner: &dyn CommandRunner,
    tracks: &[InstallTrack],
    post_install: &[String],
    branch: &str,
    dir: &Path,
) -> Result<()> {
    let active: Vec<&InstallTrack> = tracks.iter().filter(|t| t.applies_to(branch)).collect();
    info!(
        branch,
        tracks = ?active.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "Starting install phase"
    );

    let results = join_all(active.iter().map(|track| async move {
        runner
            .run_all(&track.commands, dir)
            .await
            .map_err(|err| TrackFailure {
                track: track.name.clone(),
                message: err.to_string(),
            })
    }))
    .await;

    let failures: Vec<TrackFailure> = results.into_iter().filter_map(|r| r.err()).collect();
    if !failures.is_empty() {
        for failure in &failures {
            warn!(branch, track = %failure.track, "Install track failed: {}", failure.message);
        }
        return Err(StagingError::InstallFailed { failures });
    }

    runner.run_all(post_install, dir).await
}
