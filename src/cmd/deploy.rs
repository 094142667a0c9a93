use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use stagebot::config::Config;
use stagebot::errors::StagingError;
use stagebot::github::GithubClient;
use stagebot::notify::{NotifierFactory, Notifiers};
use stagebot::progress::{Broadcaster, LogSink};
use stagebot::runner::{self, CommandRunner, DryRunRunner};
use stagebot::staging::{
    BranchLocks, Instance, Outcome, StagingServer, deploy_or_update, remove_if_present,
};

fn describe(outcome: Outcome, instance: &Instance) -> String {
    match outcome {
        Outcome::Deployed => format!("Staging server deployed at {}", instance.url()),
        Outcome::Updated => format!("Staging server updated at {}", instance.url()),
        Outcome::UpToDate => format!("Staging server for {} is up to date", instance.branch()),
        Outcome::Removed => format!("Staging server for {} deleted", instance.branch()),
        Outcome::Absent => format!("No staging server deployed for {}", instance.branch()),
    }
}

/// `deploy-branch [-d] <branch>`: deploy-or-update, or remove, one branch.
pub async fn cmd_deploy_branch(config: Config, branch: &str, delete: bool, dry_run: bool) -> Result<()> {
    let settings = Arc::new(config.staging.clone());
    let instance = Instance::new(branch, &settings)?;

    let recorder = dry_run.then(|| Arc::new(DryRunRunner::new()));
    let runner: Arc<dyn CommandRunner> = match &recorder {
        Some(recorder) => recorder.clone(),
        None => runner::from_config(&config),
    };

    let sinks = if dry_run {
        info!("Dry run: commands are recorded, not executed");
        Broadcaster::new().with(Arc::new(LogSink::new(branch)))
    } else {
        let github = GithubClient::new(&config.github, config.secrets.access_token.clone())?;
        let exists = github
            .branch_exists(branch)
            .await
            .with_context(|| format!("Failed to verify branch {} on GitHub", branch))?;
        if !exists {
            return Err(StagingError::NotFound(format!("branch {} does not exist on GitHub", branch)).into());
        }
        Notifiers::from_config(&config)?
            .without_pull_requests()
            .for_branch(branch, None)
    };

    let locks = BranchLocks::new(settings.lock_dir.clone());
    let _lease = match locks.try_acquire(instance.safe_branch())? {
        Some(lease) => lease,
        None => {
            info!(branch, "Another operation is running on this branch, waiting for it");
            locks.acquire(instance.safe_branch()).await?
        }
    };

    let server = StagingServer::new(instance.clone(), settings, runner);
    let outcome = if delete {
        remove_if_present(&server, &sinks).await?
    } else {
        deploy_or_update(&server, &sinks).await?
    };
    println!("{}", describe(outcome, &instance));

    if let Some(recorder) = recorder {
        println!();
        println!("Planned commands:");
        for recorded in recorder.commands() {
            println!("  [{}] {}", recorded.dir.display(), recorded.command);
        }
    }
    Ok(())
}
