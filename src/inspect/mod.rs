//! Read-only views of the deployment host: active instances and disk usage.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::StagingSettings;
use crate::errors::{Result, StagingError};
use crate::runner::{CommandRunner, quote_path};
use crate::staging::{Instance, validate_branch};

/// One active instance as exposed by the API and `list-servers`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSummary {
    pub repo: String,
    pub branch: String,
    pub domain: String,
    pub url: String,
    pub deployed_at: Option<DateTime<Utc>>,
}

/// Root volume usage in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub size: u64,
    pub used: u64,
}

/// Parse `find -printf '%f\t%T@\n'` output into `(name, mtime)` pairs.
pub fn parse_listing(output: &str) -> Vec<(String, Option<DateTime<Utc>>)> {
    output
        .lines()
        .filter_map(|line| {
            let (name, stamp) = match line.split_once('\t') {
                Some((name, stamp)) => (name, Some(stamp)),
                None => (line, None),
            };
            let name = name.trim();
            if name.is_empty() || name.starts_with('.') {
                return None;
            }
            let deployed_at = stamp
                .and_then(|s| s.trim().parse::<f64>().ok())
                .and_then(|secs| Utc.timestamp_opt(secs.trunc() as i64, 0).single());
            Some((name.to_string(), deployed_at))
        })
        .collect()
}

/// Parse POSIX `df -Pk` output (header plus one data row).
pub fn parse_df(output: &str) -> Result<DiskUsage> {
    let row = output
        .lines()
        .skip(1)
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| StagingError::Other(anyhow::anyhow!("df printed no data row")))?;
    let fields: Vec<&str> = row.split_whitespace().collect();
    let number = |index: usize, what: &str| -> Result<u64> {
        fields
            .get(index)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| StagingError::Other(anyhow::anyhow!("df row has no {} column: {}", what, row)))
    };
    Ok(DiskUsage {
        size: number(1, "size")?,
        used: number(2, "used")?,
    })
}

/// Instances under the root directory, sorted by branch.
///
/// Directory names are the normalized branch names, so `branch` here is the
/// safe form.
pub async fn list_instances(
    runner: &dyn CommandRunner,
    settings: &StagingSettings,
) -> Result<Vec<InstanceSummary>> {
    let root = &settings.root_dir;
    if !runner.dir_exists(root).await {
        return Err(StagingError::NotFound(format!(
            "root directory {} does not exist",
            root.display()
        )));
    }
    let output = runner
        .run(
            "find . -mindepth 1 -maxdepth 1 -type d -printf '%f\\t%T@\\n'",
            root,
        )
        .await?;

    let mut summaries = Vec::new();
    for (name, deployed_at) in parse_listing(&output) {
        if validate_branch(&name).is_err() {
            debug!(name, "Skipping directory that is not an instance");
            continue;
        }
        let instance = Instance::new(&name, settings)?;
        if !runner.dir_exists(&instance.dir()).await {
            continue;
        }
        summaries.push(InstanceSummary {
            repo: instance.repository().to_string(),
            branch: instance.branch().to_string(),
            domain: instance.hostname(),
            url: instance.url(),
            deployed_at,
        });
    }
    summaries.sort_by(|a, b| a.branch.cmp(&b.branch));
    Ok(summaries)
}

/// Usage of the volume holding `root`.
pub async fn disk_usage(runner: &dyn CommandRunner, root: &Path) -> Result<DiskUsage> {
    let output = runner.run(&format!("df -Pk {}", quote_path(root)), root).await?;
    parse_df(&output)
}
