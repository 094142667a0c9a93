use anyhow::Result;

use stagebot::config::Config;
use stagebot::inspect;
use stagebot::runner;

/// `list-servers` / `ls`: one line per active instance.
pub async fn cmd_list_servers(config: Config) -> Result<()> {
    let runner = runner::from_config(&config);
    let servers = inspect::list_instances(runner.as_ref(), &config.staging).await?;
    if servers.is_empty() {
        println!("No staging servers deployed.");
        return Ok(());
    }
    for server in servers {
        let deployed = server
            .deployed_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<40} {:<16} {}", server.branch, deployed, server.url);
    }
    Ok(())
}
