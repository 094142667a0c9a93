use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stagebot::config::Config;
use stagebot::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "stagebot")]
#[command(version, about = "Per-branch staging servers driven by GitHub webhooks")]
pub struct Cli {
    /// Configuration file (defaults to /etc/stagebot/stagebot.toml when present)
    #[arg(short, long, global = true, env = "STAGEBOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Also write logs to this file, rotated daily
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook server (the default)
    Serve {
        /// Port to listen on, overriding the configuration
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Deploy or update the staging server for a branch
    DeployBranch {
        /// Remove the branch's staging server instead
        #[arg(short = 'd', long)]
        delete: bool,

        /// Print the commands that would run without executing them
        #[arg(long)]
        dry_run: bool,

        branch: String,
    },
    /// List deployed staging servers
    #[command(visible_alias = "ls")]
    ListServers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init(cli.log_format, cli.log_file.as_deref(), cli.verbose)?;
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        None => cmd::cmd_serve(config, None).await?,
        Some(Commands::Serve { port }) => cmd::cmd_serve(config, port).await?,
        Some(Commands::DeployBranch {
            delete,
            dry_run,
            branch,
        }) => cmd::cmd_deploy_branch(config, &branch, delete, dry_run).await?,
        Some(Commands::ListServers) => cmd::cmd_list_servers(config).await?,
    }

    Ok(())
}
