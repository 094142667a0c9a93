//! Configuration for stagebot.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. CLI flags are applied last by the command layer.
//!
//! # Configuration File Format
//!
//! ```toml
//! [staging]
//! repository = "https://github.com/vektorprogrammet/vektorprogrammet"
//! root_dir = "/var/www/servers"
//! domain = "staging.vektorprogrammet.no"
//! command_timeout_secs = 1800
//!
//! [[staging.install_tracks]]
//! name = "client"
//! commands = ["npm run setup:client", "NODE_ENV=staging npm run build:client"]
//! branches = ["assistant-dashboard"]
//!
//! [server]
//! port = 5555
//! queue_capacity = 64
//!
//! [github]
//! owner = "vektorprogrammet"
//! repo = "vektorprogrammet"
//!
//! [slack]
//! channel = "#staging_log"
//! ```
//!
//! Secrets never live in the file; they come from `GITHUB_WEBHOOKS_SECRET`,
//! `GITHUB_ACCESS_TOKEN` and `SLACK_ENDPOINT`. The remote (SSH) variant is
//! enabled by setting all of `REMOTE_USER`, `REMOTE_ADDRESS` and
//! `PRIVATE_KEY_PATH`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::StagingError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/stagebot/stagebot.toml";

pub const ENV_WEBHOOK_SECRET: &str = "GITHUB_WEBHOOKS_SECRET";
pub const ENV_ACCESS_TOKEN: &str = "GITHUB_ACCESS_TOKEN";
pub const ENV_SLACK_ENDPOINT: &str = "SLACK_ENDPOINT";
pub const ENV_REMOTE_USER: &str = "REMOTE_USER";
pub const ENV_REMOTE_ADDRESS: &str = "REMOTE_ADDRESS";
pub const ENV_PRIVATE_KEY_PATH: &str = "PRIVATE_KEY_PATH";

/// One concurrent dependency-installation track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallTrack {
    pub name: String,
    pub commands: Vec<String>,
    /// Restrict the track to these raw branch names. Empty means all.
    #[serde(default)]
    pub branches: Vec<String>,
}

impl InstallTrack {
    pub fn new(name: &str, commands: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            branches: Vec::new(),
        }
    }

    pub fn applies_to(&self, branch: &str) -> bool {
        self.branches.is_empty() || self.branches.iter().any(|b| b == branch)
    }
}

fn default_install_tracks() -> Vec<InstallTrack> {
    vec![
        InstallTrack::new(
            "composer",
            &["SYMFONY_ENV=prod php ./composer.phar install -n --no-dev --optimize-autoloader"],
        ),
        InstallTrack::new("frontend", &["npm install", "npm run build:prod"]),
        InstallTrack::new(
            "scheduling",
            &["npm run setup:scheduling", "npm run build:scheduling"],
        ),
    ]
}

/// Deployment parameters shared by every instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingSettings {
    pub repository: String,
    pub root_dir: PathBuf,
    pub domain: String,
    /// Holds the `parameters.yml` template copied into each instance.
    pub installation_dir: PathBuf,
    /// Directory nginx includes virtual hosts from.
    pub nginx_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub deploy_user: String,
    pub web_user: String,
    /// Paths, relative to the instance, the web user must be able to write.
    pub runtime_dirs: Vec<String>,
    pub command_timeout_secs: u64,
    pub install_tracks: Vec<InstallTrack>,
    /// Runs once every install track has succeeded.
    pub post_install: Vec<String>,
}

impl Default for StagingSettings {
    fn default() -> Self {
        Self {
            repository: "https://github.com/vektorprogrammet/vektorprogrammet".to_string(),
            root_dir: PathBuf::from("/var/www/servers"),
            domain: "staging.vektorprogrammet.no".to_string(),
            installation_dir: PathBuf::from("/var/www/staging-server"),
            nginx_dir: PathBuf::from("/srv/nginx"),
            lock_dir: PathBuf::from("/var/lock/stagebot"),
            deploy_user: "vektorprogrammet".to_string(),
            web_user: "www-data".to_string(),
            runtime_dirs: ["app/cache", "app/logs", "www/images", "signatures", "www/media"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            command_timeout_secs: 1800,
            install_tracks: default_install_tracks(),
            post_install: vec!["php app/console cache:clear --env=prod".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    pub queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5555,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: "vektorprogrammet".to_string(),
            repo: "vektorprogrammet".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackSettings {
    pub channel: String,
    pub username: String,
    pub icon_emoji: String,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            channel: "#staging_log".to_string(),
            username: "vektorbot".to_string(),
            icon_emoji: ":robot_face:".to_string(),
        }
    }
}

/// Credentials read from the environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub webhook_secret: Option<String>,
    pub access_token: Option<String>,
    pub slack_endpoint: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("Secrets")
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("access_token", &redact(&self.access_token))
            .field("slack_endpoint", &redact(&self.slack_endpoint))
            .finish()
    }
}

/// SSH target for the remote variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub user: String,
    pub address: String,
    pub key_path: PathBuf,
}

/// Raw TOML structure.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    staging: StagingSettings,
    #[serde(default)]
    server: ServerSettings,
    #[serde(default)]
    github: GithubSettings,
    #[serde(default)]
    slack: SlackSettings,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub staging: StagingSettings,
    pub server: ServerSettings,
    pub github: GithubSettings,
    pub slack: SlackSettings,
    pub secrets: Secrets,
    pub remote: Option<RemoteTarget>,
}

impl Config {
    /// Load configuration from `path` (or the default location) and the
    /// process environment. A missing file at the default location yields
    /// defaults; an explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A .env file is optional.
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(Self {
            staging: file.staging,
            server: file.server,
            github: file.github,
            slack: file.slack,
            secrets: Secrets::default(),
            remote: None,
        })
    }

    /// Apply environment variables through `lookup`. Empty values count as
    /// unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), StagingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        self.secrets = Secrets {
            webhook_secret: get(ENV_WEBHOOK_SECRET),
            access_token: get(ENV_ACCESS_TOKEN),
            slack_endpoint: get(ENV_SLACK_ENDPOINT),
        };

        let remote = (
            get(ENV_REMOTE_USER),
            get(ENV_REMOTE_ADDRESS),
            get(ENV_PRIVATE_KEY_PATH),
        );
        self.remote = match remote {
            (Some(user), Some(address), Some(key)) => Some(RemoteTarget {
                user,
                address,
                key_path: PathBuf::from(key),
            }),
            (None, None, None) => None,
            _ => {
                return Err(StagingError::Environment(format!(
                    "remote execution needs all of {}, {} and {}",
                    ENV_REMOTE_USER, ENV_REMOTE_ADDRESS, ENV_PRIVATE_KEY_PATH
                )));
            }
        };
        Ok(())
    }

    /// The webhook secret, required to serve.
    pub fn webhook_secret(&self) -> Result<&str, StagingError> {
        self.secrets.webhook_secret.as_deref().ok_or_else(|| {
            StagingError::Environment(format!("{} is not set", ENV_WEBHOOK_SECRET))
        })
    }
}
