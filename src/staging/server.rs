//! The per-instance lifecycle: exists, deploy, fast-forward check, update,
//! and remove.
//!
//! Every host side effect goes through the injected [`CommandRunner`]; every
//! interpolated value is shell-quoted. Callers serialize operations on the
//! same instance (the dispatcher's single worker plus [`super::BranchLocks`]).
//!
//! | Step                          | Deploy | Update |
//! |-------------------------------|--------|--------|
//! | Creating server folder        | 0 %    |        |
//! | Cloning repository / fetching | 10 %   | 10 %   |
//! | Installing dependencies       | 30 %   | 30 %   |
//! | Creating / migrating database | 70 %   | 70 %   |
//! | Creating nginx instance       | 85 %   |        |
//! | Creating HTTPS certificate    | 90 %   |        |

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::install::run_install_phase;
use super::instance::Instance;
use crate::config::StagingSettings;
use crate::errors::{Result, StagingError};
use crate::nginx::VirtualHost;
use crate::progress::{ProgressSink, report};
use crate::runner::{CommandRunner, quote, quote_path, write_file_command};

const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /\n";
const PARAMETERS_TEMPLATE: &str = "parameters.yml";
const PARAMETERS_TARGET: &str = "app/config/parameters.yml";
const CONSOLE: &str = "php app/console";

/// Markers in `git status` output meaning the remote is ahead of us.
const UPDATE_MARKERS: [&str; 2] = ["can be fast-forwarded", "have diverged"];

/// Whether `git status` text says there is something to pull.
pub fn status_allows_update(status: &str) -> bool {
    UPDATE_MARKERS.iter().any(|marker| status.contains(marker))
}

pub struct StagingServer {
    instance: Instance,
    settings: Arc<StagingSettings>,
    runner: Arc<dyn CommandRunner>,
}

impl StagingServer {
    pub fn new(
        instance: Instance,
        settings: Arc<StagingSettings>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            instance,
            settings,
            runner,
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The directory is the instance: present means deployed.
    pub async fn exists(&self) -> bool {
        self.runner.dir_exists(&self.instance.dir()).await
    }

    async fn run_in(&self, dir: &Path, command: &str) -> Result<String> {
        self.runner.run(command, dir).await
    }

    async fn console(&self, args: &str) -> Result<String> {
        let command = format!("{} {}", CONSOLE, args);
        self.run_in(&self.instance.dir(), &command).await
    }

    /// Provision a fresh instance. The caller guarantees it does not exist
    /// yet and cleans up with [`StagingServer::remove`] on failure.
    pub async fn deploy(&self, sink: &dyn ProgressSink) -> Result<()> {
        let dir = self.instance.dir();
        let root = self.instance.root_dir();
        info!(branch = %self.instance.branch(), dir = %dir.display(), "Deploying staging server");

        report(sink, "Creating server folder", 0).await;
        self.run_in(root, &format!("mkdir -p {}", quote_path(&dir)))
            .await?;

        report(sink, "Cloning repository", 10).await;
        self.run_in(&dir, &format!("git clone {} .", quote(self.instance.repository())))
            .await?;
        self.run_in(&dir, &format!("git checkout {}", quote(self.instance.branch())))
            .await?;

        self.write_parameters().await?;
        self.write_robots_txt().await?;

        report(sink, "Installing dependencies", 30).await;
        self.install().await?;

        report(sink, "Creating database", 70).await;
        for args in [
            "doctrine:database:create --env=prod",
            "doctrine:schema:create --env=prod",
            "doctrine:fixtures:load -n --env=prod",
            "doctrine:migrations:version --add --all -n --env=prod",
        ] {
            self.console(args).await?;
        }

        self.grant_permissions().await?;

        report(sink, "Creating nginx instance", 85).await;
        self.install_virtual_host().await?;

        report(sink, "Creating HTTPS certificate", 90).await;
        self.run_in(
            &dir,
            &format!(
                "sudo certbot --nginx --non-interactive --redirect -d {}",
                quote(&self.instance.hostname())
            ),
        )
        .await?;

        info!(branch = %self.instance.branch(), url = %self.instance.url(), "Staging server deployed");
        Ok(())
    }

    async fn write_parameters(&self) -> Result<()> {
        let dir = self.instance.dir();
        let template = self.settings.installation_dir.join(PARAMETERS_TEMPLATE);
        self.run_in(
            &dir,
            &format!("cp {} {}", quote_path(&template), PARAMETERS_TARGET),
        )
        .await?;
        let substitution = format!("s/dbname/{}/g", self.instance.database_name());
        self.run_in(
            &dir,
            &format!("sed -i {} {}", quote(&substitution), PARAMETERS_TARGET),
        )
        .await?;
        Ok(())
    }

    async fn write_robots_txt(&self) -> Result<()> {
        let dir = self.instance.dir();
        self.run_in(&dir, &write_file_command(Path::new("www/robots.txt"), ROBOTS_TXT))
            .await?;
        Ok(())
    }

    async fn install(&self) -> Result<()> {
        run_install_phase(
            self.runner.as_ref(),
            &self.settings.install_tracks,
            &self.settings.post_install,
            self.instance.branch(),
            &self.instance.dir(),
        )
        .await
    }

    async fn grant_permissions(&self) -> Result<()> {
        let deploy_acl = format!("-m {}", quote(&format!("u:{}:rwX", self.settings.deploy_user)));
        let mut commands = vec![
            format!("sudo setfacl -R {} .", deploy_acl),
            format!("sudo setfacl -dR {} .", deploy_acl),
        ];

        if !self.settings.runtime_dirs.is_empty() {
            let acl = format!(
                "-m {} {}",
                quote(&format!("u:{}:rwX", self.settings.web_user)),
                deploy_acl
            );
            let runtime_dirs = self
                .settings
                .runtime_dirs
                .iter()
                .map(|d| quote(d))
                .collect::<Vec<_>>()
                .join(" ");
            commands.extend([
                format!("mkdir -p {}", runtime_dirs),
                format!("sudo setfacl -R {} {}", acl, runtime_dirs),
                format!("sudo setfacl -dR {} {}", acl, runtime_dirs),
            ]);
        }
        self.runner.run_all(&commands, &self.instance.dir()).await
    }

    async fn install_virtual_host(&self) -> Result<()> {
        let host = VirtualHost::new(self.instance.hostname(), self.instance.dir().join("www"));
        let target = host.path_in(&self.settings.nginx_dir);
        let commands = vec![
            write_file_command(&target, &host.render()),
            "sudo service nginx reload".to_string(),
        ];
        self.runner.run_all(&commands, &self.instance.dir()).await
    }

    /// Refresh remote tracking state and report whether `git status` shows
    /// anything to pull. Any failure answers `false`.
    pub async fn can_be_fast_forwarded(&self) -> bool {
        let dir = self.instance.dir();
        if let Err(err) = self.run_in(&dir, "git remote update").await {
            warn!(branch = %self.instance.branch(), "git remote update failed: {}", err);
            return false;
        }
        match self.run_in(&dir, "LC_ALL=C git status").await {
            Ok(status) => {
                let behind = status_allows_update(&status);
                debug!(branch = %self.instance.branch(), behind, "Checked fast-forward state");
                behind
            }
            Err(err) => {
                warn!(branch = %self.instance.branch(), "git status failed: {}", err);
                false
            }
        }
    }

    /// Bring an existing instance up to date with its remote branch.
    pub async fn update(&self, sink: &dyn ProgressSink) -> Result<()> {
        let dir = self.instance.dir();
        let branch = quote(self.instance.branch());
        info!(branch = %self.instance.branch(), "Updating staging server");

        report(sink, "Fetching changes", 10).await;
        let commands = vec![
            "git fetch origin".to_string(),
            format!("git reset --hard {}", quote(&format!("origin/{}", self.instance.branch()))),
            format!("git pull origin {}", branch),
        ];
        self.runner.run_all(&commands, &dir).await?;
        self.write_robots_txt().await?;

        report(sink, "Installing dependencies", 30).await;
        self.install().await?;

        report(sink, "Migrating database", 70).await;
        self.console("doctrine:migrations:migrate -n --env=prod").await?;

        info!(branch = %self.instance.branch(), "Staging server updated");
        Ok(())
    }

    /// Tear the instance down. Every step is attempted; only the database
    /// drop decides the result.
    pub async fn remove(&self) -> Result<()> {
        let dir = self.instance.dir();
        let root = self.instance.root_dir();
        if !self.instance.removal_is_bounded() {
            return Err(StagingError::RemoveRefused {
                dir,
                root: root.to_path_buf(),
            });
        }
        info!(branch = %self.instance.branch(), dir = %dir.display(), "Removing staging server");

        // The console lives inside the directory, so the drop goes first.
        let dropped = self
            .console("doctrine:database:drop --force --env=prod")
            .await
            .map(|_| ());

        let hostname = self.instance.hostname();
        let vhost = VirtualHost::new(hostname.clone(), dir.join("www")).path_in(&self.settings.nginx_dir);
        let cleanup = [
            format!(
                "sudo certbot revoke --non-interactive --delete-after-revoke --cert-name {}",
                quote(&hostname)
            ),
            format!("rm -f {}", quote_path(&vhost)),
            "sudo service nginx reload".to_string(),
            format!("rm -rf {}", quote_path(&dir)),
        ];
        for command in &cleanup {
            if let Err(err) = self.run_in(root, command).await {
                warn!(branch = %self.instance.branch(), "Cleanup step failed: {}", err);
            }
        }

        dropped
    }
}
