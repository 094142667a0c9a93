use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::quote::{quote, quote_path};
use super::{CommandRunner, execute};
use crate::config::RemoteTarget;
use crate::errors::Result;

/// Runs commands on a remote host over `ssh`, authenticating with a
/// private key. The remote login shell interprets the command.
#[derive(Debug, Clone)]
pub struct SshRunner {
    target: RemoteTarget,
    timeout: Duration,
}

impl SshRunner {
    pub fn new(target: RemoteTarget, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.target.user, self.target.address)
    }

    fn ssh_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-i")
            .arg(&self.target.key_path)
            .args(["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"])
            .arg(self.destination())
            .arg(remote_command);
        cmd
    }
}

/// The command line handed to the remote shell.
fn remote_command(command: &str, dir: &Path) -> String {
    format!("cd {} && {}", quote_path(dir), command)
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn run(&self, command: &str, dir: &Path) -> Result<String> {
        debug!(
            command,
            dir = %dir.display(),
            host = %self.target.address,
            "Executing remotely"
        );
        let cmd = self.ssh_command(&remote_command(command, dir));
        execute(cmd, command, self.timeout).await
    }

    async fn dir_exists(&self, path: &Path) -> bool {
        let probe = format!("test -d {}", quote(&path.to_string_lossy()));
        let cmd = self.ssh_command(&probe);
        execute(cmd, &probe, self.timeout).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn runner() -> SshRunner {
        SshRunner::new(
            RemoteTarget {
                user: "deploy".to_string(),
                address: "staging.example.org".to_string(),
                key_path: PathBuf::from("/home/deploy/.ssh/id_ed25519"),
            },
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_destination() {
        assert_eq!(runner().destination(), "deploy@staging.example.org");
    }

    #[test]
    fn test_remote_command_changes_directory_first() {
        let cmd = remote_command("git pull origin main", Path::new("/var/www/servers/a b"));
        assert_eq!(cmd, "cd '/var/www/servers/a b' && git pull origin main");
    }

    #[test]
    fn test_ssh_arguments() {
        let cmd = runner().ssh_command("true");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(args[0], "-i");
        assert_eq!(args[1], "/home/deploy/.ssh/id_ed25519");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args[args.len() - 2], "deploy@staging.example.org");
        assert_eq!(args[args.len() - 1], "true");
    }
}
