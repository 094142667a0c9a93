//! Integration tests for the stagebot binary.
//!
//! Nothing here touches a real host: lifecycle commands run with
//! `--dry-run`, and listing runs against temporary directories.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a stagebot Command isolated from the caller's environment
fn stagebot(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("stagebot");
    cmd.current_dir(dir.path())
        .env_remove("GITHUB_WEBHOOKS_SECRET")
        .env_remove("GITHUB_ACCESS_TOKEN")
        .env_remove("SLACK_ENDPOINT")
        .env_remove("REMOTE_USER")
        .env_remove("REMOTE_ADDRESS")
        .env_remove("PRIVATE_KEY_PATH")
        .env_remove("STAGEBOT_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

/// Write a configuration pointing every path into `dir`
fn write_config(dir: &TempDir, root: &Path) -> PathBuf {
    let path = dir.path().join("stagebot.toml");
    let content = format!(
        "[staging]\nroot_dir = {:?}\nlock_dir = {:?}\ndomain = \"staging.example.org\"\nnginx_dir = {:?}\n",
        root.display().to_string(),
        dir.path().join("locks").display().to_string(),
        dir.path().join("nginx").display().to_string(),
    );
    fs::write(&path, content).unwrap();
    path
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        stagebot(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("deploy-branch"))
            .stdout(predicate::str::contains("list-servers"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        stagebot(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        let dir = TempDir::new().unwrap();
        stagebot(&dir)
            .arg("redeploy-everything")
            .assert()
            .failure()
            .stderr(predicate::str::contains("unrecognized subcommand"));
    }

    #[test]
    fn test_serve_requires_webhook_secret() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &dir.path().join("servers"));
        stagebot(&dir)
            .args(["--config", config.to_str().unwrap(), "serve"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("GITHUB_WEBHOOKS_SECRET"));
    }

    #[test]
    fn test_partial_remote_configuration_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &dir.path().join("servers"));
        stagebot(&dir)
            .env("REMOTE_USER", "deploy")
            .args(["--config", config.to_str().unwrap(), "ls"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("REMOTE_ADDRESS"));
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = TempDir::new().unwrap();
        stagebot(&dir)
            .args(["--config", "does-not-exist.toml", "ls"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does-not-exist.toml"));
    }
}

// =============================================================================
// deploy-branch
// =============================================================================

mod deploy_branch {
    use super::*;

    #[test]
    fn test_invalid_branch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &dir.path().join("servers"));
        stagebot(&dir)
            .args(["--config", config.to_str().unwrap()])
            .args(["deploy-branch", "--dry-run", "bad;name"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid input"));
    }

    #[test]
    fn test_dry_run_deploy_prints_plan() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &dir.path().join("servers"));
        stagebot(&dir)
            .args(["--config", config.to_str().unwrap()])
            .args(["deploy-branch", "--dry-run", "Feature/X"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Staging server deployed at https://feature-x.staging.example.org",
            ))
            .stdout(predicate::str::contains("Planned commands:"))
            .stdout(predicate::str::contains("git checkout Feature/X"))
            .stdout(predicate::str::contains("certbot --nginx"));

        // Nothing was actually created.
        assert!(!dir.path().join("servers").exists());
    }

    #[test]
    fn test_dry_run_delete_of_absent_instance() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &dir.path().join("servers"));
        stagebot(&dir)
            .args(["--config", config.to_str().unwrap()])
            .args(["deploy-branch", "-d", "--dry-run", "feature-x"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No staging server deployed for feature-x"));
    }

    #[test]
    fn test_dry_run_delete_of_present_instance() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("servers");
        fs::create_dir_all(root.join("feature-x")).unwrap();
        let config = write_config(&dir, &root);
        stagebot(&dir)
            .args(["--config", config.to_str().unwrap()])
            .args(["deploy-branch", "--delete", "--dry-run", "feature-x"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Staging server for feature-x deleted"))
            .stdout(predicate::str::contains("doctrine:database:drop"));

        // The recorded plan never touches the real directory.
        assert!(root.join("feature-x").is_dir());
    }
}

// =============================================================================
// list-servers
// =============================================================================

mod list_servers {
    use super::*;

    #[test]
    fn test_lists_instance_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("servers");
        fs::create_dir_all(root.join("main")).unwrap();
        fs::create_dir_all(root.join("feature-y")).unwrap();
        fs::create_dir_all(root.join(".trash")).unwrap();
        let config = write_config(&dir, &root);

        stagebot(&dir)
            .args(["--config", config.to_str().unwrap(), "list-servers"])
            .assert()
            .success()
            .stdout(predicate::str::contains("https://main.staging.example.org"))
            .stdout(predicate::str::contains("https://feature-y.staging.example.org"))
            .stdout(predicate::str::contains(".trash").not());
    }

    #[test]
    fn test_ls_alias_with_empty_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("servers");
        fs::create_dir_all(&root).unwrap();
        let config = write_config(&dir, &root);

        stagebot(&dir)
            .args(["--config", config.to_str().unwrap(), "ls"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No staging servers deployed."));
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &dir.path().join("missing"));
        stagebot(&dir)
            .args(["--config", config.to_str().unwrap(), "ls"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Not found"));
    }
}
