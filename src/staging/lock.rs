//! Per-branch advisory locks.
//!
//! The dispatcher serializes webhook-driven operations, but a manual
//! `deploy-branch` run is a separate process. Both take an exclusive `flock`
//! on `<lock_dir>/<safe_branch>.lock` for the whole operation.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::errors::{Result, StagingError};

#[derive(Debug, Clone)]
pub struct BranchLocks {
    dir: PathBuf,
}

/// Held for as long as the branch is being operated on.
#[derive(Debug)]
pub struct BranchLease {
    file: File,
    path: PathBuf,
}

impl BranchLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BranchLease {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "Released branch lock");
    }
}

impl BranchLocks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn lock_path(&self, safe_branch: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", safe_branch))
    }

    fn open(dir: &Path, path: &Path) -> std::io::Result<File> {
        std::fs::create_dir_all(dir)?;
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
    }

    /// Block until the lock for `safe_branch` is ours.
    pub async fn acquire(&self, safe_branch: &str) -> Result<BranchLease> {
        let path = self.lock_path(safe_branch);
        let dir = self.dir.clone();
        let lock_path = path.clone();
        let file = tokio::task::spawn_blocking(move || {
            let file = Self::open(&dir, &lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| StagingError::Other(anyhow::anyhow!("lock task failed: {}", e)))?
        .map_err(|source| StagingError::Lock {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Acquired branch lock");
        Ok(BranchLease { file, path })
    }

    /// Take the lock if nobody holds it; `Ok(None)` when it is busy.
    pub fn try_acquire(&self, safe_branch: &str) -> Result<Option<BranchLease>> {
        let path = self.lock_path(safe_branch);
        let file = Self::open(&self.dir, &path).map_err(|source| StagingError::Lock {
            path: path.clone(),
            source,
        })?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(BranchLease { file, path })),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(source) => Err(StagingError::Lock { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let locks = BranchLocks::new(dir.path().join("locks"));
        let lease = locks.acquire("feature-x").await.unwrap();
        assert!(lease.path().ends_with("feature-x.lock"));
        assert!(lease.path().exists());
    }

    #[tokio::test]
    async fn test_held_lock_is_busy_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let locks = BranchLocks::new(dir.path());

        let lease = locks.acquire("main").await.unwrap();
        assert!(locks.try_acquire("main").unwrap().is_none());
        // Other branches are independent.
        assert!(locks.try_acquire("other").unwrap().is_some());

        drop(lease);
        assert!(locks.try_acquire("main").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let locks = BranchLocks::new(dir.path());
        let lease = locks.acquire("main").await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("main").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(lease);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap()
            .unwrap();
    }
}
