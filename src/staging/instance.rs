use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::StagingSettings;
use crate::errors::{Result, StagingError};

/// DNS labels are limited to 63 octets.
const MAX_SAFE_BRANCH_LEN: usize = 63;

/// Branch names accepted from webhooks and the CLI. Deliberately narrower
/// than git's own ref rules.
static BRANCH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/+-]*$").expect("branch pattern is valid")
});

/// Normalize a raw branch name into an identifier usable as a directory
/// name, database name fragment, and hostname label.
///
/// Lowercases, maps every character outside `[a-z0-9]` to `-`, collapses
/// runs of `-`, trims `-` from both ends and caps the length at 63.
/// Normalizing an already-normalized name returns it unchanged.
pub fn normalize_branch(branch: &str) -> String {
    let mut out = String::with_capacity(branch.len());
    for c in branch.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    if out.len() > MAX_SAFE_BRANCH_LEN {
        out.truncate(MAX_SAFE_BRANCH_LEN);
    }
    out.trim_end_matches('-').to_string()
}

/// Reject branch names that cannot safely reach a command line.
pub fn validate_branch(branch: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(StagingError::Validation(format!(
            "branch {:?} {}",
            branch, reason
        )))
    };
    if branch.is_empty() {
        return invalid("is empty");
    }
    if !BRANCH_PATTERN.is_match(branch) {
        return invalid("contains unsupported characters");
    }
    if branch.contains("..") || branch.contains("//") {
        return invalid("contains an empty or parent path component");
    }
    if branch.ends_with('/') || branch.ends_with(".lock") {
        return invalid("has an invalid suffix");
    }
    if normalize_branch(branch).is_empty() {
        return invalid("normalizes to an empty identifier");
    }
    Ok(())
}

/// One staging deployment, identified by its branch.
///
/// Nothing here is persisted: whether the instance exists is decided by its
/// directory on the target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    branch: String,
    safe_branch: String,
    repository: String,
    domain: String,
    root_dir: PathBuf,
}

impl Instance {
    /// Build an instance for `branch` with the process-wide defaults.
    pub fn new(branch: &str, settings: &StagingSettings) -> Result<Self> {
        validate_branch(branch)?;
        Ok(Self {
            branch: branch.to_string(),
            safe_branch: normalize_branch(branch),
            repository: settings.repository.clone(),
            domain: settings.domain.clone(),
            root_dir: settings.root_dir.clone(),
        })
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn safe_branch(&self) -> &str {
        &self.safe_branch
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn hostname(&self) -> String {
        format!("{}.{}", self.safe_branch, self.domain)
    }

    pub fn url(&self) -> String {
        format!("https://{}", self.hostname())
    }

    /// The instance directory; its presence is the instance's existence.
    pub fn dir(&self) -> PathBuf {
        self.root_dir.join(&self.safe_branch)
    }

    pub fn database_name(&self) -> String {
        format!("staging_{}", self.safe_branch.replace('-', "_"))
    }

    /// True when the instance directory is exactly one plain component
    /// below the root, so it can never resolve to the root itself.
    pub fn removal_is_bounded(&self) -> bool {
        let dir = self.dir();
        let Ok(rest) = dir.strip_prefix(&self.root_dir) else {
            return false;
        };
        let mut components = rest.components();
        matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(name)), None) if !name.is_empty()
        )
    }

    #[cfg(test)]
    pub(crate) fn unchecked(branch: &str, safe_branch: &str, root_dir: &str) -> Self {
        Self {
            branch: branch.to_string(),
            safe_branch: safe_branch.to_string(),
            repository: "https://example.org/repo.git".to_string(),
            domain: "staging.example.org".to_string(),
            root_dir: PathBuf::from(root_dir),
        }
    }
}
