//! Staging instances and their lifecycle.

pub mod install;
pub mod instance;
pub mod lock;
pub mod server;
pub mod workflow;

pub use install::run_install_phase;
pub use instance::{Instance, normalize_branch, validate_branch};
pub use lock::{BranchLease, BranchLocks};
pub use server::{StagingServer, status_allows_update};
pub use workflow::{Outcome, deploy_or_update, remove_if_present, update_if_behind};
