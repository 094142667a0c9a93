//! CLI command implementations.
//!
//! | Module   | Commands handled                  |
//! |----------|-----------------------------------|
//! | `serve`  | `Serve` (and no subcommand)       |
//! | `deploy` | `DeployBranch`                    |
//! | `list`   | `ListServers`                     |

pub mod deploy;
pub mod list;
pub mod serve;

pub use deploy::cmd_deploy_branch;
pub use list::cmd_list_servers;
pub use serve::cmd_serve;
