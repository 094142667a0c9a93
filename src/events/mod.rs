//! Classification of GitHub webhook deliveries.
//!
//! A delivery is turned into an [`Event`] exactly once, at the HTTP boundary.
//! The event type comes from the `X-GitHub-Event` header; when the header is
//! absent the payload shape decides.
//!
//! | Delivery                                   | Event          | Intent          |
//! |--------------------------------------------|----------------|-----------------|
//! | `pull_request` opened/synchronize/reopened | `PullRequest`  | deploy-or-update|
//! | `push` to `refs/heads/<branch>`            | `Push`         | update-if-behind|
//! | `delete` with `ref_type: branch`           | `BranchDelete` | remove          |
//! | anything else                              | `Ignored`      | none            |

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{Result, StagingError};

const BRANCH_REF_PREFIX: &str = "refs/heads/";
const DEPLOY_ACTIONS: [&str; 3] = ["opened", "synchronize", "reopened"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PullRequest {
        action: String,
        number: u64,
        branch: String,
    },
    Push {
        branch: String,
    },
    BranchDelete {
        branch: String,
    },
    Ignored {
        kind: String,
        reason: String,
    },
}

/// What the dispatcher should do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    DeployOrUpdate,
    UpdateIfBehind,
    Remove,
    Ignore,
}

impl Event {
    pub fn intent(&self) -> Intent {
        match self {
            Event::PullRequest { .. } => Intent::DeployOrUpdate,
            Event::Push { .. } => Intent::UpdateIfBehind,
            Event::BranchDelete { .. } => Intent::Remove,
            Event::Ignored { .. } => Intent::Ignore,
        }
    }

    /// The branch this event targets, if any.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Event::PullRequest { branch, .. }
            | Event::Push { branch }
            | Event::BranchDelete { branch } => Some(branch),
            Event::Ignored { .. } => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &str {
        match self {
            Event::PullRequest { .. } => "pull_request",
            Event::Push { .. } => "push",
            Event::BranchDelete { .. } => "delete",
            Event::Ignored { kind, .. } => kind,
        }
    }

    fn ignored(kind: &str, reason: impl Into<String>) -> Self {
        Event::Ignored {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

// ── payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    #[serde(default)]
    number: Option<u64>,
    pull_request: PullRequestBody,
}

#[derive(Debug, Deserialize)]
struct PullRequestBody {
    number: u64,
    head: HeadRef,
}

#[derive(Debug, Deserialize)]
struct HeadRef {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct DeletePayload {
    #[serde(rename = "ref")]
    git_ref: String,
    ref_type: String,
}

fn parse<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| StagingError::Validation(format!("malformed {} payload: {}", kind, e)))
}

/// Guess the event type of a delivery without an `X-GitHub-Event` header.
fn infer_kind(value: &Value) -> &'static str {
    if value.get("pull_request").is_some() {
        "pull_request"
    } else if value.get("zen").is_some() {
        "ping"
    } else if value.get("ref_type").is_some() && value.get("master_branch").is_none() {
        "delete"
    } else if value.get("commits").is_some() || value.get("after").is_some() {
        "push"
    } else {
        "unknown"
    }
}

/// Turn one raw delivery into an [`Event`].
///
/// Fails with a validation error when the body is not JSON or a recognized
/// event type is missing required fields.
pub fn classify(event_type: Option<&str>, payload: &[u8]) -> Result<Event> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| StagingError::Validation(format!("payload is not valid JSON: {}", e)))?;
    let kind = match event_type {
        Some(kind) if !kind.is_empty() => kind,
        _ => infer_kind(&value),
    };

    match kind {
        "pull_request" => {
            let payload: PullRequestPayload = parse(kind, value)?;
            if !DEPLOY_ACTIONS.contains(&payload.action.as_str()) {
                return Ok(Event::ignored(
                    kind,
                    format!("action {:?} does not deploy", payload.action),
                ));
            }
            Ok(Event::PullRequest {
                number: payload.number.unwrap_or(payload.pull_request.number),
                action: payload.action,
                branch: payload.pull_request.head.branch,
            })
        }
        "push" => {
            let payload: PushPayload = parse(kind, value)?;
            if payload.deleted {
                return Ok(Event::ignored(kind, "push deletes the ref"));
            }
            match payload.git_ref.strip_prefix(BRANCH_REF_PREFIX) {
                Some(branch) if !branch.is_empty() => Ok(Event::Push {
                    branch: branch.to_string(),
                }),
                _ => Ok(Event::ignored(
                    kind,
                    format!("{} is not a branch", payload.git_ref),
                )),
            }
        }
        "delete" => {
            let payload: DeletePayload = parse(kind, value)?;
            if payload.ref_type != "branch" {
                return Ok(Event::ignored(
                    kind,
                    format!("deleted ref is a {}", payload.ref_type),
                ));
            }
            Ok(Event::BranchDelete {
                branch: payload.git_ref,
            })
        }
        other => Ok(Event::ignored(other, "event type is not handled")),
    }
}
