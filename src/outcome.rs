//! Per-repository outcome taxonomy
//!
//! Every repository visited by a run ends with exactly one
//! [`OperationOutcome`]. Reasons are closed enumerations so reports can be
//! matched on exhaustively.

use serde::Serialize;
use std::fmt;

/// Why a repository was left untouched. Never counted as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Re-check at processing time found no repository metadata
    NotARepository,
    NoRemotes,
    DetachedHead,
    /// Upstream-dependent operation on a branch without a tracking ref
    NoUpstream,
    /// Neither the remote HEAD, `main` nor `master` exists on `origin`
    NoDefaultBranch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotARepository => "not-a-repository",
            SkipReason::NoRemotes => "no-remotes",
            SkipReason::DetachedHead => "detached-head",
            SkipReason::NoUpstream => "no-upstream",
            SkipReason::NoDefaultBranch => "no-default-branch",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why processing a repository failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailReason {
    /// Protection was required but the stash could not be created; the
    /// operation never ran
    StashCreation { detail: String },
    /// A step of the operation exited non-zero
    OperationExit { command: String, detail: String },
    /// The repository directory could not be accessed to run git
    UnreadableDirectory { detail: String },
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::StashCreation { .. } => "stash-creation-failure",
            FailReason::OperationExit { .. } => "operation-exit-nonzero",
            FailReason::UnreadableDirectory { .. } => "unreadable-directory",
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::StashCreation { detail } => {
                write!(f, "stash creation failed: {}", detail)
            }
            FailReason::OperationExit { command, detail } => {
                write!(f, "`git {}` failed: {}", command, detail)
            }
            FailReason::UnreadableDirectory { detail } => {
                write!(f, "repository not accessible: {}", detail)
            }
        }
    }
}

/// Condition attached to a successful outcome that still needs attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Warning {
    /// The operation succeeded but popping the protective stash conflicted;
    /// the stash entry is still present and must be resolved by hand
    StashRestoreConflict { label: String, detail: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::StashRestoreConflict { label, detail } => write!(
                f,
                "stash '{}' could not be restored ({}); resolve it manually with `git stash list`",
                label, detail
            ),
        }
    }
}

/// Final result for one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum OperationOutcome {
    Success(Option<Warning>),
    Skipped(SkipReason),
    Failed(FailReason),
}

impl OperationOutcome {
    pub fn success() -> Self {
        OperationOutcome::Success(None)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, OperationOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, OperationOutcome::Failed(_))
    }

    pub fn warning(&self) -> Option<&Warning> {
        match self {
            OperationOutcome::Success(warning) => warning.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationOutcome::Success(None) => f.write_str("success"),
            OperationOutcome::Success(Some(warning)) => write!(f, "success with warning: {}", warning),
            OperationOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            OperationOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
