//! Synchronization operations
//!
//! One closed enum covers both operation families:
//!
//! | Token (family)        | Variant                  | Commands                                        |
//! |-----------------------|--------------------------|-------------------------------------------------|
//! | `soft` (reset)        | `Reset(Soft)`            | `reset --soft HEAD`                             |
//! | `hard` (reset)        | `Reset(Hard)`            | `reset --hard HEAD`                             |
//! | `clean` (reset)       | `Reset(Clean)`           | `reset --hard HEAD`, `clean -fd`                |
//! | `pull` (reset)        | `Reset(Pull)`            | `reset --hard HEAD`, `pull` (`pull origin <b>` when detached) |
//! | `origin` (reset)      | `Reset(Origin)`          | `checkout -B <b> origin/<b>`, `reset --hard origin/<b>`, `pull origin <b>` |
//! | `pull` (sync)         | `Pull(Plain)`            | `pull`                                          |
//! | `stash-pull` (sync)   | `Pull(Stash)`            | `pull`, always stash-protected                  |
//! | `fetch` (sync)        | `Fetch`                  | `fetch --all --prune`                           |
//! | `rebase` (sync)       | `Rebase`                 | `pull --rebase`                                 |
//! | `merge` (sync)        | `Merge`                  | `pull --no-rebase`                              |
//!
//! An operation is first planned into [`Step`]s, which may resolve to a skip
//! (`Reset(Origin)`, or `Reset(Pull)` on a detached HEAD, without a default
//! branch), then executed step by
//! step; the first non-zero exit fails the operation.

use anyhow::{bail, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::discovery::RepositoryHandle;
use crate::git::GitBackend;
use crate::inspect::RepositoryState;
use crate::outcome::{FailReason, SkipReason};

/// Which command family an operation token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationFamily {
    Reset,
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetMode {
    Soft,
    Hard,
    /// Hard reset, then remove untracked files and directories
    Clean,
    /// Hard reset, then pull
    Pull,
    /// Check out the remote default branch and reset it to `origin`
    Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullMode {
    Plain,
    /// Stash-protect a dirty tree even when auto-stash is disabled
    Stash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", content = "mode", rename_all = "kebab-case")]
pub enum SyncOperation {
    Reset(ResetMode),
    Pull(PullMode),
    Fetch,
    Rebase,
    Merge,
}

impl SyncOperation {
    /// Resolve an operation token within its family.
    ///
    /// Unknown tokens are an error; callers treat it as fatal for the run.
    pub fn parse(family: OperationFamily, token: &str) -> Result<Self> {
        let token = token.trim().to_lowercase();
        let operation = match (family, token.as_str()) {
            (OperationFamily::Reset, "soft") => SyncOperation::Reset(ResetMode::Soft),
            (OperationFamily::Reset, "hard") => SyncOperation::Reset(ResetMode::Hard),
            (OperationFamily::Reset, "clean") => SyncOperation::Reset(ResetMode::Clean),
            (OperationFamily::Reset, "pull") => SyncOperation::Reset(ResetMode::Pull),
            (OperationFamily::Reset, "origin") => SyncOperation::Reset(ResetMode::Origin),
            (OperationFamily::Sync, "pull") => SyncOperation::Pull(PullMode::Plain),
            (OperationFamily::Sync, "stash-pull") => SyncOperation::Pull(PullMode::Stash),
            (OperationFamily::Sync, "fetch") => SyncOperation::Fetch,
            (OperationFamily::Sync, "rebase") => SyncOperation::Rebase,
            (OperationFamily::Sync, "merge") => SyncOperation::Merge,
            (OperationFamily::Reset, other) => bail!(
                "Unknown reset mode '{}': expected one of soft, hard, clean, pull, origin",
                other
            ),
            (OperationFamily::Sync, other) => bail!(
                "Unknown sync operation '{}': expected one of pull, fetch, rebase, merge, stash-pull",
                other
            ),
        };
        Ok(operation)
    }

    /// Display name, e.g. `reset hard` or `stash-pull`
    pub fn name(&self) -> &'static str {
        match self {
            SyncOperation::Reset(ResetMode::Soft) => "reset soft",
            SyncOperation::Reset(ResetMode::Hard) => "reset hard",
            SyncOperation::Reset(ResetMode::Clean) => "reset clean",
            SyncOperation::Reset(ResetMode::Pull) => "reset pull",
            SyncOperation::Reset(ResetMode::Origin) => "reset origin",
            SyncOperation::Pull(PullMode::Plain) => "pull",
            SyncOperation::Pull(PullMode::Stash) => "stash-pull",
            SyncOperation::Fetch => "fetch",
            SyncOperation::Rebase => "rebase",
            SyncOperation::Merge => "merge",
        }
    }

    /// Whether the operation can alter the working tree. Only fetch cannot.
    pub fn mutates_worktree(&self) -> bool {
        !matches!(self, SyncOperation::Fetch)
    }

    /// Pull, rebase and merge act on the current branch's upstream
    pub fn requires_upstream(&self) -> bool {
        matches!(
            self,
            SyncOperation::Pull(_) | SyncOperation::Rebase | SyncOperation::Merge
        )
    }

    /// Whether force mode lets the operation run without an upstream
    pub fn tolerates_missing_upstream(&self) -> bool {
        matches!(self, SyncOperation::Pull(_))
    }

    /// Whether a dirty tree is protected regardless of the auto-stash setting
    pub fn forces_stash(&self) -> bool {
        matches!(self, SyncOperation::Pull(PullMode::Stash))
    }

    /// Branch/upstream preconditions, checked before anything is touched
    pub fn check_preconditions(&self, state: &RepositoryState, force: bool) -> Result<(), SkipReason> {
        if !self.requires_upstream() {
            return Ok(());
        }
        if state.is_detached() {
            return Err(SkipReason::DetachedHead);
        }
        if state.upstream.is_none() && !(force && self.tolerates_missing_upstream()) {
            return Err(SkipReason::NoUpstream);
        }
        Ok(())
    }

    /// Turn the operation into concrete git steps for one repository
    pub async fn plan(
        &self,
        git: &dyn GitBackend,
        repo: &RepositoryHandle,
        state: &RepositoryState,
    ) -> Result<Plan> {
        let steps = match self {
            SyncOperation::Reset(ResetMode::Soft) => vec![Step::new(&["reset", "--soft", "HEAD"])],
            SyncOperation::Reset(ResetMode::Hard) => vec![Step::new(&["reset", "--hard", "HEAD"])],
            SyncOperation::Reset(ResetMode::Clean) => vec![
                Step::new(&["reset", "--hard", "HEAD"]),
                Step::new(&["clean", "-fd"]),
            ],
            SyncOperation::Reset(ResetMode::Pull) if state.is_detached() => {
                // no branch to pull into by name, so pull origin's default branch
                let Some(branch) = resolve_default_branch(git, repo).await? else {
                    return Ok(Plan::Skip(SkipReason::NoDefaultBranch));
                };
                vec![
                    Step::new(&["reset", "--hard", "HEAD"]),
                    Step::new(&["pull", "origin", branch.as_str()]),
                ]
            }
            SyncOperation::Reset(ResetMode::Pull) => vec![
                Step::new(&["reset", "--hard", "HEAD"]),
                Step::from_args(pull_args(state, &[])),
            ],
            SyncOperation::Reset(ResetMode::Origin) => {
                let Some(branch) = resolve_default_branch(git, repo).await? else {
                    return Ok(Plan::Skip(SkipReason::NoDefaultBranch));
                };
                let target = format!("origin/{}", branch);
                vec![
                    Step::new(&["checkout", "-B", branch.as_str(), target.as_str()]),
                    Step::new(&["reset", "--hard", target.as_str()]),
                    Step::new(&["pull", "origin", branch.as_str()]),
                ]
            }
            SyncOperation::Pull(_) => vec![Step::from_args(pull_args(state, &[]))],
            SyncOperation::Fetch => vec![Step::new(&["fetch", "--all", "--prune"])],
            SyncOperation::Rebase => vec![Step::from_args(pull_args(state, &["--rebase"]))
                .with_cleanup(&["rebase", "--abort"])],
            SyncOperation::Merge => vec![Step::from_args(pull_args(state, &["--no-rebase"]))
                .with_cleanup(&["merge", "--abort"])],
        };

        Ok(Plan::Run(steps))
    }

    /// Run planned steps in order, stopping at the first failure
    pub async fn execute(
        &self,
        git: &dyn GitBackend,
        repo: &RepositoryHandle,
        steps: &[Step],
    ) -> Result<(), FailReason> {
        for step in steps {
            let command = step.command();
            debug!("{}: git {}", repo, command);

            let output = match git.run(repo.path(), &step.arg_refs()).await {
                Ok(output) => output,
                Err(e) => {
                    return Err(FailReason::UnreadableDirectory {
                        detail: format!("{:#}", e),
                    })
                }
            };

            if !output.success {
                let detail = output.failure_detail();
                warn!("{}: git {} failed: {}", repo, command, detail);
                if let Some(cleanup) = &step.cleanup {
                    let args: Vec<&str> = cleanup.iter().map(String::as_str).collect();
                    match git.run(repo.path(), &args).await {
                        Ok(out) if out.success => info!("{}: ran git {}", repo, args.join(" ")),
                        _ => debug!("{}: git {} had nothing to undo", repo, args.join(" ")),
                    }
                }
                return Err(FailReason::OperationExit { command, detail });
            }
        }

        Ok(())
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One git invocation, with an optional undo command run if it fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub args: Vec<String>,
    pub cleanup: Option<Vec<String>>,
}

impl Step {
    fn new(args: &[&str]) -> Self {
        Self::from_args(args.iter().map(|a| a.to_string()).collect())
    }

    fn from_args(args: Vec<String>) -> Self {
        Self {
            args,
            cleanup: None,
        }
    }

    fn with_cleanup(mut self, args: &[&str]) -> Self {
        self.cleanup = Some(args.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn command(&self) -> String {
        self.args.join(" ")
    }

    fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

/// Outcome of planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Run(Vec<Step>),
    Skip(SkipReason),
}

/// `git pull [extra]`, naming remote and branch explicitly when the branch
/// has no upstream
fn pull_args(state: &RepositoryState, extra: &[&str]) -> Vec<String> {
    let mut args: Vec<String> = std::iter::once("pull")
        .chain(extra.iter().copied())
        .map(str::to_string)
        .collect();

    if state.upstream.is_none() {
        if let (Some(remote), Some(branch)) = (&state.default_remote, &state.current_branch) {
            args.push(remote.clone());
            args.push(branch.clone());
        }
    }

    args
}

/// Default branch of `origin`: the remote HEAD when it points at an existing
/// ref, otherwise `main`, then `master`
async fn resolve_default_branch(git: &dyn GitBackend, repo: &RepositoryHandle) -> Result<Option<String>> {
    let head = git
        .run(
            repo.path(),
            &["symbolic-ref", "--quiet", "--short", "refs/remotes/origin/HEAD"],
        )
        .await?;
    if head.success {
        if let Some(branch) = head.stdout_trimmed().strip_prefix("origin/") {
            if !branch.is_empty() && remote_branch_exists(git, repo, branch).await? {
                return Ok(Some(branch.to_string()));
            }
        }
    }

    for candidate in ["main", "master"] {
        if remote_branch_exists(git, repo, candidate).await? {
            return Ok(Some(candidate.to_string()));
        }
    }

    Ok(None)
}

async fn remote_branch_exists(git: &dyn GitBackend, repo: &RepositoryHandle, branch: &str) -> Result<bool> {
    let reference = format!("refs/remotes/origin/{}", branch);
    let output = git
        .run(repo.path(), &["rev-parse", "--verify", "--quiet", reference.as_str()])
        .await?;
    Ok(output.success)
}
