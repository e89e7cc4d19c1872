//! Working tree inspection
//!
//! Gathers the mutable repository state the engine needs before it decides
//! whether an operation is safe: configured remotes, current branch or
//! detached HEAD, upstream tracking ref, dirty tree, ahead/behind counts.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::discovery::RepositoryHandle;
use crate::git::GitBackend;

/// Snapshot of a repository's state, recomputed on every run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryState {
    pub is_dirty: bool,
    /// `None` when HEAD is detached
    pub current_branch: Option<String>,
    /// Tracking ref of the current branch, e.g. `origin/main`
    pub upstream: Option<String>,
    /// Commits on HEAD not on upstream; 0 without an upstream
    pub ahead_count: u32,
    /// Commits on upstream not on HEAD; 0 without an upstream
    pub behind_count: u32,
    pub has_remotes: bool,
    /// `origin` when configured, otherwise the first listed remote
    pub default_remote: Option<String>,
}

impl RepositoryState {
    pub fn is_detached(&self) -> bool {
        self.current_branch.is_none()
    }
}

/// Reads [`RepositoryState`] through a [`GitBackend`]
#[derive(Clone)]
pub struct WorkingTreeInspector {
    git: Arc<dyn GitBackend>,
}

impl WorkingTreeInspector {
    pub fn new(git: Arc<dyn GitBackend>) -> Self {
        Self { git }
    }

    /// Inspect a repository produced by the locator.
    ///
    /// Failed queries degrade to the conservative answer (no branch, no
    /// upstream, dirty). `Err` only surfaces when git cannot be started in
    /// the repository directory.
    pub async fn inspect(&self, repo: &RepositoryHandle) -> Result<RepositoryState> {
        let dir = repo.path();

        let remotes = self.git.run(dir, &["remote"]).await?;
        let remote_names: Vec<&str> = if remotes.success {
            remotes.stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
        } else {
            Vec::new()
        };
        let default_remote = remote_names
            .iter()
            .find(|name| **name == "origin")
            .or_else(|| remote_names.first())
            .map(|name| name.to_string());

        let branch = self
            .git
            .run(dir, &["symbolic-ref", "--quiet", "--short", "HEAD"])
            .await?;
        let current_branch = if branch.success && !branch.stdout_trimmed().is_empty() {
            Some(branch.stdout_trimmed().to_string())
        } else {
            None
        };

        let upstream = if current_branch.is_some() {
            let output = self
                .git
                .run(dir, &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
                .await?;
            if output.success && !output.stdout_trimmed().is_empty() {
                Some(output.stdout_trimmed().to_string())
            } else {
                None
            }
        } else {
            None
        };

        let status = self.git.run(dir, &["status", "--porcelain"]).await?;
        let is_dirty = if status.success {
            !status.stdout_trimmed().is_empty()
        } else {
            warn!(
                "git status failed in {}, treating tree as dirty: {}",
                repo,
                status.failure_detail()
            );
            true
        };

        let (ahead_count, behind_count) = if upstream.is_some() {
            let counts = self
                .git
                .run(dir, &["rev-list", "--left-right", "--count", "HEAD...@{u}"])
                .await?;
            if counts.success {
                parse_ahead_behind(counts.stdout_trimmed())
            } else {
                (0, 0)
            }
        } else {
            (0, 0)
        };

        let state = RepositoryState {
            is_dirty,
            current_branch,
            upstream,
            ahead_count,
            behind_count,
            has_remotes: default_remote.is_some(),
            default_remote,
        };

        debug!("State of {}: {:?}", repo, state);
        Ok(state)
    }
}

/// Parse `git rev-list --left-right --count` output ("<ahead>\t<behind>")
fn parse_ahead_behind(output: &str) -> (u32, u32) {
    let mut parts = output.split_whitespace();
    let ahead = parts.next().and_then(|n| n.parse().ok()).unwrap_or(0);
    let behind = parts.next().and_then(|n| n.parse().ok()).unwrap_or(0);
    (ahead, behind)
}
