//! Stash protection for dirty working trees
//!
//! Before a mutating operation runs against a dirty tree, [`StashGuard`]
//! shelves the changes in a labeled stash entry. Afterwards it decides
//! whether to pop it back:
//!
//! - operation succeeded and mutated the tree: pop (a conflict leaves the
//!   entry in place and is reported as a warning)
//! - operation failed: keep the entry, never pop
//! - read-only operation: keep the entry for the caller
//!
//! A stash that was created but not popped is a valid end state meaning
//! "manual recovery available", not an error.

use anyhow::{bail, Result};
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::discovery::RepositoryHandle;
use crate::git::GitBackend;
use crate::operation::SyncOperation;

const LABEL_PREFIX: &str = "gitsweep autostash";

/// What the guard did for one repository.
///
/// `popped` is only ever true when `created` is true.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StashRecord {
    pub created: bool,
    pub label: String,
    pub popped: bool,
}

impl StashRecord {
    /// Record for a repository that needed no protection
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a protective stash entry remains in the repository
    pub fn is_outstanding(&self) -> bool {
        self.created && !self.popped
    }
}

/// How restoration went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RestoreStatus {
    /// No stash was created
    NotNeeded,
    Restored,
    /// Kept because the operation never touches the working tree
    KeptForReadOnly,
    /// Kept because the operation failed
    PreservedAfterFailure,
    /// Popping failed; the entry is still in the stash list
    Conflict { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreResult {
    pub record: StashRecord,
    pub status: RestoreStatus,
}

/// Creates and restores protective stash entries
#[derive(Clone)]
pub struct StashGuard {
    git: Arc<dyn GitBackend>,
}

impl StashGuard {
    pub fn new(git: Arc<dyn GitBackend>) -> Self {
        Self { git }
    }

    /// Stash uncommitted work (including untracked files) when `dirty`.
    ///
    /// An `Err` means protection was requested and could not be put in
    /// place; the caller must not run the operation.
    pub async fn protect(&self, repo: &RepositoryHandle, dirty: bool) -> Result<StashRecord> {
        if !dirty {
            return Ok(StashRecord::none());
        }

        let label = stash_label();
        let output = self
            .git
            .run(
                repo.path(),
                &["stash", "push", "--include-untracked", "-m", label.as_str()],
            )
            .await?;

        if !output.success {
            bail!("git stash push failed: {}", output.failure_detail());
        }

        if output.stdout.contains("No local changes to save") {
            debug!("Nothing to stash in {}", repo);
            return Ok(StashRecord::none());
        }

        info!("Stashed uncommitted changes in {} as '{}'", repo, label);
        Ok(StashRecord {
            created: true,
            label,
            popped: false,
        })
    }

    /// Decide the fate of the stash once the operation has finished
    pub async fn restore(
        &self,
        repo: &RepositoryHandle,
        record: StashRecord,
        operation_succeeded: bool,
        operation: SyncOperation,
    ) -> RestoreResult {
        if !record.created {
            return RestoreResult {
                record,
                status: RestoreStatus::NotNeeded,
            };
        }

        if !operation.mutates_worktree() {
            info!(
                "Leaving stash '{}' in {} ({} does not modify the working tree)",
                record.label,
                repo,
                operation.name()
            );
            return RestoreResult {
                record,
                status: RestoreStatus::KeptForReadOnly,
            };
        }

        if !operation_succeeded {
            warn!(
                "{} failed in {}; stash '{}' preserved for manual recovery",
                operation.name(),
                repo,
                record.label
            );
            return RestoreResult {
                record,
                status: RestoreStatus::PreservedAfterFailure,
            };
        }

        match self.pop(repo, &record.label).await {
            Ok(()) => {
                info!("Restored stash '{}' in {}", record.label, repo);
                RestoreResult {
                    record: StashRecord {
                        popped: true,
                        ..record
                    },
                    status: RestoreStatus::Restored,
                }
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                warn!("Could not restore stash '{}' in {}: {}", record.label, repo, detail);
                RestoreResult {
                    record,
                    status: RestoreStatus::Conflict { detail },
                }
            }
        }
    }

    /// Pop the entry carrying `label`, wherever it sits in the stash list
    async fn pop(&self, repo: &RepositoryHandle, label: &str) -> Result<()> {
        let list = self
            .git
            .run(repo.path(), &["stash", "list", "--format=%gd%x09%gs"])
            .await?;
        if !list.success {
            bail!("git stash list failed: {}", list.failure_detail());
        }

        let Some(reference) = find_stash_ref(&list.stdout, label) else {
            bail!("stash entry '{}' not found", label);
        };

        let output = self
            .git
            .run(repo.path(), &["stash", "pop", reference.as_str()])
            .await?;
        if !output.success {
            bail!("{}", output.failure_detail());
        }
        Ok(())
    }
}

/// Unique, timestamped stash message
fn stash_label() -> String {
    format!(
        "{} {}",
        LABEL_PREFIX,
        Local::now().format("%Y-%m-%dT%H:%M:%S%.3f")
    )
}

fn find_stash_ref(list: &str, label: &str) -> Option<String> {
    list.lines().find_map(|line| {
        let (reference, subject) = line.split_once('\t')?;
        // Subjects look like "On main: <label>"
        subject
            .ends_with(label)
            .then(|| reference.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeGit;
    use crate::operation::{PullMode, ResetMode};
    use assert_matches::assert_matches;

    fn handle() -> RepositoryHandle {
        RepositoryHandle::new("/work/repo")
    }

    #[tokio::test]
    async fn test_clean_tree_creates_no_stash() {
        let git = Arc::new(FakeGit::new());
        let guard = StashGuard::new(git.clone());

        let record = guard.protect(&handle(), false).await.unwrap();
        assert_eq!(record, StashRecord::none());
        assert!(!git.called("stash"));

        let restored = guard
            .restore(&handle(), record, true, SyncOperation::Pull(PullMode::Plain))
            .await;
        assert_eq!(restored.status, RestoreStatus::NotNeeded);
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dirty_tree_is_stashed_and_popped_after_success() {
        let git = Arc::new(FakeGit::new().with_stash_entry("older user stash"));
        let guard = StashGuard::new(git.clone());

        let record = guard.protect(&handle(), true).await.unwrap();
        assert!(record.created);
        assert!(record.label.starts_with(LABEL_PREFIX));
        assert_eq!(git.stash_entries().len(), 2);

        let restored = guard
            .restore(&handle(), record, true, SyncOperation::Reset(ResetMode::Hard))
            .await;
        assert_eq!(restored.status, RestoreStatus::Restored);
        assert!(restored.record.created && restored.record.popped);
        // Only our entry was popped
        assert_eq!(git.stash_entries(), vec!["On main: older user stash".to_string()]);
    }

    #[tokio::test]
    async fn test_stash_preserved_after_failed_operation() {
        let git = Arc::new(FakeGit::new());
        let guard = StashGuard::new(git.clone());

        let record = guard.protect(&handle(), true).await.unwrap();
        let restored = guard
            .restore(&handle(), record, false, SyncOperation::Rebase)
            .await;

        assert_eq!(restored.status, RestoreStatus::PreservedAfterFailure);
        assert!(restored.record.is_outstanding());
        assert!(!git.called("stash pop"));
        assert_eq!(git.stash_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_operation_keeps_stash() {
        let git = Arc::new(FakeGit::new());
        let guard = StashGuard::new(git.clone());

        let record = guard.protect(&handle(), true).await.unwrap();
        let restored = guard
            .restore(&handle(), record, true, SyncOperation::Fetch)
            .await;

        assert_eq!(restored.status, RestoreStatus::KeptForReadOnly);
        assert!(restored.record.is_outstanding());
        assert!(!git.called("stash pop"));
    }

    #[tokio::test]
    async fn test_pop_conflict_leaves_record_unpopped() {
        let git = Arc::new(FakeGit::new().fail(
            "stash pop",
            "CONFLICT (content): Merge conflict in src/lib.rs\nThe stash entry is kept in case you need it again.",
        ));
        let guard = StashGuard::new(git.clone());

        let record = guard.protect(&handle(), true).await.unwrap();
        let restored = guard
            .restore(&handle(), record, true, SyncOperation::Merge)
            .await;

        assert_matches!(restored.status, RestoreStatus::Conflict { ref detail } if detail.contains("CONFLICT"));
        assert!(restored.record.created);
        assert!(!restored.record.popped);
    }

    #[tokio::test]
    async fn test_stash_push_failure_is_an_error() {
        let git = Arc::new(FakeGit::new().fail("stash push", "fatal: Unable to create '.git/index.lock'"));
        let guard = StashGuard::new(git);

        let err = guard.protect(&handle(), true).await.unwrap_err();
        assert!(err.to_string().contains("index.lock"));
    }

    #[tokio::test]
    async fn test_nothing_to_save_is_not_a_stash() {
        let git = Arc::new(FakeGit::new().on("stash push", "No local changes to save\n"));
        let guard = StashGuard::new(git);

        let record = guard.protect(&handle(), true).await.unwrap();
        assert!(!record.created);
    }

    #[test]
    fn test_find_stash_ref() {
        let list = "stash@{0}\tOn main: gitsweep autostash 2026-01-01T10:00:00.000\n\
                    stash@{1}\tWIP on main: 1234567 message\n";
        assert_eq!(
            find_stash_ref(list, "gitsweep autostash 2026-01-01T10:00:00.000"),
            Some("stash@{0}".to_string())
        );
        assert_eq!(find_stash_ref(list, "gitsweep autostash 2020"), None);
    }
}
