//! Run orchestration - applies one operation to every discovered repository
//!
//! Repositories are processed one at a time in walk order. Each goes through
//! the same pipeline:
//!
//! ```text
//! re-check .git -> inspect -> remotes? -> preconditions -> plan
//!     -> stash (dirty + auto-stash) -> execute -> restore -> outcome
//! ```
//!
//! A failure in one repository never stops the walk. Only an unreadable
//! root is fatal, and it is detected before any repository is touched.

use anyhow::{ensure, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::discovery::{Discovered, RepositoryHandle, RepositoryLocator};
use crate::git::{is_repository_root, GitBackend};
use crate::inspect::{RepositoryState, WorkingTreeInspector};
use crate::operation::{Plan, SyncOperation};
use crate::outcome::{FailReason, OperationOutcome, SkipReason, Warning};
use crate::report::{ReportEvent, Reporter};
use crate::stash::{RestoreStatus, StashGuard, StashRecord};

/// Parameters of a single run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub root: PathBuf,
    pub max_depth: usize,
    pub operation: SyncOperation,
    pub auto_stash: bool,
    /// Let pull proceed on branches without an upstream
    pub force: bool,
    pub follow_symlinks: bool,
}

impl RunOptions {
    pub fn new(root: impl Into<PathBuf>, operation: SyncOperation) -> Self {
        Self {
            root: root.into(),
            max_depth: 3,
            operation,
            auto_stash: true,
            force: false,
            follow_symlinks: false,
        }
    }
}

/// Everything known about one processed repository
#[derive(Debug, Clone, Serialize)]
pub struct RepoReport {
    pub path: PathBuf,
    pub operation: SyncOperation,
    pub outcome: OperationOutcome,
    pub stash: StashRecord,
    /// Absent when the repository could not be inspected
    pub state: Option<RepositoryState>,
}

/// Totals of a run. `total == success + skipped + error` always holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub error: usize,
    /// Successes that need manual stash resolution
    pub warnings: usize,
    pub duration: Duration,
    pub repositories: Vec<RepoReport>,
}

impl RunSummary {
    pub fn record(&mut self, report: RepoReport) {
        self.total += 1;
        match &report.outcome {
            OperationOutcome::Success(warning) => {
                self.success += 1;
                if warning.is_some() {
                    self.warnings += 1;
                }
            }
            OperationOutcome::Skipped(_) => self.skipped += 1,
            OperationOutcome::Failed(_) => self.error += 1,
        }
        self.repositories.push(report);
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.success + self.skipped + self.error
            && self.total == self.repositories.len()
    }

    pub fn has_errors(&self) -> bool {
        self.error > 0
    }

    /// Process exit status for this run
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }
}

/// Drives locator, inspector, stash guard and operation for a whole tree
#[derive(Clone)]
pub struct RunOrchestrator {
    git: Arc<dyn GitBackend>,
    reporter: Arc<dyn Reporter>,
    inspector: WorkingTreeInspector,
    stash_guard: StashGuard,
}

impl RunOrchestrator {
    pub fn new(git: Arc<dyn GitBackend>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            inspector: WorkingTreeInspector::new(git.clone()),
            stash_guard: StashGuard::new(git.clone()),
            git,
            reporter,
        }
    }

    /// Run the operation on every repository under `options.root`
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let start_time = Instant::now();

        let locator = RepositoryLocator::new(&options.root, options.max_depth)?
            .follow_symlinks(options.follow_symlinks);

        info!(
            "Starting {} under {} (max depth {})",
            options.operation,
            locator.root().display(),
            options.max_depth
        );
        self.reporter.report(&ReportEvent::RunStarted {
            root: locator.root().to_path_buf(),
            operation: options.operation,
            max_depth: locator.max_depth(),
        });

        let mut summary = RunSummary::default();

        for item in locator.locate() {
            match item {
                Discovered::Repository(handle) => {
                    let report = self.process(&handle, options).await;
                    self.reporter
                        .report(&ReportEvent::RepositoryFinished(report.clone()));
                    summary.record(report);
                }
                Discovered::DepthLimitReached(path) => {
                    self.reporter.report(&ReportEvent::DepthLimitReached {
                        path,
                        max_depth: options.max_depth,
                    });
                }
                Discovered::Unreadable { path, error } => {
                    self.reporter
                        .report(&ReportEvent::DirectoryUnreadable { path, error });
                }
            }
        }

        summary.duration = start_time.elapsed();
        ensure!(
            summary.is_consistent(),
            "Run summary is inconsistent: total {} != {} + {} + {}",
            summary.total,
            summary.success,
            summary.skipped,
            summary.error
        );

        info!(
            "Run completed in {:.2}s: {} total, {} successful, {} skipped, {} errors",
            summary.duration.as_secs_f64(),
            summary.total,
            summary.success,
            summary.skipped,
            summary.error
        );
        self.reporter.report(&ReportEvent::RunFinished(summary.clone()));

        Ok(summary)
    }

    /// Process one repository to exactly one outcome
    async fn process(&self, handle: &RepositoryHandle, options: &RunOptions) -> RepoReport {
        let operation = options.operation;
        let finish = |outcome, stash, state| RepoReport {
            path: handle.path().to_path_buf(),
            operation,
            outcome,
            stash,
            state,
        };

        if !is_repository_root(handle.path()) {
            return finish(
                OperationOutcome::Skipped(SkipReason::NotARepository),
                StashRecord::none(),
                None,
            );
        }

        let state = match self.inspector.inspect(handle).await {
            Ok(state) => state,
            Err(e) => {
                return finish(
                    OperationOutcome::Failed(FailReason::UnreadableDirectory {
                        detail: format!("{:#}", e),
                    }),
                    StashRecord::none(),
                    None,
                )
            }
        };

        if !state.has_remotes {
            return finish(
                OperationOutcome::Skipped(SkipReason::NoRemotes),
                StashRecord::none(),
                Some(state),
            );
        }

        if let Err(reason) = operation.check_preconditions(&state, options.force) {
            return finish(OperationOutcome::Skipped(reason), StashRecord::none(), Some(state));
        }

        let steps = match operation.plan(self.git.as_ref(), handle, &state).await {
            Ok(Plan::Run(steps)) => steps,
            Ok(Plan::Skip(reason)) => {
                return finish(OperationOutcome::Skipped(reason), StashRecord::none(), Some(state))
            }
            Err(e) => {
                return finish(
                    OperationOutcome::Failed(FailReason::UnreadableDirectory {
                        detail: format!("{:#}", e),
                    }),
                    StashRecord::none(),
                    Some(state),
                )
            }
        };

        // Read-only operations never need protection
        let wants_stash = state.is_dirty
            && operation.mutates_worktree()
            && (options.auto_stash || operation.forces_stash());

        let record = match self.stash_guard.protect(handle, wants_stash).await {
            Ok(record) => record,
            Err(e) => {
                return finish(
                    OperationOutcome::Failed(FailReason::StashCreation {
                        detail: format!("{:#}", e),
                    }),
                    StashRecord::none(),
                    Some(state),
                )
            }
        };
        if record.created {
            self.reporter.report(&ReportEvent::StashCreated {
                path: handle.path().to_path_buf(),
                label: record.label.clone(),
            });
        }

        let result = operation.execute(self.git.as_ref(), handle, &steps).await;
        let restored = self
            .stash_guard
            .restore(handle, record, result.is_ok(), operation)
            .await;

        if matches!(
            restored.status,
            RestoreStatus::KeptForReadOnly | RestoreStatus::PreservedAfterFailure
        ) {
            self.reporter.report(&ReportEvent::StashKept {
                path: handle.path().to_path_buf(),
                label: restored.record.label.clone(),
                status: restored.status.clone(),
            });
        }

        let outcome = match result {
            Err(reason) => OperationOutcome::Failed(reason),
            Ok(()) => match restored.status {
                RestoreStatus::Conflict { detail } => {
                    OperationOutcome::Success(Some(Warning::StashRestoreConflict {
                        label: restored.record.label.clone(),
                        detail,
                    }))
                }
                _ => OperationOutcome::success(),
            },
        };

        debug!("{}: {}", handle, outcome);
        finish(outcome, restored.record, Some(state))
    }
}
