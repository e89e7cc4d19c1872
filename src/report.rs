//! Run reporting
//!
//! The engine never prints. It emits [`ReportEvent`]s to an injected
//! [`Reporter`], so console formatting, JSON output and test capture are
//! interchangeable.

use crossterm::style::{Color, Stylize};
use crossterm::tty::IsTty;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

use crate::operation::SyncOperation;
use crate::outcome::OperationOutcome;
use crate::stash::RestoreStatus;
use crate::sync::{RepoReport, RunSummary};

/// Something worth telling the user about while a run progresses
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReportEvent {
    RunStarted {
        root: PathBuf,
        operation: SyncOperation,
        max_depth: usize,
    },
    DepthLimitReached {
        path: PathBuf,
        max_depth: usize,
    },
    DirectoryUnreadable {
        path: PathBuf,
        error: String,
    },
    StashCreated {
        path: PathBuf,
        label: String,
    },
    /// A protective stash was intentionally left in place
    StashKept {
        path: PathBuf,
        label: String,
        status: RestoreStatus,
    },
    RepositoryFinished(RepoReport),
    RunFinished(RunSummary),
}

/// Receives engine events
#[cfg_attr(test, mockall::automock)]
pub trait Reporter: Send + Sync {
    fn report(&self, event: &ReportEvent);
}

/// Human-readable output on stdout
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    color: bool,
}

impl ConsoleReporter {
    /// `color` is honored only when stdout is a terminal
    pub fn new(color: bool) -> Self {
        Self {
            color: color && std::io::stdout().is_tty(),
        }
    }

    fn paint(&self, text: String, color: Color) -> String {
        if self.color {
            text.with(color).to_string()
        } else {
            text
        }
    }

    fn repository_line(&self, report: &RepoReport) -> String {
        let path = report.path.display();
        match &report.outcome {
            OperationOutcome::Success(None) => {
                self.paint(format!("✅ {}: {}", path, report.operation), Color::Green)
            }
            OperationOutcome::Success(Some(warning)) => self.paint(
                format!("⚠️  {}: {} succeeded, but {}", path, report.operation, warning),
                Color::Yellow,
            ),
            OperationOutcome::Skipped(reason) => {
                self.paint(format!("⏭️  {}: skipped ({})", path, reason), Color::DarkGrey)
            }
            OperationOutcome::Failed(reason) => {
                self.paint(format!("❌ {}: {}", path, reason), Color::Red)
            }
        }
    }

    fn print_summary(&self, summary: &RunSummary) {
        println!();
        if summary.error == 0 {
            println!("{}", self.paint("🎉 Run complete".to_string(), Color::Green));
        } else {
            println!("{}", self.paint("💥 Run complete with errors".to_string(), Color::Red));
        }
        println!("   📊 Total repositories: {}", summary.total);
        println!("   ✅ Successful: {}", summary.success);
        println!("   ⏭️  Skipped: {}", summary.skipped);
        println!("   ❌ Errors: {}", summary.error);
        if summary.warnings > 0 {
            println!("   ⚠️  Need manual stash recovery: {}", summary.warnings);
        }
        println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

        let outstanding: Vec<&RepoReport> = summary
            .repositories
            .iter()
            .filter(|r| r.stash.is_outstanding())
            .collect();
        if !outstanding.is_empty() {
            println!("\n📦 Stashes left for manual recovery:");
            for report in outstanding {
                println!("   {}: {}", report.path.display(), report.stash.label);
            }
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &ReportEvent) {
        match event {
            ReportEvent::RunStarted {
                root,
                operation,
                max_depth,
            } => {
                println!(
                    "🔍 Running {} on repositories under {} (max depth {})",
                    operation,
                    root.display(),
                    max_depth
                );
            }
            ReportEvent::DepthLimitReached { path, max_depth } => {
                println!(
                    "{}",
                    self.paint(
                        format!("⚠️  Depth limit {} reached at {}", max_depth, path.display()),
                        Color::Yellow
                    )
                );
            }
            ReportEvent::DirectoryUnreadable { path, error } => {
                println!(
                    "{}",
                    self.paint(
                        format!("⚠️  Cannot read {}: {}", path.display(), error),
                        Color::Yellow
                    )
                );
            }
            ReportEvent::StashCreated { path, label } => {
                println!("📦 {}: stashed local changes as '{}'", path.display(), label);
            }
            ReportEvent::StashKept {
                path,
                label,
                status,
            } => {
                let why = match status {
                    RestoreStatus::KeptForReadOnly => "read-only operation",
                    RestoreStatus::PreservedAfterFailure => "operation failed",
                    _ => "restore did not complete",
                };
                println!("📦 {}: stash '{}' kept ({})", path.display(), label, why);
            }
            ReportEvent::RepositoryFinished(report) => {
                println!("{}", self.repository_line(report));
            }
            ReportEvent::RunFinished(summary) => self.print_summary(summary),
        }
    }
}

/// One JSON object per event on stdout
#[derive(Debug, Clone, Default)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, event: &ReportEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize report event: {}", e),
        }
    }
}
