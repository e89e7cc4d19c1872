//! gitsweep - batch synchronization of local git working trees
//!
//! gitsweep walks a directory tree, finds every git repository beneath it and
//! applies one synchronization operation to each (reset, pull, fetch, rebase,
//! merge), protecting uncommitted work with labeled stash entries along the
//! way. Results are aggregated into a per-run summary.
//!
//! ## Modules
//!
//! - [`discovery`]: bounded, lazy repository discovery
//! - [`inspect`]: working tree state (branch, upstream, dirtiness)
//! - [`stash`]: protective stash creation and restoration
//! - [`operation`]: the closed set of operations and their git steps
//! - [`sync`]: the run orchestrator and summary
//! - [`report`]: console and JSON progress reporting
//! - [`github`] and [`clone`]: mass cloning of a GitHub account
//! - [`config`]: YAML configuration
//! - [`health`]: preflight checks

pub mod clone;
pub mod config;
pub mod discovery;
pub mod git;
pub mod github;
pub mod health;
pub mod inspect;
pub mod operation;
pub mod outcome;
pub mod report;
pub mod stash;
pub mod sync;

pub use clone::{CloneOptions, CloneSummary, MassCloner};
pub use config::Config;
pub use discovery::{RepositoryHandle, RepositoryLocator};
pub use git::{GitBackend, GitCli};
pub use github::{AccountKind, GitHubClient};
pub use health::HealthCheck;
pub use inspect::{RepositoryState, WorkingTreeInspector};
pub use operation::{OperationFamily, SyncOperation};
pub use outcome::{FailReason, OperationOutcome, SkipReason};
pub use report::{ConsoleReporter, JsonReporter, Reporter};
pub use stash::StashGuard;
pub use sync::{RunOptions, RunOrchestrator, RunSummary};
