//! Git subprocess plumbing
//!
//! Every git query and mutation issued by the engine goes through the
//! [`GitBackend`] trait. The production implementation, [`GitCli`], spawns the
//! `git` executable with its working directory pinned to the repository, so
//! no process-wide state is touched between repositories.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Captured result of a single git invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Best human-readable explanation of a failed command
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "exited with non-zero status".to_string()
    }
}

/// Runs git commands inside a repository directory.
///
/// `Err` is reserved for "git could not be started at all" (missing binary,
/// unreadable working directory). A command that runs and exits non-zero is
/// reported through [`GitOutput::success`].
#[async_trait]
pub trait GitBackend: Send + Sync {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput>;
}

/// [`GitBackend`] backed by the system `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Use a specific git executable instead of the one on `PATH`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitBackend for GitCli {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<GitOutput> {
        debug!("git {} (in {})", args.join(" "), dir.display());

        let output = AsyncCommand::new(&self.program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| {
                format!("Failed to execute git {} in {}", args.join(" "), dir.display())
            })?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Whether `path` holds repository metadata (a `.git` directory, or a
/// `.git` file as used by worktrees and submodules)
pub fn is_repository_root(path: &Path) -> bool {
    path.join(".git").exists()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_detail_prefers_stderr() {
        let output = GitOutput {
            success: false,
            stdout: "Auto-merging README.md\n".to_string(),
            stderr: "CONFLICT (content): Merge conflict in README.md\n".to_string(),
        };
        assert_eq!(
            output.failure_detail(),
            "CONFLICT (content): Merge conflict in README.md"
        );

        let quiet = GitOutput::failed("");
        assert_eq!(quiet.failure_detail(), "exited with non-zero status");
    }

    #[test]
    fn test_repository_root_detection() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(!is_repository_root(temp.path()));

        std::fs::create_dir(temp.path().join(".git")).unwrap();
        assert!(is_repository_root(temp.path()));

        // Worktrees and submodules use a .git file
        let worktree = temp.path().join("worktree");
        std::fs::create_dir(&worktree).unwrap();
        std::fs::write(worktree.join(".git"), "gitdir: ../.git/worktrees/wt\n").unwrap();
        assert!(is_repository_root(&worktree));
    }

    #[tokio::test]
    async fn test_git_cli_reports_spawn_failure() {
        let git = GitCli::with_program("definitely-not-a-git-binary");
        let result = git.run(Path::new("."), &["--version"]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fake_stash_simulation() {
        let git = fake::FakeGit::new();
        let dir = Path::new("/repo");

        git.run(dir, &["stash", "push", "--include-untracked", "-m", "first"]).await.unwrap();
        git.run(dir, &["stash", "push", "--include-untracked", "-m", "second"]).await.unwrap();

        let list = git.run(dir, &["stash", "list"]).await.unwrap();
        assert_eq!(list.stdout, "stash@{0}\tOn main: second\nstash@{1}\tOn main: first\n");

        let pop = git.run(dir, &["stash", "pop", "stash@{1}"]).await.unwrap();
        assert!(pop.success);
        assert_eq!(git.stash_entries(), vec!["On main: second".to_string()]);
    }
}
