//! Common test utilities for gitsweep integration tests
//!
//! Builds real git repositories in temporary directories: a bare "remote"
//! seeded with one commit, and working clones of it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tempfile::TempDir;

use gitsweep::report::{ReportEvent, Reporter};

/// Whether a usable git executable is on PATH
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run git in `dir`, panicking with its stderr on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("Failed to execute git");
    assert!(
        output.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn configure_identity(repo: &Path) {
    git(repo, &["config", "user.name", "gitsweep tests"]);
    git(repo, &["config", "user.email", "tests@gitsweep.invalid"]);
    git(repo, &["config", "pull.rebase", "false"]);
    git(repo, &["config", "commit.gpgsign", "false"]);
}

/// Temporary workspace holding remotes and a root directory to sweep
pub struct GitFixture {
    pub temp_dir: TempDir,
}

impl GitFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("root")).expect("Failed to create root dir");
        std::fs::create_dir_all(temp_dir.path().join("remotes")).expect("Failed to create remotes dir");
        Self { temp_dir }
    }

    /// Directory passed to runs
    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().join("root")
    }

    /// Bare repository on `main` with a README commit
    pub fn remote(&self, name: &str) -> PathBuf {
        let remotes = self.temp_dir.path().join("remotes");
        let bare = remotes.join(format!("{}.git", name));
        git(&remotes, &["init", "--bare", "--quiet", bare.to_str().expect("utf-8 path")]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let seed = remotes.join(format!("{}-seed", name));
        std::fs::create_dir_all(&seed).expect("Failed to create seed dir");
        git(&seed, &["init", "--quiet"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        configure_identity(&seed);
        commit_file(&seed, "README.md", "first line\n", "Initial commit");
        git(&seed, &["remote", "add", "origin", bare.to_str().expect("utf-8 path")]);
        git(&seed, &["push", "--quiet", "-u", "origin", "main"]);

        bare
    }

    /// Clone `remote` to `root/<name>`
    pub fn clone_into_root(&self, remote: &Path, name: &str) -> PathBuf {
        let dest = self.root().join(name);
        git(
            &self.root(),
            &["clone", "--quiet", remote.to_str().expect("utf-8 path"), dest.to_str().expect("utf-8 path")],
        );
        configure_identity(&dest);
        dest
    }

    /// Push a new commit to `remote` through a scratch clone
    pub fn advance_remote(&self, remote: &Path, file: &str, content: &str) {
        let scratch = self.temp_dir.path().join(format!(
            "scratch-{}",
            remote.file_stem().and_then(|s| s.to_str()).unwrap_or("remote")
        ));
        if !scratch.exists() {
            git(
                self.temp_dir.path(),
                &["clone", "--quiet", remote.to_str().expect("utf-8 path"), scratch.to_str().expect("utf-8 path")],
            );
            configure_identity(&scratch);
        } else {
            git(&scratch, &["pull", "--quiet"]);
        }
        commit_file(&scratch, file, content, "Remote change");
        git(&scratch, &["push", "--quiet", "origin", "main"]);
    }

    /// Repository under root with a commit but no remotes
    pub fn local_only(&self, name: &str) -> PathBuf {
        let dir = self.root().join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create repo dir");
        git(&dir, &["init", "--quiet"]);
        git(&dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        configure_identity(&dir);
        commit_file(&dir, "README.md", "local\n", "Local commit");
        dir
    }
}

pub fn commit_file(repo: &Path, file: &str, content: &str, message: &str) {
    std::fs::write(repo.join(file), content).expect("Failed to write file");
    git(repo, &["add", file]);
    git(repo, &["commit", "--quiet", "-m", message]);
}

pub fn head(repo: &Path) -> String {
    git(repo, &["rev-parse", "HEAD"]).trim().to_string()
}

pub fn stash_count(repo: &Path) -> usize {
    git(repo, &["stash", "list"]).lines().count()
}

/// Reporter that keeps every event for later assertions
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().expect("reporter lock poisoned").clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &ReportEvent) {
        self.events
            .lock()
            .expect("reporter lock poisoned")
            .push(event.clone());
    }
}

/// Assertion helper for output validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
