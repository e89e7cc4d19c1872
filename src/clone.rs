//! Mass cloning of a GitHub account's repositories
//!
//! Repositories are filtered, mapped to a target directory, then cloned on a
//! bounded worker pool. Existing targets are never touched.

use anyhow::{anyhow, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{CloneConfig, CloneProtocol};
use crate::git::GitBackend;
use crate::github::RemoteRepo;

#[derive(Debug, Clone)]
pub struct CloneOptions {
    pub base_directory: PathBuf,
    pub parallel: usize,
    pub timeout: Duration,
    pub protocol: CloneProtocol,
    pub include_forks: bool,
    pub include_archived: bool,
    /// Clone into `base/owner/name` instead of `base/name`
    pub separate_owner_dirs: bool,
    pub exclude_patterns: Vec<String>,
}

impl CloneOptions {
    pub fn from_config(config: &CloneConfig) -> Self {
        Self {
            base_directory: PathBuf::from(&config.base_directory),
            parallel: config.parallel.max(1),
            timeout: Duration::from_secs(config.timeout),
            protocol: config.protocol,
            include_forks: config.include_forks,
            include_archived: config.include_archived,
            separate_owner_dirs: config.separate_owner_dirs,
            exclude_patterns: config.exclude_patterns.clone(),
        }
    }

    /// Where `repo` ends up on disk
    pub fn target_path(&self, repo: &RemoteRepo) -> PathBuf {
        if self.separate_owner_dirs {
            self.base_directory.join(repo.owner()).join(&repo.name)
        } else {
            self.base_directory.join(&repo.name)
        }
    }

    fn clone_url<'a>(&self, repo: &'a RemoteRepo) -> &'a str {
        match self.protocol {
            CloneProtocol::Https => &repo.clone_url,
            CloneProtocol::Ssh => &repo.ssh_url,
        }
    }

    /// Why `repo` is filtered out, if it is
    fn exclusion(&self, repo: &RemoteRepo) -> Option<&'static str> {
        if repo.fork && !self.include_forks {
            return Some("fork");
        }
        if repo.archived && !self.include_archived {
            return Some("archived");
        }
        if matches_exclusion_pattern(&repo.name, &self.exclude_patterns) {
            return Some("excluded by pattern");
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum CloneOutcome {
    Cloned,
    /// Target directory already exists
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CloneReport {
    pub full_name: String,
    pub target: PathBuf,
    pub outcome: CloneOutcome,
}

/// Totals of a clone run. `total == cloned + skipped + failed`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CloneSummary {
    pub total: usize,
    pub cloned: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Repositories removed by filters before cloning; not part of `total`
    pub filtered: usize,
    pub duration: Duration,
    pub results: Vec<CloneReport>,
}

impl CloneSummary {
    fn record(&mut self, report: CloneReport) {
        self.total += 1;
        match report.outcome {
            CloneOutcome::Cloned => self.cloned += 1,
            CloneOutcome::Skipped => self.skipped += 1,
            CloneOutcome::Failed(_) => self.failed += 1,
        }
        self.results.push(report);
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.cloned + self.skipped + self.failed
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

pub struct MassCloner {
    git: Arc<dyn GitBackend>,
    options: CloneOptions,
}

impl MassCloner {
    pub fn new(git: Arc<dyn GitBackend>, options: CloneOptions) -> Self {
        Self { git, options }
    }

    /// Filter and clone `repositories` in parallel
    pub async fn clone_all(&self, repositories: Vec<RemoteRepo>) -> Result<CloneSummary> {
        let start_time = Instant::now();
        let mut summary = CloneSummary::default();

        let candidates: Vec<RemoteRepo> = repositories
            .into_iter()
            .filter(|repo| match self.options.exclusion(repo) {
                Some(reason) => {
                    debug!("Skipping {} ({})", repo.full_name, reason);
                    summary.filtered += 1;
                    false
                }
                None => true,
            })
            .collect();

        tokio::fs::create_dir_all(&self.options.base_directory)
            .await
            .with_context(|| {
                format!(
                    "Failed to create base directory {}",
                    self.options.base_directory.display()
                )
            })?;

        info!(
            "Cloning {} repositories into {} ({} at a time)",
            candidates.len(),
            self.options.base_directory.display(),
            self.options.parallel
        );

        let semaphore = Arc::new(Semaphore::new(self.options.parallel.max(1)));
        let mut futures = FuturesUnordered::new();

        for repo in candidates {
            let semaphore = semaphore.clone();
            let git = self.git.clone();
            let target = self.options.target_path(&repo);
            let url = self.options.clone_url(&repo).to_string();
            let clone_timeout = self.options.timeout;

            futures.push(async move {
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => clone_one(git.as_ref(), &url, &target, clone_timeout).await,
                    Err(e) => CloneOutcome::Failed(format!("worker pool closed: {}", e)),
                };
                CloneReport {
                    full_name: repo.full_name,
                    target,
                    outcome,
                }
            });
        }

        while let Some(report) = futures.next().await {
            match &report.outcome {
                CloneOutcome::Cloned => info!("Cloned {}", report.full_name),
                CloneOutcome::Skipped => {
                    info!("{} already exists at {}", report.full_name, report.target.display())
                }
                CloneOutcome::Failed(e) => error!("Clone of {} failed: {}", report.full_name, e),
            }
            summary.record(report);
        }

        summary.results.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        summary.duration = start_time.elapsed();

        info!(
            "Clone completed in {:.2}s: {} cloned, {} skipped, {} failed",
            summary.duration.as_secs_f64(),
            summary.cloned,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }
}

async fn clone_one(git: &dyn GitBackend, url: &str, target: &Path, clone_timeout: Duration) -> CloneOutcome {
    if target.exists() {
        return CloneOutcome::Skipped;
    }

    match timeout(clone_timeout, run_clone(git, url, target)).await {
        Ok(Ok(())) => CloneOutcome::Cloned,
        Ok(Err(e)) => CloneOutcome::Failed(format!("{:#}", e)),
        Err(_) => {
            warn!("Clone of {} timed out", url);
            // the killed clone may have left a partial checkout behind
            if target.exists() {
                if let Err(e) = tokio::fs::remove_dir_all(target).await {
                    warn!("Failed to remove partial clone {}: {}", target.display(), e);
                }
            }
            CloneOutcome::Failed(format!(
                "timed out after {}s",
                clone_timeout.as_secs_f64()
            ))
        }
    }
}

async fn run_clone(git: &dyn GitBackend, url: &str, target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| anyhow!("Clone target {} has no parent directory", target.display()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let target_arg = target.to_string_lossy();
    let output = git.run(parent, &["clone", url, target_arg.as_ref()]).await?;
    if !output.success {
        return Err(anyhow!("git clone failed: {}", output.failure_detail()));
    }
    Ok(())
}

/// Whether `name` matches one of the glob-style patterns (`*` wildcard)
fn matches_exclusion_pattern(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.contains('*') {
            let pattern_regex = regex::escape(pattern).replace(r"\*", ".*");
            Regex::new(&format!("^{}$", pattern_regex))
                .map(|re| re.is_match(name))
                .unwrap_or(false)
        } else {
            name == pattern
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeGit;
    use crate::git::GitOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn remote(owner: &str, name: &str) -> RemoteRepo {
        RemoteRepo {
            name: name.to_string(),
            full_name: format!("{}/{}", owner, name),
            clone_url: format!("https://github.com/{}/{}.git", owner, name),
            ssh_url: format!("git@github.com:{}/{}.git", owner, name),
            fork: false,
            private: false,
            archived: false,
            default_branch: Some("main".to_string()),
        }
    }

    fn options(base: &Path) -> CloneOptions {
        CloneOptions {
            base_directory: base.to_path_buf(),
            parallel: 2,
            timeout: Duration::from_secs(30),
            protocol: CloneProtocol::Https,
            include_forks: true,
            include_archived: true,
            separate_owner_dirs: false,
            exclude_patterns: Vec::new(),
        }
    }

    /// Backend whose clones take a while, tracking peak concurrency
    struct SlowGit {
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl GitBackend for SlowGit {
        async fn run(&self, _dir: &Path, _args: &[&str]) -> Result<GitOutput> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(GitOutput::ok(""))
        }
    }

    #[test]
    fn test_exclusion_patterns() {
        let patterns = vec!["*-archive".to_string(), "test.*".to_string(), "scratch".to_string()];

        assert!(matches_exclusion_pattern("old-archive", &patterns));
        assert!(matches_exclusion_pattern("test.repo", &patterns));
        assert!(matches_exclusion_pattern("scratch", &patterns));
        assert!(!matches_exclusion_pattern("testXrepo", &patterns));
        assert!(!matches_exclusion_pattern("scratchpad", &patterns));
    }

    #[test]
    fn test_target_path_layout() {
        let mut opts = options(Path::new("/dev"));
        let repo = remote("acme", "api");

        assert_eq!(opts.target_path(&repo), PathBuf::from("/dev/api"));
        opts.separate_owner_dirs = true;
        assert_eq!(opts.target_path(&repo), PathBuf::from("/dev/acme/api"));

        opts.protocol = CloneProtocol::Ssh;
        assert_eq!(opts.clone_url(&repo), "git@github.com:acme/api.git");
    }

    #[tokio::test]
    async fn test_clones_filters_and_skips_existing() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("existing")).unwrap();

        let mut fork = remote("acme", "forked");
        fork.fork = true;
        let mut archived = remote("acme", "frozen");
        archived.archived = true;

        let mut opts = options(temp.path());
        opts.include_forks = false;
        opts.include_archived = false;
        opts.exclude_patterns = vec!["tmp-*".to_string()];

        let git = Arc::new(FakeGit::new().fail("clone https://github.com/acme/broken.git", "fatal: repository not found"));
        let cloner = MassCloner::new(git.clone(), opts);

        let summary = cloner
            .clone_all(vec![
                remote("acme", "api"),
                remote("acme", "existing"),
                remote("acme", "broken"),
                remote("acme", "tmp-scratch"),
                fork,
                archived,
            ])
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.cloned, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.filtered, 3);
        assert!(summary.is_consistent());
        assert_eq!(summary.exit_code(), 1);

        assert!(git.called("clone https://github.com/acme/api.git"));
        assert!(!git.called("clone https://github.com/acme/existing.git"));
        assert!(!git.called("clone https://github.com/acme/forked.git"));

        let names: Vec<&str> = summary.results.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["acme/api", "acme/broken", "acme/existing"]);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let temp = TempDir::new().unwrap();
        let git = Arc::new(SlowGit {
            delay: Duration::from_millis(20),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let cloner = MassCloner::new(git.clone(), options(temp.path()));

        let repos = (0..6).map(|i| remote("acme", &format!("repo-{}", i))).collect();
        let summary = cloner.clone_all(repos).await.unwrap();

        assert_eq!(summary.cloned, 6);
        assert!(git.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_slow_clone_times_out() {
        let temp = TempDir::new().unwrap();
        let git = Arc::new(SlowGit {
            delay: Duration::from_secs(5),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut opts = options(temp.path());
        opts.timeout = Duration::from_millis(50);
        let cloner = MassCloner::new(git, opts);

        let summary = cloner.clone_all(vec![remote("acme", "huge")]).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(matches!(
            &summary.results[0].outcome,
            CloneOutcome::Failed(msg) if msg.contains("timed out")
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_clone_process_is_killed() {
        use crate::git::GitCli;
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base");
        let marker = temp.path().join("finished");

        // stand-in for git: start the checkout, then keep "downloading"
        let script = temp.path().join("slow-git");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nmkdir -p \"$3\"\nsleep 1\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut opts = options(&base);
        opts.timeout = Duration::from_millis(300);
        let git = Arc::new(GitCli::with_program(script.to_string_lossy()));
        let cloner = MassCloner::new(git, opts);

        let summary = cloner.clone_all(vec![remote("acme", "huge")]).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(!base.join("huge").exists());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
        assert!(!base.join("huge").exists());
    }
}
