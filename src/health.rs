//! Preflight checks for `gitsweep doctor`
//!
//! Verifies git is usable and the root directory can be walked before a
//! run is attempted.

use std::path::Path;

use crate::git::GitBackend;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Root directory status, when a root was given
    pub root: Option<CheckResult>,
    /// GitHub token presence (warning only, needed by `clone` for private
    /// repositories and higher rate limits)
    pub github_token: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(git: &dyn GitBackend, root: Option<&Path>) -> Self {
        let token = std::env::var("GITHUB_TOKEN").ok();
        Self {
            git: Self::check_git(git).await,
            root: root.map(Self::check_root),
            github_token: Self::check_github_token(token.as_deref()),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.root.as_ref().map_or(true, |r| r.passed)
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Check git installation
    async fn check_git(git: &dyn GitBackend) -> CheckResult {
        let dir = std::env::temp_dir();
        match git.run(&dir, &["--version"]).await {
            Ok(output) if output.success => {
                CheckResult::ok_with_details("Git installed", output.stdout_trimmed().to_string())
            }
            Ok(output) => CheckResult::error_with_details("Git command failed", output.failure_detail()),
            Err(_) => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Check the root directory can be listed
    fn check_root(root: &Path) -> CheckResult {
        if !root.exists() {
            return CheckResult::error_with_details(
                "Root directory does not exist",
                root.display().to_string(),
            );
        }
        if !root.is_dir() {
            return CheckResult::error(format!("{} is not a directory", root.display()));
        }
        match std::fs::read_dir(root) {
            Ok(_) => CheckResult::ok_with_details("Root directory readable", root.display().to_string()),
            Err(e) => CheckResult::error_with_details("Root directory not readable", e.to_string()),
        }
    }

    fn check_github_token(token: Option<&str>) -> CheckResult {
        match token.map(str::trim) {
            Some(token) if !token.is_empty() => {
                CheckResult::ok_with_details("GITHUB_TOKEN set", "Authenticated GitHub API access")
            }
            _ => CheckResult::warning_with_details(
                "GITHUB_TOKEN not set",
                "clone is limited to public repositories and 60 API requests per hour",
            ),
        }
    }

    /// Get all checks for iteration
    pub fn all_checks(&self) -> Vec<(&'static str, &CheckResult)> {
        let mut checks = vec![("Git Installation", &self.git)];
        if let Some(root) = &self.root {
            checks.push(("Root Directory", root));
        }
        checks.push(("GitHub Token", &self.github_token));
        checks
    }
}
