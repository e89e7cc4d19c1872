use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for gitsweep
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    /// Defaults for `reset` and `sync` runs
    #[serde(default)]
    pub sync: SyncConfig,

    /// GitHub mass-clone settings
    #[serde(default)]
    pub clone: CloneConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Run defaults; command-line flags override them
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SyncConfig {
    /// Directory levels below the root that are enumerated
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Stash a dirty tree before a mutating operation
    #[serde(default = "default_true")]
    pub auto_stash: bool,

    /// Let pull run on branches without an upstream
    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CloneProtocol {
    #[default]
    Https,
    Ssh,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CloneConfig {
    /// Where repositories are cloned to
    #[serde(default = "default_base_directory")]
    pub base_directory: String,

    /// Maximum concurrent clones
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Per-clone timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub protocol: CloneProtocol,

    #[serde(default = "default_true")]
    pub include_forks: bool,

    #[serde(default = "default_true")]
    pub include_archived: bool,

    /// Clone into `base/owner/name` instead of `base/name`
    #[serde(default)]
    pub separate_owner_dirs: bool,

    /// Glob-style repository name patterns to skip
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Full,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level used when neither `RUST_LOG` nor `--verbose` is given
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Colored console output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_max_depth() -> usize {
    3
}
fn default_base_directory() -> String {
    "~/dev".to_string()
}
fn default_parallel() -> usize {
    4
}
fn default_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            auto_stash: true,
            force: false,
            follow_symlinks: false,
        }
    }
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
            parallel: default_parallel(),
            timeout: default_timeout(),
            protocol: CloneProtocol::Https,
            include_forks: true,
            include_archived: true,
            separate_owner_dirs: false,
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Compact,
            color: true,
        }
    }
}

impl Config {
    /// Load from `path` when given, otherwise from the default location.
    ///
    /// An explicit path must exist. A missing default file yields the
    /// built-in defaults without writing anything.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load_or_default(),
        }
    }

    /// Load configuration from the default location, or use defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            let mut config = Self::default();
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;
        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Write the default configuration to `path`.
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!(
                "Configuration already exists at {:?} (use --force to overwrite)",
                path
            );
        }
        Self::default().save(path)?;
        tracing::info!("Wrote default configuration to {:?}", path);
        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("gitsweep").join("config.yml"))
    }

    /// Expand `~` and environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.clone.base_directory = shellexpand::full(&self.clone.base_directory)
            .context("Failed to expand base_directory path")?
            .into_owned();

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.clone.parallel == 0 {
            bail!("clone.parallel must be at least 1");
        }
        if self.clone.timeout == 0 {
            bail!("clone.timeout must be at least 1 second");
        }
        Ok(())
    }
}
