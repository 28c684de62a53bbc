use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::UpgradeError;
use crate::upgrade::Mode;

/// Main configuration structure for repo-upgrade
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// The checkout to keep in sync
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Upgrade behavior settings
    #[serde(default)]
    pub upgrade: UpgradeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the checkout lives and which upstream branch it mirrors
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Local directory that must end up mirroring the remote branch
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Name the remote is registered under inside the checkout
    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    /// Address of the upstream repository
    #[serde(default)]
    pub remote_url: String,

    /// Branch to track
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// Upgrade behavior
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpgradeConfig {
    /// "auto", "default" or "hard"
    #[serde(default)]
    pub mode: Mode,

    /// Remove untracked files after a default-mode reset (hard mode always does)
    #[serde(default)]
    pub clean_untracked: bool,

    /// Git executable to invoke
    #[serde(default = "default_git_binary")]
    pub git_binary: String,

    /// Give up after this many seconds (applied by the CLI, not the engine)
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact" or "full"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_remote_name() -> String {
    "origin".to_string()
}
fn default_branch() -> String {
    "master".to_string()
}
fn default_git_binary() -> String {
    "git".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            remote_name: default_remote_name(),
            remote_url: String::new(),
            branch: default_branch(),
        }
    }
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            clean_untracked: false,
            git_binary: default_git_binary(),
            timeout: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_true(),
        }
    }
}

impl RepositoryConfig {
    pub fn new(dir: impl Into<PathBuf>, remote_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            remote_url: remote_url.into(),
            ..Self::default()
        }
    }

    pub fn with_remote_name(mut self, remote_name: impl Into<String>) -> Self {
        self.remote_name = remote_name.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// `<remote_name>/<branch>`, the ref every sync resets to
    pub fn upstream(&self) -> String {
        format!("{}/{}", self.remote_name, self.branch)
    }

    /// Reject configurations no synchronization could succeed with.
    pub fn validate(&self) -> Result<(), UpgradeError> {
        if self.remote_url.trim().is_empty() {
            return Err(UpgradeError::Config("remote URL is empty".to_string()));
        }

        if self.dir.as_os_str().is_empty() {
            return Err(UpgradeError::Config("target directory is empty".to_string()));
        }

        let name = self.remote_name.as_str();
        if name.is_empty() || name.contains(char::is_whitespace) || name.contains('/') {
            return Err(UpgradeError::Config(format!(
                "invalid remote name {:?}",
                self.remote_name
            )));
        }

        let branch = self.branch.as_str();
        if branch.is_empty() || branch.contains(char::is_whitespace) || branch.starts_with('-') {
            return Err(UpgradeError::Config(format!(
                "invalid branch name {:?}",
                self.branch
            )));
        }

        Ok(())
    }

    /// Expand `~` and environment variables in `dir` and normalize it
    pub fn expand_dir(&mut self) -> Result<()> {
        let raw = self.dir.to_string_lossy().into_owned();
        let expanded = shellexpand::full(&raw)
            .with_context(|| format!("Failed to expand repository dir: {}", raw))?;
        self.dir = path_clean::clean(&*expanded);
        Ok(())
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        // Expand environment variables in paths
        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repo-upgrade").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.repository.expand_dir()?;

        self.upgrade.git_binary = shellexpand::full(&self.upgrade.git_binary)
            .context("Failed to expand git_binary path")?
            .into_owned();

        Ok(())
    }
}
