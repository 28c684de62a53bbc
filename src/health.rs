//! Preflight checks for repo-upgrade
//!
//! This module verifies the host can run an upgrade before anything touches
//! the target directory.

use crate::config::RepositoryConfig;
use crate::Config;
use std::path::Path;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Repository configuration status
    pub repository: CheckResult,
    /// Target directory status
    pub target_dir: CheckResult,
    /// SSH configuration status (warning only, not required)
    pub ssh: CheckResult,
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
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

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
    pub fn run(config: &Config) -> Self {
        Self {
            git: Self::check_git(&config.upgrade.git_binary),
            repository: Self::check_repository(&config.repository),
            target_dir: Self::check_target_dir(&config.repository.dir),
            ssh: Self::check_ssh(&config.repository.remote_url),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.repository.passed && self.target_dir.passed
        // SSH is optional, not included in required checks
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.results()
            .into_iter()
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.results().into_iter().filter(|r| r.is_warning).collect()
    }

    fn results(&self) -> [&CheckResult; 4] {
        [&self.git, &self.repository, &self.target_dir, &self.ssh]
    }

    /// Check git installation
    fn check_git(git_binary: &str) -> CheckResult {
        match std::process::Command::new(git_binary).arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                CheckResult::ok_with_details("Git installed", version.trim().to_string())
            }
            Ok(_) => CheckResult::error(format!("`{} --version` failed", git_binary)),
            Err(_) => CheckResult::error_with_details(
                format!("{} not found in PATH", git_binary),
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Check the repository section is complete
    fn check_repository(repo: &RepositoryConfig) -> CheckResult {
        match repo.validate() {
            Ok(()) => CheckResult::ok_with_details(
                "Repository configured",
                format!("{} ({})", repo.upstream(), repo.remote_url),
            ),
            Err(e) => CheckResult::error_with_details(
                "Repository configuration incomplete",
                format!("{}\nSet repository.remote_url or pass --remote-url", e),
            ),
        }
    }

    /// Check the target directory, or the ancestor it would be created in, is writable
    fn check_target_dir(dir: &Path) -> CheckResult {
        // A relative path's last ancestor is "", which stands for the current directory
        let Some(existing) = dir
            .ancestors()
            .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
            .find(|p| p.exists())
        else {
            return CheckResult::error_with_details(
                "Target directory has no existing ancestor",
                dir.display().to_string(),
            );
        };

        if !existing.is_dir() {
            return CheckResult::error_with_details(
                "Target path is not a directory",
                existing.display().to_string(),
            );
        }

        let readonly = std::fs::metadata(existing)
            .map(|meta| meta.permissions().readonly())
            .unwrap_or(true);
        if readonly {
            return CheckResult::error_with_details(
                "Target directory is not writable",
                existing.display().to_string(),
            );
        }

        if existing == dir {
            CheckResult::ok_with_details("Target directory exists", dir.display().to_string())
        } else {
            CheckResult::ok_with_details(
                "Target directory will be created",
                format!("{} (inside {})", dir.display(), existing.display()),
            )
        }
    }

    /// Check SSH configuration (warning only, and only for SSH remotes)
    fn check_ssh(remote_url: &str) -> CheckResult {
        if !(remote_url.starts_with("git@") || remote_url.starts_with("ssh://")) {
            return CheckResult::ok("Remote does not use SSH");
        }

        let ssh_dir = dirs::home_dir().unwrap_or_default().join(".ssh");
        if !ssh_dir.exists() {
            return CheckResult::warning_with_details(
                "~/.ssh directory not found",
                "SSH fetches may not work. Run: ssh-keygen -t ed25519",
            );
        }

        let ssh_keys = ["id_rsa", "id_ed25519", "id_ecdsa"];
        let found_keys: Vec<_> = ssh_keys
            .iter()
            .filter(|key| ssh_dir.join(key).exists())
            .copied()
            .collect();

        if found_keys.is_empty() {
            CheckResult::warning_with_details(
                "No SSH keys found",
                "SSH fetches may not work unless an agent provides a key",
            )
        } else {
            CheckResult::ok_with_details("SSH keys found", found_keys.join(", "))
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Git Installation", &self.git),
            ("Repository", &self.repository),
            ("Target Directory", &self.target_dir),
            ("SSH Configuration", &self.ssh),
        ]
    }
}
