//! Upgrade orchestration - the public entry point of the engine
//!
//! An [`Upgrade`] wraps one [`UpgradeContext`], probes the target directory,
//! picks a synchronizer and runs it to completion. The completion callback
//! only runs when every step succeeded.
//!
//! ```no_run
//! use repo_upgrade::{RepositoryConfig, Upgrade, UpgradeContext};
//!
//! # async fn deploy() -> Result<(), repo_upgrade::UpgradeError> {
//! let repo = RepositoryConfig::new("/srv/app", "https://example.org/app.git");
//! let _report = Upgrade::new(UpgradeContext::new(repo).hard_mode())
//!     .run_then(|report| println!("now at {}", report.head))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::config::{Config, RepositoryConfig};
use crate::error::Result;
use crate::git::GitClient;
use crate::probe::{classify, RepoState};
use crate::runner::{CommandRunner, ProcessRunner};
use crate::sync::{SyncMode, SyncOptions, SyncOutcome, Synchronizer};

/// Requested synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Default mode for a valid checkout, hard mode otherwise.
    #[default]
    Auto,
    /// Incremental update; falls back to hard mode on unusable checkouts.
    Default,
    /// Always rebuild the git metadata.
    Hard,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => f.write_str("auto"),
            Mode::Default => f.write_str("default"),
            Mode::Hard => f.write_str("hard"),
        }
    }
}

/// Everything one upgrade invocation needs. Built once, consumed by [`Upgrade`].
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    pub repository: RepositoryConfig,
    pub mode: Mode,
    pub options: SyncOptions,
    pub git_binary: String,
}

impl UpgradeContext {
    pub fn new(repository: RepositoryConfig) -> Self {
        Self {
            repository,
            mode: Mode::Auto,
            options: SyncOptions::default(),
            git_binary: "git".to_string(),
        }
    }

    /// Build a context from the `repository` and `upgrade` config sections.
    pub fn from_config(config: &Config) -> Self {
        Self {
            repository: config.repository.clone(),
            mode: config.upgrade.mode,
            options: SyncOptions {
                clean_untracked: config.upgrade.clean_untracked,
            },
            git_binary: config.upgrade.git_binary.clone(),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Select incremental mode. Overrides any earlier mode choice.
    pub fn default_mode(self) -> Self {
        self.with_mode(Mode::Default)
    }

    /// Select hard mode. Overrides any earlier mode choice.
    pub fn hard_mode(self) -> Self {
        self.with_mode(Mode::Hard)
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_git_binary(mut self, git_binary: impl Into<String>) -> Self {
        self.git_binary = git_binary.into();
        self
    }
}

/// Summary handed to the completion callback and returned on success.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub dir: PathBuf,
    pub remote: String,
    pub remote_url: String,
    pub branch: String,
    pub requested_mode: Mode,
    pub mode: SyncMode,
    pub fell_back: bool,
    pub initial_state: RepoState,
    pub head: String,
    pub finished_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

/// Lifecycle of one invocation. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Probing,
    Syncing,
    CallbackRun,
    Done,
    Failed,
}

impl Phase {
    fn can_enter(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Created, Probing)
                | (Created, Failed)
                | (Probing, Syncing)
                | (Syncing, CallbackRun)
                | (Syncing, Done)
                | (Syncing, Failed)
                | (CallbackRun, Done)
        )
    }
}

/// Orchestrates one upgrade of one directory.
pub struct Upgrade {
    context: UpgradeContext,
    runner: Arc<dyn CommandRunner>,
    phase: Phase,
}

impl Upgrade {
    /// Create an orchestrator that drives real `git` processes.
    pub fn new(context: UpgradeContext) -> Self {
        Self::with_runner(context, Arc::new(ProcessRunner::new()))
    }

    /// Create an orchestrator on top of a custom [`CommandRunner`].
    pub fn with_runner(context: UpgradeContext, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            context,
            runner,
            phase: Phase::Created,
        }
    }

    pub fn context(&self) -> &UpgradeContext {
        &self.context
    }

    /// Run the upgrade to completion.
    pub async fn run(self) -> Result<UpgradeReport> {
        self.execute(None::<fn(&UpgradeReport)>).await
    }

    /// Run the upgrade and call `callback` once every step has succeeded.
    pub async fn run_then<F>(self, callback: F) -> Result<UpgradeReport>
    where
        F: FnOnce(&UpgradeReport),
    {
        self.execute(Some(callback)).await
    }

    /// Run the upgrade, invoking `callback` (if any) on success only.
    pub async fn execute<F>(mut self, callback: Option<F>) -> Result<UpgradeReport>
    where
        F: FnOnce(&UpgradeReport),
    {
        let started = Instant::now();

        let report = match self.synchronize(started).await {
            Ok(report) => report,
            Err(e) => {
                self.enter(Phase::Failed);
                error!(
                    "Upgrade of {} failed: {}",
                    self.context.repository.dir.display(),
                    e
                );
                return Err(e);
            }
        };

        if let Some(callback) = callback {
            self.enter(Phase::CallbackRun);
            callback(&report);
        }

        self.enter(Phase::Done);
        info!(
            "Upgrade of {} completed in {:.2}s",
            report.dir.display(),
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    async fn synchronize(&mut self, started: Instant) -> Result<UpgradeReport> {
        let repo = self.context.repository.clone();
        repo.validate()?;

        self.enter(Phase::Probing);
        let initial_state = classify(&repo.dir);
        let requested_mode = self.context.mode;
        let strategy = match requested_mode {
            Mode::Hard => SyncMode::Hard,
            Mode::Default => SyncMode::Default,
            Mode::Auto if initial_state.is_usable_checkout() => SyncMode::Default,
            Mode::Auto => SyncMode::Hard,
        };
        info!(
            "Upgrading {} from {} ({}) in {} mode (requested {})",
            repo.dir.display(),
            repo.upstream(),
            repo.remote_url,
            strategy,
            requested_mode
        );
        debug!("Initial state of {}: {}", repo.dir.display(), initial_state);

        self.enter(Phase::Syncing);
        let git = GitClient::new(self.runner.clone(), self.context.git_binary.clone(), repo.dir.clone());
        let synchronizer = Synchronizer::new(git, repo.clone(), self.context.options.clone());
        let SyncOutcome {
            mode,
            fell_back,
            head,
        } = match strategy {
            SyncMode::Default => synchronizer.sync_default().await?,
            SyncMode::Hard => synchronizer.sync_hard().await?,
        };

        Ok(UpgradeReport {
            dir: repo.dir,
            remote: repo.remote_name,
            remote_url: repo.remote_url,
            branch: repo.branch,
            requested_mode,
            mode,
            fell_back,
            initial_state,
            head,
            finished_at: Utc::now(),
            elapsed: started.elapsed(),
        })
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_enter(next),
            "illegal upgrade phase change {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("Upgrade phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
