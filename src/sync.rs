//! Synchronizers - force a checkout to mirror one upstream branch
//!
//! Two strategies share the same [`GitClient`]:
//!
//! - **Default mode** updates an existing checkout in place: fetch, switch to
//!   the configured branch if needed, hard reset to the remote tip.
//! - **Hard mode** throws away any git metadata and rebuilds it: init on the
//!   configured branch, add the remote, fetch, hard reset, track the branch
//!   and remove everything the remote branch does not track.
//!
//! Default mode hands over to hard mode whenever the directory does not hold
//! a checkout it can trust.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::RepositoryConfig;
use crate::error::{env_err, Result};
use crate::git::{remote_urls_match, GitClient};
use crate::probe::{classify, metadata_path};

/// Strategy that actually brought the checkout up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Default,
    Hard,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Default => f.write_str("default"),
            SyncMode::Hard => f.write_str("hard"),
        }
    }
}

/// Knobs for the incremental strategy. Hard mode always purges.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Run `git clean -fd` after a default-mode reset.
    pub clean_untracked: bool,
}

/// Result of a completed synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub mode: SyncMode,
    /// Default mode was requested but the checkout had to be rebuilt.
    pub fell_back: bool,
    /// Commit the working tree now matches.
    pub head: String,
}

/// Runs the default or hard strategy for one repository configuration.
pub struct Synchronizer {
    git: GitClient,
    repo: RepositoryConfig,
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(git: GitClient, repo: RepositoryConfig, options: SyncOptions) -> Self {
        Self { git, repo, options }
    }

    fn dir(&self) -> &Path {
        &self.repo.dir
    }

    /// Incremental update of an existing checkout.
    pub async fn sync_default(&self) -> Result<SyncOutcome> {
        ensure_dir(self.dir()).await?;

        if let Some(reason) = self.unusable_checkout_reason().await {
            warn!(
                "{}: {}, rebuilding checkout in hard mode",
                self.dir().display(),
                reason
            );
            let mut outcome = self.sync_hard().await?;
            outcome.fell_back = true;
            return Ok(outcome);
        }

        let remote = self.repo.remote_name.as_str();
        let branch = self.repo.branch.as_str();
        let upstream = self.repo.upstream();

        info!("Fetching {} into {}", remote, self.dir().display());
        self.git.track_all_branches(remote).await?;
        self.git.fetch(remote).await?;

        match self.git.current_branch().await {
            Some(current) if current == branch => {
                debug!("Already on branch {}", branch);
            }
            current => {
                info!(
                    "Switching from {} to {} tracking {}",
                    current.as_deref().unwrap_or("detached HEAD"),
                    branch,
                    upstream
                );
                self.git.checkout_tracking(branch, &upstream).await?;
            }
        }

        info!("Resetting working tree to {}", upstream);
        self.git.reset_hard(&upstream).await?;

        self.finish(SyncMode::Default).await
    }

    /// Destructive rebuild of the checkout from scratch.
    pub async fn sync_hard(&self) -> Result<SyncOutcome> {
        ensure_dir(self.dir()).await?;

        let state = classify(self.dir());
        if state.has_metadata() {
            info!("Removing existing git metadata ({}) in {}", state, self.dir().display());
            remove_metadata(self.dir()).await?;
        }

        let remote = self.repo.remote_name.as_str();
        let branch = self.repo.branch.as_str();
        let upstream = self.repo.upstream();

        info!("Initializing fresh repository in {}", self.dir().display());
        self.git.init().await?;
        self.git.name_branch(branch).await?;
        self.git.remote_add(remote, &self.repo.remote_url).await?;

        info!("Fetching {} ({})", remote, self.repo.remote_url);
        self.git.fetch(remote).await?;

        info!("Resetting working tree to {}", upstream);
        self.git.reset_hard(&upstream).await?;

        match self.git.current_branch().await {
            Some(current) if current == branch => {
                self.git.set_upstream(branch, &upstream).await?;
            }
            _ => {
                info!("Checking out {} tracking {}", branch, upstream);
                self.git.checkout_tracking(branch, &upstream).await?;
            }
        }

        self.finish(SyncMode::Hard).await
    }

    /// Why the directory cannot be updated incrementally, if it cannot.
    async fn unusable_checkout_reason(&self) -> Option<String> {
        let state = classify(self.dir());
        if !state.is_usable_checkout() {
            return Some(format!("directory state is {}", state));
        }

        if !self.git.is_repository().await {
            return Some("git does not recognise the metadata".to_string());
        }

        let remote = self.repo.remote_name.as_str();
        match self.git.remote_url(remote).await {
            None => Some(format!("remote {} is not registered", remote)),
            Some(url) if !remote_urls_match(&url, &self.repo.remote_url) => {
                Some(format!("remote {} points at {}", remote, url))
            }
            Some(_) => None,
        }
    }

    async fn finish(&self, mode: SyncMode) -> Result<SyncOutcome> {
        match mode {
            SyncMode::Hard => {
                info!("Removing files not tracked by {}", self.repo.upstream());
                self.git.purge_untracked().await?;
            }
            SyncMode::Default if self.options.clean_untracked => {
                info!("Removing untracked files");
                self.git.clean_untracked().await?;
            }
            SyncMode::Default => {}
        }

        let head = self.git.head_commit().await?;
        info!("{} is at {} ({} mode)", self.dir().display(), head, mode);

        Ok(SyncOutcome {
            mode,
            fell_back: false,
            head,
        })
    }
}

/// Create `dir` (and parents) unless it already is a directory.
pub(crate) async fn ensure_dir(dir: &Path) -> Result<()> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(env_err(
            dir,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "path exists and is not a directory"),
        )),
        Err(_) => {
            info!("Creating directory {}", dir.display());
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| env_err(dir, source))
        }
    }
}

async fn remove_metadata(dir: &Path) -> Result<()> {
    let git_dir = metadata_path(dir);
    let meta = tokio::fs::symlink_metadata(&git_dir)
        .await
        .map_err(|source| env_err(&git_dir, source))?;

    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(&git_dir).await
    } else {
        tokio::fs::remove_file(&git_dir).await
    };
    removed.map_err(|source| env_err(&git_dir, source))
}
