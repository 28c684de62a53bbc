use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, Step, UpgradeError};
use crate::runner::{display_command, CommandOutput, CommandRunner};

/// Git operations for a single checkout directory.
///
/// Mutating operations go through [`GitClient::step`], which turns a launch
/// failure, a non-zero exit or a `fatal:` line into an [`UpgradeError`].
/// Queries return `None` when git cannot answer instead of failing.
#[derive(Clone)]
pub struct GitClient {
    runner: Arc<dyn CommandRunner>,
    program: String,
    dir: PathBuf,
}

impl GitClient {
    /// Create a client driving `program` (usually `git`) inside `dir`.
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `git init`
    pub async fn init(&self) -> Result<()> {
        self.step(Step::Init, &["init"]).await.map(drop)
    }

    /// Point the unborn `HEAD` of a fresh repository at `branch`.
    pub async fn name_branch(&self, branch: &str) -> Result<()> {
        let target = format!("refs/heads/{}", branch);
        self.step(Step::NameBranch, &["symbolic-ref", "HEAD", target.as_str()])
            .await
            .map(drop)
    }

    /// `git remote add <name> <url>`
    pub async fn remote_add(&self, name: &str, url: &str) -> Result<()> {
        self.step(Step::AddRemote, &["remote", "add", name, url])
            .await
            .map(drop)
    }

    /// Make `remote` track every branch again, undoing `--single-branch`
    /// clones and narrowed fetch refspecs.
    pub async fn track_all_branches(&self, remote: &str) -> Result<()> {
        self.step(Step::SetBranches, &["remote", "set-branches", remote, "*"])
            .await
            .map(drop)
    }

    /// Fetch every branch of `remote` into `refs/remotes/<remote>/`,
    /// whatever refspec the checkout has configured.
    pub async fn fetch(&self, remote: &str) -> Result<()> {
        let refspec = fetch_refspec(remote);
        self.step(Step::Fetch, &["fetch", "--prune", remote, refspec.as_str()])
            .await
            .map(drop)
    }

    /// `git reset --hard <target>`
    pub async fn reset_hard(&self, target: &str) -> Result<()> {
        self.step(Step::Reset, &["reset", "--hard", target])
            .await
            .map(drop)
    }

    /// Create or reset `branch` at `upstream`, check it out and track `upstream`.
    pub async fn checkout_tracking(&self, branch: &str, upstream: &str) -> Result<()> {
        self.step(
            Step::Checkout,
            &["checkout", "--force", "-B", branch, "--track", upstream],
        )
        .await
        .map(drop)
    }

    /// `git branch --set-upstream-to=<upstream> <branch>`
    pub async fn set_upstream(&self, branch: &str, upstream: &str) -> Result<()> {
        let flag = format!("--set-upstream-to={}", upstream);
        self.step(Step::Track, &["branch", flag.as_str(), branch])
            .await
            .map(drop)
    }

    /// `git clean -fd`: untracked files go, ignored files stay.
    pub async fn clean_untracked(&self) -> Result<()> {
        self.step(Step::Clean, &["clean", "-fd"]).await.map(drop)
    }

    /// `git clean -ffdx`: everything not tracked goes, including ignored
    /// files and nested repositories.
    pub async fn purge_untracked(&self) -> Result<()> {
        self.step(Step::Clean, &["clean", "-ffdx"]).await.map(drop)
    }

    /// Commit id of `HEAD`.
    pub async fn head_commit(&self) -> Result<String> {
        let output = self.step(Step::ResolveHead, &["rev-parse", "HEAD"]).await?;
        output
            .first_line()
            .map(str::to_string)
            .ok_or_else(|| UpgradeError::CommandFailed {
                step: Step::ResolveHead,
                command: output.command.clone(),
                code: Some(0),
                output: "empty output".to_string(),
            })
    }

    /// Name of the checked-out branch; `None` when detached or unreadable.
    pub async fn current_branch(&self) -> Option<String> {
        self.query(&["symbolic-ref", "--short", "-q", "HEAD"]).await
    }

    /// URL registered for `remote`; `None` when the remote is missing.
    pub async fn remote_url(&self, remote: &str) -> Option<String> {
        self.query(&["remote", "get-url", remote]).await
    }

    /// Whether git itself accepts the directory as a repository.
    pub async fn is_repository(&self) -> bool {
        self.query(&["rev-parse", "--git-dir"]).await.is_some()
    }

    /// Run a mutating command for `step`.
    async fn step(&self, step: Step, args: &[&str]) -> Result<CommandOutput> {
        let output = self
            .runner
            .run(&self.dir, &self.program, args)
            .await
            .map_err(|err| UpgradeError::from_run(step, err))?;

        if output.has_fatal_marker() {
            return Err(UpgradeError::ToolFatal {
                step,
                command: output.command,
                output: output.text,
            });
        }

        Ok(output)
    }

    /// Run a read-only command, yielding its first output line on success.
    async fn query(&self, args: &[&str]) -> Option<String> {
        match self.runner.run(&self.dir, &self.program, args).await {
            Ok(output) if !output.has_fatal_marker() => output.first_line().map(str::to_string),
            Ok(_) => None,
            Err(e) => {
                debug!("{} gave no answer: {}", display_command(&self.program, args), e);
                None
            }
        }
    }
}

/// Refspec mirroring all branches of `remote` into its remote-tracking refs.
pub fn fetch_refspec(remote: &str) -> String {
    format!("+refs/heads/*:refs/remotes/{}/*", remote)
}

/// Compare remote URLs, treating `git@host:path` and `https://host/path` as
/// equal and ignoring a trailing `.git`, trailing slashes and case.
pub fn remote_urls_match(actual: &str, expected: &str) -> bool {
    normalize_remote_url(actual) == normalize_remote_url(expected)
}

fn normalize_remote_url(url: &str) -> String {
    let url = url.trim();
    let url = match url.strip_prefix("git@") {
        Some(rest) => match rest.split_once(':') {
            Some((host, path)) => format!("https://{}/{}", host, path),
            None => url.to_string(),
        },
        None => url.replacen("ssh://git@", "https://", 1),
    };

    url.trim_end_matches('/')
        .trim_end_matches(".git")
        .trim_end_matches('/')
        .to_lowercase()
}
