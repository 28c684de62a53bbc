//! Error types for the upgrade engine.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A single git operation performed while synchronizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Init,
    NameBranch,
    AddRemote,
    SetBranches,
    Fetch,
    Checkout,
    Track,
    Reset,
    Clean,
    ResolveHead,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::NameBranch => "symbolic-ref",
            Step::AddRemote => "remote add",
            Step::SetBranches => "remote set-branches",
            Step::Fetch => "fetch",
            Step::Checkout => "checkout",
            Step::Track => "track",
            Step::Reset => "reset",
            Step::Clean => "clean",
            Step::ResolveHead => "rev-parse",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`CommandRunner`](crate::runner::CommandRunner).
#[derive(Debug, Error)]
pub enum RunError {
    /// The program could not be started at all (missing binary, bad cwd).
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{command}` exited with {}: {output}", describe_code(.code))]
    Exit {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

/// All errors that can abort an upgrade.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// Invalid or incomplete repository configuration. Raised before any
    /// external command runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// The target directory could not be created, inspected or cleared.
    #[error("filesystem error at {path}: {source}")]
    Environment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The VCS tool could not be started.
    #[error("{step} step could not launch `{command}`: {source}")]
    Launch {
        step: Step,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The VCS tool exited non-zero.
    #[error("{step} step failed: `{command}` exited with {}: {output}", describe_code(.code))]
    CommandFailed {
        step: Step,
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The VCS tool exited successfully but its output carried a `fatal:` line.
    #[error("{step} step reported a fatal error from `{command}`: {output}")]
    ToolFatal {
        step: Step,
        command: String,
        output: String,
    },
}

impl UpgradeError {
    /// The step that failed, if the failure came from the VCS tool.
    pub fn step(&self) -> Option<Step> {
        match self {
            UpgradeError::Launch { step, .. }
            | UpgradeError::CommandFailed { step, .. }
            | UpgradeError::ToolFatal { step, .. } => Some(*step),
            UpgradeError::Config(_) | UpgradeError::Environment { .. } => None,
        }
    }

    /// Process exit status for a binary that terminates on this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            UpgradeError::Config(_) => 2,
            _ => 1,
        }
    }

    /// Lift a runner failure into an upgrade error for `step`.
    pub(crate) fn from_run(step: Step, err: RunError) -> Self {
        match err {
            RunError::Launch { command, source } => UpgradeError::Launch {
                step,
                command,
                source,
            },
            RunError::Exit {
                command,
                code,
                output,
            } => UpgradeError::CommandFailed {
                step,
                command,
                code,
                output,
            },
        }
    }
}

/// Convenience constructor for [`UpgradeError::Environment`].
pub(crate) fn env_err(path: impl Into<PathBuf>, source: std::io::Error) -> UpgradeError {
    UpgradeError::Environment {
        path: path.into(),
        source,
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T, E = UpgradeError> = std::result::Result<T, E>;
