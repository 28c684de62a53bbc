//! Process execution for the upgrade engine.
//!
//! Every external command the engine issues goes through a [`CommandRunner`].
//! The working directory is passed on each call, so one runner can serve any
//! number of upgrades in the same process.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::error::RunError;

/// Prefix git uses for unrecoverable errors.
pub const FATAL_MARKER: &str = "fatal:";

/// Variables that redirect git away from the working directory's own
/// metadata. Git hooks export several of them.
pub const REPOSITORY_ENV_VARS: [&str; 6] = [
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_OBJECT_DIRECTORY",
    "GIT_ALTERNATE_OBJECT_DIRECTORIES",
    "GIT_COMMON_DIR",
];

/// Combined output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Printable command line, used in logs and errors.
    pub command: String,
    /// stdout followed by stderr.
    pub text: String,
}

impl CommandOutput {
    pub fn new(command: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            text: text.into(),
        }
    }

    /// True when any line of the output starts with [`FATAL_MARKER`].
    pub fn has_fatal_marker(&self) -> bool {
        contains_fatal_marker(&self.text)
    }

    /// First non-empty line, trimmed.
    pub fn first_line(&self) -> Option<&str> {
        self.text.lines().map(str::trim).find(|line| !line.is_empty())
    }
}

/// Runs external programs on behalf of the engine.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute `program` with `args` inside `dir`.
    ///
    /// Returns the combined output on a zero exit status. A launch failure or a
    /// non-zero exit is reported as [`RunError`], the latter still carrying the
    /// output text.
    async fn run(&self, dir: &Path, program: &str, args: &[&str]) -> Result<CommandOutput, RunError>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, dir: &Path, program: &str, args: &[&str]) -> Result<CommandOutput, RunError> {
        let command = display_command(program, args);
        debug!("+ {} (in {})", command, dir.display());

        let output = build_command(dir, program, args)
            .output()
            .await
            .map_err(|source| RunError::Launch {
                command: command.clone(),
                source,
            })?;

        let text = combine(&output.stdout, &output.stderr);
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            info!("{}", line);
        }

        if !output.status.success() {
            return Err(RunError::Exit {
                command,
                code: output.status.code(),
                output: text,
            });
        }

        Ok(CommandOutput { command, text })
    }
}

fn build_command(dir: &Path, program: &str, args: &[&str]) -> AsyncCommand {
    let mut cmd = AsyncCommand::new(program);
    cmd.args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .kill_on_drop(true);
    for var in REPOSITORY_ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Join a program and its arguments into a printable command line.
pub fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn contains_fatal_marker(text: &str) -> bool {
    text.lines()
        .any(|line| line.trim_start().starts_with(FATAL_MARKER))
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);

    match (stdout.trim_end().is_empty(), stderr.trim_end().is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.trim_end().to_string(),
        (true, false) => stderr.trim_end().to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
    }
}
