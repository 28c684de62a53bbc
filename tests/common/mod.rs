//! Common test utilities and helpers for repo-upgrade tests
#![allow(dead_code)]

use async_trait::async_trait;
use repo_upgrade::runner::display_command;
use repo_upgrade::{CommandOutput, CommandRunner, RunError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tempfile::TempDir;

pub const FAKE_HEAD: &str = "4e18764d1f0a6c3f1a2b3c4d5e6f708192a3b4c5";

/// Canned answer for a scripted command
#[derive(Debug, Clone)]
pub enum Reply {
    /// Exit 0 with this output
    Ok(String),
    /// Exit with this status and output
    Exit(i32, String),
    /// Program could not be started
    Launch,
}

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub dir: PathBuf,
    /// Arguments joined by spaces, without the program name
    pub args: String,
}

/// [`CommandRunner`] that records calls and answers from a script.
///
/// Rules match on the start of the joined argument list; the most recently
/// added matching rule wins. Unmatched commands succeed with empty output.
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers for a directory with no prior checkout
    pub fn fresh() -> Self {
        Self::new()
            .on("symbolic-ref", Reply::Ok("master\n".to_string()))
            .on("rev-parse HEAD", Reply::Ok(format!("{}\n", FAKE_HEAD)))
    }

    /// Answers for a healthy checkout of `url` on `branch`
    pub fn checkout(url: &str, branch: &str) -> Self {
        Self::fresh()
            .on("rev-parse --git-dir", Reply::Ok(".git\n".to_string()))
            .on("remote get-url", Reply::Ok(format!("{}\n", url)))
            .on("symbolic-ref", Reply::Ok(format!("{}\n", branch)))
    }

    pub fn on(self, prefix: &str, reply: Reply) -> Self {
        self.rules.lock().unwrap().push((prefix.to_string(), reply));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Joined arguments of every call, in order
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.args).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.commands().iter().any(|args| args.starts_with(prefix))
    }

    fn reply_for(&self, args: &str) -> Reply {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(prefix, _)| args.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Ok(String::new()))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, dir: &Path, program: &str, args: &[&str]) -> Result<CommandOutput, RunError> {
        let joined = args.join(" ");
        self.calls.lock().unwrap().push(Call {
            dir: dir.to_path_buf(),
            args: joined.clone(),
        });

        let command = display_command(program, args);
        match self.reply_for(&joined) {
            Reply::Ok(text) => Ok(CommandOutput::new(command, text)),
            Reply::Exit(code, output) => Err(RunError::Exit {
                command,
                code: Some(code),
                output,
            }),
            Reply::Launch => Err(RunError::Launch {
                command,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            }),
        }
    }
}

/// Create `.git` with the entries the prober looks for
pub fn fake_metadata(dir: &Path) {
    let git_dir = dir.join(".git");
    std::fs::create_dir_all(git_dir.join("objects")).expect("Failed to create objects dir");
    std::fs::create_dir_all(git_dir.join("refs")).expect("Failed to create refs dir");
    std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/master\n").expect("Failed to write HEAD");
}

/// Whether a usable `git` binary is on PATH
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run git in `dir`, panicking on failure, returning trimmed stdout
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.org"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .env("LC_ALL", "C")
        .output()
        .expect("Failed to run git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A non-bare upstream repository living in a temp dir
pub struct Upstream {
    pub temp_dir: TempDir,
}

impl Upstream {
    /// Repository with one commit on `master`
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let upstream = Self { temp_dir };
        git(upstream.path(), &["init", "-q"]);
        git(upstream.path(), &["symbolic-ref", "HEAD", "refs/heads/master"]);
        upstream.commit(&[("README.md", "# app\n"), ("src/index.php", "<?php echo 1;\n")], "initial");
        upstream
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn url(&self) -> String {
        self.path().to_string_lossy().into_owned()
    }

    /// Write files on the current branch and commit them
    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> String {
        for (name, content) in files {
            let path = self.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create parent dir");
            }
            std::fs::write(&path, content).expect("Failed to write file");
        }
        git(self.path(), &["add", "-A"]);
        git(self.path(), &["commit", "-q", "-m", message]);
        self.rev("HEAD")
    }

    pub fn checkout(&self, branch: &str) {
        git(self.path(), &["checkout", "-q", branch]);
    }

    pub fn create_branch(&self, branch: &str) {
        git(self.path(), &["checkout", "-q", "-b", branch]);
    }

    pub fn rev(&self, rev: &str) -> String {
        git(self.path(), &["rev-parse", rev])
    }

    /// Working tree of the currently checked-out branch
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        snapshot(self.path())
    }
}

/// Every file under `dir` except the git metadata, keyed by relative path
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    files_below(dir)
        .into_iter()
        .filter_map(|path| {
            let relative = path.strip_prefix(dir).ok()?.to_path_buf();
            let content = std::fs::read(&path).ok()?;
            Some((relative, content))
        })
        .collect()
}

/// Regular files below `dir`, skipping `.git`
fn files_below(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.file_name().is_some_and(|name| name == ".git") {
                continue;
            }
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}
