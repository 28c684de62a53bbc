//! Filesystem-only classification of a synchronization target.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the git metadata directory inside a checkout.
pub const METADATA_DIR: &str = ".git";

/// Synchronization state of a target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoState {
    /// Nothing exists at the target path.
    Absent,
    /// The directory exists but holds no `.git` entry.
    ExistsNoMetadata,
    /// A `.git` directory with `HEAD`, `objects/` and `refs/`.
    ExistsWithMetadata,
    /// A `.git` entry that is not a usable metadata directory (gitfile,
    /// interrupted init, partial delete).
    BrokenMetadata,
}

impl RepoState {
    /// Whether a `.git` entry of any kind is present.
    pub fn has_metadata(&self) -> bool {
        matches!(self, RepoState::ExistsWithMetadata | RepoState::BrokenMetadata)
    }

    /// Whether an incremental update can start from this state.
    pub fn is_usable_checkout(&self) -> bool {
        matches!(self, RepoState::ExistsWithMetadata)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepoState::Absent => "absent",
            RepoState::ExistsNoMetadata => "exists_no_metadata",
            RepoState::ExistsWithMetadata => "exists_with_metadata",
            RepoState::BrokenMetadata => "broken_metadata",
        }
    }
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path of the metadata directory for `dir`.
pub fn metadata_path(dir: &Path) -> PathBuf {
    dir.join(METADATA_DIR)
}

/// Classify `dir` without invoking any external tool.
pub fn classify(dir: &Path) -> RepoState {
    if !dir.exists() {
        return RepoState::Absent;
    }

    let git_dir = metadata_path(dir);
    let Ok(meta) = std::fs::symlink_metadata(&git_dir) else {
        return RepoState::ExistsNoMetadata;
    };

    if meta.is_dir()
        && git_dir.join("HEAD").is_file()
        && git_dir.join("objects").is_dir()
        && git_dir.join("refs").is_dir()
    {
        RepoState::ExistsWithMetadata
    } else {
        RepoState::BrokenMetadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_metadata(dir: &Path) {
        let git_dir = metadata_path(dir);
        fs::create_dir_all(git_dir.join("objects")).unwrap();
        fs::create_dir_all(git_dir.join("refs")).unwrap();
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/master\n").unwrap();
    }

    #[test]
    fn test_absent_directory() {
        let temp = TempDir::new().unwrap();
        assert_eq!(classify(&temp.path().join("missing")), RepoState::Absent);
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();
        assert_eq!(classify(temp.path()), RepoState::ExistsNoMetadata);
    }

    #[test]
    fn test_valid_metadata() {
        let temp = TempDir::new().unwrap();
        fake_metadata(temp.path());
        let state = classify(temp.path());
        assert_eq!(state, RepoState::ExistsWithMetadata);
        assert!(state.has_metadata());
        assert!(state.is_usable_checkout());
    }

    #[test]
    fn test_metadata_missing_head_is_broken() {
        let temp = TempDir::new().unwrap();
        fake_metadata(temp.path());
        fs::remove_file(metadata_path(temp.path()).join("HEAD")).unwrap();
        let state = classify(temp.path());
        assert_eq!(state, RepoState::BrokenMetadata);
        assert!(state.has_metadata());
        assert!(!state.is_usable_checkout());
    }

    #[test]
    fn test_gitfile_is_broken() {
        let temp = TempDir::new().unwrap();
        fs::write(metadata_path(temp.path()), "gitdir: /elsewhere/.git/worktrees/x\n").unwrap();
        assert_eq!(classify(temp.path()), RepoState::BrokenMetadata);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(RepoState::Absent.to_string(), "absent");
        assert_eq!(
            serde_json::to_string(&RepoState::BrokenMetadata).unwrap(),
            "\"broken_metadata\""
        );
    }
}
