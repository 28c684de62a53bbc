//! repo-upgrade - Force a working directory to mirror one upstream git branch
//!
//! Deploys or updates application code without a package manager by driving
//! the `git` command line through a fixed sequence of operations. Whatever
//! the starting state of the target directory, a successful run leaves it
//! hard-reset to `<remote>/<branch>`.
//!
//! ## Modules
//!
//! - [`upgrade`]: Orchestrator, mode selection and completion callback
//! - [`sync`]: Default-mode and hard-mode synchronizers
//! - [`probe`]: Filesystem classification of the target directory
//! - [`git`]: The git subcommands the synchronizers use
//! - [`runner`]: External process execution
//! - [`config`]: Configuration management and parsing
//! - [`health`]: Preflight checks

pub mod config;
pub mod error;
pub mod git;
pub mod health;
pub mod probe;
pub mod runner;
pub mod sync;
pub mod upgrade;

pub use config::{Config, RepositoryConfig};
pub use error::{RunError, Step, UpgradeError};
pub use health::HealthCheck;
pub use probe::{classify, RepoState};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use sync::{SyncMode, SyncOptions};
pub use upgrade::{Mode, Upgrade, UpgradeContext, UpgradeReport};
