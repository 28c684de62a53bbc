use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repo_upgrade::config::LoggingConfig;
use repo_upgrade::health::CheckResult;
use repo_upgrade::{classify, Config, HealthCheck, Mode, Upgrade, UpgradeContext, UpgradeReport};

#[derive(Parser)]
#[command(name = "repo-upgrade")]
#[command(about = "Force a working directory to mirror one upstream git branch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Repository settings that override the configuration file
#[derive(Args, Default)]
struct RepoArgs {
    /// Directory that must mirror the remote branch
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Upstream repository URL
    #[arg(long)]
    remote_url: Option<String>,

    /// Name to register the remote under
    #[arg(long)]
    remote_name: Option<String>,

    /// Branch to track
    #[arg(long)]
    branch: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the directory in line with the remote branch (default command)
    Run {
        #[command(flatten)]
        repo: RepoArgs,

        /// Rebuild git metadata from scratch
        #[arg(long, conflicts_with = "default_mode")]
        hard: bool,

        /// Update the existing checkout incrementally
        #[arg(long = "default")]
        default_mode: bool,

        /// Abort if the upgrade takes longer than this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the upgrade report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the synchronization state of the target directory
    Probe {
        /// Directory to inspect
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a configuration file
    Init {
        #[command(flatten)]
        repo: RepoArgs,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Preflight checks and diagnostics
    Doctor {
        #[command(flatten)]
        repo: RepoArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Run {
        repo: RepoArgs::default(),
        hard: false,
        default_mode: false,
        timeout: None,
        json: false,
    });

    // `init` may be pointed at a file that does not exist yet
    let allow_missing = matches!(command, Commands::Init { .. });
    let config = load_config(cli.config.as_deref(), allow_missing)?;

    init_logging(cli.verbose, &config.logging)?;
    info!("Starting repo-upgrade v{}", env!("CARGO_PKG_VERSION"));

    match command {
        Commands::Run {
            repo,
            hard,
            default_mode,
            timeout,
            json,
        } => {
            let mode = if hard {
                Some(Mode::Hard)
            } else if default_mode {
                Some(Mode::Default)
            } else {
                None
            };
            cmd_run(config, repo, mode, timeout, json).await
        }
        Commands::Probe { dir, json } => cmd_probe(config, dir, json),
        Commands::Init { repo, force } => cmd_init(config, repo, force, cli.config),
        Commands::Doctor { repo } => cmd_doctor(config, repo),
    }
}

/// Initialize logging based on verbosity level and the logging section
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level))?,
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(logging.color);

    match logging.format.as_str() {
        "full" => tracing_subscriber::registry().with(layer).with(filter).init(),
        other => {
            tracing_subscriber::registry()
                .with(layer.compact())
                .with(filter)
                .init();
            if other != "compact" {
                warn!("Unknown log format {:?}, using compact", other);
            }
        }
    }

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&Path>, allow_missing: bool) -> Result<Config> {
    match config_path {
        Some(path) if allow_missing && !path.exists() => Ok(Config::default()),
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

/// Apply command-line overrides to the repository section
fn apply_repo_args(config: &mut Config, args: RepoArgs) -> Result<()> {
    if let Some(dir) = args.dir {
        config.repository.dir = dir;
        config.repository.expand_dir()?;
    }
    if let Some(remote_url) = args.remote_url {
        config.repository.remote_url = remote_url;
    }
    if let Some(remote_name) = args.remote_name {
        config.repository.remote_name = remote_name;
    }
    if let Some(branch) = args.branch {
        config.repository.branch = branch;
    }
    Ok(())
}

/// Synchronize the target directory with the remote branch
async fn cmd_run(
    mut config: Config,
    repo: RepoArgs,
    mode: Option<Mode>,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    apply_repo_args(&mut config, repo)?;

    let mut context = UpgradeContext::from_config(&config);
    if let Some(mode) = mode {
        context = context.with_mode(mode);
    }

    let upgrade = Upgrade::new(context).run_then(|report| print_report(report, json));

    let result = match timeout.or(config.upgrade.timeout) {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), upgrade).await {
            Ok(result) => result,
            Err(_) => {
                eprintln!("❌ Upgrade timed out after {}s", secs);
                std::process::exit(1);
            }
        },
        None => upgrade.await,
    };

    if let Err(e) = result {
        eprintln!("❌ Upgrade failed: {}", e);
        std::process::exit(e.exit_code());
    }

    Ok(())
}

/// Completion callback: report what the upgrade did
fn print_report(report: &UpgradeReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize report: {}", e),
        }
        return;
    }

    println!("✅ Upgrade complete");
    println!("   Directory: {}", report.dir.display());
    println!("   Upstream: {}/{} ({})", report.remote, report.branch, report.remote_url);
    if report.fell_back {
        println!("   Mode: {} (fell back from {})", report.mode, report.requested_mode);
    } else {
        println!("   Mode: {}", report.mode);
    }
    println!("   Initial state: {}", report.initial_state);
    println!("   HEAD: {}", report.head);
    println!("   Duration: {:.2}s", report.elapsed.as_secs_f64());
}

/// Print the synchronization state of the target directory
fn cmd_probe(mut config: Config, dir: Option<PathBuf>, json: bool) -> Result<()> {
    apply_repo_args(
        &mut config,
        RepoArgs {
            dir,
            ..RepoArgs::default()
        },
    )?;

    let dir = &config.repository.dir;
    let state = classify(dir);

    if json {
        let value = serde_json::json!({ "dir": dir, "state": state });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}: {}", dir.display(), state);
    }

    Ok(())
}

/// Write a configuration file with the given repository settings
fn cmd_init(mut config: Config, repo: RepoArgs, force: bool, path: Option<PathBuf>) -> Result<()> {
    apply_repo_args(&mut config, repo)?;

    let config_path = match path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists at {:?} (use --force to overwrite)",
            config_path
        );
    }

    config.save(&config_path)?;
    info!("Configuration saved to: {:?}", config_path);

    println!("✅ Configuration written");
    println!("   Config: {:?}", config_path);
    println!("   Directory: {}", config.repository.dir.display());
    if config.repository.remote_url.is_empty() {
        println!("   Next: set repository.remote_url, then run 'repo-upgrade doctor'");
    } else {
        println!("   Upstream: {} ({})", config.repository.upstream(), config.repository.remote_url);
    }

    Ok(())
}

/// System health check and diagnostics
fn cmd_doctor(mut config: Config, repo: RepoArgs) -> Result<()> {
    apply_repo_args(&mut config, repo)?;

    let health = HealthCheck::run(&config);
    print_health_report(&health);

    if !health.all_passed() {
        std::process::exit(1);
    }

    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 repo-upgrade Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    let errors = health.errors();
    let warnings = health.warnings();
    if health.all_passed() && warnings.is_empty() {
        println!("✅ All checks passed");
    } else if health.all_passed() {
        println!("✅ Required checks passed ({} warning(s))", warnings.len());
    } else {
        println!("❌ {} check(s) failed", errors.len());
        for failed in errors {
            println!("   - {}", failed.message);
        }
    }
}
