use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gitsweep::clone::CloneOutcome;
use gitsweep::config::{CloneProtocol, LogFormat, LoggingConfig};
use gitsweep::health::CheckResult;
use gitsweep::{
    AccountKind, CloneOptions, Config, ConsoleReporter, GitCli, GitHubClient, HealthCheck, JsonReporter,
    MassCloner, OperationFamily, Reporter, RunOptions, RunOrchestrator, SyncOperation,
};

#[derive(Parser)]
#[command(name = "gitsweep")]
#[command(about = "Apply git reset, pull, fetch, rebase or merge to every repository under a directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset every repository: soft, hard, clean, pull or origin
    Reset {
        /// Directory to search for repositories
        root: PathBuf,

        /// soft | hard | clean | pull | origin
        mode: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Synchronize every repository: pull, fetch, rebase, merge or stash-pull
    Sync {
        /// Directory to search for repositories
        root: PathBuf,

        /// pull | fetch | rebase | merge | stash-pull
        operation: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Clone all repositories of a GitHub user or organization
    Clone {
        /// GitHub user or organization name
        account: String,

        /// Treat the account as an organization
        #[arg(long)]
        org: bool,

        /// Destination directory (defaults to clone.base_directory)
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Maximum concurrent clones
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Clone over SSH instead of HTTPS
        #[arg(long)]
        ssh: bool,

        /// Skip forked repositories
        #[arg(long)]
        no_forks: bool,

        /// Skip archived repositories
        #[arg(long)]
        no_archived: bool,

        /// Skip repositories whose name matches (repeatable, '*' wildcard)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Check git installation and root directory access
    Doctor {
        /// Root directory to check
        root: Option<PathBuf>,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Directory levels below the root to search (default from config)
    max_depth: Option<usize>,

    /// Do not stash uncommitted changes before mutating operations
    #[arg(long)]
    no_stash: bool,

    /// Pull even on branches without an upstream
    #[arg(long)]
    force: bool,

    /// Descend into symlinked directories
    #[arg(long)]
    follow_symlinks: bool,

    /// Emit one JSON object per event instead of human output
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // init must work even when the existing file is unreadable
    if let Commands::Init { force } = cli.command {
        init_logging(cli.verbose, &LoggingConfig::default())?;
        return cmd_init(cli.config, force);
    }

    let config = Config::resolve(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging)?;
    debug!("Starting gitsweep v{}", env!("CARGO_PKG_VERSION"));

    let exit_code = match cli.command {
        Commands::Reset { root, mode, run } => {
            cmd_run(root, OperationFamily::Reset, &mode, run, &config).await?
        }
        Commands::Sync { root, operation, run } => {
            cmd_run(root, OperationFamily::Sync, &operation, run, &config).await?
        }
        Commands::Clone {
            account,
            org,
            dest,
            parallel,
            ssh,
            no_forks,
            no_archived,
            exclude,
        } => {
            let mut options = CloneOptions::from_config(&config.clone);
            if let Some(dest) = dest {
                options.base_directory = dest;
            }
            if let Some(parallel) = parallel {
                options.parallel = parallel.max(1);
            }
            if ssh {
                options.protocol = CloneProtocol::Ssh;
            }
            options.include_forks &= !no_forks;
            options.include_archived &= !no_archived;
            options.exclude_patterns.extend(exclude);

            let kind = if org {
                AccountKind::Organization
            } else {
                AccountKind::User
            };
            cmd_clone(&account, kind, options).await?
        }
        Commands::Doctor { root } => cmd_doctor(root).await,
        Commands::Init { .. } => 0,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Initialize logging on stderr.
///
/// `RUST_LOG` wins, then `--verbose`, then the configured level.
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let layer = fmt::layer().with_writer(std::io::stderr).with_ansi(logging.color);
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Compact => registry.with(layer.compact()).init(),
        LogFormat::Pretty => registry.with(layer.pretty()).init(),
        LogFormat::Full => registry.with(layer).init(),
    }

    Ok(())
}

/// Run one operation over every repository under `root`
async fn cmd_run(
    root: PathBuf,
    family: OperationFamily,
    token: &str,
    args: RunArgs,
    config: &Config,
) -> Result<i32> {
    let operation = SyncOperation::parse(family, token)?;

    let options = RunOptions {
        root,
        max_depth: args.max_depth.unwrap_or(config.sync.max_depth),
        operation,
        auto_stash: config.sync.auto_stash && !args.no_stash,
        force: config.sync.force || args.force,
        follow_symlinks: config.sync.follow_symlinks || args.follow_symlinks,
    };

    let reporter: Arc<dyn Reporter> = if args.json {
        Arc::new(JsonReporter)
    } else {
        Arc::new(ConsoleReporter::new(config.logging.color))
    };

    let orchestrator = RunOrchestrator::new(Arc::new(GitCli::new()), reporter);
    let summary = orchestrator.run(&options).await?;

    Ok(summary.exit_code())
}

/// Clone every repository of a GitHub account
async fn cmd_clone(account: &str, kind: AccountKind, options: CloneOptions) -> Result<i32> {
    let client = GitHubClient::from_env()?;

    let access = if client.is_authenticated() {
        "authenticated"
    } else {
        "anonymous"
    };
    println!("🔍 Listing repositories for {} ({})...", account, access);
    let repos = client.list_repositories(account, kind).await?;
    println!("   Found {} repositories", repos.len());

    let cloner = MassCloner::new(Arc::new(GitCli::new()), options);
    let summary = cloner.clone_all(repos).await?;

    for report in &summary.results {
        match &report.outcome {
            CloneOutcome::Cloned => println!("✅ Cloned {}", report.full_name),
            CloneOutcome::Skipped => {
                println!("⏭️  {} already exists at {}", report.full_name, report.target.display())
            }
            CloneOutcome::Failed(e) => println!("❌ {}: {}", report.full_name, e),
        }
    }

    println!("\n📊 Clone Summary:");
    println!("   📥 Cloned: {}", summary.cloned);
    println!("   ⏭️  Already present: {}", summary.skipped);
    println!("   🚫 Filtered out: {}", summary.filtered);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    Ok(summary.exit_code())
}

async fn cmd_doctor(root: Option<PathBuf>) -> i32 {
    let health = HealthCheck::run(&GitCli::new(), root.as_deref()).await;
    print_health_report(&health);

    if health.all_passed() {
        0
    } else {
        1
    }
}

/// Write the default configuration file
fn cmd_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = match path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    Config::write_default(&config_path, force)?;
    info!("Configuration initialized");

    println!("✅ gitsweep configuration written");
    println!("   Config: {}", config_path.display());
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning {
                "⚠️ "
            } else {
                "✅"
            }
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

    println!("🔍 gitsweep System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
    }

    println!();
    let warnings = health.warnings().len();
    if health.all_passed() && warnings > 0 {
        println!("✅ All required checks passed ({} warning(s))", warnings);
    } else if health.all_passed() {
        println!("✅ All required checks passed");
    } else {
        println!("❌ {} check(s) failed", health.errors().len());
    }
}
