//! # rewind CLI
//!
//! Rebuilds raw volume images from an incremental backup store.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use console::style;

mod describe;
mod progress;
mod restore;

use rewind_config::logging::{init_logging, LogLevel};
use rewind_config::{log_cli_debug, log_cli_warn, Config};
use rewind_store::BackupStore;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("REWIND_GIT_COMMIT"),
    ")"
);

/// Rewind - restore volume images from incremental block backups
#[derive(Parser)]
#[command(name = "rewind")]
#[command(version = VERSION, about, long_about = None)]
struct Cli {
    /// Directory containing `backupstore/` (default: config or REWIND_BACKUP_ROOT)
    #[arg(long, global = true, value_name = "DIR")]
    backup_root: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reassemble a volume image from its backup chain
    Restore(restore::RestoreArgs),

    /// List every volume directory in the store
    ListVolumes,

    /// Show the backups and blocks of a volume
    Describe {
        /// Volume name
        #[arg(short = 't', long, alias = "target")]
        volume: String,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file locations
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{} ignoring unreadable config: {}",
                style("warning:").yellow().bold(),
                e
            );
            Config::default()
        }
    };

    let level = config
        .log
        .level
        .parse::<LogLevel>()
        .unwrap_or(LogLevel::Warn)
        .raised(cli.verbose);
    init_logging(level);
    log_cli_debug!("Starting", version = VERSION, log_level = level.as_str());

    match cli.command {
        Commands::Restore(args) => {
            let backup_root = backup_root(cli.backup_root, &config)?;
            restore::run(&backup_root, &config, args)
        }
        Commands::ListVolumes => {
            let backup_root = backup_root(cli.backup_root, &config)?;
            cmd_list_volumes(&backup_root)
        }
        Commands::Describe { volume } => {
            let backup_root = backup_root(cli.backup_root, &config)?;
            describe::run(&backup_root, &volume)
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => cmd_config_show(&config),
            ConfigCommands::Path => cmd_config_path(),
        },
    }
}

/// `--backup-root` wins over the configured (or env-provided) root.
fn backup_root(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    flag.or_else(|| config.store.backup_root.clone())
        .context("No backup root given: pass --backup-root, set REWIND_BACKUP_ROOT or [store] backup_root")
}

/// Open `<backup_root>/backupstore`, explaining what was expected on failure.
pub(crate) fn open_store(backup_root: &Path) -> Result<BackupStore> {
    BackupStore::open(backup_root).with_context(|| {
        format!(
            "{} does not look like a backup root (expected a backupstore/ directory)",
            backup_root.display()
        )
    })
}

fn cmd_list_volumes(backup_root: &Path) -> Result<()> {
    let store = open_store(backup_root)?;
    let volumes = store.list_volumes().context("Failed to list volumes")?;

    if volumes.is_empty() {
        log_cli_warn!("No volumes found", store = store.root().display().to_string());
        eprintln!("No volumes found in {}", store.root().display());
        return Ok(());
    }

    for volume in volumes {
        println!("{}", volume.display());
    }
    Ok(())
}

fn cmd_config_show(config: &Config) -> Result<()> {
    print!("{}", config.to_toml().context("Failed to render config")?);
    Ok(())
}

fn cmd_config_path() -> Result<()> {
    match Config::global_config_path() {
        Some(path) => println!("Global:  {}", path.display()),
        None => println!("Global:  (no home directory)"),
    }
    let project = std::env::current_dir()
        .map(|cwd| cwd.join(rewind_config::PROJECT_CONFIG_PATH))
        .unwrap_or_else(|_| PathBuf::from(rewind_config::PROJECT_CONFIG_PATH));
    println!("Project: {}", project.display());
    Ok(())
}
