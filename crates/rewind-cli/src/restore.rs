//! # rewind restore
//!
//! Replays a volume's backup chain onto a fresh output image.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use console::{style, Term};

use rewind_config::{log_cli_info, log_cli_warn, log_restore_info, Config};
use rewind_store::load_catalog;

use crate::progress::ProgressObserver;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Volume name
    #[arg(short = 't', long, alias = "target")]
    pub volume: String,

    /// Output image file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Overwrite an existing output file without asking
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,
}

pub fn run(backup_root: &Path, config: &Config, args: RestoreArgs) -> Result<()> {
    let store = crate::open_store(backup_root)?;

    check_output_dir(&args.output)?;

    let volume_path = store
        .volume_path(&args.volume)
        .with_context(|| format!("Failed to find backups for volume {}", args.volume))?;
    eprintln!(
        "Found backups for {} at {}",
        style(&args.volume).cyan(),
        volume_path.display()
    );

    let volume = load_catalog(&volume_path)
        .with_context(|| format!("Failed to load backups of volume {}", args.volume))?;
    if volume.backups.is_empty() {
        log_cli_warn!("Volume has no backups", volume = args.volume.as_str());
    }
    eprintln!(
        "Replaying {} backup(s), {} block(s)",
        volume.backups.len(),
        volume.block_count()
    );

    // Only touch an existing output once the chain is known to load
    if args.output.exists() {
        let overwrite = args.yes || config.restore.assume_yes || confirm_overwrite(&args.output)?;
        if !overwrite {
            bail!("Not overwriting {}", args.output.display());
        }
        fs::remove_file(&args.output)
            .with_context(|| format!("Failed to remove {}", args.output.display()))?;
        log_cli_info!("Removed existing output", output = args.output.display().to_string());
    }

    let show_progress = config.restore.progress && !args.no_progress;
    let mut observer = ProgressObserver::new(show_progress);

    match rewind_image::restore(&volume, &args.output, &mut observer) {
        Ok(report) => {
            log_restore_info!(
                "Restore complete",
                volume = volume.name.as_str(),
                blocks = report.stats.blocks,
                bytes_written = report.stats.bytes,
                image_size = report.image_size
            );
            eprintln!(
                "{} Restored {} to {} ({} bytes: {} blocks of {} bytes)",
                style("✔").green(),
                volume.name,
                args.output.display(),
                report.image_size,
                report.superblock.block_count,
                report.superblock.block_size
            );
            eprintln!("Mount the image with:");
            eprintln!("  mount -o loop {} /mnt", args.output.display());
            Ok(())
        }
        Err(e) if e.leaves_raw_image() => {
            eprintln!(
                "{} The assembled image at {} was kept, but its final size could not be derived.",
                style("warning:").yellow().bold(),
                args.output.display()
            );
            eprintln!("It has not been truncated and may not be mountable as is.");
            Err(e).context(format!("Failed to size image of volume {}", volume.name))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to restore volume {}", volume.name)),
    }
}

/// The output's parent directory must already exist.
fn check_output_dir(output: &Path) -> Result<()> {
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if !parent.is_dir() {
        bail!("Output directory {} does not exist", parent.display());
    }
    Ok(())
}

/// Ask on the terminal; anything but `y` (or a non-interactive stdin) declines.
fn confirm_overwrite(output: &Path) -> Result<bool> {
    let term = Term::stderr();
    term.write_str(&format!(
        "Output file {} already exists. Overwrite it? [y/n] ",
        output.display()
    ))?;
    let answer = term.read_line().context("Failed to read answer")?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
