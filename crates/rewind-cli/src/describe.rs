//! # rewind describe
//!
//! Prints the backup chain of a volume without restoring it.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use rewind_store::VolumeBackup;

/// Payload size the store cuts volumes into; used for size estimates only.
pub const STORE_BLOCK_SIZE: u64 = 2 * 1024 * 1024;

pub fn run(backup_root: &Path, volume_name: &str) -> Result<()> {
    let store = crate::open_store(backup_root)?;
    let volume_path = store
        .volume_path(volume_name)
        .with_context(|| format!("Failed to find backups for volume {}", volume_name))?;
    println!(
        "Found backups for {} at {}",
        style(volume_name).cyan(),
        volume_path.display()
    );

    let volume = rewind_store::load_catalog(&volume_path)
        .with_context(|| format!("Failed to load backups of volume {}", volume_name))?;
    print_volume(&volume);
    Ok(())
}

fn print_volume(volume: &VolumeBackup) {
    println!("Number of backups: {}", volume.backups.len());

    for backup in &volume.backups {
        println!();
        println!("{} {}", style("Backup:").bold(), backup.identifier.display());
        println!("  Created:     {}", backup.created.to_rfc3339());
        println!("  Size:        {}", backup.size);
        println!("  Compression: {}", backup.compression);
        println!("  Blocks:      {}", backup.blocks.len());
        for block in &backup.blocks {
            println!(
                "    {} offset={}",
                style(&block.checksum).dim(),
                block.offset
            );
        }
    }

    println!();
    println!(
        "Approximate cumulative size: {} MiB",
        approximate_size(volume) / (1024 * 1024)
    );
}

/// Sum of every block reference at the store's block size.
fn approximate_size(volume: &VolumeBackup) -> u64 {
    (volume.block_count() as u64).saturating_mul(STORE_BLOCK_SIZE)
}
