//! # rewind-image
//!
//! Rebuilds a raw block-device image from a loaded backup chain.
//!
//! ```text
//! VolumeBackup ──► ImageAssembler::replay ──► ImageAssembler::finish
//!  (oldest first)    seek + write per block     superblock @ 1024 → set_len
//! ```

pub mod assembler;
pub mod superblock;

pub use assembler::{ImageAssembler, NoopObserver, ReplayObserver, ReplayStats};
pub use superblock::{RawSuperblock, Superblock, SuperblockError, SUPERBLOCK_OFFSET};

use std::io;
use std::path::{Path, PathBuf};

use rewind_store::{CompressionError, StoreError, VolumeBackup};
use thiserror::Error;

/// Errors that can occur while assembling an image
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to create output file {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },

    #[error("Backup {backup}: {source}")]
    Resolve { backup: String, source: StoreError },

    #[error("Failed to read block {checksum} of backup {backup} from {}: {source}", path.display())]
    ReadBlock {
        backup: String,
        checksum: String,
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to decompress block {checksum} of backup {backup}: {source}")]
    Decompress {
        backup: String,
        checksum: String,
        source: CompressionError,
    },

    #[error("Failed to write block {checksum} of backup {backup} at offset {offset}: {source}")]
    Write {
        backup: String,
        checksum: String,
        offset: u64,
        source: io::Error,
    },

    #[error("Block {checksum} of backup {backup} has negative offset {offset}")]
    NegativeOffset {
        backup: String,
        checksum: String,
        offset: i64,
    },

    #[error("Failed to size image from superblock: {0}")]
    SizeDerivation(#[source] SuperblockError),
}

impl ImageError {
    /// Whether the assembled image is complete apart from its final length.
    pub fn leaves_raw_image(&self) -> bool {
        matches!(self, ImageError::SizeDerivation(_))
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;

/// Outcome of a full restore
#[derive(Debug, Clone, Copy)]
pub struct RestoreReport {
    pub stats: ReplayStats,
    pub superblock: Superblock,
    /// Final image length in bytes
    pub image_size: u64,
}

/// Create `output`, replay `volume` onto it and size it from its superblock.
pub fn restore<P: AsRef<Path>>(
    volume: &VolumeBackup,
    output: P,
    observer: &mut dyn ReplayObserver,
) -> Result<RestoreReport> {
    let mut assembler = ImageAssembler::create(output)?;
    let stats = assembler.replay(volume, observer)?;
    let superblock = assembler.finish()?;
    let image_size = superblock
        .total_size()
        .map_err(ImageError::SizeDerivation)?;

    Ok(RestoreReport {
        stats,
        superblock,
        image_size,
    })
}
