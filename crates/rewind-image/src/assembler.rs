//! Sequential replay of a backup chain onto one output file.
//!
//! Backups are applied oldest first and blocks in descriptor order. Each
//! block is written at its absolute offset with a plain seek + write, so a
//! later backup overwrites whatever an earlier one put at the same range.
//! There is no merge step; ordering alone yields last-write-wins.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rewind_store::{decompress, Backup, Block, VolumeBackup};
use tracing::{debug, info, instrument};

use crate::superblock::{size_image, Superblock};
use crate::{ImageError, Result};

/// Hooks invoked while a chain is replayed. Every method defaults to a no-op.
pub trait ReplayObserver {
    fn backup_started(&mut self, _index: usize, _total: usize, _backup: &Backup) {}

    fn block_written(&mut self, _backup: &Backup, _block_index: usize, _block: &Block, _len: usize) {}

    fn backup_finished(&mut self, _index: usize, _backup: &Backup) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ReplayObserver for NoopObserver {}

/// Counters for a finished replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub backups: usize,
    pub blocks: u64,
    /// Decompressed bytes written, counting overwrites
    pub bytes: u64,
}

/// Owns the output image for the duration of a restore.
#[derive(Debug)]
pub struct ImageAssembler {
    file: File,
    path: PathBuf,
}

impl ImageAssembler {
    /// Create a fresh image at `path`. Fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| ImageError::Create {
                path: path.clone(),
                source,
            })?;
        Ok(Self { file, path })
    }

    /// Wrap an already opened read/write handle.
    pub fn from_file<P: AsRef<Path>>(file: File, path: P) -> Self {
        Self {
            file,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write `data` at absolute `offset`, touching exactly `offset..offset + data.len()`.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)
    }

    /// Replay every backup of `volume`, oldest first.
    #[instrument(level = "debug", skip_all, fields(volume = %volume.name))]
    pub fn replay(
        &mut self,
        volume: &VolumeBackup,
        observer: &mut dyn ReplayObserver,
    ) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        let total = volume.backups.len();

        for (index, backup) in volume.backups.iter().enumerate() {
            observer.backup_started(index, total, backup);
            debug!(
                backup = %backup.name(),
                created = %backup.created,
                blocks = backup.blocks.len(),
                compression = %backup.compression,
                "Replaying backup"
            );

            for (block_index, block) in backup.blocks.iter().enumerate() {
                let len = self.replay_block(volume, backup, block)?;
                stats.blocks += 1;
                stats.bytes += len as u64;
                observer.block_written(backup, block_index, block, len);
            }

            stats.backups += 1;
            observer.backup_finished(index, backup);
        }

        info!(
            backups = stats.backups,
            blocks = stats.blocks,
            bytes = stats.bytes,
            "Replay complete"
        );
        Ok(stats)
    }

    fn replay_block(&mut self, volume: &VolumeBackup, backup: &Backup, block: &Block) -> Result<usize> {
        let offset = u64::try_from(block.offset).map_err(|_| ImageError::NegativeOffset {
            backup: backup.name(),
            checksum: block.checksum.clone(),
            offset: block.offset,
        })?;

        let path = volume
            .block_path(&block.checksum)
            .map_err(|source| ImageError::Resolve {
                backup: backup.name(),
                source,
            })?;

        let payload = fs::read(&path).map_err(|source| ImageError::ReadBlock {
            backup: backup.name(),
            checksum: block.checksum.clone(),
            path: path.clone(),
            source,
        })?;

        let data = decompress(&payload, &backup.compression).map_err(|source| {
            ImageError::Decompress {
                backup: backup.name(),
                checksum: block.checksum.clone(),
                source,
            }
        })?;

        self.write_at(offset, &data)
            .map_err(|source| ImageError::Write {
                backup: backup.name(),
                checksum: block.checksum.clone(),
                offset,
                source,
            })?;

        debug!(checksum = %block.checksum, offset, len = data.len(), "Wrote block");
        Ok(data.len())
    }

    /// Size the image from its superblock and release the file.
    ///
    /// On failure the assembled bytes stay on disk as they are.
    pub fn finish(mut self) -> Result<Superblock> {
        let superblock = size_image(&mut self.file).map_err(ImageError::SizeDerivation)?;
        self.file.flush()?;
        info!(
            image = %self.path.display(),
            block_count = superblock.block_count,
            block_size = superblock.block_size,
            "Image sized from superblock"
        );
        Ok(superblock)
    }
}
