//! Fixture builder for isolated backup stores.
//!
//! Provides `StoreFixture` to lay out:
//! - A temporary backup root with an empty `backupstore/`
//! - Sharded volume directories
//! - Backup descriptors and compressed block payloads
//!
//! # Usage
//!
//! ```ignore
//! use rewind_store::testing::StoreFixture;
//!
//! let fixture = StoreFixture::new()?;
//! let volume = fixture.add_volume("pvc-1", "ab", "cd")?;
//! fixture.put_block(&volume, "c0ffee00", b"raw data", &CompressionMethod::Lz4)?;
//! fixture.write_backup(&volume, "backup_a.cfg", "2023-01-01T00:00:00Z", "lz4", &[(0, "c0ffee00")])?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::json;
use tempfile::TempDir;

use crate::compression::{compress, CompressionMethod};
use crate::{BackupStore, BACKUPS_DIR, BLOCKS_DIR, BLOCK_EXT, STORE_DIR, VOLUMES_DIR};

/// Atomic counter for unique fixture IDs
static FIXTURE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated backup root in a temporary directory
pub struct StoreFixture {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Directory passed as `--backup-root`
    pub backup_root: PathBuf,
    /// `<backup_root>/backupstore`
    pub store_root: PathBuf,
    /// Scratch directory for output images
    pub output_dir: PathBuf,
    pub fixture_id: u32,
}

impl StoreFixture {
    pub fn new() -> anyhow::Result<Self> {
        let fixture_id = FIXTURE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let backup_root = temp_dir.path().join("backup-root");
        let store_root = backup_root.join(STORE_DIR);
        let output_dir = temp_dir.path().join("out");

        std::fs::create_dir_all(store_root.join(VOLUMES_DIR))?;
        std::fs::create_dir_all(&output_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            backup_root,
            store_root,
            output_dir,
            fixture_id,
        })
    }

    pub fn store(&self) -> BackupStore {
        BackupStore::from_store_root(&self.store_root)
    }

    /// A not-yet-existing image path inside the scratch directory.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Create `volumes/<shard1>/<shard2>/<name>` with empty `backups/` and `blocks/`.
    pub fn add_volume(&self, name: &str, shard1: &str, shard2: &str) -> anyhow::Result<PathBuf> {
        let path = self
            .store_root
            .join(VOLUMES_DIR)
            .join(shard1)
            .join(shard2)
            .join(name);
        std::fs::create_dir_all(path.join(BACKUPS_DIR))?;
        std::fs::create_dir_all(path.join(BLOCKS_DIR))?;
        Ok(path)
    }

    /// Compress `raw` and store it under shards taken from the checksum prefix.
    pub fn put_block(
        &self,
        volume: &Path,
        checksum: &str,
        raw: &[u8],
        method: &CompressionMethod,
    ) -> anyhow::Result<PathBuf> {
        let shard1 = checksum.get(..2).unwrap_or("00");
        let shard2 = checksum.get(2..4).unwrap_or("00");
        self.put_block_at(volume, shard1, shard2, checksum, raw, method)
    }

    /// Compress `raw` and store it under explicit shard directories.
    pub fn put_block_at(
        &self,
        volume: &Path,
        shard1: &str,
        shard2: &str,
        checksum: &str,
        raw: &[u8],
        method: &CompressionMethod,
    ) -> anyhow::Result<PathBuf> {
        let payload = compress(raw, method)?;
        self.put_payload_at(volume, shard1, shard2, checksum, &payload)
    }

    /// Store `payload` verbatim, e.g. to plant corrupt data.
    pub fn put_payload_at(
        &self,
        volume: &Path,
        shard1: &str,
        shard2: &str,
        checksum: &str,
        payload: &[u8],
    ) -> anyhow::Result<PathBuf> {
        let dir = volume.join(BLOCKS_DIR).join(shard1).join(shard2);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.{}", checksum, BLOCK_EXT));
        std::fs::write(&path, payload)?;
        Ok(path)
    }

    /// Write a backup descriptor listing `(offset, checksum)` blocks in order.
    pub fn write_backup(
        &self,
        volume: &Path,
        file_name: &str,
        created: &str,
        compression: &str,
        blocks: &[(i64, &str)],
    ) -> anyhow::Result<PathBuf> {
        let blocks: Vec<_> = blocks
            .iter()
            .map(|(offset, checksum)| json!({ "Offset": offset, "BlockChecksum": checksum }))
            .collect();
        let descriptor = json!({
            "Name": file_name.trim_end_matches(".cfg"),
            "CreatedTime": created,
            "Size": "2097152",
            "CompressionMethod": compression,
            "Blocks": blocks,
        });

        let dir = volume.join(BACKUPS_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(file_name);
        std::fs::write(&path, serde_json::to_vec_pretty(&descriptor)?)?;
        Ok(path)
    }
}
