//! # rewind-store
//!
//! Read-only access to an incremental, content-addressed backup store.
//!
//! ## Directory Layout
//!
//! ```text
//! <backup_root>/backupstore/
//! └── volumes/
//!     └── 5a/
//!         └── 91/
//!             └── pvc-0f3e.../          # one directory per volume
//!                 ├── backups/
//!                 │   └── backup_*.cfg  # one JSON descriptor per snapshot
//!                 └── blocks/
//!                     └── 3c/
//!                         └── 8f/
//!                             └── <checksum>.blk
//! ```
//!
//! Shard directory names are opaque: lookups enumerate both shard levels
//! instead of deriving them from the name being searched for.

pub mod catalog;
pub mod compression;
mod shard;
pub mod testing;

pub use catalog::{load_catalog, Backup, Block, VolumeBackup};
pub use compression::{compress, decompress, CompressionError, CompressionMethod};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::instrument;

/// Name of the store directory inside a backup root.
pub const STORE_DIR: &str = "backupstore";
/// Per-store directory holding every volume.
pub const VOLUMES_DIR: &str = "volumes";
/// Per-volume directory holding backup descriptors.
pub const BACKUPS_DIR: &str = "backups";
/// Per-volume directory holding compressed block payloads.
pub const BLOCKS_DIR: &str = "blocks";
/// Extension of backup descriptor files.
pub const DESCRIPTOR_EXT: &str = "cfg";
/// Extension of block payload files.
pub const BLOCK_EXT: &str = "blk";

/// Errors that can occur while reading the backup store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Directory not found: {}", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("Could not find backup for volume {name}")]
    VolumeNotFound { name: String },

    #[error("Could not find block {checksum}")]
    BlockNotFound { checksum: String },

    #[error("Invalid store entry name {name:?}: must be a single path component")]
    InvalidName { name: String },

    #[error("Failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Malformed backup descriptor {}: {source}", path.display())]
    Descriptor {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid creation time {value:?} in {}: {source}", path.display())]
    InvalidTimestamp {
        path: PathBuf,
        value: String,
        source: chrono::ParseError,
    },

    #[error("Invalid size {value:?} in {}: {source}", path.display())]
    InvalidSize {
        path: PathBuf,
        value: String,
        source: std::num::ParseIntError,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle on the `backupstore` directory of a backup root.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    /// Open the store under `backup_root`, i.e. `<backup_root>/backupstore`.
    ///
    /// Fails with [`StoreError::MissingDirectory`] when the backup root does
    /// not contain a store.
    pub fn open<P: AsRef<Path>>(backup_root: P) -> Result<Self> {
        let root = backup_root.as_ref().join(STORE_DIR);
        if !root.is_dir() {
            return Err(StoreError::MissingDirectory { path: root });
        }
        Ok(Self { root })
    }

    /// Use `store_root` directly as the store directory, without checks.
    pub fn from_store_root<P: AsRef<Path>>(store_root: P) -> Self {
        Self {
            root: store_root.as_ref().to_path_buf(),
        }
    }

    /// Get the root path of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.root.join(VOLUMES_DIR)
    }

    /// Locate the directory of `volume_name`.
    pub fn volume_path(&self, volume_name: &str) -> Result<PathBuf> {
        resolve_volume_path(&self.root, volume_name)
    }

    /// Locate and load the backup catalog of `volume_name`.
    pub fn load_volume(&self, volume_name: &str) -> Result<VolumeBackup> {
        let path = self.volume_path(volume_name)?;
        load_catalog(path)
    }

    /// Every entry two shard levels below `volumes/`, sorted by path.
    pub fn list_volumes(&self) -> Result<Vec<PathBuf>> {
        Ok(shard::list_sharded(&self.volumes_dir())?)
    }
}

/// Find `<store_root>/volumes/<shard>/<shard>/<volume_name>`.
///
/// When several shard pairs hold the name, the lexicographically smallest
/// path is returned.
#[instrument(level = "debug", skip(store_root))]
pub fn resolve_volume_path<P: AsRef<Path>>(store_root: P, volume_name: &str) -> Result<PathBuf> {
    shard::check_entry_name(volume_name)?;
    let base = store_root.as_ref().join(VOLUMES_DIR);
    shard::find_sharded(&base, volume_name)?.ok_or_else(|| StoreError::VolumeNotFound {
        name: volume_name.to_string(),
    })
}

/// Find `<volume_path>/blocks/<shard>/<shard>/<checksum>.blk`.
#[instrument(level = "debug", skip(volume_path))]
pub fn resolve_block_path<P: AsRef<Path>>(volume_path: P, checksum: &str) -> Result<PathBuf> {
    shard::check_entry_name(checksum)?;
    let base = volume_path.as_ref().join(BLOCKS_DIR);
    let file_name = format!("{}.{}", checksum, BLOCK_EXT);
    shard::find_sharded(&base, &file_name)?.ok_or_else(|| StoreError::BlockNotFound {
        checksum: checksum.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_with_volume(s1: &str, s2: &str, name: &str) -> (TempDir, BackupStore, PathBuf) {
        let temp = TempDir::new().unwrap();
        let store_root = temp.path().join(STORE_DIR);
        let volume = store_root.join(VOLUMES_DIR).join(s1).join(s2).join(name);
        fs::create_dir_all(&volume).unwrap();
        let store = BackupStore::open(temp.path()).unwrap();
        (temp, store, volume)
    }

    #[test]
    fn test_open_requires_backupstore() {
        let temp = TempDir::new().unwrap();
        let err = BackupStore::open(temp.path()).unwrap_err();
        assert!(matches!(err, StoreError::MissingDirectory { .. }));
    }

    #[test]
    fn test_volume_path_found() {
        let (_temp, store, volume) = store_with_volume("ab", "cd", "volume1");
        assert_eq!(store.volume_path("volume1").unwrap(), volume);
    }

    #[test]
    fn test_volume_path_opaque_shards() {
        // Shard names need not relate to the volume name
        let (_temp, store, volume) = store_with_volume("zz", "00", "pvc-1234");
        assert_eq!(store.volume_path("pvc-1234").unwrap(), volume);
    }

    #[test]
    fn test_volume_path_not_found() {
        let (_temp, store, _volume) = store_with_volume("ab", "cd", "volume1");
        let err = store.volume_path("nonexistent").unwrap_err();
        assert!(matches!(err, StoreError::VolumeNotFound { ref name } if name == "nonexistent"));
    }

    #[test]
    fn test_volume_path_rejects_non_entry_names() {
        let (_temp, store, _volume) = store_with_volume("ab", "cd", "vol");
        for name in ["", ".", "..", "../cd", "cd/vol", "vol/", "/vol"] {
            let err = store.volume_path(name).unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidName { name: ref n } if n == name),
                "{:?} was accepted",
                name
            );
        }
    }

    #[test]
    fn test_block_path_rejects_non_entry_checksums() {
        let (_temp, _store, volume) = store_with_volume("ab", "cd", "vol");
        for checksum in ["", "..", "../../ab/cd/x", "12/34"] {
            let err = resolve_block_path(&volume, checksum).unwrap_err();
            assert!(matches!(err, StoreError::InvalidName { .. }));
        }
    }

    #[test]
    fn test_volume_path_ambiguous_picks_smallest() {
        let (temp, store, _) = store_with_volume("cd", "00", "dup");
        let smaller = temp
            .path()
            .join(STORE_DIR)
            .join(VOLUMES_DIR)
            .join("ab")
            .join("ff")
            .join("dup");
        fs::create_dir_all(&smaller).unwrap();

        assert_eq!(store.volume_path("dup").unwrap(), smaller);
    }

    #[test]
    fn test_block_path_found_and_missing() {
        let (_temp, _store, volume) = store_with_volume("ab", "cd", "volume1");
        let block = volume.join(BLOCKS_DIR).join("12").join("34").join("deadbeef.blk");
        fs::create_dir_all(block.parent().unwrap()).unwrap();
        fs::write(&block, b"payload").unwrap();

        assert_eq!(resolve_block_path(&volume, "deadbeef").unwrap(), block);

        let err = resolve_block_path(&volume, "cafebabe").unwrap_err();
        assert!(matches!(err, StoreError::BlockNotFound { ref checksum } if checksum == "cafebabe"));
    }

    #[test]
    fn test_block_path_requires_extension() {
        let (_temp, _store, volume) = store_with_volume("ab", "cd", "volume1");
        let bare = volume.join(BLOCKS_DIR).join("12").join("34").join("deadbeef");
        fs::create_dir_all(bare.parent().unwrap()).unwrap();
        fs::write(&bare, b"payload").unwrap();

        assert!(resolve_block_path(&volume, "deadbeef").is_err());
    }

    #[test]
    fn test_list_volumes_sorted() {
        let (temp, store, first) = store_with_volume("ab", "cd", "b-volume");
        let volumes = temp.path().join(STORE_DIR).join(VOLUMES_DIR);
        let second = volumes.join("ab").join("cd").join("c-volume");
        let third = volumes.join("ef").join("01").join("a-volume");
        fs::create_dir_all(&second).unwrap();
        fs::create_dir_all(&third).unwrap();

        assert_eq!(store.list_volumes().unwrap(), vec![first, second, third]);
    }

    #[test]
    fn test_list_volumes_empty_store() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(STORE_DIR)).unwrap();
        let store = BackupStore::open(temp.path()).unwrap();
        assert!(store.list_volumes().unwrap().is_empty());
    }
}
