//! Backup catalog: the chronologically ordered chain of snapshots of a volume.
//!
//! Each snapshot is described by one JSON descriptor in `<volume>/backups/`:
//!
//! ```json
//! {
//!   "CreatedTime": "2023-01-01T00:00:00Z",
//!   "Size": "2097152",
//!   "CompressionMethod": "lz4",
//!   "Blocks": [{ "Offset": 0, "BlockChecksum": "3c8f..." }]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::compression::CompressionMethod;
use crate::{resolve_block_path, Result, StoreError, BACKUPS_DIR, DESCRIPTOR_EXT};

/// One changed block recorded by a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Absolute byte offset in the reconstructed image
    #[serde(rename = "Offset")]
    pub offset: i64,
    /// Content address of the compressed payload, shared across backups
    #[serde(rename = "BlockChecksum")]
    pub checksum: String,
}

/// Raw descriptor as stored on disk. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BackupDescriptor {
    created_time: String,
    size: String,
    compression_method: String,
    blocks: Vec<Block>,
}

/// One point-in-time incremental snapshot.
#[derive(Debug, Clone)]
pub struct Backup {
    /// Path of the descriptor this backup was loaded from
    pub identifier: PathBuf,
    pub created: DateTime<Utc>,
    /// Declared volume size in bytes, informational only; the sign is not checked
    pub size: i64,
    pub compression: CompressionMethod,
    /// Blocks in descriptor order
    pub blocks: Vec<Block>,
}

impl Backup {
    /// Parse a single descriptor file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &data)
    }

    fn parse(path: &Path, data: &[u8]) -> Result<Self> {
        let descriptor: BackupDescriptor =
            serde_json::from_slice(data).map_err(|source| StoreError::Descriptor {
                path: path.to_path_buf(),
                source,
            })?;

        let created = DateTime::parse_from_rfc3339(&descriptor.created_time)
            .map_err(|source| StoreError::InvalidTimestamp {
                path: path.to_path_buf(),
                value: descriptor.created_time.clone(),
                source,
            })?
            .with_timezone(&Utc);

        let size = descriptor
            .size
            .parse::<i64>()
            .map_err(|source| StoreError::InvalidSize {
                path: path.to_path_buf(),
                value: descriptor.size.clone(),
                source,
            })?;

        Ok(Self {
            identifier: path.to_path_buf(),
            created,
            size,
            compression: CompressionMethod::from_tag(&descriptor.compression_method),
            blocks: descriptor.blocks,
        })
    }

    /// File name of the descriptor, for display.
    pub fn name(&self) -> String {
        self.identifier
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.identifier.display().to_string())
    }
}

/// The full backup chain of one volume.
#[derive(Debug, Clone)]
pub struct VolumeBackup {
    pub name: String,
    /// The volume directory inside the store
    pub backup_path: PathBuf,
    /// Ascending by creation time
    pub backups: Vec<Backup>,
}

impl VolumeBackup {
    /// Locate the payload file of a block of this volume.
    pub fn block_path(&self, checksum: &str) -> Result<PathBuf> {
        resolve_block_path(&self.backup_path, checksum)
    }

    /// Total number of block references across every backup.
    pub fn block_count(&self) -> usize {
        self.backups.iter().map(|b| b.blocks.len()).sum()
    }
}

/// Load every descriptor of the volume at `volume_path`.
///
/// Descriptors are visited in file-name order and then stably sorted by
/// creation time, so backups created at the same instant keep file-name
/// order. Any unreadable or malformed descriptor fails the whole load.
#[instrument(level = "debug", skip(volume_path), fields(volume = %volume_path.as_ref().display()))]
pub fn load_catalog<P: AsRef<Path>>(volume_path: P) -> Result<VolumeBackup> {
    let volume_path = volume_path.as_ref();
    let backups_dir = volume_path.join(BACKUPS_DIR);

    let mut descriptors = Vec::new();
    if backups_dir.is_dir() {
        for entry in fs::read_dir(&backups_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == DESCRIPTOR_EXT) && path.is_file() {
                descriptors.push(path);
            }
        }
    } else {
        warn!(dir = %backups_dir.display(), "Volume has no backups directory");
    }
    descriptors.sort();

    let mut backups = descriptors
        .iter()
        .map(Backup::load)
        .collect::<Result<Vec<_>>>()?;
    backups.sort_by_key(|b| b.created);

    let name = volume_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    debug!(volume = %name, backups = backups.len(), "Loaded backup catalog");

    Ok(VolumeBackup {
        name,
        backup_path: volume_path.to_path_buf(),
        backups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_descriptor(dir: &Path, file: &str, body: &str) -> PathBuf {
        let backups = dir.join(BACKUPS_DIR);
        fs::create_dir_all(&backups).unwrap();
        let path = backups.join(file);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_single_descriptor() {
        let temp = TempDir::new().unwrap();
        let cfg = write_descriptor(
            temp.path(),
            "backup_1.cfg",
            r#"{
                "CreatedTime": "2023-01-01T00:00:00Z",
                "Size": "1024",
                "CompressionMethod": "lz4",
                "Blocks": [
                    { "Offset": 0, "BlockChecksum": "test123" }
                ]
            }"#,
        );

        let volume = load_catalog(temp.path()).unwrap();
        assert_eq!(volume.backups.len(), 1);

        let backup = &volume.backups[0];
        assert_eq!(backup.identifier, cfg);
        assert_eq!(backup.size, 1024);
        assert_eq!(backup.compression, CompressionMethod::Lz4);
        assert_eq!(backup.created.to_rfc3339(), "2023-01-01T00:00:00+00:00");
        assert_eq!(
            backup.blocks,
            vec![Block {
                offset: 0,
                checksum: "test123".to_string()
            }]
        );
    }

    #[test]
    fn test_ignores_other_extensions_and_unknown_fields() {
        let temp = TempDir::new().unwrap();
        write_descriptor(
            temp.path(),
            "backup_1.cfg",
            r#"{"Name":"backup-1","CreatedTime":"2023-01-01T00:00:00Z","Size":"0",
                "CompressionMethod":"gzip","Labels":{"k":"v"}}"#,
        );
        write_descriptor(temp.path(), "volume.cfg.tmp", "not json");
        write_descriptor(temp.path(), "notes.txt", "not json");

        let volume = load_catalog(temp.path()).unwrap();
        assert_eq!(volume.backups.len(), 1);
        assert!(volume.backups[0].blocks.is_empty());
    }

    #[test]
    fn test_offset_timezone_normalized() {
        let temp = TempDir::new().unwrap();
        write_descriptor(
            temp.path(),
            "a.cfg",
            r#"{"CreatedTime":"2023-01-01T03:00:00+02:00","Size":"1","CompressionMethod":"lz4"}"#,
        );
        write_descriptor(
            temp.path(),
            "b.cfg",
            r#"{"CreatedTime":"2023-01-01T00:30:00Z","Size":"1","CompressionMethod":"lz4"}"#,
        );

        let volume = load_catalog(temp.path()).unwrap();
        let names: Vec<_> = volume.backups.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["b.cfg", "a.cfg"]);
    }

    #[test]
    fn test_equal_timestamps_keep_file_name_order() {
        let temp = TempDir::new().unwrap();
        for file in ["c.cfg", "a.cfg", "b.cfg"] {
            write_descriptor(
                temp.path(),
                file,
                r#"{"CreatedTime":"2023-06-01T00:00:00Z","Size":"1","CompressionMethod":"lz4"}"#,
            );
        }

        let volume = load_catalog(temp.path()).unwrap();
        let names: Vec<_> = volume.backups.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["a.cfg", "b.cfg", "c.cfg"]);
    }

    #[test]
    fn test_bad_timestamp_aborts_load() {
        let temp = TempDir::new().unwrap();
        write_descriptor(
            temp.path(),
            "good.cfg",
            r#"{"CreatedTime":"2023-01-01T00:00:00Z","Size":"1","CompressionMethod":"lz4"}"#,
        );
        write_descriptor(
            temp.path(),
            "bad.cfg",
            r#"{"CreatedTime":"yesterday","Size":"1","CompressionMethod":"lz4"}"#,
        );

        let err = load_catalog(temp.path()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTimestamp { ref value, .. } if value == "yesterday"));
    }

    #[test]
    fn test_bad_size_aborts_load() {
        let temp = TempDir::new().unwrap();
        write_descriptor(
            temp.path(),
            "bad.cfg",
            r#"{"CreatedTime":"2023-01-01T00:00:00Z","Size":"1k","CompressionMethod":"lz4"}"#,
        );

        let err = load_catalog(temp.path()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSize { ref value, .. } if value == "1k"));
    }

    #[test]
    fn test_negative_size_loads() {
        let temp = TempDir::new().unwrap();
        write_descriptor(
            temp.path(),
            "neg.cfg",
            r#"{"CreatedTime":"2023-01-01T00:00:00Z","Size":"-1","CompressionMethod":"lz4"}"#,
        );

        let volume = load_catalog(temp.path()).unwrap();
        assert_eq!(volume.backups[0].size, -1);
    }

    #[test]
    fn test_malformed_json_aborts_load() {
        let temp = TempDir::new().unwrap();
        write_descriptor(temp.path(), "bad.cfg", "{ not json");

        let err = load_catalog(temp.path()).unwrap_err();
        assert!(matches!(err, StoreError::Descriptor { .. }));
    }

    #[test]
    fn test_unknown_compression_loads() {
        let temp = TempDir::new().unwrap();
        write_descriptor(
            temp.path(),
            "x.cfg",
            r#"{"CreatedTime":"2023-01-01T00:00:00Z","Size":"1","CompressionMethod":"snappy"}"#,
        );

        let volume = load_catalog(temp.path()).unwrap();
        assert_eq!(
            volume.backups[0].compression,
            CompressionMethod::Unrecognized("snappy".to_string())
        );
    }

    #[test]
    fn test_missing_backups_dir_is_empty_chain() {
        let temp = TempDir::new().unwrap();
        let volume_dir = temp.path().join("vol-a");
        fs::create_dir_all(&volume_dir).unwrap();

        let volume = load_catalog(&volume_dir).unwrap();
        assert_eq!(volume.name, "vol-a");
        assert!(volume.backups.is_empty());
        assert_eq!(volume.block_count(), 0);
    }
}
