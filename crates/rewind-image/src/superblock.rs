//! ext2/3/4 superblock sizing.
//!
//! Only the leading fields of the superblock are consulted: enough to know
//! how many blocks the filesystem spans and how large each block is. The
//! assembled image is then cut (or zero-extended) to exactly that length.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::mem::size_of;

use thiserror::Error;
use zerocopy::{little_endian::U32, FromBytes, Immutable, IntoBytes, KnownLayout};

/// Byte offset of the superblock from the start of the device.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Block size for a log2 exponent of zero.
pub const MIN_BLOCK_SIZE: u64 = 1024;

#[derive(Error, Debug)]
pub enum SuperblockError {
    #[error("superblock unreadable: {0}")]
    Read(#[from] io::Error),

    #[error("block size exponent {0} is out of range")]
    BlockSizeOverflow(u32),

    #[error("{block_count} blocks of {block_size} bytes overflows the addressable size")]
    SizeOverflow { block_count: u64, block_size: u64 },
}

/// Leading fields of the on-disk superblock, little-endian.
#[derive(Debug, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct RawSuperblock {
    pub inodes_count: U32,
    pub blocks_count: U32,
    pub r_blocks_count: U32,
    pub free_blocks_count: U32,
    pub free_inodes_count: U32,
    pub first_data_block: U32,
    pub log_block_size: U32,
}

/// Geometry derived from a [`RawSuperblock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub block_count: u64,
    pub block_size: u64,
}

impl Superblock {
    pub fn from_raw(raw: &RawSuperblock) -> Result<Self, SuperblockError> {
        let log = raw.log_block_size.get();
        let block_size = MIN_BLOCK_SIZE
            .checked_shl(log)
            .filter(|size| size >> log == MIN_BLOCK_SIZE)
            .ok_or(SuperblockError::BlockSizeOverflow(log))?;

        Ok(Self {
            block_count: u64::from(raw.blocks_count.get()),
            block_size,
        })
    }

    /// Length of the filesystem in bytes.
    pub fn total_size(&self) -> Result<u64, SuperblockError> {
        self.block_count
            .checked_mul(self.block_size)
            .ok_or(SuperblockError::SizeOverflow {
                block_count: self.block_count,
                block_size: self.block_size,
            })
    }
}

/// Read the raw superblock at [`SUPERBLOCK_OFFSET`].
pub fn read_superblock<R: Read + Seek>(reader: &mut R) -> Result<RawSuperblock, SuperblockError> {
    reader.seek(SeekFrom::Start(SUPERBLOCK_OFFSET))?;

    let mut buf = [0u8; size_of::<RawSuperblock>()];
    reader.read_exact(&mut buf)?;

    // Infallible: the buffer is exactly one record long
    RawSuperblock::read_from_bytes(&buf)
        .map_err(|_| SuperblockError::Read(io::ErrorKind::InvalidData.into()))
}

/// Read the superblock of `image` and set its length to the size it declares.
///
/// Nothing is modified unless the superblock could be read and its size
/// computed.
pub fn size_image(image: &mut File) -> Result<Superblock, SuperblockError> {
    let raw = read_superblock(image)?;
    let superblock = Superblock::from_raw(&raw)?;
    image.set_len(superblock.total_size()?)?;
    Ok(superblock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn raw(blocks: u32, log: u32) -> RawSuperblock {
        RawSuperblock {
            inodes_count: U32::new(64),
            blocks_count: U32::new(blocks),
            r_blocks_count: U32::new(5),
            free_blocks_count: U32::new(10),
            free_inodes_count: U32::new(50),
            first_data_block: U32::new(0),
            log_block_size: U32::new(log),
        }
    }

    fn image_with(raw: &RawSuperblock, len: usize) -> Vec<u8> {
        let mut image = vec![0u8; len];
        let start = SUPERBLOCK_OFFSET as usize;
        image[start..start + size_of::<RawSuperblock>()].copy_from_slice(raw.as_bytes());
        image
    }

    #[test]
    fn test_record_layout_is_seven_le_words() {
        assert_eq!(size_of::<RawSuperblock>(), 28);
        let bytes = raw(0x0102_0304, 2).as_bytes().to_vec();
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[24..28], &[2, 0, 0, 0]);
    }

    #[test]
    fn test_geometry() {
        let sb = Superblock::from_raw(&raw(100, 2)).unwrap();
        assert_eq!(sb.block_size, 4096);
        assert_eq!(sb.total_size().unwrap(), 409_600);

        let sb = Superblock::from_raw(&raw(8, 0)).unwrap();
        assert_eq!(sb.block_size, 1024);
        assert_eq!(sb.total_size().unwrap(), 8192);
    }

    #[test]
    fn test_read_from_cursor() {
        let image = image_with(&raw(100, 2), 4096);
        let parsed = read_superblock(&mut Cursor::new(image)).unwrap();
        assert_eq!(parsed.blocks_count.get(), 100);
        assert_eq!(parsed.log_block_size.get(), 2);
        assert_eq!(parsed.inodes_count.get(), 64);
    }

    #[test]
    fn test_short_image_is_error() {
        let err = read_superblock(&mut Cursor::new(vec![0u8; 1030])).unwrap_err();
        assert!(matches!(err, SuperblockError::Read(_)));
    }

    #[test]
    fn test_absurd_exponent_is_error() {
        let err = Superblock::from_raw(&raw(1, 60)).unwrap_err();
        assert!(matches!(err, SuperblockError::BlockSizeOverflow(60)));
        let err = Superblock::from_raw(&raw(1, 200)).unwrap_err();
        assert!(matches!(err, SuperblockError::BlockSizeOverflow(200)));
    }

    #[test]
    fn test_size_overflow_is_error() {
        let sb = Superblock::from_raw(&raw(u32::MAX, 40)).unwrap();
        assert!(matches!(
            sb.total_size(),
            Err(SuperblockError::SizeOverflow { .. })
        ));
    }

    #[test]
    fn test_size_image_truncates_and_extends() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&image_with(&raw(100, 2), 500_000)).unwrap();
        let sb = size_image(&mut file).unwrap();
        assert_eq!(sb.total_size().unwrap(), 409_600);
        assert_eq!(file.metadata().unwrap().len(), 409_600);

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&image_with(&raw(4, 0), 2048)).unwrap();
        size_image(&mut file).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 4096);
    }

    #[test]
    fn test_size_image_leaves_short_file_untouched() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[0xAB; 900]).unwrap();
        assert!(size_image(&mut file).is_err());
        assert_eq!(file.metadata().unwrap().len(), 900);
    }
}
