//! Block payload compression.
//!
//! Payloads are stored either as an LZ4 frame (`"lz4"`) or as a gzip stream
//! (`"gzip"`, every member is decoded). The method is declared once per backup descriptor
//! and applies to every block that backup references.

use std::fmt;
use std::io::{self, Read, Write};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("{method} payload is corrupt or truncated: {source}")]
    Decode {
        method: &'static str,
        source: io::Error,
    },

    #[error("{method} encoding failed: {source}")]
    Encode {
        method: &'static str,
        source: io::Error,
    },

    #[error("Unsupported compression method: {0:?}")]
    Unsupported(String),
}

/// Compression method declared by a backup descriptor.
///
/// Descriptors are loaded without validating the tag, so anything outside the
/// known set is kept as [`CompressionMethod::Unrecognized`] and rejected only
/// when a payload actually has to be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// LZ4 frame format
    Lz4,
    /// Gzip, one or more members
    Gzip,
    Unrecognized(String),
}

impl CompressionMethod {
    /// Map a descriptor tag to a method. Matching is exact.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "lz4" => CompressionMethod::Lz4,
            "gzip" => CompressionMethod::Gzip,
            other => CompressionMethod::Unrecognized(other.to_string()),
        }
    }

    /// The tag as written in descriptors.
    pub fn as_str(&self) -> &str {
        match self {
            CompressionMethod::Lz4 => "lz4",
            CompressionMethod::Gzip => "gzip",
            CompressionMethod::Unrecognized(tag) => tag,
        }
    }

}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a full payload.
pub fn decompress(payload: &[u8], method: &CompressionMethod) -> Result<Vec<u8>, CompressionError> {
    let mut raw = Vec::new();
    match method {
        CompressionMethod::Lz4 => {
            FrameDecoder::new(payload)
                .read_to_end(&mut raw)
                .map_err(|source| CompressionError::Decode {
                    method: "lz4",
                    source,
                })?;
        }
        CompressionMethod::Gzip => {
            // Concatenated members are one payload; a non-gzip tail is an error
            MultiGzDecoder::new(payload)
                .read_to_end(&mut raw)
                .map_err(|source| CompressionError::Decode {
                    method: "gzip",
                    source,
                })?;
        }
        CompressionMethod::Unrecognized(tag) => {
            return Err(CompressionError::Unsupported(tag.clone()));
        }
    }
    Ok(raw)
}

/// Encode `raw` the way the store writes payloads.
pub fn compress(raw: &[u8], method: &CompressionMethod) -> Result<Vec<u8>, CompressionError> {
    match method {
        CompressionMethod::Lz4 => {
            let encode_err = |source: io::Error| CompressionError::Encode {
                method: "lz4",
                source,
            };
            let mut encoder = FrameEncoder::new(Vec::new());
            encoder.write_all(raw).map_err(encode_err)?;
            encoder
                .finish()
                .map_err(|e| encode_err(io::Error::other(e)))
        }
        CompressionMethod::Gzip => {
            let encode_err = |source: io::Error| CompressionError::Encode {
                method: "gzip",
                source,
            };
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(raw).map_err(encode_err)?;
            encoder.finish().map_err(encode_err)
        }
        CompressionMethod::Unrecognized(tag) => Err(CompressionError::Unsupported(tag.clone())),
    }
}
