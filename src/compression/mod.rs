// src/compression/mod.rs
//! Archive compression detection and decoding
//!
//! Upstream distributions ship tarballs compressed with gzip, xz or zstd.
//! The format is detected from magic bytes rather than the file name, since
//! mirrors do not always keep names intact.

use std::io::{self, Read};
use thiserror::Error;

/// Offset of the `ustar` magic inside a tar header block
const TAR_MAGIC_OFFSET: usize = 257;

/// Bytes needed to recognize every supported format
pub const SNIFF_LEN: usize = TAR_MAGIC_OFFSET + 5;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Uncompressed tar
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstandard compression (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    ///
    /// ```
    /// use repack::compression::CompressionFormat;
    ///
    /// assert_eq!(CompressionFormat::from_extension("a.tar.gz"), Some(CompressionFormat::Gzip));
    /// assert_eq!(CompressionFormat::from_extension("a.tar"), Some(CompressionFormat::None));
    /// assert_eq!(CompressionFormat::from_extension("a.zip"), None);
    /// ```
    pub fn from_extension(path: &str) -> Option<Self> {
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(Self::Gzip)
        } else if path.ends_with(".tar.xz") || path.ends_with(".txz") {
            Some(Self::Xz)
        } else if path.ends_with(".tar.zst") || path.ends_with(".tar.zstd") {
            Some(Self::Zstd)
        } else if path.ends_with(".tar") {
            Some(Self::None)
        } else {
            None
        }
    }

    /// Detect the format from the first bytes of an archive
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    /// - Plain tar: `ustar` at offset 257
    pub fn from_magic_bytes(data: &[u8]) -> Result<Self, CompressionError> {
        if data.starts_with(&[0x1f, 0x8b]) {
            Ok(Self::Gzip)
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Ok(Self::Xz)
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Ok(Self::Zstd)
        } else if data.len() >= SNIFF_LEN && &data[TAR_MAGIC_OFFSET..SNIFF_LEN] == b"ustar" {
            Ok(Self::None)
        } else if data.starts_with(b"PK\x03\x04") {
            Err(CompressionError::UnsupportedFormat("zip".to_string()))
        } else {
            Err(CompressionError::UnsupportedFormat(
                "unrecognized magic bytes".to_string(),
            ))
        }
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "tar",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create a decompressing reader for the given format
///
/// For `CompressionFormat::None`, returns the reader unchanged.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder =
                zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                    format: "zstd",
                    source: e,
                })?;
            Ok(Box::new(decoder))
        }
    }
}
