// src/hash.rs

//! SHA-256 digests for archive integrity
//!
//! The digest algorithm is fixed: archive references carry a hex-encoded
//! SHA-256 value and every comparison goes through [`Sha256Digest`], which
//! can only be built from a well-formed 64-character hex string or from
//! hashing actual bytes.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Name of the fixed digest algorithm
pub const ALGORITHM: &str = "sha256";

/// SHA-256 output length in bytes
pub const OUTPUT_LEN: usize = 32;

/// SHA-256 output length as a hex string
pub const HEX_LEN: usize = OUTPUT_LEN * 2;

/// Read buffer for streaming hashes (archives run to hundreds of MB)
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Digest parse errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Hash string has wrong length for the algorithm
    InvalidLength { expected: usize, got: usize },
    /// Hash string contains invalid hex characters
    InvalidHex(String),
    /// Prefixed hash names an algorithm other than sha256
    UnsupportedAlgorithm(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid sha256 digest length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in sha256 digest: {}", s),
            Self::UnsupportedAlgorithm(name) => {
                write!(f, "unsupported digest algorithm: {} (only sha256)", name)
            }
        }
    }
}

impl std::error::Error for HashError {}

/// A validated, lowercase hex SHA-256 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Parse a hex digest, optionally prefixed with `sha256:`
    pub fn parse(s: &str) -> Result<Self, HashError> {
        let value = match s.trim().split_once(':') {
            Some((algo, hash)) if algo.eq_ignore_ascii_case(ALGORITHM) => hash,
            Some((algo, _)) => return Err(HashError::UnsupportedAlgorithm(algo.to_string())),
            None => s.trim(),
        };

        if value.len() != HEX_LEN {
            return Err(HashError::InvalidLength {
                expected: HEX_LEN,
                got: value.len(),
            });
        }

        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value.to_string()));
        }

        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Get the digest as a lowercase hex string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Format as a prefixed string (`sha256:abc123...`)
    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", ALGORITHM, self.0)
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sha256Digest {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compute the digest of a byte slice
pub fn hash_bytes(data: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Sha256Digest(format!("{:x}", hasher.finalize()))
}

/// Compute the digest of everything a reader yields
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<Sha256Digest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Sha256Digest(format!("{:x}", hasher.finalize())))
}

/// Compute the digest of a file, streaming its content
pub fn hash_file(path: &Path) -> io::Result<Sha256Digest> {
    let mut file = File::open(path)?;
    hash_reader(&mut file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";

    #[test]
    fn test_sha256_hash() {
        let hash = hash_bytes(b"Hello, World!");
        assert_eq!(hash.as_str(), HELLO_WORLD);
        assert_eq!(hash.as_str().len(), HEX_LEN);
    }

    #[test]
    fn test_hash_reader_matches_bytes() {
        let data = vec![7u8; READ_BUFFER_SIZE * 3 + 17];
        let mut cursor = std::io::Cursor::new(&data);
        let streamed = hash_reader(&mut cursor).unwrap();
        assert_eq!(streamed, hash_bytes(&data));
    }

    #[test]
    fn test_digest_validation() {
        assert!(Sha256Digest::parse(HELLO_WORLD).is_ok());

        assert!(matches!(
            Sha256Digest::parse("abc123"),
            Err(HashError::InvalidLength { expected: 64, got: 6 })
        ));

        let bad_hex = format!("gggg{}", &HELLO_WORLD[4..]);
        assert!(matches!(
            Sha256Digest::parse(&bad_hex),
            Err(HashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_digest_normalizes_case_and_prefix() {
        let upper = HELLO_WORLD.to_ascii_uppercase();
        let parsed = Sha256Digest::parse(&upper).unwrap();
        assert_eq!(parsed.as_str(), HELLO_WORLD);

        let prefixed = Sha256Digest::parse(&format!("SHA256:{}", HELLO_WORLD)).unwrap();
        assert_eq!(prefixed, parsed);
        assert_eq!(prefixed.to_prefixed_string(), format!("sha256:{}", HELLO_WORLD));

        assert!(matches!(
            Sha256Digest::parse(&format!("md5:{}", HELLO_WORLD)),
            Err(HashError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"Hello, World!").unwrap();
        assert_eq!(hash_file(&path).unwrap().as_str(), HELLO_WORLD);
    }
}
