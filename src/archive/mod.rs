// src/archive/mod.rs

//! Acquisition of the upstream archive
//!
//! The stages here turn a user-supplied location into a tree on disk:
//!
//! - [`fetch`]: resolve an [`ArchiveReference`] to a [`LocalArchive`],
//!   reusing a cached copy only when it still verifies
//! - [`verify`]: the integrity gate producing a [`verify::VerifiedArchive`]
//! - [`extract`]: unpack a verified archive into an
//!   [`ExtractedTree`](crate::tree::ExtractedTree)
//! - [`discover`]: find the newest release on an upstream index page

pub mod client;
pub mod discover;
pub mod extract;
pub mod fetch;
pub mod verify;

use crate::config::KnownArchive;
use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_filename;
use crate::hash::Sha256Digest;
use std::path::{Path, PathBuf};
use url::Url;

pub use client::{RemoteClient, Transport, TransportError};
pub use discover::{Release, discover_latest};
pub use extract::{ExtractStats, extract};
pub use fetch::Fetcher;
pub use verify::{VerifiedArchive, verify};

/// Location of an upstream archive plus the digest it must have
///
/// Immutable once built: the digest was validated for length and hex
/// content, and the URI has a supported scheme and a usable file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReference {
    uri: Url,
    file_name: String,
    digest: Sha256Digest,
}

impl ArchiveReference {
    /// Build a reference from a URI and an already parsed digest
    pub fn new(uri: &str, digest: Sha256Digest) -> Result<Self> {
        let (uri, file_name) = parse_location(uri)?;
        Ok(Self {
            uri,
            file_name,
            digest,
        })
    }

    /// Build a reference, taking the digest from the command line or
    /// configuration first and from the known-archive table otherwise
    ///
    /// A missing digest is an error: there is no way to fetch an archive
    /// without something to verify it against.
    pub fn resolve(uri: &str, explicit: Option<&str>, known: &[KnownArchive]) -> Result<Self> {
        let (uri, file_name) = parse_location(uri)?;
        let listed = known
            .iter()
            .find(|archive| archive.file == file_name)
            .map(|archive| Sha256Digest::parse(&archive.sha256))
            .transpose()?;

        let digest = match (explicit.map(Sha256Digest::parse).transpose()?, listed) {
            (Some(given), Some(table)) if given != table => {
                return Err(Error::Config(format!(
                    "digest for {} conflicts with the known-archive table ({} vs {})",
                    file_name, given, table
                )));
            }
            (Some(given), _) => given,
            (None, Some(table)) => table,
            (None, None) => {
                return Err(Error::Config(format!(
                    "no expected sha256 for {}; pass --sha256 or add it to [[archives]]",
                    file_name
                )));
            }
        };

        Ok(Self {
            uri,
            file_name,
            digest,
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// File name the archive is stored under locally
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }
}

/// Parse an archive URI and derive the local file name from its last segment
fn parse_location(uri: &str) -> Result<(Url, String)> {
    let parsed =
        Url::parse(uri).map_err(|e| Error::Config(format!("invalid archive URI '{}': {}", uri, e)))?;

    if !matches!(parsed.scheme(), "http" | "https" | "file") {
        return Err(Error::Config(format!(
            "unsupported URI scheme '{}' in {}",
            parsed.scheme(),
            uri
        )));
    }

    let file_name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Config(format!("archive URI has no file name: {}", uri)))?;
    let file_name = sanitize_filename(file_name)
        .map_err(|_| Error::Config(format!("archive URI has an unusable file name: {}", uri)))?;

    Ok((parsed, file_name))
}

/// An archive file on local disk, not yet verified
#[derive(Debug)]
pub struct LocalArchive {
    path: PathBuf,
    reference: ArchiveReference,
    fresh: bool,
}

impl LocalArchive {
    pub(crate) fn new(path: PathBuf, reference: ArchiveReference, fresh: bool) -> Self {
        Self {
            path,
            reference,
            fresh,
        }
    }

    /// Open an existing file as the local copy of `reference`
    pub fn open(path: impl Into<PathBuf>, reference: ArchiveReference) -> Self {
        Self::new(path.into(), reference, false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reference(&self) -> &ArchiveReference {
        &self.reference
    }

    /// Whether this run downloaded the file (as opposed to reusing a cache)
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }
}
