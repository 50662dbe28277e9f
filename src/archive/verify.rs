// src/archive/verify.rs

//! Integrity gate between fetching and extraction
//!
//! [`VerifiedArchive`] can only be built here, and the extractor only accepts
//! a `VerifiedArchive`. There is no way to unpack bytes whose digest was not
//! checked.

use super::{ArchiveReference, LocalArchive};
use crate::error::{Error, Result, Stage};
use crate::filesystem::remove_path;
use crate::hash::{Sha256Digest, hash_file};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An archive whose SHA-256 digest matched the expected value
#[derive(Debug)]
pub struct VerifiedArchive {
    path: PathBuf,
    digest: Sha256Digest,
    reference: ArchiveReference,
}

impl VerifiedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    pub fn reference(&self) -> &ArchiveReference {
        &self.reference
    }
}

/// Check a local archive against its reference digest
///
/// A freshly downloaded archive that fails the check is deleted so that no
/// unverified file stays in the cache; a pre-existing file is left alone.
pub fn verify(archive: LocalArchive) -> Result<VerifiedArchive> {
    let expected = archive.reference().digest().clone();

    match verify_file(archive.path(), &expected) {
        Ok(digest) => {
            debug!("Verified {} ({})", archive.path().display(), digest);
            let LocalArchive {
                path, reference, ..
            } = archive;
            Ok(VerifiedArchive {
                path,
                digest,
                reference,
            })
        }
        Err(e) => {
            if archive.is_fresh()
                && let Err(remove_err) = remove_path(archive.path())
            {
                warn!(
                    "Failed to remove unverified download {}: {}",
                    archive.path().display(),
                    remove_err
                );
            }
            Err(e)
        }
    }
}

/// Compute the digest of `path` and compare it with `expected`
///
/// Returns the computed digest on success.
pub fn verify_file(path: &Path, expected: &Sha256Digest) -> Result<Sha256Digest> {
    let actual = hash_file(path).map_err(|e| Error::io(Stage::Verify, path, e))?;

    if &actual != expected {
        return Err(Error::Integrity {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    Ok(actual)
}
