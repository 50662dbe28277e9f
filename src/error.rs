// src/error.rs

//! Error types for the repackaging pipeline
//!
//! Every fatal error carries the stage it came from and renders as a single
//! line: `<stage>: <subject>: <reason>`. Scripts driving `repack` can split on
//! the first two colons.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Config,
    Fetch,
    Verify,
    Extract,
    Prune,
    Icon,
    Describe,
}

impl Stage {
    /// Short stage name used in error lines and logs
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Extract => "extract",
            Self::Prune => "prune",
            Self::Icon => "icon",
            Self::Describe => "describe",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Network or transport failure, after retries
    #[error("fetch: {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Archive digest does not match the expected value
    #[error("verify: {}: sha256 mismatch (expected {expected}, got {actual})", path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Corrupt or unsupported archive
    #[error("extract: {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    /// Malformed prune rule configuration
    #[error("prune: rule '{tag}': {reason}")]
    PruneRule { tag: String, reason: String },

    /// Manifest and tree disagree, or the description cannot be produced
    #[error("describe: {}: {reason}", path.display())]
    Descriptor { path: PathBuf, reason: String },

    #[error("config: {0}")]
    Config(String),

    #[error("extract: {0}: path escapes the tree root")]
    PathTraversal(String),

    #[error("extract: {0}: invalid path")]
    InvalidPath(String),

    #[error("{stage}: {}: {source}", path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with the stage and path it concerns
    pub fn io(stage: Stage, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            stage,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// The stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            Self::Fetch { .. } => Stage::Fetch,
            Self::Integrity { .. } => Stage::Verify,
            Self::Extraction { .. } | Self::PathTraversal(_) | Self::InvalidPath(_) => {
                Stage::Extract
            }
            Self::PruneRule { .. } => Stage::Prune,
            Self::Descriptor { .. } => Stage::Describe,
            Self::Config(_) => Stage::Config,
            Self::Io { stage, .. } => *stage,
        }
    }

    /// Whether the pipeline may retry the operation that produced this error
    ///
    /// Only transport failures are retryable. A digest mismatch may indicate
    /// tampering and is never retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

impl From<crate::hash::HashError> for Error {
    fn from(err: crate::hash::HashError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
