// src/lib.rs

//! repack: turn an upstream binary tarball into an rpmbuild-ready package
//!
//! # Architecture
//!
//! - Verified acquisition: archives are fetched with bounded retries and
//!   must match a SHA-256 digest before anything reads their contents
//! - Typed stages: `LocalArchive` -> `VerifiedArchive` -> `ExtractedTree`
//!   -> `PrunedTree`, each only obtainable from the stage before it
//! - Data-driven pruning: a platform rule table removes foreign
//!   architectures and operating systems from the tree
//! - Deterministic output: manifest, spec file and desktop entry are
//!   byte-identical for identical inputs and written atomically

pub mod archive;
pub mod compression;
pub mod config;
pub mod descriptor;
mod error;
pub mod filesystem;
pub mod hash;
pub mod icon;
pub mod layout;
pub mod pipeline;
pub mod prune;
pub mod tree;

pub use archive::{ArchiveReference, LocalArchive, RemoteClient, Transport, TransportError, VerifiedArchive};
pub use config::{Config, DependencyGeneration, TargetArch};
pub use descriptor::{Manifest, PackageDescriptor};
pub use error::{Error, Result, Stage};
pub use hash::{HashError, Sha256Digest};
pub use icon::{IconOutcome, IconWarning};
pub use layout::BuildLayout;
pub use pipeline::{Pipeline, PipelineReport};
pub use prune::{PruneReport, PruneTable, Pruner, RuleKind, RuleSpec};
pub use tree::{ExtractedTree, PrunedTree};
