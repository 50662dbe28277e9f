// src/tree.rs

//! Typed handles for the unpacked archive
//!
//! An [`ExtractedTree`] is only produced by the extractor and a
//! [`PrunedTree`] only by the pruner, so the stage order
//! extract, prune, describe is carried by the types.

use crate::error::{Error, Result, Stage};
use crate::filesystem::path::relative_slash_path;
use serde::{Deserialize, Serialize};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Unpacked archive contents, before pruning
#[derive(Debug)]
pub struct ExtractedTree {
    root: PathBuf,
}

impl ExtractedTree {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Tree with every foreign-platform subtree removed
#[derive(Debug)]
pub struct PrunedTree {
    root: PathBuf,
}

impl PrunedTree {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the tree as it is on disk now
    pub fn entries(&self) -> Result<Vec<TreeEntry>> {
        scan(&self.root, Stage::Describe)
    }
}

/// Entry types found in a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Regular,
    Symlink,
    Directory,
}

/// One path below a tree root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// `/`-separated path relative to the root
    pub relative: String,
    pub kind: EntryKind,
    /// Permission bits (without the file type)
    pub mode: u32,
    /// Size in bytes (0 for directories, target length for symlinks)
    pub size: u64,
}

/// Walk `root` without following symlinks, sorted by relative path
///
/// The root itself is not included. Any unreadable entry is an error
/// attributed to `stage`: a silently skipped path would make the manifest
/// disagree with the tree.
pub fn scan(root: &Path, stage: Stage) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            Error::io(stage, path, source)
        })?;
        let metadata = entry
            .path()
            .symlink_metadata()
            .map_err(|e| Error::io(stage, entry.path(), e))?;

        let kind = if metadata.file_type().is_symlink() {
            EntryKind::Symlink
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Regular
        };

        let relative = relative_slash_path(root, entry.path()).ok_or_else(|| {
            Error::io(
                stage,
                entry.path(),
                std::io::Error::other("path outside the tree root"),
            )
        })?;

        entries.push(TreeEntry {
            relative,
            kind,
            mode: metadata.permissions().mode() & 0o7777,
            size: if kind == EntryKind::Directory {
                0
            } else {
                metadata.len()
            },
        });
    }

    entries.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_sorted_without_following_links() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("plugins/b")).unwrap();
        fs::write(root.join("plugins/b/lib.so"), b"elf").unwrap();
        fs::write(root.join("eclipse"), b"#!/bin/sh").unwrap();
        fs::set_permissions(root.join("eclipse"), fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("plugins/b", root.join("link")).unwrap();

        let entries = scan(root, Stage::Describe).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.relative.as_str()).collect();
        assert_eq!(
            names,
            vec!["eclipse", "link", "plugins", "plugins/b", "plugins/b/lib.so"]
        );

        assert_eq!(entries[0].kind, EntryKind::Regular);
        assert_eq!(entries[0].mode, 0o755);
        assert_eq!(entries[1].kind, EntryKind::Symlink);
        assert_eq!(entries[2].kind, EntryKind::Directory);
        assert_eq!(entries[2].size, 0);
    }
}
