// src/descriptor/manifest.rs

//! Installed-file manifest
//!
//! Every non-directory entry of the pruned tree appears exactly once, keyed
//! by its path relative to the tree root. Directories are listed separately
//! so the package owns them.

use crate::error::{Error, Result};
use crate::tree::{EntryKind, PrunedTree, TreeEntry};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// One installed path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Path relative to the tree root
    pub source: String,
    /// Absolute install-time path
    pub install: String,
    /// Permission bits
    pub mode: u32,
    pub kind: EntryKind,
}

/// Files and owned directories of a package, sorted by source path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    files: Vec<ManifestEntry>,
    directories: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build the manifest of `tree` installed under `prefix`
    pub fn from_tree(tree: &PrunedTree, prefix: &Path) -> Result<Self> {
        let prefix = prefix.to_string_lossy();
        let prefix = prefix.trim_end_matches('/');
        let mut manifest = Self::default();

        for TreeEntry {
            relative,
            kind,
            mode,
            ..
        } in tree.entries()?
        {
            let entry = ManifestEntry {
                install: format!("{}/{}", prefix, relative),
                source: relative,
                mode,
                kind,
            };
            match kind {
                EntryKind::Directory => manifest.directories.push(entry),
                EntryKind::Regular | EntryKind::Symlink => manifest.files.push(entry),
            }
        }

        Ok(manifest)
    }

    /// Regular files and symlinks
    pub fn files(&self) -> &[ManifestEntry] {
        &self.files
    }

    pub fn directories(&self) -> &[ManifestEntry] {
        &self.directories
    }

    pub fn find(&self, source: &str) -> Option<&ManifestEntry> {
        self.files
            .binary_search_by(|e| e.source.as_str().cmp(source))
            .ok()
            .map(|i| &self.files[i])
    }

    /// Check that the manifest and the tree on disk list the same files
    pub fn check_against(&self, tree: &PrunedTree) -> Result<()> {
        let on_disk: BTreeSet<String> = tree
            .entries()?
            .into_iter()
            .filter(|e| e.kind != EntryKind::Directory)
            .map(|e| e.relative)
            .collect();
        let listed: BTreeSet<&str> = self.files.iter().map(|e| e.source.as_str()).collect();

        if listed.len() != self.files.len() {
            return Err(Error::Descriptor {
                path: tree.root().to_path_buf(),
                reason: "manifest lists a file more than once".to_string(),
            });
        }
        if let Some(missing) = listed.iter().find(|s| !on_disk.contains(**s)) {
            return Err(Error::Descriptor {
                path: tree.root().join(missing),
                reason: "manifest entry has no file in the tree".to_string(),
            });
        }
        if let Some(unlisted) = on_disk.iter().find(|s| !listed.contains(s.as_str())) {
            return Err(Error::Descriptor {
                path: tree.root().join(unlisted),
                reason: "file in the tree is missing from the manifest".to_string(),
            });
        }
        Ok(())
    }

    /// Tab-separated listing: mode, kind, install path, source path
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in self.directories.iter().chain(&self.files) {
            let kind = match entry.kind {
                EntryKind::Regular => "file",
                EntryKind::Symlink => "link",
                EntryKind::Directory => "dir",
            };
            out.push_str(&format!(
                "{:04o}\t{}\t{}\t{}\n",
                entry.mode, kind, entry.install, entry.source
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn tree(dir: &Path) -> PrunedTree {
        let root = dir.join("tree");
        fs::create_dir_all(root.join("lib/linux/x86_64")).unwrap();
        fs::write(root.join("lib/linux/x86_64/libswt.so"), b"elf").unwrap();
        fs::write(root.join("eclipse"), b"#!/bin/sh").unwrap();
        fs::set_permissions(root.join("eclipse"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(
            root.join("lib/linux/x86_64/libswt.so"),
            fs::Permissions::from_mode(0o644),
        )
        .unwrap();
        std::os::unix::fs::symlink("eclipse", root.join("launcher")).unwrap();
        PrunedTree::new(root)
    }

    #[test]
    fn test_manifest_lists_every_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let manifest = Manifest::from_tree(&tree, Path::new("/opt/eclipse-cpp/")).unwrap();

        let sources: Vec<_> = manifest.files().iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["eclipse", "launcher", "lib/linux/x86_64/libswt.so"]);
        let dirs: Vec<_> = manifest
            .directories()
            .iter()
            .map(|e| e.install.as_str())
            .collect();
        assert_eq!(
            dirs,
            vec!["/opt/eclipse-cpp/lib", "/opt/eclipse-cpp/lib/linux", "/opt/eclipse-cpp/lib/linux/x86_64"]
        );

        let launcher = manifest.find("eclipse").unwrap();
        assert_eq!(launcher.install, "/opt/eclipse-cpp/eclipse");
        assert_eq!(launcher.mode, 0o755);
        assert_eq!(manifest.find("launcher").unwrap().kind, EntryKind::Symlink);
        assert!(manifest.find("missing").is_none());

        manifest.check_against(&tree).unwrap();
    }

    #[test]
    fn test_bijection_detects_drift() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let manifest = Manifest::from_tree(&tree, Path::new("/opt/app")).unwrap();

        fs::write(tree.root().join("extra"), b"x").unwrap();
        let err = manifest.check_against(&tree).unwrap_err();
        assert!(err.to_string().contains("missing from the manifest"));

        fs::remove_file(tree.root().join("extra")).unwrap();
        fs::remove_file(tree.root().join("eclipse")).unwrap();
        let err = manifest.check_against(&tree).unwrap_err();
        assert!(err.to_string().contains("no file in the tree"));
    }

    #[test]
    fn test_render_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let rendered = Manifest::from_tree(&tree, Path::new("/opt/app"))
            .unwrap()
            .render();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].ends_with("\tdir\t/opt/app/lib\tlib"));
        assert_eq!(lines[3], "0755\tfile\t/opt/app/eclipse\teclipse");
    }
}
