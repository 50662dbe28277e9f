// src/filesystem/mod.rs

//! Filesystem helpers shared by the pipeline stages
//!
//! Generated artifacts are written replace-or-nothing: content goes to a
//! temporary file in the destination directory and is renamed over the
//! target only once complete. A failed run never leaves a half-written
//! description behind.

pub mod path;

use crate::error::{Error, Result, Stage};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace `dest` with `content`
pub fn write_atomic(stage: Stage, dest: &Path, content: &[u8]) -> Result<()> {
    let parent = dest.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|e| Error::io(stage, parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| Error::io(stage, parent, e))?;
    temp.write_all(content)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| Error::io(stage, dest, e))?;
    temp.persist(dest).map_err(|e| Error::io(stage, dest, e.error))?;
    Ok(())
}

/// Remove a file, symlink or directory tree without following symlinks
///
/// A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Move a fully built directory into place, replacing any previous one
pub fn replace_dir(staging: &Path, target: &Path) -> io::Result<()> {
    remove_path(target)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(staging, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("SPECS/pkg.spec");

        write_atomic(Stage::Describe, &dest, b"first").unwrap();
        write_atomic(Stage::Describe, &dest, b"second").unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"second");
        let leftovers: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_remove_path_handles_all_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir_all(sub.join("deep")).unwrap();
        fs::write(sub.join("deep/file"), b"x").unwrap();
        let outside = dir.path().join("keep");
        fs::write(&outside, b"keep").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        remove_path(&sub).unwrap();
        remove_path(&link).unwrap();
        remove_path(&dir.path().join("missing")).unwrap();

        assert!(!sub.exists());
        assert!(fs::symlink_metadata(&link).is_err());
        assert!(outside.exists());
    }

    #[test]
    fn test_replace_dir() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let target = dir.path().join("target");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("new"), b"new").unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old"), b"old").unwrap();

        replace_dir(&staging, &target).unwrap();

        assert!(target.join("new").exists());
        assert!(!target.join("old").exists());
        assert!(!staging.exists());
    }
}
