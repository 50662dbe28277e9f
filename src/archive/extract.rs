// src/archive/extract.rs

//! Unpacking a verified archive into a tree
//!
//! Entries are unpacked into a staging directory next to the destination.
//! Only after every entry succeeded is the staging directory renamed over
//! the destination, so a failed or interrupted extraction never leaves a
//! half-populated tree where the next stage would look for one.

use super::verify::VerifiedArchive;
use crate::compression::{CompressionFormat, SNIFF_LEN, create_decoder};
use crate::error::{Error, Result, Stage};
use crate::filesystem::path::{sanitize_path, strip_components};
use crate::filesystem::{remove_path, replace_dir};
use crate::tree::ExtractedTree;
use serde::Serialize;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use tar::EntryType;
use tracing::{debug, info, warn};

/// Counters for one extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub hard_links: u64,
    /// Device nodes and FIFOs, which are never created
    pub skipped: u64,
    pub bytes: u64,
}

/// Unpack `archive` into `dest`, dropping `strip` leading path components
///
/// Any previous tree at `dest` is replaced only once extraction succeeded.
pub fn extract(
    archive: &VerifiedArchive,
    dest: &Path,
    strip: usize,
) -> Result<(ExtractedTree, ExtractStats)> {
    let staging = staging_dir(dest);
    remove_path(&staging).map_err(|e| Error::io(Stage::Extract, &staging, e))?;
    fs::create_dir_all(&staging).map_err(|e| Error::io(Stage::Extract, &staging, e))?;

    let stats = match unpack_into(archive.path(), &staging, strip) {
        Ok(stats) => stats,
        Err(e) => {
            if let Err(cleanup) = remove_path(&staging) {
                warn!("Failed to remove {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }
    };

    replace_dir(&staging, dest).map_err(|e| Error::io(Stage::Extract, dest, e))?;

    info!(
        "Extracted {} files, {} directories, {} symlinks into {}",
        stats.files,
        stats.directories,
        stats.symlinks,
        dest.display()
    );
    Ok((ExtractedTree::new(dest.to_path_buf()), stats))
}

fn staging_dir(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tree".to_string());
    dest.with_file_name(format!(".{}.partial", name))
}

fn corrupt(archive: &Path, reason: impl Display) -> Error {
    Error::Extraction {
        path: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn unpack_into(archive_path: &Path, root: &Path, strip: usize) -> Result<ExtractStats> {
    let file = File::open(archive_path).map_err(|e| Error::io(Stage::Extract, archive_path, e))?;
    let mut reader = BufReader::new(file);

    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut reader)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .map_err(|e| Error::io(Stage::Extract, archive_path, e))?;

    let format =
        CompressionFormat::from_magic_bytes(&head).map_err(|e| corrupt(archive_path, e))?;
    debug!("Archive {} is {}", archive_path.display(), format);
    if let Some(named) = CompressionFormat::from_extension(&archive_path.to_string_lossy())
        && named != format
    {
        warn!(
            "{} is named like a {} archive but contains {}",
            archive_path.display(),
            named,
            format
        );
    }

    let decoder =
        create_decoder(Cursor::new(head).chain(reader), format).map_err(|e| corrupt(archive_path, e))?;

    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let mut stats = ExtractStats::default();

    for entry in tar.entries().map_err(|e| corrupt(archive_path, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive_path, e))?;
        let entry_type = entry.header().entry_type();

        if matches!(
            entry_type,
            EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName
        ) {
            continue;
        }

        let raw = entry
            .path()
            .map_err(|e| corrupt(archive_path, e))?
            .into_owned();

        // "./" and similar entries name the root itself
        let sanitized = match sanitize_path(&raw) {
            Ok(path) => path,
            Err(Error::InvalidPath(_)) => continue,
            Err(e) => return Err(e),
        };
        let Some(relative) = strip_components(&sanitized, strip) else {
            continue;
        };

        check_no_symlink_ancestor(root, &relative)?;
        let target = root.join(&relative);

        match entry_type {
            EntryType::Directory => {
                if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
                    remove_path(&target).map_err(|e| Error::io(Stage::Extract, &target, e))?;
                }
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| Error::io(Stage::Extract, parent, e))?;
                }
                entry
                    .unpack(&target)
                    .map_err(|e| corrupt(archive_path, format!("{}: {}", relative.display(), e)))?;
                stats.directories += 1;
            }
            EntryType::Char | EntryType::Block | EntryType::Fifo => {
                warn!("Skipping special file {}", relative.display());
                stats.skipped += 1;
            }
            EntryType::Link => {
                let link_name = entry
                    .link_name()
                    .map_err(|e| corrupt(archive_path, e))?
                    .ok_or_else(|| {
                        corrupt(archive_path, format!("{}: hard link without target", relative.display()))
                    })?
                    .into_owned();
                let source = sanitize_path(&link_name)
                    .ok()
                    .and_then(|p| strip_components(&p, strip))
                    .ok_or_else(|| Error::PathTraversal(link_name.display().to_string()))?;
                check_link_source(root, &source)?;

                prepare_target(&target)?;
                create_hard_link(&root.join(&source), &target)
                    .map_err(|e| corrupt(archive_path, format!("{}: {}", relative.display(), e)))?;
                stats.hard_links += 1;
            }
            EntryType::Symlink => {
                prepare_target(&target)?;
                entry
                    .unpack(&target)
                    .map_err(|e| corrupt(archive_path, format!("{}: {}", relative.display(), e)))?;
                stats.symlinks += 1;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                prepare_target(&target)?;
                entry
                    .unpack(&target)
                    .map_err(|e| corrupt(archive_path, format!("{}: {}", relative.display(), e)))?;
                stats.files += 1;
                stats.bytes += entry.size();
            }
            other => {
                debug!("Ignoring {:?} entry {}", other, relative.display());
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}

/// Refuse entries that would be written through a symlink created by an
/// earlier entry, which could otherwise point anywhere on the host
fn check_no_symlink_ancestor(root: &Path, relative: &Path) -> Result<()> {
    let mut current = root.to_path_buf();
    let mut components = relative.components().peekable();

    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return Err(Error::PathTraversal(relative.display().to_string()));
        }
    }
    Ok(())
}

/// A hard link source must be a regular file already unpacked inside the
/// tree, reached without passing through a symlink
fn check_link_source(root: &Path, source: &Path) -> Result<()> {
    check_no_symlink_ancestor(root, source)?;
    match fs::symlink_metadata(root.join(source)) {
        Ok(meta) if meta.file_type().is_symlink() => {
            Err(Error::PathTraversal(source.display().to_string()))
        }
        Ok(meta) if !meta.is_file() => Err(Error::Extraction {
            path: root.join(source),
            reason: "hard link source is not a regular file".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Create parent directories and clear whatever is at `target`
fn prepare_target(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(Stage::Extract, parent, e))?;
    }
    remove_path(target).map_err(|e| Error::io(Stage::Extract, target, e))
}

/// Hard link `target` to `source`, copying when linking is not possible
fn create_hard_link(source: &Path, target: &Path) -> std::io::Result<()> {
    match fs::hard_link(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(e),
        Err(e) => {
            debug!("Hard link failed ({}), copying {}", e, source.display());
            fs::copy(source, target).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveReference, LocalArchive, verify};
    use crate::hash::hash_bytes;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::os::unix::fs::PermissionsExt;

    fn header(entry_type: EntryType, size: u64, mode: u32) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_size(size);
        header.set_mode(mode);
        header
    }

    fn add_file(builder: &mut tar::Builder<GzEncoder<Vec<u8>>>, path: &str, data: &[u8], mode: u32) {
        let mut h = header(EntryType::Regular, data.len() as u64, mode);
        builder.append_data(&mut h, path, data).unwrap();
    }

    fn add_symlink(builder: &mut tar::Builder<GzEncoder<Vec<u8>>>, path: &str, target: &str) {
        let mut h = header(EntryType::Symlink, 0, 0o777);
        builder.append_link(&mut h, path, target).unwrap();
    }

    fn new_builder() -> tar::Builder<GzEncoder<Vec<u8>>> {
        tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()))
    }

    fn finish(builder: tar::Builder<GzEncoder<Vec<u8>>>) -> Vec<u8> {
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn verified(dir: &Path, bytes: &[u8]) -> VerifiedArchive {
        let path = dir.join("app.tar.gz");
        fs::write(&path, bytes).unwrap();
        let reference =
            ArchiveReference::new("https://example.org/app.tar.gz", hash_bytes(bytes)).unwrap();
        verify(LocalArchive::open(path, reference)).unwrap()
    }

    #[test]
    fn test_extract_strips_and_preserves() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = new_builder();
        add_file(&mut builder, "eclipse/eclipse", b"#!/bin/sh\n", 0o755);
        add_file(&mut builder, "eclipse/plugins/a.jar", b"jar", 0o644);
        add_symlink(&mut builder, "eclipse/launcher", "eclipse");
        let archive = verified(dir.path(), &finish(builder));

        let dest = dir.path().join("tree");
        let (tree, stats) = extract(&archive, &dest, 1).unwrap();

        assert_eq!(tree.root(), dest);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.symlinks, 1);
        let mode = fs::metadata(dest.join("eclipse")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(fs::read_link(dest.join("launcher")).unwrap(), PathBuf::from("eclipse"));
        assert_eq!(fs::read(dest.join("plugins/a.jar")).unwrap(), b"jar");
        assert!(!staging_dir(&dest).exists());
    }

    #[test]
    fn test_extract_replaces_previous_tree() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tree");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale"), b"old").unwrap();

        let mut builder = new_builder();
        add_file(&mut builder, "fresh", b"new", 0o644);
        let archive = verified(dir.path(), &finish(builder));

        extract(&archive, &dest, 0).unwrap();
        assert!(dest.join("fresh").exists());
        assert!(!dest.join("stale").exists());
    }

    #[test]
    fn test_extract_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = new_builder();
        let mut h = header(EntryType::Regular, 4, 0o644);
        let name = b"../evil";
        h.as_old_mut().name[..name.len()].copy_from_slice(name);
        h.set_cksum();
        builder.append(&h, &b"evil"[..]).unwrap();
        let archive = verified(dir.path(), &finish(builder));

        let dest = dir.path().join("out/tree");
        let err = extract(&archive, &dest, 0).unwrap_err();
        assert!(matches!(err, Error::PathTraversal(_)));
        assert!(!dir.path().join("out/evil").exists());
        assert!(!dest.exists());
        assert!(!staging_dir(&dest).exists());
    }

    #[test]
    fn test_extract_refuses_writes_through_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();

        let mut builder = new_builder();
        add_symlink(&mut builder, "escape", outside.to_str().unwrap());
        add_file(&mut builder, "escape/payload", b"x", 0o644);
        let archive = verified(dir.path(), &finish(builder));

        let err = extract(&archive, &dir.path().join("tree"), 0).unwrap_err();
        assert!(matches!(err, Error::PathTraversal(_)));
        assert!(!outside.join("payload").exists());
    }

    #[test]
    fn test_extract_refuses_hard_links_through_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let host = dir.path().join("host");
        fs::create_dir_all(&host).unwrap();
        fs::write(host.join("secret"), b"HOST SECRET").unwrap();

        let mut builder = new_builder();
        add_symlink(&mut builder, "app/esc", host.to_str().unwrap());
        let mut h = header(EntryType::Link, 0, 0o644);
        builder.append_link(&mut h, "app/stolen", "app/esc/secret").unwrap();
        let archive = verified(dir.path(), &finish(builder));

        let dest = dir.path().join("tree");
        let err = extract(&archive, &dest, 1).unwrap_err();
        assert!(matches!(err, Error::PathTraversal(_)), "got {err}");
        assert!(!dest.exists());
        assert!(!staging_dir(&dest).exists());
        assert_eq!(fs::read(host.join("secret")).unwrap(), b"HOST SECRET");
    }

    #[test]
    fn test_extract_refuses_hard_links_to_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let host = dir.path().join("host-file");
        fs::write(&host, b"HOST SECRET").unwrap();

        let mut builder = new_builder();
        add_symlink(&mut builder, "app/esc", host.to_str().unwrap());
        let mut h = header(EntryType::Link, 0, 0o644);
        builder.append_link(&mut h, "app/stolen", "app/esc").unwrap();
        let archive = verified(dir.path(), &finish(builder));

        let err = extract(&archive, &dir.path().join("tree"), 1).unwrap_err();
        assert!(matches!(err, Error::PathTraversal(_)), "got {err}");
    }

    #[test]
    fn test_extract_hard_links() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = new_builder();
        add_file(&mut builder, "app/lib.so", b"elf", 0o755);
        let mut h = header(EntryType::Link, 0, 0o755);
        builder.append_link(&mut h, "app/lib.so.1", "app/lib.so").unwrap();
        let archive = verified(dir.path(), &finish(builder));

        let dest = dir.path().join("tree");
        let (_, stats) = extract(&archive, &dest, 1).unwrap();
        assert_eq!(stats.hard_links, 1);
        assert_eq!(fs::read(dest.join("lib.so.1")).unwrap(), b"elf");
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let archive = verified(dir.path(), b"this is not an archive at all");

        let dest = dir.path().join("tree");
        let err = extract(&archive, &dest, 0).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(!dest.exists());
    }
}
