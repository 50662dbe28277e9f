// src/filesystem/path.rs

//! Path sanitization utilities for security
//!
//! Archive entries come from an untrusted source. Every entry path goes
//! through [`sanitize_path`] before it is joined to the extraction root, so a
//! crafted tarball cannot write outside the tree.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Sanitize a path from an untrusted source
///
/// This function:
/// 1. Rejects paths containing `..` (parent directory) components
/// 2. Skips `.` (current directory) components
/// 3. Strips leading slashes to make the path relative
/// 4. Returns an error for empty paths
///
/// # Examples
///
/// ```
/// use repack::filesystem::path::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("eclipse/plugins").unwrap(), PathBuf::from("eclipse/plugins"));
/// assert_eq!(sanitize_path("/eclipse/eclipse").unwrap(), PathBuf::from("eclipse/eclipse"));
/// assert!(sanitize_path("../etc/passwd").is_err());
/// ```
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path_str.to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(path_str.to_string()));
    }

    Ok(normalized)
}

/// Drop the first `count` components of an already sanitized path
///
/// Returns `None` when nothing is left, which is the case for the archive's
/// top-level directory entries themselves.
pub fn strip_components(path: &Path, count: usize) -> Option<PathBuf> {
    let stripped: PathBuf = path.components().skip(count).collect();
    if stripped.as_os_str().is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Sanitize a filename (single path component) from an untrusted source
///
/// Stricter than `sanitize_path`: any path separator is rejected.
///
/// ```
/// use repack::filesystem::path::sanitize_filename;
///
/// assert_eq!(sanitize_filename("eclipse.tar.gz").unwrap(), "eclipse.tar.gz");
/// assert!(sanitize_filename("../eclipse.tar.gz").is_err());
/// ```
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains('/') || name.contains('\\') || name == ".." || name == "." {
        return Err(Error::PathTraversal(name.to_string()));
    }

    if name.is_empty() {
        return Err(Error::InvalidPath(name.to_string()));
    }

    Ok(name.to_string())
}

/// Render a path relative to `root` with `/` separators
///
/// Used as the matching subject for prune globs and as the manifest key, so
/// output does not depend on the host's separator.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Lexically resolve a symlink target against the link's location
///
/// Returns the absolute path the link points to without touching the
/// filesystem, so it works for targets that no longer exist.
pub fn resolve_link_target(link: &Path, target: &Path) -> PathBuf {
    let base = if target.is_absolute() {
        PathBuf::new()
    } else {
        link.parent().map(Path::to_path_buf).unwrap_or_default()
    };

    let mut resolved = PathBuf::new();
    for component in base.join(target).components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}
