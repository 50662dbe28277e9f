// src/layout.rs

//! rpmbuild top directory
//!
//! ```text
//! <topdir>/
//!   BUILD/ RPMS/<arch>/ SRPMS/
//!   SOURCES/<archive>  SOURCES/<name>-<version>/  SOURCES/<name>-icons/
//!   SOURCES/<name>.desktop
//!   SPECS/<name>.spec  SPECS/<name>.manifest
//! ```

use crate::config::TargetArch;
use crate::error::{Error, Result, Stage};
use std::fs;
use std::path::{Path, PathBuf};

/// Sub-directories rpmbuild expects under its top directory
pub const SUBDIRS: [&str; 5] = ["BUILD", "RPMS", "SOURCES", "SPECS", "SRPMS"];

/// Paths of every artifact inside an rpmbuild top directory
#[derive(Debug, Clone)]
pub struct BuildLayout {
    topdir: PathBuf,
}

impl BuildLayout {
    pub fn new(topdir: impl Into<PathBuf>) -> Self {
        Self {
            topdir: topdir.into(),
        }
    }

    /// Create the top directory and its sub-directories
    pub fn create(&self) -> Result<()> {
        for dir in SUBDIRS {
            let path = self.topdir.join(dir);
            fs::create_dir_all(&path).map_err(|e| Error::io(Stage::Config, &path, e))?;
        }
        Ok(())
    }

    pub fn topdir(&self) -> &Path {
        &self.topdir
    }

    /// Download cache for archives
    pub fn sources(&self) -> PathBuf {
        self.topdir.join("SOURCES")
    }

    pub fn specs(&self) -> PathBuf {
        self.topdir.join("SPECS")
    }

    /// Where rpmbuild puts binary packages for `arch`
    pub fn rpms(&self, arch: TargetArch) -> PathBuf {
        self.topdir.join("RPMS").join(arch.rpm_arch())
    }

    /// Directory name of the pruned tree inside `SOURCES`
    pub fn tree_dir_name(name: &str, upstream_version: &str) -> String {
        format!("{}-{}", name, upstream_version)
    }

    pub fn tree_dir(&self, name: &str, upstream_version: &str) -> PathBuf {
        self.sources()
            .join(Self::tree_dir_name(name, upstream_version))
    }

    /// Directory name of the icon tree inside `SOURCES`
    pub fn icon_dir_name(name: &str) -> String {
        format!("{}-icons", name)
    }

    pub fn icon_dir(&self, name: &str) -> PathBuf {
        self.sources().join(Self::icon_dir_name(name))
    }

    pub fn desktop_path(&self, name: &str) -> PathBuf {
        self.sources().join(format!("{}.desktop", name))
    }

    pub fn spec_path(&self, name: &str) -> PathBuf {
        self.specs().join(format!("{}.spec", name))
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.specs().join(format!("{}.manifest", name))
    }

    /// Command that builds the binary package; printed, never run
    pub fn rpmbuild_command(&self, name: &str) -> String {
        let topdir = std::path::absolute(&self.topdir).unwrap_or_else(|_| self.topdir.clone());
        format!(
            "rpmbuild --define \"_topdir {}\" -bb {}",
            topdir.display(),
            topdir.join("SPECS").join(format!("{}.spec", name)).display()
        )
    }
}
