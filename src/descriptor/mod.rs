// src/descriptor/mod.rs

//! Package description generation
//!
//! A [`PackageDescriptor`] combines facts supplied by configuration (name,
//! version, architecture, dependency policy) with what is actually in the
//! pruned tree (the [`Manifest`]) and the installed icons. Rendering is
//! pure: identical inputs give byte-identical artifacts.

pub mod desktop;
pub mod manifest;
pub mod spec;

pub use desktop::DesktopEntry;
pub use manifest::{Manifest, ManifestEntry};

use crate::config::{ChangelogSection, Config, DependencyGeneration, DesktopSection, TargetArch};
use crate::error::{Error, Result, Stage};
use crate::filesystem::write_atomic;
use crate::icon::IconOutcome;
use crate::layout::BuildLayout;
use crate::tree::{EntryKind, PrunedTree};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Turn an upstream version into an rpm version (`2025-12` -> `2025.12`)
///
/// The upstream form also names the tree directory, so it must start with an
/// alphanumeric and may not contain path separators or whitespace.
pub fn normalize_version(upstream: &str) -> Result<String> {
    let version = upstream.replace('-', ".");
    if !version.starts_with(|c: char| c.is_ascii_alphanumeric())
        || version.contains("..")
        || !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+'))
    {
        return Err(Error::Config(format!(
            "version '{}' cannot be used as a package version",
            upstream
        )));
    }
    Ok(version)
}

/// Inputs that do not come from the tree
#[derive(Debug, Clone)]
pub struct PackageFacts {
    pub name: String,
    pub upstream_version: String,
    pub release: String,
    pub summary: String,
    pub license: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub arch: TargetArch,
    pub install_prefix: PathBuf,
    pub dependency_generation: DependencyGeneration,
    /// Executable relative to the tree root
    pub launcher: String,
    pub link_launcher: bool,
    /// Archive file name, listed as `Source0`
    pub archive_file: Option<String>,
    pub changelog: Option<ChangelogSection>,
}

impl PackageFacts {
    pub fn from_config(config: &Config, upstream_version: &str, archive_file: Option<&str>) -> Self {
        let pkg = &config.package;
        Self {
            name: pkg.name_stem.clone(),
            upstream_version: upstream_version.to_string(),
            release: pkg.release.clone(),
            summary: config.summary().to_string(),
            license: pkg.license.clone(),
            url: pkg.url.clone(),
            description: pkg.description.clone(),
            arch: pkg.target_architecture,
            install_prefix: config.install_prefix(),
            dependency_generation: pkg.dependency_generation,
            launcher: pkg.launcher.trim_matches('/').to_string(),
            link_launcher: pkg.link_launcher,
            archive_file: archive_file.map(str::to_string),
            changelog: pkg.changelog.clone(),
        }
    }
}

/// Everything needed to render the spec file and desktop entry
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub name: String,
    /// Normalized rpm version
    pub version: String,
    pub release: String,
    pub summary: String,
    pub license: String,
    pub url: Option<String>,
    pub description: String,
    pub arch: TargetArch,
    pub install_prefix: PathBuf,
    pub dependency_generation: DependencyGeneration,
    pub launcher: String,
    pub link_launcher: bool,
    pub archive_file: Option<String>,
    /// Directory name of the pruned tree inside `SOURCES`
    pub tree_dir: String,
    /// Directory name of the icon tree inside `SOURCES`
    pub icon_dir: String,
    /// Installed icons relative to `icon_dir`
    pub icons: Vec<String>,
    pub manifest: Manifest,
    pub desktop: DesktopEntry,
    pub changelog: Option<ChangelogEntry>,
}

/// The single `%changelog` entry of a generated spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub date: NaiveDate,
    pub packager: String,
    pub text: String,
}

/// Paths of the written artifacts
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorArtifacts {
    pub spec: PathBuf,
    pub manifest: PathBuf,
    pub desktop: PathBuf,
}

impl PackageDescriptor {
    /// Derive the descriptor of `tree`
    pub fn generate(
        tree: &PrunedTree,
        facts: PackageFacts,
        icons: &IconOutcome,
        desktop: &DesktopSection,
    ) -> Result<Self> {
        let version = normalize_version(&facts.upstream_version)?;
        let manifest = Manifest::from_tree(tree, &facts.install_prefix)?;

        if let Some(bad) = manifest
            .directories()
            .iter()
            .chain(manifest.files())
            // Tabs would split the manifest's tab-separated lines
            .find(|e| e.source.contains(['"', '\n', '\r', '\t']))
        {
            return Err(Error::Descriptor {
                path: tree.root().join(&bad.source),
                reason: "path cannot be expressed in a spec file".to_string(),
            });
        }

        let launcher = manifest.find(&facts.launcher).ok_or_else(|| Error::Descriptor {
            path: tree.root().join(&facts.launcher),
            reason: "launcher is not in the manifest".to_string(),
        })?;
        if launcher.kind == EntryKind::Regular && launcher.mode & 0o111 == 0 {
            return Err(Error::Descriptor {
                path: tree.root().join(&facts.launcher),
                reason: "launcher is not executable".to_string(),
            });
        }

        let tree_dir = tree
            .root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Descriptor {
                path: tree.root().to_path_buf(),
                reason: "tree root has no directory name".to_string(),
            })?;

        let (icon_name, installed_icons) = match icons {
            IconOutcome::Installed(set) => (facts.name.clone(), set.installed.clone()),
            IconOutcome::Missing(warning) => (warning.fallback.clone(), Vec::new()),
        };

        let prefix = facts.install_prefix.to_string_lossy();
        let exec = if facts.link_launcher {
            format!("/usr/bin/{}", facts.name)
        } else {
            format!("{}/{}", prefix.trim_end_matches('/'), facts.launcher)
        };
        let desktop = DesktopEntry::new(desktop, &facts.summary, exec, icon_name);

        let changelog = match &facts.changelog {
            Some(section) => Some(ChangelogEntry {
                date: section.parsed_date()?,
                packager: section.packager.trim().to_string(),
                text: section.text.clone().unwrap_or_else(|| {
                    format!("Repackaged upstream release {}", facts.upstream_version)
                }),
            }),
            None => None,
        };

        Ok(Self {
            icon_dir: BuildLayout::icon_dir_name(&facts.name),
            description: facts
                .description
                .clone()
                .unwrap_or_else(|| facts.summary.clone()),
            name: facts.name,
            version,
            release: facts.release,
            summary: facts.summary,
            license: facts.license,
            url: facts.url,
            arch: facts.arch,
            install_prefix: facts.install_prefix,
            dependency_generation: facts.dependency_generation,
            launcher: facts.launcher,
            link_launcher: facts.link_launcher,
            archive_file: facts.archive_file,
            tree_dir,
            icons: installed_icons,
            manifest,
            desktop,
            changelog,
        })
    }

    /// Install prefix without a trailing slash
    pub(crate) fn install_prefix_str(&self) -> String {
        self.install_prefix
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string()
    }

    pub fn render_spec(&self) -> String {
        spec::render(self)
    }

    pub fn render_desktop(&self) -> String {
        self.desktop.render()
    }

    pub fn render_manifest(&self) -> String {
        self.manifest.render()
    }

    /// Check the manifest against the tree, then write all artifacts
    ///
    /// The spec file is written last, so it only exists once everything it
    /// refers to is in place.
    pub fn write(&self, tree: &PrunedTree, layout: &BuildLayout) -> Result<DescriptorArtifacts> {
        self.manifest.check_against(tree)?;

        let artifacts = DescriptorArtifacts {
            spec: layout.spec_path(&self.name),
            manifest: layout.manifest_path(&self.name),
            desktop: layout.desktop_path(&self.name),
        };

        write_atomic(Stage::Describe, &artifacts.desktop, self.render_desktop().as_bytes())?;
        write_atomic(Stage::Describe, &artifacts.manifest, self.render_manifest().as_bytes())?;
        write_atomic(Stage::Describe, &artifacts.spec, self.render_spec().as_bytes())?;

        info!(
            "Wrote {} ({} files, {} directories)",
            artifacts.spec.display(),
            self.manifest.files().len(),
            self.manifest.directories().len()
        );
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icon::{IconCandidate, IconFormat, IconSet, IconWarning};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn facts() -> PackageFacts {
        let config = Config::new("eclipse-cpp", "eclipse");
        PackageFacts::from_config(&config, "2025-12", Some("eclipse-cpp-2025-12-R-linux-gtk-x86_64.tar.gz"))
    }

    fn tree(dir: &Path) -> PrunedTree {
        let root = dir.join("eclipse-cpp-2025-12");
        fs::create_dir_all(root.join("lib/linux/x86_64")).unwrap();
        fs::write(root.join("lib/linux/x86_64/libswt.so"), b"elf").unwrap();
        fs::set_permissions(
            root.join("lib/linux/x86_64/libswt.so"),
            fs::Permissions::from_mode(0o644),
        )
        .unwrap();
        fs::write(root.join("eclipse"), b"#!/bin/sh").unwrap();
        fs::set_permissions(root.join("eclipse"), fs::Permissions::from_mode(0o755)).unwrap();
        PrunedTree::new(root)
    }

    fn icons() -> IconOutcome {
        IconOutcome::Installed(IconSet {
            primary: IconCandidate {
                relative: "icon/256.png".to_string(),
                path: PathBuf::from("icon/256.png"),
                resolution: 256,
                format: IconFormat::Png,
                named: false,
            },
            installed: vec![
                "hicolor/256x256/apps/eclipse-cpp.png".to_string(),
                "pixmaps/eclipse-cpp.png".to_string(),
            ],
        })
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("2025-12").unwrap(), "2025.12");
        assert_eq!(normalize_version("4.36").unwrap(), "4.36");
        assert!(normalize_version("").is_err());
        assert!(normalize_version("2025 12").is_err());
        assert!(normalize_version(" 2025-12").is_err());
        assert!(normalize_version("x/../../..").is_err());
        assert!(normalize_version("..").is_err());
        assert!(normalize_version("-rc1").is_err());
    }

    #[test]
    fn test_spec_contents() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let descriptor =
            PackageDescriptor::generate(&tree, facts(), &icons(), &DesktopSection::default())
                .unwrap();
        let spec = descriptor.render_spec();

        assert!(spec.starts_with("%define __jar_repack 0\n"));
        assert!(spec.contains("Name:           eclipse-cpp\n"));
        assert!(spec.contains("Version:        2025.12\n"));
        assert!(spec.contains("Release:        1%{?dist}\n"));
        assert!(spec.contains("AutoReqProv:    no\n"));
        assert!(spec.contains("ExclusiveArch:  x86_64\n"));
        assert!(spec.contains("BuildRequires:  desktop-file-utils\n"));
        assert!(spec.contains(
            "cp -a \"%{_sourcedir}/eclipse-cpp-2025-12/.\" \"%{buildroot}/opt/eclipse-cpp/\"\n"
        ));
        assert!(spec.contains("%dir \"/opt/eclipse-cpp\"\n"));
        assert!(spec.contains("%dir \"/opt/eclipse-cpp/lib/linux/x86_64\"\n"));
        assert!(spec.contains("%attr(0755,root,root) \"/opt/eclipse-cpp/eclipse\"\n"));
        assert!(spec.contains(
            "%attr(0644,root,root) \"/opt/eclipse-cpp/lib/linux/x86_64/libswt.so\"\n"
        ));
        assert!(spec.contains("%{_datadir}/icons/hicolor/256x256/apps/eclipse-cpp.png\n"));
        assert!(spec.contains("%{_bindir}/eclipse-cpp\n"));
        assert!(spec.contains("ln -sf \"/opt/eclipse-cpp/eclipse\""));
        assert_eq!(spec.matches("%attr(").count(), 2);
    }

    #[test]
    fn test_dependency_generation_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let mut facts = facts();
        facts.dependency_generation = DependencyGeneration::Enabled;
        let spec = PackageDescriptor::generate(&tree, facts, &icons(), &DesktopSection::default())
            .unwrap()
            .render_spec();
        assert!(!spec.contains("AutoReqProv"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let render = || {
            let d = PackageDescriptor::generate(&tree, facts(), &icons(), &DesktopSection::default())
                .unwrap();
            (d.render_spec(), d.render_manifest(), d.render_desktop())
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn test_missing_launcher_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let mut facts = facts();
        facts.launcher = "bin/eclipse".to_string();
        let err = PackageDescriptor::generate(&tree, facts, &icons(), &DesktopSection::default())
            .unwrap_err();
        assert!(matches!(err, Error::Descriptor { .. }));
        assert!(err.to_string().starts_with("describe: "));
    }

    #[test]
    fn test_tab_in_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        fs::write(tree.root().join("lib/notes\tdraft.txt"), b"x").unwrap();
        let err = PackageDescriptor::generate(&tree, facts(), &icons(), &DesktopSection::default())
            .unwrap_err();
        match err {
            Error::Descriptor { path, .. } => {
                assert!(path.ends_with("lib/notes\tdraft.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_changelog_only_when_dated() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let plain = PackageDescriptor::generate(&tree, facts(), &icons(), &DesktopSection::default())
            .unwrap();
        assert!(!plain.render_spec().contains("%changelog"));

        let mut dated = facts();
        dated.changelog = Some(ChangelogSection {
            date: "2026-01-04".to_string(),
            packager: "Packager <packager@example.com>".to_string(),
            text: None,
        });
        let spec = PackageDescriptor::generate(&tree, dated, &icons(), &DesktopSection::default())
            .unwrap()
            .render_spec();
        assert!(spec.ends_with(
            "\n%changelog\n* Sun Jan 04 2026 Packager <packager@example.com> - 2025.12-1\n\
             - Repackaged upstream release 2025-12\n"
        ));

        let mut bad = facts();
        bad.changelog = Some(ChangelogSection {
            date: "04/01/2026".to_string(),
            packager: "Packager".to_string(),
            text: None,
        });
        assert!(matches!(
            PackageDescriptor::generate(&tree, bad, &icons(), &DesktopSection::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_fallback_icon_in_desktop_entry() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let missing = IconOutcome::Missing(IconWarning {
            root: tree.root().to_path_buf(),
            fallback: "application-x-executable".to_string(),
        });
        let d = PackageDescriptor::generate(&tree, facts(), &missing, &DesktopSection::default())
            .unwrap();
        assert!(d.render_desktop().contains("Icon=application-x-executable\n"));
        assert!(d.render_desktop().contains("Exec=/usr/bin/eclipse-cpp\n"));
        assert!(!d.render_spec().contains("install -D"));
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree(dir.path());
        let layout = BuildLayout::new(dir.path().join("rpmbuild"));
        let d = PackageDescriptor::generate(&tree, facts(), &icons(), &DesktopSection::default())
            .unwrap();

        let artifacts = d.write(&tree, &layout).unwrap();
        assert_eq!(fs::read_to_string(&artifacts.spec).unwrap(), d.render_spec());
        assert!(artifacts.manifest.ends_with("SPECS/eclipse-cpp.manifest"));
        assert!(artifacts.desktop.ends_with("SOURCES/eclipse-cpp.desktop"));

        fs::write(tree.root().join("late-addition"), b"x").unwrap();
        fs::remove_file(&artifacts.spec).unwrap();
        assert!(d.write(&tree, &layout).is_err());
        assert!(!artifacts.spec.exists());
    }
}
