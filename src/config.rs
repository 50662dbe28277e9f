// src/config.rs

//! Pipeline configuration
//!
//! Everything the pipeline needs is passed in through [`Config`]; nothing is
//! read from the environment or prompted for. The configuration is normally
//! loaded from a TOML file and then adjusted with command-line overrides.

use crate::descriptor::normalize_version;
use crate::error::{Error, Result};
use crate::hash::Sha256Digest;
use crate::prune::RuleSpec;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Target architecture of the generated package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetArch {
    /// x86_64 / AMD64
    #[default]
    X86_64,
    /// AArch64 / ARM64
    Aarch64,
    /// 64-bit little-endian POWER
    Ppc64le,
    /// RISC-V 64-bit
    Riscv64,
}

impl TargetArch {
    /// Architecture name as used by rpmbuild (`RPMS/<arch>`)
    pub fn rpm_arch(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Ppc64le => "ppc64le",
            Self::Riscv64 => "riscv64",
        }
    }

    /// Parse from string, accepting common aliases
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            "ppc64le" => Some(Self::Ppc64le),
            "riscv64" => Some(Self::Riscv64),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetArch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.rpm_arch())
    }
}

/// Whether the package builder scans binaries for library dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyGeneration {
    Enabled,
    /// Bundled runtimes ship their own libraries; scanning them produces
    /// bogus provides and unmet requirements.
    #[default]
    Disabled,
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name (`eclipse-cpp`)
    pub name_stem: String,

    /// Upstream version (`2025-12`); may come from discovery instead
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default = "default_release")]
    pub release: String,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default = "default_license")]
    pub license: String,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub target_architecture: TargetArch,

    /// Install location of the tree (default `/opt/<name_stem>`)
    #[serde(default)]
    pub install_prefix: Option<PathBuf>,

    #[serde(default)]
    pub dependency_generation: DependencyGeneration,

    /// Executable inside the tree, relative to its root
    pub launcher: String,

    /// Also install `/usr/bin/<name_stem>` pointing at the launcher
    #[serde(default = "default_true")]
    pub link_launcher: bool,

    /// `%changelog` entry; the spec has no changelog when unset
    #[serde(default)]
    pub changelog: Option<ChangelogSection>,
}

/// A dated `%changelog` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogSection {
    /// Entry date as `YYYY-MM-DD`
    pub date: String,

    /// `Name <email>` shown on the entry line
    pub packager: String,

    #[serde(default)]
    pub text: Option<String>,
}

impl ChangelogSection {
    pub fn parsed_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|e| {
            Error::Config(format!("package.changelog.date '{}': {}", self.date, e))
        })
    }
}

/// Where the archive comes from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSection {
    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default)]
    pub sha256: Option<String>,

    /// Leading path components dropped during extraction (tar semantics)
    #[serde(default)]
    pub strip_components: usize,
}

/// Network behavior of the fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Timeout for a single download attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts before giving up
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base backoff; attempt `n` waits `n * retry_delay_ms`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_true")]
    pub progress: bool,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            progress: true,
        }
    }
}

impl FetchSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Release index scraping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// Page listing one directory per release
    pub index_url: String,

    /// Fragments that must all appear in the archive link
    #[serde(rename = "match")]
    pub match_fragments: Vec<String>,

    /// Regex a release directory name must match
    #[serde(default = "default_release_pattern")]
    pub release_pattern: String,

    /// Sub-directory of a release holding the final builds
    #[serde(default = "default_release_subdir")]
    pub release_subdir: String,
}

/// Icon discovery and installation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconSection {
    /// File-name fragments identifying icon candidates
    #[serde(default = "default_icon_names")]
    pub names: Vec<String>,

    /// Sizes installed under `hicolor/<N>x<N>`
    #[serde(default = "default_icon_sizes")]
    pub sizes: Vec<u32>,

    /// Theme icon name used when the archive ships none
    #[serde(default = "default_fallback_icon")]
    pub fallback: String,
}

impl Default for IconSection {
    fn default() -> Self {
        Self {
            names: default_icon_names(),
            sizes: default_icon_sizes(),
            fallback: default_fallback_icon(),
        }
    }
}

/// Desktop entry fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesktopSection {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub comment: Option<String>,

    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    #[serde(default)]
    pub terminal: bool,
}

/// A known upstream archive and its published digest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownArchive {
    /// Archive file name (last URI segment)
    pub file: String,
    pub sha256: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneSection {
    /// Replaces the built-in platform table when present
    #[serde(default)]
    pub rules: Option<Vec<RuleSpec>>,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// rpmbuild top directory
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    pub package: PackageSection,

    #[serde(default)]
    pub source: SourceSection,

    #[serde(default)]
    pub fetch: FetchSection,

    #[serde(default)]
    pub discovery: Option<DiscoverySection>,

    #[serde(default)]
    pub icons: IconSection,

    #[serde(default)]
    pub desktop: DesktopSection,

    #[serde(default)]
    pub archives: Vec<KnownArchive>,

    #[serde(default)]
    pub prune: PruneSection,
}

fn default_release() -> String {
    "1".to_string()
}

fn default_license() -> String {
    "Unknown".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_release_pattern() -> String {
    r"^\d{4}-\d{2}$".to_string()
}

fn default_release_subdir() -> String {
    "R/".to_string()
}

fn default_icon_names() -> Vec<String> {
    vec!["icon".to_string()]
}

fn default_icon_sizes() -> Vec<u32> {
    vec![16, 32, 48, 64, 128, 256]
}

fn default_fallback_icon() -> String {
    "application-x-executable".to_string()
}

fn default_categories() -> Vec<String> {
    vec!["Utility".to_string()]
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("rpmbuild")
}

impl Config {
    /// Create a configuration with defaults for everything but the package
    /// name and launcher
    pub fn new(name_stem: impl Into<String>, launcher: impl Into<String>) -> Self {
        Self {
            work_dir: default_work_dir(),
            package: PackageSection {
                name_stem: name_stem.into(),
                version: None,
                release: default_release(),
                summary: None,
                license: default_license(),
                url: None,
                description: None,
                target_architecture: TargetArch::default(),
                install_prefix: None,
                dependency_generation: DependencyGeneration::default(),
                launcher: launcher.into(),
                link_launcher: true,
                changelog: None,
            },
            source: SourceSection::default(),
            fetch: FetchSection::default(),
            discovery: None,
            icons: IconSection::default(),
            desktop: DesktopSection::default(),
            archives: Vec::new(),
            prune: PruneSection::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), config_reason(e))))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let pkg = &self.package;

        if pkg.name_stem.is_empty()
            || !pkg
                .name_stem
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
        {
            return Err(Error::Config(format!(
                "package.name_stem '{}' is not a valid package name",
                pkg.name_stem
            )));
        }

        if pkg.release.is_empty() || pkg.release.contains('-') {
            return Err(Error::Config(format!(
                "package.release '{}' must be non-empty and contain no '-'",
                pkg.release
            )));
        }

        if !self.install_prefix().is_absolute() {
            return Err(Error::Config(format!(
                "package.install_prefix '{}' must be absolute",
                self.install_prefix().display()
            )));
        }

        crate::filesystem::path::sanitize_path(&pkg.launcher).map_err(|_| {
            Error::Config(format!(
                "package.launcher '{}' must stay inside the tree",
                pkg.launcher
            ))
        })?;

        if let Some(version) = &pkg.version {
            normalize_version(version)
                .map_err(|_| Error::Config(format!("package.version '{}' is not usable", version)))?;
        }

        if let Some(changelog) = &pkg.changelog {
            changelog.parsed_date()?;
            let single_line = |s: &str| !s.trim().is_empty() && !s.contains(['\n', '\r']);
            if !single_line(changelog.packager.as_str())
                || !changelog.text.as_deref().is_none_or(single_line)
            {
                return Err(Error::Config(
                    "package.changelog packager and text must be single non-empty lines".to_string(),
                ));
            }
        }

        if let Some(sha256) = &self.source.sha256 {
            Sha256Digest::parse(sha256)?;
        }

        for archive in &self.archives {
            Sha256Digest::parse(&archive.sha256)
                .map_err(|e| Error::Config(format!("archives '{}': {}", archive.file, e)))?;
            if let Some(version) = &archive.version {
                normalize_version(version).map_err(|_| {
                    Error::Config(format!(
                        "archives '{}': version '{}' is not usable",
                        archive.file, version
                    ))
                })?;
            }
        }

        if self.fetch.retries == 0 {
            return Err(Error::Config("fetch.retries must be at least 1".to_string()));
        }

        if self.icons.sizes.contains(&0) {
            return Err(Error::Config("icons.sizes must be positive".to_string()));
        }

        if let Some(discovery) = &self.discovery {
            regex::Regex::new(&discovery.release_pattern).map_err(|e| {
                Error::Config(format!("discovery.release_pattern: {}", e))
            })?;
            if discovery.match_fragments.is_empty() {
                return Err(Error::Config(
                    "discovery.match needs at least one fragment".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Install location of the tree
    pub fn install_prefix(&self) -> PathBuf {
        self.package
            .install_prefix
            .clone()
            .unwrap_or_else(|| PathBuf::from("/opt").join(&self.package.name_stem))
    }

    /// Package summary line
    pub fn summary(&self) -> &str {
        self.package
            .summary
            .as_deref()
            .unwrap_or(&self.package.name_stem)
    }

    /// Set the rpmbuild top directory
    pub fn with_work_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.work_dir = path.into();
        self
    }

    /// Set the target architecture
    pub fn with_target(mut self, arch: TargetArch) -> Self {
        self.package.target_architecture = arch;
        self
    }

    /// Set the archive location
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.source.uri = Some(uri.into());
        self
    }

    /// Set the expected archive digest
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.source.sha256 = Some(sha256.into());
        self
    }

    /// Set the upstream version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.package.version = Some(version.into());
        self
    }

    /// Set the number of leading components stripped on extraction
    pub fn with_strip_components(mut self, count: usize) -> Self {
        self.source.strip_components = count;
        self
    }

    /// Choose whether rpmbuild generates library dependencies
    pub fn with_dependency_generation(mut self, mode: DependencyGeneration) -> Self {
        self.package.dependency_generation = mode;
        self
    }
}

fn config_reason(err: Error) -> String {
    match err {
        Error::Config(reason) => reason,
        other => other.to_string(),
    }
}
