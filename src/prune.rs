// src/prune.rs
//! Removal of foreign-platform content from an extracted tree
//!
//! Upstream archives bundle native code for platforms the package will
//! never run on. A [`PruneTable`] describes, per platform tag, which paths
//! belong to that platform; the [`Pruner`] deletes the paths of every tag
//! that is foreign to the target.

use crate::config::TargetArch;
use crate::error::{Error, Result, Stage};
use crate::filesystem::path::{relative_slash_path, resolve_link_target};
use crate::filesystem::remove_path;
use crate::tree::{ExtractedTree, PrunedTree};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// The only operating system packages are built for
const HOST_OS: &str = "linux";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// What a rule's tag names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// CPU architecture (`aarch64`)
    Arch,
    /// Operating system (`win32`)
    Os,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arch => "arch",
            Self::Os => "os",
        }
    }
}

/// A rule as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub tag: String,
    pub kind: RuleKind,
    pub patterns: Vec<String>,
}

impl RuleSpec {
    fn new(tag: &str, kind: RuleKind, patterns: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            kind,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Built-in platform table
///
/// Directory names follow the conventions of bundled runtimes (`lib/<os>`,
/// `<os>/<arch>`) and Eclipse-style fragment names
/// (`org.eclipse.swt.win32.win32.x86_64_3.126.0.jar`).
pub fn default_rule_specs() -> Vec<RuleSpec> {
    use RuleKind::{Arch, Os};

    vec![
        RuleSpec::new(
            "win32",
            Os,
            &["**/win32", "**/windows", "**/*.win32.*", "**/*.win32_*", "**/*.dll", "**/*.exe"],
        ),
        RuleSpec::new(
            "macosx",
            Os,
            &[
                "**/macos",
                "**/macosx",
                "**/darwin",
                "**/*.macosx.*",
                "**/*.macosx_*",
                "**/*.cocoa.*",
                "**/*.dylib",
                "**/*.jnilib",
                "**/*.app",
            ],
        ),
        RuleSpec::new("aix", Os, &["**/aix", "**/*.aix.*", "**/*.aix_*"]),
        RuleSpec::new("solaris", Os, &["**/solaris", "**/sunos", "**/*.solaris.*"]),
        RuleSpec::new("freebsd", Os, &["**/freebsd", "**/*.freebsd.*"]),
        RuleSpec::new("linux", Os, &["**/linux", "**/*.linux.*", "**/*.linux_*"]),
        RuleSpec::new(
            "x86_64",
            Arch,
            &["**/x86_64", "**/amd64", "**/x86-64", "**/*.x86_64", "**/*.x86_64_*"],
        ),
        RuleSpec::new(
            "aarch64",
            Arch,
            &["**/aarch64", "**/arm64", "**/*.aarch64", "**/*.aarch64_*"],
        ),
        RuleSpec::new(
            "ppc64le",
            Arch,
            &["**/ppc64le", "**/*.ppc64le", "**/*.ppc64le_*"],
        ),
        // Big-endian POWER, foreign to every supported target
        RuleSpec::new("ppc64", Arch, &["**/ppc64", "**/*.ppc64", "**/*.ppc64_*"]),
        RuleSpec::new("riscv64", Arch, &["**/riscv64", "**/*.riscv64", "**/*.riscv64_*"]),
        RuleSpec::new("x86", Arch, &["**/x86", "**/i386", "**/i686", "**/*.x86"]),
        RuleSpec::new("arm", Arch, &["**/arm", "**/armhf", "**/armv7*"]),
    ]
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct PruneRule {
    tag: String,
    kind: RuleKind,
    patterns: Vec<Pattern>,
}

impl PruneRule {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::as_str)
    }

    /// Whether the tag names a platform other than `target`
    pub fn is_active(&self, target: TargetArch) -> bool {
        match self.kind {
            RuleKind::Os => self.tag != HOST_OS,
            RuleKind::Arch => {
                self.tag != target.rpm_arch() && TargetArch::parse(&self.tag) != Some(target)
            }
        }
    }

    /// Match a `/`-separated path relative to the tree root
    pub fn matches(&self, relative: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(relative, MATCH_OPTIONS))
    }
}

/// Ordered, validated rule set, loaded once at startup
#[derive(Debug, Clone)]
pub struct PruneTable {
    rules: Vec<PruneRule>,
}

impl PruneTable {
    /// Compile rules in the given order
    pub fn compile(specs: &[RuleSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::PruneRule {
                tag: String::new(),
                reason: "rule table is empty".to_string(),
            });
        }

        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.tag.trim().is_empty() {
                return Err(Error::PruneRule {
                    tag: spec.tag.clone(),
                    reason: "empty tag".to_string(),
                });
            }
            if spec.patterns.is_empty() {
                return Err(Error::PruneRule {
                    tag: spec.tag.clone(),
                    reason: "no patterns".to_string(),
                });
            }

            let patterns = spec
                .patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| Error::PruneRule {
                        tag: spec.tag.clone(),
                        reason: format!("invalid pattern '{}': {}", p, e.msg),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            rules.push(PruneRule {
                tag: spec.tag.clone(),
                kind: spec.kind,
                patterns,
            });
        }

        Ok(Self { rules })
    }

    /// Compile the configured table, or the built-in one when none is given
    pub fn load(custom: Option<&[RuleSpec]>) -> Result<Self> {
        match custom {
            Some(specs) => Self::compile(specs),
            None => Self::compile(&default_rule_specs()),
        }
    }

    pub fn rules(&self) -> &[PruneRule] {
        &self.rules
    }

    /// Rules that apply to `target`, in table order
    pub fn active_rules(&self, target: TargetArch) -> impl Iterator<Item = &PruneRule> {
        self.rules.iter().filter(move |r| r.is_active(target))
    }
}

/// Paths removed on behalf of one rule
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleOutcome {
    pub tag: String,
    pub paths: Vec<String>,
    pub files: u64,
    pub bytes: u64,
}

/// Result of a prune run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    /// Non-directory entries removed, links included
    pub files_removed: u64,
    pub bytes_removed: u64,
    /// Rules that matched at least one path, in table order
    pub rules: Vec<RuleOutcome>,
    /// Links removed because their target was pruned
    pub dangling_links: Vec<String>,
}

/// Applies a prune table for one target
pub struct Pruner<'a> {
    table: &'a PruneTable,
    target: TargetArch,
}

impl<'a> Pruner<'a> {
    pub fn new(table: &'a PruneTable, target: TargetArch) -> Self {
        Self { table, target }
    }

    /// Delete every path matched by an active rule
    ///
    /// Running the pruner on its own output removes nothing.
    pub fn prune(&self, tree: ExtractedTree) -> Result<(PrunedTree, PruneReport)> {
        let root = tree.root().to_path_buf();
        let mut report = PruneReport::default();
        let mut removed: Vec<PathBuf> = Vec::new();

        for rule in self.table.active_rules(self.target) {
            let matched = matching_paths(&root, rule)?;
            if matched.is_empty() {
                continue;
            }

            let mut outcome = RuleOutcome {
                tag: rule.tag.clone(),
                ..Default::default()
            };
            for path in matched {
                let (files, bytes) = measure(&path)?;
                remove_path(&path).map_err(|e| Error::io(Stage::Prune, &path, e))?;
                debug!("Pruned {} ({})", path.display(), rule.tag);

                outcome.files += files;
                outcome.bytes += bytes;
                outcome
                    .paths
                    .extend(relative_slash_path(&root, &path));
                removed.push(path);
            }

            report.files_removed += outcome.files;
            report.bytes_removed += outcome.bytes;
            report.rules.push(outcome);
        }

        if !removed.is_empty() {
            remove_dangling_links(&root, &mut removed, &mut report)?;
        }

        info!(
            "Pruned {} files ({} bytes) for target {}",
            report.files_removed, report.bytes_removed, self.target
        );
        Ok((PrunedTree::new(root), report))
    }
}

/// Paths matched by `rule`, sorted, without descending into matched
/// directories
fn matching_paths(root: &Path, rule: &PruneRule) -> Result<Vec<PathBuf>> {
    let mut matched = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let Some(relative) = relative_slash_path(root, entry.path()) else {
            continue;
        };

        if rule.matches(&relative) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            matched.push(entry.into_path());
        }
    }

    Ok(matched)
}

/// Count non-directory entries and their bytes below `path`
fn measure(path: &Path) -> Result<(u64, u64)> {
    let mut files = 0;
    let mut bytes = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| walk_error(path, e))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let metadata = fs::symlink_metadata(entry.path())
            .map_err(|e| Error::io(Stage::Prune, entry.path(), e))?;
        files += 1;
        bytes += metadata.len();
    }
    Ok((files, bytes))
}

/// Remove links whose lexical target lies in a pruned subtree, repeating
/// until no removed link is itself the target of another link
fn remove_dangling_links(
    root: &Path,
    removed: &mut Vec<PathBuf>,
    report: &mut PruneReport,
) -> Result<()> {
    loop {
        let mut newly_removed = Vec::new();

        for entry in WalkDir::new(root).min_depth(1).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(root, e))?;
            if !entry.path_is_symlink() {
                continue;
            }
            let link = entry.path();
            let target = fs::read_link(link).map_err(|e| Error::io(Stage::Prune, link, e))?;
            let resolved = resolve_link_target(link, &target);

            if removed.iter().any(|gone| resolved.starts_with(gone)) {
                let size = fs::symlink_metadata(link).map(|m| m.len()).unwrap_or(0);
                remove_path(link).map_err(|e| Error::io(Stage::Prune, link, e))?;
                debug!("Removed dangling link {}", link.display());

                report.files_removed += 1;
                report.bytes_removed += size;
                report.dangling_links.extend(relative_slash_path(root, link));
                newly_removed.push(link.to_path_buf());
            }
        }

        if newly_removed.is_empty() {
            return Ok(());
        }
        removed.extend(newly_removed);
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    Error::io(Stage::Prune, path, source)
}
