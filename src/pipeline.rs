// src/pipeline.rs

//! The repackaging pipeline
//!
//! Stages run strictly in order and each consumes the handle produced by
//! its predecessor:
//!
//! ```text
//! ArchiveReference -> LocalArchive -> VerifiedArchive -> ExtractedTree
//!                  -> PrunedTree -> icons -> spec, manifest, desktop entry
//! ```
//!
//! Any fatal error stops the run. The spec file of a previous run is removed
//! up front, so a failed run never leaves a description behind.

use crate::archive::{
    self, ArchiveReference, ExtractStats, Fetcher, LocalArchive, Transport, VerifiedArchive,
};
use crate::config::Config;
use crate::descriptor::{DescriptorArtifacts, PackageDescriptor, PackageFacts, normalize_version};
use crate::error::{Error, Result, Stage};
use crate::filesystem::remove_path;
use crate::icon::{self, IconOutcome};
use crate::layout::BuildLayout;
use crate::prune::{PruneReport, PruneTable, Pruner};
use crate::tree::{ExtractedTree, PrunedTree};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where the archive comes from and which upstream version it is
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub reference: ArchiveReference,
    /// Upstream version string (`2025-12`)
    pub version: String,
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub package: String,
    pub version: String,
    pub archive: PathBuf,
    pub sha256: String,
    /// The archive was already cached and verified
    pub reused_archive: bool,
    pub tree: PathBuf,
    pub extract: ExtractStats,
    pub prune: PruneReport,
    pub icon: IconOutcome,
    pub artifacts: DescriptorArtifacts,
    pub rpmbuild_command: String,
}

/// A configured pipeline
pub struct Pipeline<T: Transport> {
    config: Config,
    layout: BuildLayout,
    table: PruneTable,
    transport: T,
}

impl<T: Transport> Pipeline<T> {
    /// Validate configuration and compile the prune table
    pub fn new(config: Config, transport: T) -> Result<Self> {
        config.validate()?;
        let table = PruneTable::load(config.prune.rules.as_deref())?;
        let layout = BuildLayout::new(&config.work_dir);
        Ok(Self {
            config,
            layout,
            table,
            transport,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    pub fn prune_table(&self) -> &PruneTable {
        &self.table
    }

    /// Determine archive location, digest and upstream version
    ///
    /// With `[discovery]` configured the newest release is looked up first.
    /// `source.uri` is the pinned fallback, used when discovery fails or the
    /// discovered archive has no known digest. The digest never comes from
    /// discovery.
    pub fn resolve_source(&self) -> Result<ResolvedSource> {
        let pinned = self.config.source.uri.as_deref();

        let Some(discovery) = &self.config.discovery else {
            return match pinned {
                Some(uri) => self.pinned_source(uri),
                None => Err(Error::Config(
                    "no archive location; set source.uri, pass --uri or configure [discovery]"
                        .to_string(),
                )),
            };
        };

        let release = match (archive::discover_latest(&self.transport, discovery), pinned) {
            (Ok(release), _) => release,
            (Err(e @ Error::Fetch { .. }), Some(uri)) => {
                warn!("Release discovery failed, using the pinned archive: {}", e);
                return self.pinned_source(uri);
            }
            (Err(e), _) => return Err(e),
        };

        // source.sha256 describes the pinned archive when there is one
        let explicit = match pinned {
            Some(_) => None,
            None => self.config.source.sha256.as_deref(),
        };
        let reference =
            match ArchiveReference::resolve(release.uri.as_str(), explicit, &self.config.archives) {
                Ok(reference) => reference,
                Err(Error::Config(reason)) => match pinned {
                    Some(uri) => {
                        warn!(
                            "Discovered {} is not usable, using the pinned archive: {}",
                            release.uri, reason
                        );
                        return self.pinned_source(uri);
                    }
                    None => return Err(Error::Config(reason)),
                },
                Err(e) => return Err(e),
            };

        normalize_version(&release.version)?;
        Ok(ResolvedSource {
            reference,
            version: release.version,
        })
    }

    /// The archive named by `source.uri`, versioned by `package.version` or
    /// its `[[archives]]` entry
    fn pinned_source(&self, uri: &str) -> Result<ResolvedSource> {
        let reference = ArchiveReference::resolve(
            uri,
            self.config.source.sha256.as_deref(),
            &self.config.archives,
        )?;

        let version = self
            .config
            .package
            .version
            .clone()
            .or_else(|| {
                self.config
                    .archives
                    .iter()
                    .find(|a| a.file == reference.file_name())
                    .and_then(|a| a.version.clone())
            })
            .ok_or_else(|| {
                Error::Config(format!(
                    "no version for {}; set package.version or pass --version",
                    reference.file_name()
                ))
            })?;
        normalize_version(&version)?;

        Ok(ResolvedSource { reference, version })
    }

    pub fn fetch(&self, reference: &ArchiveReference) -> Result<LocalArchive> {
        Fetcher::new(&self.transport, self.layout.sources())
            .with_retries(self.config.fetch.retries)
            .with_retry_delay(self.config.fetch.retry_delay())
            .with_progress(self.config.fetch.progress)
            .fetch(reference)
    }

    pub fn verify(&self, archive: LocalArchive) -> Result<VerifiedArchive> {
        archive::verify(archive)
    }

    pub fn extract(
        &self,
        archive: &VerifiedArchive,
        version: &str,
    ) -> Result<(ExtractedTree, ExtractStats)> {
        let dest = self
            .layout
            .tree_dir(&self.config.package.name_stem, version);
        archive::extract(archive, &dest, self.config.source.strip_components)
    }

    pub fn prune(&self, tree: ExtractedTree) -> Result<(PrunedTree, PruneReport)> {
        Pruner::new(&self.table, self.config.package.target_architecture).prune(tree)
    }

    pub fn icons(&self, tree: &PrunedTree) -> Result<IconOutcome> {
        let name = &self.config.package.name_stem;
        icon::extract_icons(tree, &self.config.icons, name, &self.layout.icon_dir(name))
    }

    pub fn describe(
        &self,
        tree: &PrunedTree,
        source: &ResolvedSource,
        icons: &IconOutcome,
    ) -> Result<(PackageDescriptor, DescriptorArtifacts)> {
        let facts = PackageFacts::from_config(
            &self.config,
            &source.version,
            Some(source.reference.file_name()),
        );
        let descriptor = PackageDescriptor::generate(tree, facts, icons, &self.config.desktop)?;
        let artifacts = descriptor.write(tree, &self.layout)?;
        Ok((descriptor, artifacts))
    }

    /// Run every stage
    pub fn run(&self) -> Result<PipelineReport> {
        let name = &self.config.package.name_stem;

        self.layout.create()?;
        let stale_spec = self.layout.spec_path(name);
        remove_path(&stale_spec).map_err(|e| Error::io(Stage::Describe, &stale_spec, e))?;

        let source = self.resolve_source()?;
        info!(
            "Packaging {} {} from {}",
            name,
            source.version,
            source.reference.uri()
        );

        let local = self.fetch(&source.reference)?;
        let reused_archive = !local.is_fresh();
        let verified = self.verify(local)?;
        let (extracted, extract) = self.extract(&verified, &source.version)?;
        let (pruned, prune) = self.prune(extracted)?;
        let icon = self.icons(&pruned)?;
        let (descriptor, artifacts) = self.describe(&pruned, &source, &icon)?;

        Ok(PipelineReport {
            package: descriptor.name,
            version: descriptor.version,
            archive: verified.path().to_path_buf(),
            sha256: verified.digest().to_string(),
            reused_archive,
            tree: pruned.root().to_path_buf(),
            extract,
            prune,
            icon,
            artifacts,
            rpmbuild_command: self.layout.rpmbuild_command(name),
        })
    }
}
