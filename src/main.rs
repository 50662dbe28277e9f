// src/main.rs

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use repack::archive::verify::verify_file;
use repack::{Config, Pipeline, PruneTable, RemoteClient, Sha256Digest, TargetArch};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "repack")]
#[command(author, version, about = "Repackage upstream binary tarballs as RPM sources", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, verify, extract and prune an archive, then write the spec file
    Prepare {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Package name when no configuration file is given
        #[arg(long)]
        name: Option<String>,

        /// Launcher path inside the tree when no configuration file is given
        #[arg(long)]
        launcher: Option<String>,

        /// Archive location (http, https or file URI); skips release discovery
        #[arg(long)]
        uri: Option<String>,

        /// Expected SHA-256 of the archive
        #[arg(long)]
        sha256: Option<String>,

        /// Upstream version (e.g. 2025-12)
        #[arg(long)]
        version: Option<String>,

        /// rpmbuild top directory
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Target architecture
        #[arg(long, value_parser = parse_arch)]
        arch: Option<TargetArch>,

        /// Leading path components to strip from archive entries
        #[arg(long)]
        strip_components: Option<usize>,

        /// Do not show a download progress bar
        #[arg(long)]
        no_progress: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a file against an expected SHA-256 digest
    Verify {
        /// File to check
        file: PathBuf,

        /// Expected digest (64 hex characters, optional "sha256:" prefix)
        #[arg(long)]
        sha256: String,
    },
    /// Find the newest upstream release
    Discover {
        /// Configuration file with a [discovery] section
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show the prune rule table and which rules apply
    Rules {
        /// Configuration file (built-in table if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Target architecture
        #[arg(long, value_parser = parse_arch)]
        arch: Option<TargetArch>,
    },
}

fn parse_arch(s: &str) -> std::result::Result<TargetArch, String> {
    TargetArch::parse(s).ok_or_else(|| {
        format!("unknown architecture '{s}' (expected x86_64, aarch64, ppc64le or riscv64)")
    })
}

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG: &str = "repack.toml";

/// The explicit path, or `repack.toml` in the current directory if present
fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG);
        default.is_file().then_some(default)
    })
}

fn load_config(
    path: Option<&Path>,
    name: Option<String>,
    launcher: Option<String>,
) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => {
            let (Some(name), Some(launcher)) = (name.clone(), launcher.clone()) else {
                bail!(
                    "no configuration; pass --config, create {} or give --name and --launcher",
                    DEFAULT_CONFIG
                );
            };
            Config::new(name, launcher)
        }
    };

    if let Some(name) = name {
        config.package.name_stem = name;
    }
    if let Some(launcher) = launcher {
        config.package.launcher = launcher;
    }
    Ok(config)
}

fn client(config: &Config) -> Result<RemoteClient> {
    RemoteClient::new(config.fetch.timeout()).context("failed to create HTTP client")
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Prepare {
            config,
            name,
            launcher,
            uri,
            sha256,
            version,
            work_dir,
            arch,
            strip_components,
            no_progress,
            json,
        } => {
            let mut config = load_config(config_path(config).as_deref(), name, launcher)?;
            if let Some(uri) = uri {
                // An explicit location replaces release discovery
                config = config.with_uri(uri);
                config.discovery = None;
            }
            if let Some(sha256) = sha256 {
                config = config.with_sha256(sha256);
            }
            if let Some(version) = version {
                config = config.with_version(version);
            }
            if let Some(dir) = work_dir {
                config = config.with_work_dir(dir);
            }
            if let Some(arch) = arch {
                config = config.with_target(arch);
            }
            if let Some(count) = strip_components {
                config = config.with_strip_components(count);
            }
            if no_progress || json {
                config.fetch.progress = false;
            }

            let transport = client(&config)?;
            let pipeline = Pipeline::new(config, transport)?;
            let report = pipeline.run()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Package:  {} {}", report.package, report.version);
                println!("Archive:  {} (sha256 {})", report.archive.display(), report.sha256);
                println!(
                    "Pruned:   {} files, {} bytes",
                    report.prune.files_removed, report.prune.bytes_removed
                );
                match report.icon.icon_set() {
                    Some(set) => println!("Icon:     {}", set.primary.relative),
                    None => println!("Icon:     none (using theme fallback)"),
                }
                println!("Spec:     {}", report.artifacts.spec.display());
                println!();
                println!("Build the package with:");
                println!("  {}", report.rpmbuild_command);
            }
            Ok(())
        }
        Commands::Verify { file, sha256 } => {
            let expected = Sha256Digest::parse(&sha256).map_err(repack::Error::from)?;
            let digest = verify_file(&file, &expected)?;
            println!("{}: OK ({})", file.display(), digest.to_prefixed_string());
            Ok(())
        }
        Commands::Discover { config } => {
            let Some(path) = config_path(config) else {
                bail!("no configuration; pass --config or create {}", DEFAULT_CONFIG);
            };
            let config = Config::load(&path)?;
            let Some(discovery) = &config.discovery else {
                bail!("{} has no [discovery] section", config.package.name_stem);
            };
            let release = repack::archive::discover_latest(&client(&config)?, discovery)?;
            println!("{}\t{}", release.version, release.uri);
            Ok(())
        }
        Commands::Rules { config, arch } => {
            let (table, config_arch) = match config_path(config) {
                Some(path) => {
                    let config = Config::load(&path)?;
                    (
                        PruneTable::load(config.prune.rules.as_deref())?,
                        config.package.target_architecture,
                    )
                }
                None => (PruneTable::load(None)?, TargetArch::default()),
            };
            let target = arch.unwrap_or(config_arch);
            info!("Prune rules for target {}", target);

            for rule in table.rules() {
                let state = if rule.is_active(target) {
                    "active"
                } else {
                    "inactive"
                };
                let patterns: Vec<&str> = rule.patterns().collect();
                println!(
                    "{:<10} {:<5} {:<8} {}",
                    rule.tag(),
                    rule.kind().as_str(),
                    state,
                    patterns.join(" ")
                );
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Library errors already render as one stage-tagged line
            match e.downcast_ref::<repack::Error>() {
                Some(err) => eprintln!("error: {err}"),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
