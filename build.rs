// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Configuration file")
}

/// Common argument: target architecture
fn arch_arg() -> Arg {
    Arg::new("arch")
        .long("arch")
        .value_parser(["x86_64", "aarch64", "ppc64le", "riscv64"])
        .help("Target architecture")
}

fn build_cli() -> Command {
    Command::new("repack")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Repack Contributors")
        .about("Repackage upstream binary tarballs as RPM sources")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("prepare")
                .about("Fetch, verify, extract and prune an archive, then write the spec file")
                .arg(config_arg())
                .arg(Arg::new("name").long("name").help("Package name when no configuration file is given"))
                .arg(Arg::new("launcher").long("launcher").help("Launcher path inside the tree"))
                .arg(Arg::new("uri").long("uri").help("Archive location (http, https or file URI); skips release discovery"))
                .arg(Arg::new("sha256").long("sha256").help("Expected SHA-256 of the archive"))
                .arg(Arg::new("version").long("version").help("Upstream version (e.g. 2025-12)"))
                .arg(Arg::new("work_dir").long("work-dir").help("rpmbuild top directory"))
                .arg(arch_arg())
                .arg(
                    Arg::new("strip_components")
                        .long("strip-components")
                        .help("Leading path components to strip from archive entries"),
                )
                .arg(
                    Arg::new("no_progress")
                        .long("no-progress")
                        .action(ArgAction::SetTrue)
                        .help("Do not show a download progress bar"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the run report as JSON"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Check a file against an expected SHA-256 digest")
                .arg(Arg::new("file").required(true).help("File to check"))
                .arg(Arg::new("sha256").long("sha256").required(true).help("Expected digest")),
        )
        .subcommand(
            Command::new("discover")
                .about("Find the newest upstream release")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("rules")
                .about("Show the prune rule table and which rules apply")
                .arg(config_arg())
                .arg(arch_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("repack.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
