// tests/config.rs

//! Configuration files shipped with the repository.

use repack::{Config, DependencyGeneration, PruneTable, TargetArch};
use std::path::Path;

#[test]
fn test_demo_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/eclipse-cpp.toml");
    let config = Config::load(&path).unwrap();

    assert_eq!(config.package.name_stem, "eclipse-cpp");
    assert_eq!(config.package.target_architecture, TargetArch::X86_64);
    assert_eq!(
        config.package.dependency_generation,
        DependencyGeneration::Disabled
    );
    assert_eq!(config.install_prefix(), Path::new("/opt/eclipse-cpp"));
    assert_eq!(config.source.strip_components, 1);

    let discovery = config.discovery.as_ref().unwrap();
    assert_eq!(discovery.release_subdir, "R/");
    assert_eq!(discovery.match_fragments.len(), 2);

    let table = PruneTable::load(config.prune.rules.as_deref()).unwrap();
    assert!(table.active_rules(TargetArch::X86_64).all(|r| r.tag() != "x86_64"));
}
