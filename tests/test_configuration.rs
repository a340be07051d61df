//! Configuration files as a user writes them

use scaffold_forge::utils::configuration::{
    save_configuration, AssemblerConfiguration, AssemblyError, ConfigTemplate, ConfigurationManager,
};
use tempfile::tempdir;

#[test]
fn test_library_tables_replace_default_registry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("libraries.toml");
    std::fs::write(
        &path,
        r#"
[scaffold]
depth = 6
redundancy = 3

[[scaffold.libraries]]
name = "3K"
mean_insert = 3000.0
std_dev = 150.0

[[scaffold.libraries]]
name = "8K"
mean_insert = 8000.0
std_dev = 400.0
"#,
    )
    .unwrap();

    let manager = ConfigurationManager::from_file(&path).unwrap();
    let scaffold = &manager.config().scaffold;
    assert_eq!(scaffold.depth, 6);
    assert_eq!(scaffold.redundancy, 3);
    assert_eq!(scaffold.libraries.len(), 2);
    assert_eq!(scaffold.libraries.get("3K").unwrap().mean_insert, 3000.0);
    assert!(matches!(
        scaffold.libraries.get("0.5K"),
        Err(AssemblyError::UnknownLibrary { .. })
    ));
    // untouched sections keep their defaults
    assert!(scaffold.enabled);
    assert_eq!(scaffold.overlap.min_overlap, 8);
}

#[test]
fn test_invalid_thresholds_rejected_on_load() {
    let dir = tempdir().unwrap();
    for (name, body) in [
        ("depth.toml", "[scaffold]\ndepth = 0\n"),
        ("tips.toml", "[assembly.tip_removal]\nmax_tip_length = 0\n"),
        ("k.toml", "[assembly]\nkmer_length = 32\n"),
        ("format.toml", "[logging]\nformat = \"xml\"\n"),
    ] {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        assert!(
            matches!(
                ConfigurationManager::from_file(&path),
                Err(AssemblyError::ValidationError { .. })
            ),
            "{name} should fail validation"
        );
    }
}

#[test]
fn test_templates_round_trip() {
    let dir = tempdir().unwrap();
    for template in [
        ConfigTemplate::Standard,
        ConfigTemplate::ContigsOnly,
        ConfigTemplate::Noisy,
    ] {
        let config = ConfigurationManager::create_template(template);
        let path = dir.path().join(format!("{template:?}.toml"));
        save_configuration(&config, &path).unwrap();
        let loaded = ConfigurationManager::from_file(&path).unwrap();
        assert_eq!(loaded.config(), &config);
    }
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let result = ConfigurationManager::from_file(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AssemblyError::IOError { .. })));
    assert!(ConfigurationManager::from_config(AssemblerConfiguration::default()).is_ok());
}
