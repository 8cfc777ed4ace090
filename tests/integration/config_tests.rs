use std::fs;
use std::path::PathBuf;

use figment::providers::{Format, Serialized};
use tempfile::tempdir;
use voltrack::config::{Config, ConfigOverrides};
use voltrack::error::InventoryError;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = figment::Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert!(config.volumes.is_empty());
    assert_eq!(config.skip_components, vec!["@eaDir".to_string()]);
    assert_eq!(config.scan.hash_batch_size, 100);
    assert_eq!(config.watch.workers, 1);
    assert_eq!(config.watch.move_window_secs, 5);
    assert_eq!(config.database.retry_attempts, 3);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r##"
volumes = ["/volume1", "/volume2"]
deny_list = ["#recycle", "@tmp"]

[database]
path = "/var/lib/voltrack/inventory.db"
busy_timeout_ms = 10000

[scan]
hash_batch_size = 500

[watch]
workers = 4
"##;
    fs::write(&config_path, toml_content).unwrap();

    let figment = figment::Figment::from(Serialized::defaults(Config::default()))
        .merge(figment::providers::Toml::file(&config_path));
    let config: Config = figment.extract().unwrap();

    assert_eq!(
        config.volumes,
        vec![PathBuf::from("/volume1"), PathBuf::from("/volume2")]
    );
    assert_eq!(config.deny_list, vec!["#recycle", "@tmp"]);
    assert_eq!(
        config.database.path,
        PathBuf::from("/var/lib/voltrack/inventory.db")
    );
    assert_eq!(config.database.busy_timeout_ms, 10000);
    assert_eq!(config.database.retry_attempts, 3);
    assert_eq!(config.scan.hash_batch_size, 500);
    assert_eq!(config.watch.workers, 4);
    assert_eq!(config.watch.move_window_secs, 5);
}

#[test]
fn test_env_overrides_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "volumes = [\"/volume1\"]\n[watch]\nmove_window_secs = 30\n",
    )
    .unwrap();

    std::env::set_var("VOLTRACK_WATCH__MOVE_WINDOW_SECS", "12");
    std::env::set_var("VOLTRACK_SKIP_COMPONENTS", "@eaDir, .snapshot ,");

    let config: Config = Config::figment(Some(&config_path)).extract().unwrap();

    std::env::remove_var("VOLTRACK_WATCH__MOVE_WINDOW_SECS");
    std::env::remove_var("VOLTRACK_SKIP_COMPONENTS");

    assert_eq!(config.volumes, vec![PathBuf::from("/volume1")]);
    assert_eq!(config.watch.move_window_secs, 12);
    assert_eq!(config.skip_components, vec!["@eaDir", ".snapshot"]);
}

#[test]
fn test_cli_overrides_win() {
    let mut config = Config {
        volumes: vec![PathBuf::from("/volume1")],
        deny_list: vec!["#recycle".to_string()],
        ..Config::default()
    };
    config.apply_overrides(&ConfigOverrides {
        volumes: vec![PathBuf::from("/volume2")],
        deny_list: Vec::new(),
        database: Some(PathBuf::from("/tmp/other.db")),
    });

    assert_eq!(config.volumes, vec![PathBuf::from("/volume2")]);
    assert_eq!(config.deny_list, vec!["#recycle"]);
    assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
}

#[test]
fn test_missing_explicit_config_file_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let result = Config::load(Some(&temp_dir.path().join("absent.toml")));
    assert!(matches!(result, Err(InventoryError::Config(_))));
}

#[test]
fn test_malformed_config_file_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[watch]\nworkers = \"many\"\n").unwrap();

    let result = Config::load(Some(&config_path));
    assert!(matches!(result, Err(InventoryError::Config(_))));
}

#[test]
fn test_validate_rejects_bad_settings() {
    let valid = Config {
        volumes: vec![PathBuf::from("/volume1")],
        ..Config::default()
    };
    assert!(valid.validate().is_ok());

    let mut no_volumes = valid.clone();
    no_volumes.volumes.clear();
    assert!(matches!(no_volumes.validate(), Err(InventoryError::Config(_))));

    let mut relative = valid.clone();
    relative.volumes = vec![PathBuf::from("volume1")];
    assert!(relative.validate().is_err());

    let mut nested = valid.clone();
    nested.volumes = vec![PathBuf::from("/volume1"), PathBuf::from("/volume1/share")];
    assert!(matches!(nested.validate(), Err(InventoryError::Config(_))));

    let mut repeated = valid.clone();
    repeated.volumes = vec![PathBuf::from("/volume1"), PathBuf::from("/volume1")];
    assert!(repeated.validate().is_err());

    let mut siblings = valid.clone();
    siblings.volumes = vec![PathBuf::from("/volume1"), PathBuf::from("/volume10")];
    assert!(siblings.validate().is_ok());

    let mut no_batch = valid.clone();
    no_batch.scan.hash_batch_size = 0;
    assert!(no_batch.validate().is_err());

    let mut no_workers = valid;
    no_workers.watch.workers = 0;
    assert!(no_workers.validate().is_err());
}

#[test]
fn test_numeric_env_values_kept_as_text() {
    // Own prefix, so concurrently loaded configs never see these values
    std::env::set_var("VOLTRACK_NUMERIC_DENY_LIST", "2021");
    std::env::set_var("VOLTRACK_NUMERIC_SKIP_COMPONENTS", "true");

    let figment = figment::Figment::from(Serialized::defaults(Config::default()))
        .merge(figment::providers::Env::prefixed("VOLTRACK_NUMERIC_").split("__"));
    let config: Result<Config, _> = figment.extract();

    std::env::remove_var("VOLTRACK_NUMERIC_DENY_LIST");
    std::env::remove_var("VOLTRACK_NUMERIC_SKIP_COMPONENTS");

    let config = config.unwrap();
    assert_eq!(config.deny_list, vec!["2021"]);
    assert_eq!(config.skip_components, vec!["true"]);
}

#[test]
fn test_numeric_toml_list_items_kept_as_text() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "deny_list = [2021, \"@tmp\"]\nskip_components = 1999\n").unwrap();

    let figment = figment::Figment::from(Serialized::defaults(Config::default()))
        .merge(figment::providers::Toml::file(&config_path));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config.deny_list, vec!["2021", "@tmp"]);
    assert_eq!(config.skip_components, vec!["1999"]);
}
