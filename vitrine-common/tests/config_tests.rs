//! Unit tests for bootstrap configuration and graceful degradation
//!
//! Tests that manipulate VITRINE_CONFIG are marked #[serial] so they do not
//! race each other.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use vitrine_common::config::{
    locate_config_file, BootstrapConfig, CompiledDefaults, SlotCycleEntry, TomlConfig,
    CONFIG_ENV_VAR,
};
use vitrine_common::models::SlotKind;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();
    assert!(!defaults.data_dir.as_os_str().is_empty());
    assert!(defaults.data_dir.to_string_lossy().contains("vitrine"));
    assert_eq!(defaults.log_level, "info");
}

#[test]
fn test_empty_toml_uses_defaults() {
    let config = TomlConfig::parse("").unwrap();
    assert_eq!(config.status_port, 5780);
    assert_eq!(config.logging.level, "info");
    assert!(config.slot_cycle.is_empty());
    assert!(config.backend_api_key.is_none());
}

#[test]
fn test_full_toml_parses() {
    let config = TomlConfig::parse(
        r#"
        data_dir = "/srv/vitrine"
        backend_url = "https://backend.example/api/"
        backend_api_key = "secret"
        status_port = 6000
        default_feed_url = "https://news.example/rss"

        [logging]
        level = "debug"
        file = "/var/log/vitrine.log"

        [[slot_cycle]]
        kind = "global"
        duration_seconds = 20

        [[slot_cycle]]
        kind = "local_ad"
        duration_seconds = 10
        "#,
    )
    .unwrap();

    assert_eq!(config.data_dir, Some(PathBuf::from("/srv/vitrine")));
    assert_eq!(config.status_port, 6000);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(
        config.slot_cycle,
        vec![
            SlotCycleEntry {
                kind: SlotKind::Global,
                duration_seconds: 20
            },
            SlotCycleEntry {
                kind: SlotKind::LocalAd,
                duration_seconds: 10
            },
        ]
    );

    let resolved = BootstrapConfig::resolve(config, None);
    assert_eq!(resolved.backend_url, "https://backend.example/api");
    assert_eq!(resolved.database_path, PathBuf::from("/srv/vitrine/vitrine.db"));
    assert_eq!(resolved.cache_dir, PathBuf::from("/srv/vitrine/media"));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let result = TomlConfig::parse("status_port = \"not a number\"");
    assert!(result.is_err());
}

#[test]
fn test_cli_data_dir_overrides_toml() {
    let config = TomlConfig::parse("data_dir = \"/from/toml\"").unwrap();
    let resolved = BootstrapConfig::resolve(config, Some(PathBuf::from("/from/cli")));
    assert_eq!(resolved.data_dir, PathBuf::from("/from/cli"));
    assert_eq!(resolved.database_path, PathBuf::from("/from/cli/vitrine.db"));
}

#[test]
fn test_ensure_directories_creates_layout() {
    let dir = TempDir::new().unwrap();
    let config = TomlConfig::default();
    let resolved = BootstrapConfig::resolve(config, Some(dir.path().join("data")));

    resolved.ensure_directories().unwrap();
    assert!(resolved.data_dir.is_dir());
    assert!(resolved.cache_dir.is_dir());
}

#[test]
#[serial]
fn test_explicit_path_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/from/env.toml");
    let located = locate_config_file(Some(&PathBuf::from("/explicit.toml")));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(located, Some(PathBuf::from("/explicit.toml")));
}

#[test]
#[serial]
fn test_env_var_locates_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kiosk.toml");
    std::fs::write(&path, "status_port = 7001\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let config = TomlConfig::load_or_default(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.unwrap().status_port, 7001);
}
