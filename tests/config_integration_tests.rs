//! Integration tests for ConfigManager
//!
//! These tests verify:
//! - A partial `calcrelay.yaml` fills the missing sections with defaults
//! - Loaded settings wire up the executable locator and run timeout
//! - Environment overrides win over the file
//! - The remembered picker directory survives a save/load cycle

use calcrelay::ConfigManager;
use calcrelay::config::CONFIG_FILE_NAME;
use calcrelay::models::{AppConfig, ModeSetting, STD_SENTINEL};
use calcrelay::services::{ExecutableLocator, RuntimeMode};
use camino::Utf8PathBuf;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn manager() -> (ConfigManager, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let dir = Utf8PathBuf::try_from(temp_dir.path().join("calcrelay-data")).unwrap();
    let manager = ConfigManager::new(&dir).unwrap();
    (manager, temp_dir)
}

#[test]
fn test_config_dir_is_created() {
    let (manager, _temp_dir) = manager();

    assert!(manager.config_dir().is_dir());
    assert_eq!(manager.config_path(), manager.config_dir().join(CONFIG_FILE_NAME));
    assert!(!manager.config_path().exists());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let (manager, _temp_dir) = manager();
    fs::write(
        manager.config_path(),
        r#"
executable:
  name: engine-x
  mode: packaged
  packaged_dir: /opt/calcrelay/bin
ui:
  default_options:
    use_area: true
"#,
    )
    .unwrap();

    let config = manager.load_config_from_vars(Vec::new()).unwrap();

    assert_eq!(config.executable.name, "engine-x");
    assert_eq!(config.executable.mode, ModeSetting::Packaged);
    assert_eq!(config.run, AppConfig::default().run);
    assert_eq!(config.logging, AppConfig::default().logging);
    assert!(config.ui.default_options.use_area);
    assert_eq!(config.ui.default_options.std_name, STD_SENTINEL);
}

#[test]
fn test_loaded_settings_drive_locator() {
    let (manager, _temp_dir) = manager();
    fs::write(
        manager.config_path(),
        "executable:\n  mode: development\n  development_dir: /src/calcrelay/tools\nrun:\n  timeout_secs: 120\n",
    )
    .unwrap();

    let config = manager.load_config_from_vars(Vec::new()).unwrap();
    let locator = ExecutableLocator::from_settings(&config.executable);

    assert_eq!(locator.mode, RuntimeMode::Development);
    assert!(locator.resolve().starts_with("/src/calcrelay/tools"));
    assert_eq!(config.run.timeout(), Some(Duration::from_secs(120)));
}

#[test]
fn test_environment_overrides_nested_options() {
    let (manager, _temp_dir) = manager();
    fs::write(manager.config_path(), "logging:\n  debug: false\n").unwrap();

    let config = manager
        .load_config_from_vars(vec![
            ("CALCRELAY__LOGGING__DEBUG".to_string(), "true".to_string()),
            (
                "CALCRELAY__UI__DEFAULT_OPTIONS__USE_GBK".to_string(),
                "true".to_string(),
            ),
        ])
        .unwrap();

    assert!(config.logging.debug);
    assert!(config.ui.default_options.use_gbk);
}

#[test]
fn test_last_directory_round_trip() {
    let (manager, temp_dir) = manager();
    let picked = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

    let mut config = manager.load_config_from_vars(Vec::new()).unwrap();
    assert!(config.ui.last_directory.is_none());

    config.ui.last_directory = Some(picked.clone());
    manager.save_config(&config).unwrap();

    let reloaded = manager.load_config_from_vars(Vec::new()).unwrap();
    assert_eq!(reloaded.ui.last_directory, Some(picked));
}
