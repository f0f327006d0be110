//! Configuration management tests
//!
//! Tests for ConfigManager and Config structures.

use fleetops_core::config::{CommissionerConfig, Config, ConfigManager};
use fleetops_core::TaskType;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temp directory for config tests
fn setup_config_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

fn config_path(dir: &TempDir) -> PathBuf {
    dir.path().join("fleetops").join("config.toml")
}

mod config_structure_tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(
            config.commissioner.retryable_task_types,
            vec![TaskType::CreateUniverse]
        );
        assert!(config.commissioner.is_retryable(TaskType::CreateUniverse));
        assert!(!config.commissioner.is_retryable(TaskType::DestroyUniverse));
        assert_eq!(config.commissioner.task_query_limit, 2000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_builder_overrides() {
        let config = CommissionerConfig::default()
            .with_retryable(vec![TaskType::CreateBackup])
            .with_task_query_limit(10);

        assert!(config.is_retryable(TaskType::CreateBackup));
        assert!(!config.is_retryable(TaskType::CreateUniverse));
        assert_eq!(config.task_query_limit, 10);
    }

    #[test]
    fn test_unknown_task_type_is_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [commissioner]
            retryable_task_types = ["reboot_everything"]
            "#,
        );
        assert!(result.is_err());
    }
}

mod config_manager_tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = setup_config_dir();
        let manager = ConfigManager::with_path(config_path(&dir)).unwrap();

        assert_eq!(manager.config().commissioner.task_query_limit, 2000);
        assert_eq!(manager.config_path(), config_path(&dir).as_path());
        assert!(!config_path(&dir).exists());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = setup_config_dir();
        let path = config_path(&dir);

        let mut manager = ConfigManager::with_path(path.clone()).unwrap();
        manager.config_mut().commissioner.retryable_task_types =
            vec![TaskType::CreateUniverse, TaskType::ConfigureMonitoring];
        manager.config_mut().commissioner.wait_poll_interval_ms = 25;
        manager.config_mut().logging.level = "debug".to_string();
        manager.save().unwrap();

        // Parent directories are created on save
        assert!(path.exists());

        let reloaded = ConfigManager::with_path(path).unwrap();
        let config = reloaded.config();
        assert!(config.commissioner.is_retryable(TaskType::ConfigureMonitoring));
        assert_eq!(config.commissioner.wait_poll_interval_ms, 25);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_partial_file() {
        let dir = setup_config_dir();
        let path = config_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            r#"
[logging]
level = "warn"
"#,
        )
        .unwrap();

        let manager = ConfigManager::with_path(path).unwrap();
        assert_eq!(manager.config().logging.level, "warn");
        assert_eq!(
            manager.config().commissioner.retryable_task_types,
            vec![TaskType::CreateUniverse]
        );
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = setup_config_dir();
        let path = config_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[commissioner\nretryable_task_types = ").unwrap();

        let result = ConfigManager::with_path(path);
        assert!(matches!(result, Err(fleetops_core::Error::Config(_))));
    }
}
