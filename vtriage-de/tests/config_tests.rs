//! Configuration resolution tests: root folder and config file priority.
//!
//! These tests mutate process environment variables and must not interleave,
//! hence `#[serial]`.

use serial_test::serial;
use tempfile::TempDir;
use vtriage_common::config::{resolve_root, CollisionMode, EngineConfig};

#[test]
#[serial]
fn test_cli_root_beats_environment() {
    std::env::set_var("VTRIAGE_ROOT", "/from/env");
    let root = resolve_root(Some("/from/cli"));
    std::env::remove_var("VTRIAGE_ROOT");
    assert_eq!(root, std::path::PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_environment_root_beats_default() {
    std::env::set_var("VTRIAGE_ROOT", "/from/env");
    let root = resolve_root(None);
    std::env::remove_var("VTRIAGE_ROOT");
    assert_eq!(root, std::path::PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_config_env_var_fallback() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("custom.toml");
    std::fs::write(
        &config_path,
        r#"
[actions]
collision_mode = "disambiguate"

[decider]
keep_threshold = 0.7
"#,
    )
    .unwrap();

    std::env::set_var("VTRIAGE_CONFIG", &config_path);
    let config = EngineConfig::load(None, dir.path()).unwrap();
    std::env::remove_var("VTRIAGE_CONFIG");

    assert_eq!(config.actions.collision_mode, CollisionMode::Disambiguate);
    assert_eq!(config.decider.keep_threshold, 0.7);
    // Unspecified sections keep their defaults
    assert_eq!(config.decider.discard_threshold, 0.4);
}

#[test]
#[serial]
fn test_explicit_config_beats_env_var() {
    let dir = TempDir::new().unwrap();
    let env_config = dir.path().join("env.toml");
    let cli_config = dir.path().join("cli.toml");
    std::fs::write(&env_config, "[decider]\nkeep_threshold = 0.9\n").unwrap();
    std::fs::write(&cli_config, "[decider]\nkeep_threshold = 0.8\n").unwrap();

    std::env::set_var("VTRIAGE_CONFIG", &env_config);
    let config = EngineConfig::load(Some(&cli_config), dir.path()).unwrap();
    std::env::remove_var("VTRIAGE_CONFIG");

    assert_eq!(config.decider.keep_threshold, 0.8);
}

#[test]
#[serial]
fn test_root_toml_picked_up_without_env() {
    std::env::remove_var("VTRIAGE_CONFIG");
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("vtriage.toml"),
        "[executor]\nop_timeout_secs = 5\n",
    )
    .unwrap();

    let config = EngineConfig::load(None, dir.path()).unwrap();
    assert_eq!(config.executor.op_timeout_secs, 5);
}

#[test]
#[serial]
fn test_invalid_thresholds_rejected_at_load() {
    std::env::remove_var("VTRIAGE_CONFIG");
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("vtriage.toml"),
        "[decider]\ndiscard_threshold = 0.8\nkeep_threshold = 0.5\n",
    )
    .unwrap();

    let err = EngineConfig::load(None, dir.path()).unwrap_err();
    assert!(matches!(err, vtriage_common::Error::Config(_)));
}
