//! Unit tests for configuration parsing, defaults, and validation.

use std::path::PathBuf;

use agent_console::config::{GlobalConfig, PermissionMode};

#[test]
fn empty_toml_yields_working_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults parse");

    assert_eq!(config.agent_binary, "claude");
    assert!(config.agent_args.is_empty());
    assert!(config.model.is_none());
    assert_eq!(config.permission_mode, PermissionMode::Delegate);
    assert_eq!(config.grace_period_seconds, 5);
    assert_eq!(config.max_conversations, 50);
    assert!(config.idle.enabled);
    assert_eq!(config.idle.threshold_seconds, 120);
    assert!(!config.compat.enabled);
}

#[test]
fn full_toml_overrides_every_default() {
    let toml = r#"
agent_binary = "my-agent"
agent_args = ["--trace"]
model = "opus"
permission_mode = "bypass"
data_dir = "/tmp/console-data"
workspace_root = "/srv/work"
grace_period_seconds = 10
max_conversations = 3

[idle]
enabled = false
threshold_seconds = 30

[compat]
enabled = true
launcher = "wsl.exe"
"#;
    let config = GlobalConfig::from_toml_str(toml).expect("full config parses");

    assert_eq!(config.agent_binary, "my-agent");
    assert_eq!(config.agent_args, vec!["--trace"]);
    assert_eq!(config.model.as_deref(), Some("opus"));
    assert_eq!(config.permission_mode, PermissionMode::Bypass);
    assert_eq!(config.grace_period_seconds, 10);
    assert_eq!(config.max_conversations, 3);
    assert!(!config.idle.enabled);
    assert_eq!(config.idle.threshold_seconds, 30);
    assert!(config.compat.enabled);
    assert_eq!(
        config.effective_workspace_root(),
        PathBuf::from("/srv/work")
    );
}

#[test]
fn storage_paths_derive_from_data_dir() {
    let config = GlobalConfig::from_toml_str("data_dir = '/var/console'").expect("parses");

    assert_eq!(
        config.rules_path(),
        PathBuf::from("/var/console/permission_rules.json")
    );
    assert_eq!(
        config.conversations_dir(),
        PathBuf::from("/var/console/conversations")
    );
}

#[test]
fn blank_agent_binary_is_rejected() {
    let err = GlobalConfig::from_toml_str("agent_binary = '  '").expect_err("rejected");
    assert!(err.to_string().contains("agent_binary"));
}

#[test]
fn zero_max_conversations_is_rejected() {
    let err = GlobalConfig::from_toml_str("max_conversations = 0").expect_err("rejected");
    assert!(err.to_string().contains("max_conversations"));
}

#[test]
fn enabled_compat_requires_a_launcher() {
    let toml = "[compat]\nenabled = true\nlauncher = ''";
    let err = GlobalConfig::from_toml_str(toml).expect_err("rejected");
    assert!(err.to_string().contains("launcher"));
}

#[test]
fn invalid_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("agent_binary = [not toml").expect_err("rejected");
    assert!(err.to_string().starts_with("config:"));
}
