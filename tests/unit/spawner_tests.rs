//! Unit tests for agent command-line construction.

use std::path::PathBuf;

use agent_console::config::{CompatConfig, GlobalConfig, PermissionMode};
use agent_console::process::SpawnConfig;

fn base_config() -> SpawnConfig {
    SpawnConfig {
        binary: "claude".into(),
        extra_args: Vec::new(),
        workspace_root: PathBuf::from("."),
        model: None,
        permission_mode: PermissionMode::Delegate,
        mcp_config: None,
        resume_session_id: None,
        compat: CompatConfig::default(),
    }
}

#[test]
fn required_protocol_flags_come_first() {
    let args = base_config().build_args();
    assert_eq!(
        &args[..7],
        &[
            "--print",
            "--input-format",
            "stream-json",
            "--output-format",
            "stream-json",
            "--verbose",
            "--include-partial-messages",
        ]
    );
}

#[test]
fn delegate_mode_routes_permissions_over_stdio() {
    let args = base_config().build_args();
    let position = args
        .iter()
        .position(|a| a == "--permission-prompt-tool")
        .expect("flag present");
    assert_eq!(args[position + 1], "stdio");
    assert!(!args.contains(&"--dangerously-skip-permissions".to_owned()));
}

#[test]
fn bypass_mode_skips_permission_mediation() {
    let mut config = base_config();
    config.permission_mode = PermissionMode::Bypass;

    let args = config.build_args();
    assert!(args.contains(&"--dangerously-skip-permissions".to_owned()));
    assert!(!args.contains(&"--permission-prompt-tool".to_owned()));
}

#[test]
fn optional_flags_follow_in_order() {
    let mut config = base_config();
    config.model = Some("opus".into());
    config.resume_session_id = Some("sess-42".into());
    config.extra_args = vec!["--custom".into()];

    let args = config.build_args();
    let model = args.iter().position(|a| a == "--model").expect("model");
    let resume = args.iter().position(|a| a == "--resume").expect("resume");
    assert_eq!(args[model + 1], "opus");
    assert_eq!(args[resume + 1], "sess-42");
    assert!(model < resume);
    assert_eq!(args.last().map(String::as_str), Some("--custom"));
}

#[test]
fn mcp_config_path_is_translated_under_compat() {
    let mut config = base_config();
    config.mcp_config = Some(PathBuf::from(r"C:\tools\mcp.json"));
    config.compat = CompatConfig {
        enabled: true,
        launcher: "wsl.exe".into(),
    };

    let args = config.build_args();
    let flag = args.iter().position(|a| a == "--mcp-config").expect("flag");
    assert_eq!(args[flag + 1], "/mnt/c/tools/mcp.json");
}

#[test]
fn compat_wraps_the_invocation_in_the_launcher() {
    let mut config = base_config();
    config.compat = CompatConfig {
        enabled: true,
        launcher: "wsl.exe".into(),
    };

    let (program, args) = config.resolve_invocation();
    assert_eq!(program, "wsl.exe");
    assert_eq!(&args[..2], &["-e", "claude"]);
    assert_eq!(args[2], "--print");
}

#[test]
fn without_compat_the_binary_runs_directly() {
    let (program, args) = base_config().resolve_invocation();
    assert_eq!(program, "claude");
    assert_eq!(args[0], "--print");
}

#[test]
fn from_global_carries_config_and_resume_session() {
    let toml = r#"
agent_binary = "my-agent"
model = "sonnet"
data_dir = "/tmp/d"
"#;
    let global = GlobalConfig::from_toml_str(toml).expect("config parses");
    let spawn = SpawnConfig::from_global(&global, Some("sess-7".into()));

    assert_eq!(spawn.binary, "my-agent");
    assert_eq!(spawn.model.as_deref(), Some("sonnet"));
    assert_eq!(spawn.resume_session_id.as_deref(), Some("sess-7"));
}
