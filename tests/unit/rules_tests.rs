//! Unit tests for the persisted always-allow ruleset.

use serde_json::json;

use agent_console::permissions::rules::{pattern_for_input, RuleSet};

#[test]
fn missing_file_loads_as_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    let rules = RuleSet::load(temp.path().join("rules.json"));
    assert!(rules.rules().is_empty());
}

#[test]
fn corrupt_file_loads_as_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("rules.json");
    std::fs::write(&path, "{{{not json").expect("write garbage");

    let rules = RuleSet::load(&path);
    assert!(rules.rules().is_empty());
}

#[test]
fn added_rules_survive_a_reload() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("rules.json");

    let mut rules = RuleSet::load(&path);
    rules.add_rule("Bash", "npm test").expect("rule persists");

    let reloaded = RuleSet::load(&path);
    assert_eq!(reloaded.rules().len(), 1);
    assert_eq!(reloaded.rules()[0].tool_name, "Bash");
    assert_eq!(reloaded.rules()[0].pattern, "npm test");
}

#[test]
fn duplicate_rules_are_ignored() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut rules = RuleSet::load(temp.path().join("rules.json"));

    rules.add_rule("Bash", "ls").expect("first add");
    rules.add_rule("Bash", "ls").expect("duplicate add");
    assert_eq!(rules.rules().len(), 1);
}

/// Matching is exact string equality — a stored `npm test` does not
/// cover `npm test --coverage`.
#[test]
fn matching_is_exact_only() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut rules = RuleSet::load(temp.path().join("rules.json"));
    rules.add_rule("Bash", "npm test").expect("add");

    assert!(rules.should_auto_approve("Bash", &json!({ "command": "npm test" })));
    assert!(!rules.should_auto_approve("Bash", &json!({ "command": "npm test --coverage" })));
    assert!(!rules.should_auto_approve("Bash", &json!({ "command": "npm" })));
    assert!(!rules.should_auto_approve("Shell", &json!({ "command": "npm test" })));
}

#[test]
fn pattern_prefers_command_then_paths_then_raw_json() {
    assert_eq!(
        pattern_for_input(&json!({ "command": "cargo build", "file_path": "x" })),
        "cargo build"
    );
    assert_eq!(
        pattern_for_input(&json!({ "file_path": "src/main.rs" })),
        "src/main.rs"
    );
    assert_eq!(pattern_for_input(&json!({ "path": "/etc/hosts" })), "/etc/hosts");
    assert_eq!(
        pattern_for_input(&json!({ "url": "https://example.com" })),
        r#"{"url":"https://example.com"}"#
    );
}

/// A rule stays active in memory even when persistence fails, so the
/// user's decision holds for the rest of the session.
#[test]
fn rule_is_active_in_memory_when_the_write_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    // Point the ruleset file inside a path occupied by a regular file so
    // the write must fail.
    let blocker = temp.path().join("blocker");
    std::fs::write(&blocker, "occupied").expect("write blocker");
    let mut rules = RuleSet::load(blocker.join("rules.json"));

    let result = rules.add_rule("Bash", "git status");
    assert!(result.is_err(), "write through a file must fail");
    assert!(rules.should_auto_approve("Bash", &json!({ "command": "git status" })));
}
