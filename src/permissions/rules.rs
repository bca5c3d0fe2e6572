//! Persisted always-allow ruleset.
//!
//! Rules are `{tool_name, pattern}` pairs matched by exact equality against
//! the pattern reconstructed from each incoming request's input — the
//! command string for command tools, the file path for file tools. No
//! globbing. The set is append-only and persisted as JSON; a rule added in
//! one conversation protects all others immediately, since a single
//! instance is shared through the multiplexer's control loop.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{AppError, Result};

/// One persisted always-allow rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PermissionRule {
    /// Tool the rule applies to.
    pub tool_name: String,
    /// Exact command string or file path the rule matches.
    pub pattern: String,
}

/// Reconstruct the matchable pattern from a tool input.
///
/// Command tools carry a `command` string, file tools a `file_path` (or
/// `path`); anything else falls back to the compact JSON of the whole
/// input, which still gives exact-equality semantics.
#[must_use]
pub fn pattern_for_input(input: &Value) -> String {
    if let Some(command) = input.get("command").and_then(Value::as_str) {
        return command.to_owned();
    }
    if let Some(path) = input
        .get("file_path")
        .or_else(|| input.get("path"))
        .and_then(Value::as_str)
    {
        return path.to_owned();
    }
    input.to_string()
}

/// Append-only ruleset with JSON persistence.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<PermissionRule>,
    path: PathBuf,
}

impl RuleSet {
    /// Load the ruleset from `path`; a missing file yields an empty set.
    ///
    /// A corrupt file is logged and treated as empty rather than refusing
    /// to start — losing trust rules degrades to prompting again.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rules = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(rules) => rules,
                Err(err) => {
                    warn!(path = %path.display(), %err, "permission ruleset is corrupt, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { rules, path }
    }

    /// All persisted rules, in insertion order.
    #[must_use]
    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    /// Append a rule and persist the set. Duplicates are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] when the file write fails; the rule is
    /// still active in memory in that case.
    pub fn add_rule(&mut self, tool_name: &str, pattern: &str) -> Result<()> {
        let rule = PermissionRule {
            tool_name: tool_name.to_owned(),
            pattern: pattern.to_owned(),
        };
        if self.rules.contains(&rule) {
            return Ok(());
        }

        info!(tool_name, pattern, "adding always-allow rule");
        self.rules.push(rule);
        self.save()
    }

    /// Whether a request for `tool_name` with `input` matches a rule.
    ///
    /// Exact string equality only — `npm test` does not match
    /// `npm test --coverage`.
    #[must_use]
    pub fn should_auto_approve(&self, tool_name: &str, input: &Value) -> bool {
        let pattern = pattern_for_input(input);
        self.rules
            .iter()
            .any(|rule| rule.tool_name == tool_name && rule.pattern == pattern)
    }

    /// Path the set persists to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| AppError::Store(format!("cannot create ruleset dir: {err}")))?;
        }
        let raw = serde_json::to_string_pretty(&self.rules)
            .map_err(|err| AppError::Store(format!("cannot serialise ruleset: {err}")))?;
        fs::write(&self.path, raw)
            .map_err(|err| AppError::Store(format!("cannot write ruleset: {err}")))
    }
}
