//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// How tool-permission requests from the agent are handled.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Every risky tool use is routed back over stdio for mediation.
    #[default]
    Delegate,
    /// The agent approves everything itself; no control-loop traffic.
    Bypass,
}

/// Idle-watcher thresholds. The watcher only observes silence for UI
/// purposes; it never terminates a process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IdleConfig {
    /// Whether the idle watcher is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Silence threshold before an idle notice is emitted.
    #[serde(default = "default_idle_threshold")]
    pub threshold_seconds: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_seconds: default_idle_threshold(),
        }
    }
}

/// Platform-compatibility indirection for launching the agent through an
/// alternate OS layer (e.g. WSL from a Windows host).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct CompatConfig {
    /// Whether the launcher indirection is applied at spawn time.
    #[serde(default)]
    pub enabled: bool,
    /// Launcher executable that wraps the agent binary (e.g. `wsl.exe`).
    #[serde(default = "default_compat_launcher")]
    pub launcher: String,
}

fn default_true() -> bool {
    true
}

fn default_idle_threshold() -> u64 {
    120
}

fn default_compat_launcher() -> String {
    "wsl.exe".into()
}

fn default_agent_binary() -> String {
    "claude".into()
}

fn default_grace_period_seconds() -> u64 {
    5
}

fn default_max_conversations() -> u32 {
    50
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".agent-console")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Agent CLI binary (e.g. `claude`).
    #[serde(default = "default_agent_binary")]
    pub agent_binary: String,
    /// Extra arguments appended after the required protocol flags.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Model selection forwarded to the agent, when set.
    #[serde(default)]
    pub model: Option<String>,
    /// Permission-handling mode for spawned turns.
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Path to a supplementary tool-server configuration file.
    #[serde(default)]
    pub mcp_config: Option<PathBuf>,
    /// Directory holding persisted conversations and the permission ruleset.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Working directory for spawned agent processes; defaults to cwd.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    /// Grace period before a terminating process is force-killed.
    #[serde(default = "default_grace_period_seconds")]
    pub grace_period_seconds: u64,
    /// Conversation count beyond which older conversations are archived.
    #[serde(default = "default_max_conversations")]
    pub max_conversations: u32,
    /// Idle-watcher thresholds.
    #[serde(default)]
    pub idle: IdleConfig,
    /// Platform-compatibility launcher settings.
    #[serde(default)]
    pub compat: CompatConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the persisted permission ruleset.
    #[must_use]
    pub fn rules_path(&self) -> PathBuf {
        self.data_dir.join("permission_rules.json")
    }

    /// Directory holding one JSON file per conversation plus the index.
    #[must_use]
    pub fn conversations_dir(&self) -> PathBuf {
        self.data_dir.join("conversations")
    }

    /// Working directory for spawned agents, defaulting to the current one.
    #[must_use]
    pub fn effective_workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn validate(&self) -> Result<()> {
        if self.agent_binary.trim().is_empty() {
            return Err(AppError::Config("agent_binary must not be empty".into()));
        }
        if self.max_conversations == 0 {
            return Err(AppError::Config(
                "max_conversations must be greater than zero".into(),
            ));
        }
        if self.compat.enabled && self.compat.launcher.trim().is_empty() {
            return Err(AppError::Config(
                "compat.launcher must not be empty when compat is enabled".into(),
            ));
        }
        Ok(())
    }
}
