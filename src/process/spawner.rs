//! Agent process spawner.
//!
//! Builds the agent command line (required stream-protocol flags plus the
//! optional permission/model/resume flags), applies the platform-compat
//! indirection when configured, and spawns one headless process per
//! conversation turn with:
//! - `kill_on_drop(true)` so processes are cleaned up automatically,
//! - its own process group on Unix, so termination can reach the whole
//!   process tree and not just the top-level handle.

use std::path::PathBuf;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::config::{CompatConfig, GlobalConfig, PermissionMode};
use crate::process::compat;
use crate::{AppError, Result};

/// Configuration for spawning one agent turn.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Agent CLI binary (e.g. `claude`).
    pub binary: String,
    /// Extra arguments appended after the protocol flags.
    pub extra_args: Vec<String>,
    /// Working directory for the agent process.
    pub workspace_root: PathBuf,
    /// Model selection forwarded via `--model`, when set.
    pub model: Option<String>,
    /// Permission-handling mode.
    pub permission_mode: PermissionMode,
    /// Supplementary tool-server configuration path.
    pub mcp_config: Option<PathBuf>,
    /// Session id to resume, carried via `--resume`.
    pub resume_session_id: Option<String>,
    /// Platform-compat launcher settings.
    pub compat: CompatConfig,
}

impl SpawnConfig {
    /// Derive a spawn configuration from the global config.
    #[must_use]
    pub fn from_global(config: &GlobalConfig, resume_session_id: Option<String>) -> Self {
        Self {
            binary: config.agent_binary.clone(),
            extra_args: config.agent_args.clone(),
            workspace_root: config.effective_workspace_root(),
            model: config.model.clone(),
            permission_mode: config.permission_mode,
            mcp_config: config.mcp_config.clone(),
            resume_session_id,
            compat: config.compat.clone(),
        }
    }

    /// Build the full argument vector for one turn.
    ///
    /// Required flags establish non-interactive batch mode, stream-json on
    /// both directions, verbose internal logging, and partial/incremental
    /// events. Optional flags follow, then any configured extras.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--print".into(),
            "--input-format".into(),
            "stream-json".into(),
            "--output-format".into(),
            "stream-json".into(),
            "--verbose".into(),
            "--include-partial-messages".into(),
        ];

        match self.permission_mode {
            PermissionMode::Bypass => args.push("--dangerously-skip-permissions".into()),
            PermissionMode::Delegate => {
                args.push("--permission-prompt-tool".into());
                args.push("stdio".into());
            }
        }

        if let Some(ref path) = self.mcp_config {
            args.push("--mcp-config".into());
            let raw = path.to_string_lossy().into_owned();
            args.push(if self.compat.enabled {
                compat::to_compat_path(&raw)
            } else {
                raw
            });
        }

        if let Some(ref model) = self.model {
            args.push("--model".into());
            args.push(model.clone());
        }

        if let Some(ref session_id) = self.resume_session_id {
            args.push("--resume".into());
            args.push(session_id.clone());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// The executable/arguments pair actually handed to the OS, after the
    /// compat indirection is applied.
    #[must_use]
    pub fn resolve_invocation(&self) -> (String, Vec<String>) {
        let args = self.build_args();
        if self.compat.enabled {
            compat::wrap_command(&self.compat.launcher, &self.binary, &args)
        } else {
            (self.binary.clone(), args)
        }
    }
}

/// Raw stdio handles for a freshly spawned agent process.
#[derive(Debug)]
pub struct SpawnedAgent {
    /// Child process handle — kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Agent's stdin for sending NDJSON messages.
    pub stdin: ChildStdin,
    /// Agent's stdout carrying the NDJSON event stream.
    pub stdout: ChildStdout,
    /// Agent's stderr, surfaced verbatim into the owning conversation.
    pub stderr: ChildStderr,
    /// OS process id, when the runtime exposes it.
    pub pid: Option<u32>,
}

/// Spawn one agent process for a conversation turn.
///
/// # Errors
///
/// - `AppError::Agent("agent binary … is not installed")` — the executable
///   was not found; surfaced as an actionable prompt, not a raw error.
/// - `AppError::Agent("failed to spawn agent: …")` — any other OS failure.
/// - `AppError::Agent("failed to capture agent …")` — piped stdio missing.
pub fn spawn_agent(config: &SpawnConfig, conversation_id: &str) -> Result<SpawnedAgent> {
    let (program, args) = config.resolve_invocation();

    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .current_dir(&config.workspace_root)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    // Own process group so termination reaches descendants, not just the
    // top-level handle.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::Agent(format!(
                "agent binary `{program}` is not installed or not on PATH"
            ))
        } else {
            AppError::Agent(format!("failed to spawn agent: {err}"))
        }
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Agent("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Agent("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Agent("failed to capture agent stderr".into()))?;

    let pid = child.id();
    info!(conversation_id, program, ?pid, "agent process spawned");

    Ok(SpawnedAgent {
        child,
        stdin,
        stdout,
        stderr,
        pid,
    })
}
