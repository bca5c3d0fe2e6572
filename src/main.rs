#![forbid(unsafe_code)]

//! `agent-console` — interactive console front end for the conversation
//! engine.
//!
//! Bootstraps configuration, starts the conversation multiplexer control
//! loop, and bridges stdin lines and multiplexer events to the terminal.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_console::conversations::{Command, ConversationMultiplexer, UiEvent};
use agent_console::permissions::{PendingPermissionRequest, PermissionPrompt, RequestKind};
use agent_console::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-console", about = "Concurrent agent conversation console", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (defaults apply when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the workspace root the agent is started in.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Override the model passed to the agent.
    #[arg(long)]
    model: Option<String>,

    /// Reopen the persisted conversation with this id instead of starting
    /// a new one; its stored agent session is resumed on the next turn.
    #[arg(long, value_name = "CONVERSATION_ID")]
    resume: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-console bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::from_toml_str("")?,
    };
    if let Some(workspace) = args.workspace {
        let canonical = workspace
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
        config.workspace_root = Some(canonical);
    }
    if let Some(model) = args.model {
        config.model = Some(model);
    }
    info!("configuration loaded");

    // ── Start the multiplexer control loop ──────────────
    let (ui_tx, mut ui_rx) = mpsc::channel(256);
    let (command_tx, command_rx) = mpsc::channel(64);

    let mut multiplexer = ConversationMultiplexer::new(config, ui_tx)?;
    let conversation_id = match args.resume {
        Some(id) => {
            multiplexer.ensure_conversation(&id).await;
            id
        }
        None => multiplexer.create_conversation().await,
    };
    multiplexer.attach(&conversation_id).await;
    info!(conversation_id, "conversation opened");

    let loop_handle = tokio::spawn(multiplexer.run(command_rx));

    // Translate process signals into a shutdown command.
    let signal_tx = command_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(Command::Shutdown).await;
    });

    // ── Console loop ────────────────────────────────────
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_prompt: Option<PendingPermissionRequest> = None;

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        handle_input(&command_tx, &conversation_id, &mut pending_prompt, text.trim())
                            .await;
                    }
                    Ok(None) => {
                        let _ = command_tx.send(Command::Shutdown).await;
                    }
                    Err(err) => {
                        error!(%err, "stdin read failed");
                        let _ = command_tx.send(Command::Shutdown).await;
                    }
                }
            }
            event = ui_rx.recv() => {
                match event {
                    Some(UiEvent::ShutdownComplete) | None => break,
                    Some(event) => render_event(event, &mut pending_prompt),
                }
            }
        }
    }

    if let Err(err) = loop_handle.await {
        error!(%err, "control loop task failed");
    }
    info!("agent-console shut down");
    Ok(())
}

/// Interpret one console line: a prompt answer, a slash command, or a
/// user turn.
async fn handle_input(
    command_tx: &mpsc::Sender<Command>,
    conversation_id: &str,
    pending_prompt: &mut Option<PendingPermissionRequest>,
    text: &str,
) {
    if text.is_empty() {
        return;
    }

    if let Some(pending) = pending_prompt.take() {
        let command = match pending.kind {
            RequestKind::ToolPermission => match text {
                "y" | "yes" => Command::PermissionResponse {
                    request_id: pending.request_id,
                    approved: true,
                    always_allow: false,
                },
                "a" | "always" => Command::PermissionResponse {
                    request_id: pending.request_id,
                    approved: true,
                    always_allow: true,
                },
                _ => Command::PermissionResponse {
                    request_id: pending.request_id,
                    approved: false,
                    always_allow: false,
                },
            },
            RequestKind::Question => Command::QuestionResponse {
                request_id: pending.request_id,
                answers: serde_json::from_str(text).unwrap_or_else(|_| json!(text)),
            },
        };
        let _ = command_tx.send(command).await;
        return;
    }

    let command = match text {
        "/quit" => Command::Shutdown,
        "/stop" => Command::StopTurn {
            conversation_id: conversation_id.to_owned(),
        },
        "/resend" => Command::ResendPending,
        _ => Command::SendTurn {
            conversation_id: conversation_id.to_owned(),
            text: text.to_owned(),
        },
    };
    let _ = command_tx.send(command).await;
}

/// Print one multiplexer event to the terminal.
fn render_event(event: UiEvent, pending_prompt: &mut Option<PendingPermissionRequest>) {
    match event {
        UiEvent::SessionStarted { session_id, .. } => {
            info!(session_id, "agent session started");
        }
        UiEvent::TextDelta { text, .. } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        UiEvent::MessageCompleted { .. } => {
            println!();
        }
        UiEvent::ToolUse { tool_name, .. } => {
            println!("[tool] {tool_name}");
        }
        UiEvent::Prompt(prompt) => {
            let pending = match prompt {
                PermissionPrompt::Permission(pending) => {
                    println!(
                        "[permission] {} {} — [y]es / [n]o / [a]lways",
                        pending.tool_name, pending.input
                    );
                    pending
                }
                PermissionPrompt::Question(pending) => {
                    println!("[question] {}", pending.input);
                    pending
                }
            };
            *pending_prompt = Some(pending);
        }
        UiEvent::AccountInfo { record, .. } => {
            debug!(%record, "account info");
        }
        UiEvent::TurnCompleted { .. } => {
            println!("• turn complete");
        }
        UiEvent::ErrorMessage { message, .. } => {
            eprintln!("[error] {message}");
        }
        UiEvent::Replay {
            buffer, processing, ..
        } => {
            if !buffer.is_empty() {
                print!("{buffer}");
                let _ = std::io::stdout().flush();
            }
            if processing {
                println!("… (turn in progress)");
            }
        }
        UiEvent::Idle {
            idle_seconds, ..
        } => {
            println!("[idle] no agent output for {idle_seconds}s");
        }
        UiEvent::IdleRecovered { .. } => {
            println!("[idle] agent output resumed");
        }
        UiEvent::ShutdownComplete => {}
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
