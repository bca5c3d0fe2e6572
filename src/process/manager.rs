//! Per-conversation process registry.
//!
//! Tracks at most one live agent process per conversation id and exposes
//! the write/liveness/termination primitives the multiplexer builds on.
//! Each spawned process gets three background tasks:
//!
//! - a **reader** driving [`FramedRead`] + [`NdjsonCodec`] over stdout,
//!   forwarding complete lines as [`ProcessEvent::Line`],
//! - a **stderr collector** forwarding each stderr line verbatim,
//! - an **exit monitor** owning the [`Child`]; it emits
//!   [`ProcessEvent::Exited`] on natural exit and runs the
//!   graceful-then-forceful termination sequence when cancelled.
//!
//! Every event carries the conversation id and spawn generation captured
//! at spawn time, so all later asynchronous callbacks attribute data to
//! the right conversation no matter what the user is currently viewing,
//! and leftovers from a superseded process can be told apart from the
//! current one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::codec::NdjsonCodec;
use crate::process::spawner::{self, SpawnConfig};
use crate::{AppError, Result};

// ── Events ───────────────────────────────────────────────────────────────────

/// I/O events emitted by a conversation's process tasks.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// One complete NDJSON line from the agent's stdout.
    Line {
        /// Conversation the process was spawned for.
        conversation_id: String,
        /// Spawn generation of the emitting process.
        generation: u64,
        /// Raw line content without the newline terminator.
        line: String,
    },
    /// One line of stderr output, surfaced verbatim.
    Stderr {
        /// Conversation the process was spawned for.
        conversation_id: String,
        /// Spawn generation of the emitting process.
        generation: u64,
        /// Raw stderr text.
        text: String,
    },
    /// The process exited, for any reason.
    Exited {
        /// Conversation the process was spawned for.
        conversation_id: String,
        /// Spawn generation of the exited process.
        generation: u64,
        /// Exit code when available; `None` for signal termination.
        exit_code: Option<i32>,
    },
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Live process registered for one conversation.
///
/// The owning conversation id is immutable for the handle's lifetime; all
/// event attribution reads from it, never from ambient state.
#[derive(Debug)]
pub struct ProcessHandle {
    conversation_id: String,
    generation: u64,
    session_resumed: Option<String>,
    pid: Option<u32>,
    stdin_tx: mpsc::Sender<serde_json::Value>,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    /// The conversation this process belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Monotonic spawn generation; distinguishes this process from any
    /// earlier one spawned for the same conversation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Session id the process was resumed with, when any.
    #[must_use]
    pub fn resumed_session(&self) -> Option<&str> {
        self.session_resumed.as_deref()
    }

    /// OS process id, when the runtime exposes it.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Best-effort liveness: true until the exit monitor observes exit.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

// ── Manager ──────────────────────────────────────────────────────────────────

/// Registry of live agent processes keyed by conversation id.
#[derive(Debug)]
pub struct ProcessManager {
    processes: HashMap<String, ProcessHandle>,
    event_tx: mpsc::Sender<ProcessEvent>,
    grace_period: Duration,
    next_generation: u64,
}

impl ProcessManager {
    /// Create an empty registry emitting into `event_tx`.
    #[must_use]
    pub fn new(event_tx: mpsc::Sender<ProcessEvent>, grace_period: Duration) -> Self {
        Self {
            processes: HashMap::new(),
            event_tx,
            grace_period,
            next_generation: 1,
        }
    }

    /// Spawn an agent process for `conversation_id` and register it.
    ///
    /// Callers enforce the at-most-one-live-process invariant by
    /// terminating any registered process before respawning; a conflicting
    /// live registration is rejected here as a safety net.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Agent`] on spawn failure or when a live process
    /// is already registered for the conversation.
    pub fn spawn(&mut self, config: &SpawnConfig, conversation_id: &str) -> Result<()> {
        if self.is_conversation_running(conversation_id) {
            return Err(AppError::Agent(format!(
                "conversation {conversation_id} already has a live process"
            )));
        }

        let spawned = spawner::spawn_agent(config, conversation_id)?;
        let generation = self.next_generation;
        self.next_generation += 1;
        let cancel = CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));
        let (stdin_tx, stdin_rx) = mpsc::channel::<serde_json::Value>(64);

        let conversation = conversation_id.to_owned();
        tokio::spawn(run_writer(
            conversation.clone(),
            spawned.stdin,
            stdin_rx,
            cancel.clone(),
        ));
        tokio::spawn(run_reader(
            conversation.clone(),
            generation,
            spawned.stdout,
            self.event_tx.clone(),
            cancel.clone(),
        ));
        tokio::spawn(run_stderr(
            conversation.clone(),
            generation,
            spawned.stderr,
            self.event_tx.clone(),
            cancel.clone(),
        ));
        let monitor = tokio::spawn(monitor_exit(
            conversation,
            generation,
            spawned.child,
            spawned.pid,
            self.event_tx.clone(),
            cancel.clone(),
            Arc::clone(&alive),
            self.grace_period,
        ));

        self.processes.insert(
            conversation_id.to_owned(),
            ProcessHandle {
                conversation_id: conversation_id.to_owned(),
                generation,
                session_resumed: config.resume_session_id.clone(),
                pid: spawned.pid,
                stdin_tx,
                cancel,
                alive,
                monitor: Some(monitor),
            },
        );

        Ok(())
    }

    /// Whether an event generation is stale for the conversation.
    ///
    /// Stale means a process from a *later* spawn is registered: the event
    /// is a leftover from a superseded process whose events must not touch
    /// the conversation's state. An event with no registered handle is not
    /// stale — the handle may already have been reaped after exit.
    #[must_use]
    pub fn is_stale_event(&self, conversation_id: &str, generation: u64) -> bool {
        self.processes
            .get(conversation_id)
            .is_some_and(|handle| handle.generation != generation)
    }

    /// Whether the conversation currently has a live registered process.
    #[must_use]
    pub fn is_conversation_running(&self, conversation_id: &str) -> bool {
        self.processes
            .get(conversation_id)
            .is_some_and(ProcessHandle::is_alive)
    }

    /// Conversation ids with a registered process, live or draining.
    #[must_use]
    pub fn get_active_conversation_ids(&self) -> Vec<String> {
        self.processes.keys().cloned().collect()
    }

    /// The registered handle for a conversation, when any.
    #[must_use]
    pub fn get_process_for_conversation(&self, conversation_id: &str) -> Option<&ProcessHandle> {
        self.processes.get(conversation_id)
    }

    /// Send one JSON message to the conversation's stdin.
    ///
    /// Returns a best-effort liveness boolean — `true` means the message
    /// was queued for a process believed alive, not that it was delivered.
    pub async fn write_to_conversation(
        &self,
        conversation_id: &str,
        message: serde_json::Value,
    ) -> bool {
        let Some(handle) = self.processes.get(conversation_id) else {
            return false;
        };
        if !handle.is_alive() {
            return false;
        }
        handle.stdin_tx.send(message).await.is_ok()
    }

    /// Terminate the conversation's process: graceful shutdown first,
    /// escalating to a forceful kill after the grace period.
    ///
    /// Returns `true` when a process was registered for the conversation.
    /// Waits for the exit monitor to finish its termination sequence, so
    /// a respawn immediately afterwards cannot race the old process.
    pub async fn terminate_conversation(&mut self, conversation_id: &str) -> bool {
        let Some(mut handle) = self.processes.remove(conversation_id) else {
            return false;
        };

        info!(conversation_id, "terminating conversation process");
        handle.cancel.cancel();

        if let Some(monitor) = handle.monitor.take() {
            if let Err(err) = monitor.await {
                warn!(conversation_id, %err, "exit monitor task failed");
            }
        }
        true
    }

    /// Terminate every tracked conversation, for global shutdown.
    pub async fn terminate_all_conversations(&mut self) {
        let ids: Vec<String> = self.processes.keys().cloned().collect();
        for id in ids {
            self.terminate_conversation(&id).await;
        }
    }

    /// Drop the registry entry for an exited process without signalling.
    ///
    /// Called by the event loop after [`ProcessEvent::Exited`] so the map
    /// does not accumulate dead handles.
    pub fn reap(&mut self, conversation_id: &str) {
        if let Some(handle) = self.processes.get(conversation_id) {
            if !handle.is_alive() {
                self.processes.remove(conversation_id);
            }
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────────────

/// Writer task — serialises outbound JSON messages and writes NDJSON lines
/// to the agent's stdin. Dropping stdin on exit signals EOF to the agent.
async fn run_writer(
    conversation_id: String,
    mut stdin: ChildStdin,
    mut msg_rx: mpsc::Receiver<serde_json::Value>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(conversation_id, "writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!(conversation_id, "writer: message channel closed, stopping");
                    break;
                };
                let Ok(mut bytes) = serde_json::to_vec(&value) else {
                    warn!(conversation_id, "writer: failed to serialise outbound message");
                    continue;
                };
                bytes.push(b'\n');
                if let Err(err) = stdin.write_all(&bytes).await {
                    warn!(conversation_id, %err, "writer: write to stdin failed");
                    break;
                }
            }
        }
    }
}

/// Reader task — frames stdout into lines and forwards them as events.
///
/// Framing errors (oversized lines) are logged and skipped; I/O errors and
/// EOF stop the task. Exit signalling is the monitor's job, not the
/// reader's.
async fn run_reader(
    conversation_id: String,
    generation: u64,
    stdout: ChildStdout,
    event_tx: mpsc::Sender<ProcessEvent>,
    cancel: CancellationToken,
) {
    let mut framed = FramedRead::new(stdout, NdjsonCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(conversation_id, "reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(conversation_id, "reader: EOF detected");
                        break;
                    }
                    Some(Err(AppError::Protocol(ref msg))) => {
                        warn!(conversation_id, error = msg.as_str(), "reader: framing error, skipping");
                    }
                    Some(Err(err)) => {
                        warn!(conversation_id, %err, "reader: IO error, stopping");
                        break;
                    }
                    Some(Ok(line)) => {
                        let event = ProcessEvent::Line {
                            conversation_id: conversation_id.clone(),
                            generation,
                            line,
                        };
                        if event_tx.send(event).await.is_err() {
                            debug!(conversation_id, "reader: event channel closed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Stderr collector — forwards each stderr line verbatim.
async fn run_stderr(
    conversation_id: String,
    generation: u64,
    stderr: ChildStderr,
    event_tx: mpsc::Sender<ProcessEvent>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(stderr).lines();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        let event = ProcessEvent::Stderr {
                            conversation_id: conversation_id.clone(),
                            generation,
                            text,
                        };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }
}

/// Exit monitor — owns the child and emits [`ProcessEvent::Exited`].
///
/// On cancellation it runs the termination sequence: signal the process
/// group (reaching descendants across process-tree topologies), wait out
/// the grace period, then force-kill the direct child as a fallback.
#[allow(clippy::too_many_arguments)] // Plain task parameters, not a builder surface.
async fn monitor_exit(
    conversation_id: String,
    generation: u64,
    mut child: Child,
    pid: Option<u32>,
    event_tx: mpsc::Sender<ProcessEvent>,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
    grace_period: Duration,
) {
    let exit_code = tokio::select! {
        result = child.wait() => {
            match result {
                Ok(status) => status.code(),
                Err(err) => {
                    warn!(conversation_id, %err, "error waiting for agent child process");
                    None
                }
            }
        }
        () = cancel.cancelled() => {
            terminate_child(&conversation_id, &mut child, pid, grace_period).await
        }
    };

    alive.store(false, Ordering::SeqCst);

    let event = ProcessEvent::Exited {
        conversation_id: conversation_id.clone(),
        generation,
        exit_code,
    };
    if event_tx.send(event).await.is_err() {
        debug!(
            conversation_id,
            "event channel closed before Exited could be delivered"
        );
    }
}

/// Graceful-then-forceful termination of the child's process tree.
async fn terminate_child(
    conversation_id: &str,
    child: &mut Child,
    pid: Option<u32>,
    grace_period: Duration,
) -> Option<i32> {
    // Ask the whole group to stop first. Signalling only the top-level
    // handle may not reach descendants when the agent is launched through
    // a compat indirection layer.
    signal_group_term(pid);

    match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(Ok(status)) => {
            info!(conversation_id, ?status, "agent exited within grace period");
            return status.code();
        }
        Ok(Err(err)) => {
            warn!(conversation_id, %err, "error waiting for agent during grace period");
        }
        Err(_elapsed) => {
            warn!(
                conversation_id,
                "agent did not exit within grace period, forcing kill"
            );
        }
    }

    signal_group_kill(pid);
    if let Err(err) = child.kill().await {
        warn!(conversation_id, %err, "failed to force-kill agent process");
    }
    None
}

#[cfg(unix)]
fn signal_group_term(pid: Option<u32>) {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(unix)]
fn signal_group_kill(pid: Option<u32>) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

/// Send `signal` to the child's process group. The child was spawned with
/// `process_group(0)`, so its pid doubles as the group id.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(err) = nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pid), signal) {
        debug!(pid, %err, "process-group signal failed");
    }
}

#[cfg(not(unix))]
fn signal_group_term(_pid: Option<u32>) {}

#[cfg(not(unix))]
fn signal_group_kill(_pid: Option<u32>) {}
