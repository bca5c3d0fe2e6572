//! Conversation multiplexer.
//!
//! Owns the per-conversation registry (message log, usage totals,
//! streaming buffer, processing flag) and coordinates the process
//! manager, stream parser, and permission handler per conversation. Any
//! number of conversations can be processing simultaneously with full
//! isolation: every process event carries the conversation id and spawn
//! generation captured at spawn time, and all state is mutated by the
//! single control loop in [`ConversationMultiplexer::run`], so no locking
//! is needed. Events from a superseded spawn generation are discarded.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::conversations::idle::{IdleEvent, IdleWatcher, IdleWatcherHandle};
use crate::conversations::model::{Conversation, MessageKind};
use crate::conversations::store::{ConversationStore, ConversationSummary};
use crate::permissions::handler::{PermissionHandler, PermissionPrompt};
use crate::permissions::rules::RuleSet;
use crate::process::manager::{ProcessEvent, ProcessManager};
use crate::process::spawner::SpawnConfig;
use crate::protocol::events::{self, ControlRequest};
use crate::protocol::outbound;
use crate::protocol::parser::{StreamObserver, StreamParser};
use crate::Result;

// ── Commands & UI events ─────────────────────────────────────────────────────

/// Operations the front end submits to the control loop.
#[derive(Debug)]
pub enum Command {
    /// Start a turn: send one user message on a conversation.
    SendTurn {
        /// Target conversation.
        conversation_id: String,
        /// User message text.
        text: String,
    },
    /// Explicitly stop the conversation's in-flight turn.
    StopTurn {
        /// Target conversation.
        conversation_id: String,
    },
    /// Resolve a pending permission request.
    PermissionResponse {
        /// Request being resolved.
        request_id: String,
        /// Whether the tool use is approved.
        approved: bool,
        /// Persist an always-allow rule before responding.
        always_allow: bool,
    },
    /// Resolve a pending question with its answer map.
    QuestionResponse {
        /// Request being resolved.
        request_id: String,
        /// Answers keyed by question id.
        answers: Value,
    },
    /// Re-emit prompts for every pending permission entry.
    ResendPending,
    /// Attach to a conversation: replay its streaming state, mark read.
    Attach {
        /// Target conversation.
        conversation_id: String,
    },
    /// Terminate all conversations and exit the control loop.
    Shutdown,
}

/// Events the control loop emits for presentation.
#[derive(Debug)]
pub enum UiEvent {
    /// The agent issued its session handle.
    SessionStarted {
        /// Conversation the session belongs to.
        conversation_id: String,
        /// Opaque session id for later resumption.
        session_id: String,
    },
    /// Incremental assistant text.
    TextDelta {
        /// Owning conversation.
        conversation_id: String,
        /// Text fragment.
        text: String,
    },
    /// A completed assistant message was committed to the log.
    MessageCompleted {
        /// Owning conversation.
        conversation_id: String,
        /// Full message text.
        text: String,
    },
    /// The agent invoked a tool.
    ToolUse {
        /// Owning conversation.
        conversation_id: String,
        /// Tool name.
        tool_name: String,
        /// Tool input.
        input: Value,
    },
    /// A permission or question prompt needs the user's decision.
    Prompt(PermissionPrompt),
    /// Account/subscription information from the agent.
    AccountInfo {
        /// Owning conversation.
        conversation_id: String,
        /// Raw record.
        record: Value,
    },
    /// The conversation's turn finished.
    TurnCompleted {
        /// Owning conversation.
        conversation_id: String,
    },
    /// An error entry was appended to the transcript.
    ErrorMessage {
        /// Owning conversation.
        conversation_id: String,
        /// Error text.
        message: String,
    },
    /// Streaming-state replay for a re-attached conversation: the full
    /// accumulated buffer as one chunk, plus the live-processing flag.
    Replay {
        /// Conversation being attached.
        conversation_id: String,
        /// Accumulated in-progress text.
        buffer: String,
        /// Whether a turn is still in flight.
        processing: bool,
    },
    /// The agent has been silent past the idle threshold (UI only).
    Idle {
        /// Owning conversation.
        conversation_id: String,
        /// Seconds of observed silence.
        idle_seconds: u64,
    },
    /// The agent resumed output after an idle notice.
    IdleRecovered {
        /// Owning conversation.
        conversation_id: String,
    },
    /// All conversations terminated; the control loop is exiting.
    ShutdownComplete,
}

// ── Parsed-event collection ──────────────────────────────────────────────────

/// One classified event from a conversation's stream, staged for routing.
#[derive(Debug)]
enum TurnEvent {
    SessionStart(String),
    TextDelta(String),
    Message(String),
    ToolUse {
        name: String,
        input: Value,
        tool_use_id: Option<String>,
    },
    ToolResult(Value),
    ControlRequest(ControlRequest),
    AccountInfo(Value),
    TokenUsage { input_tokens: u64, output_tokens: u64 },
    Cost(f64),
    TurnResult(Value),
    Error(String),
}

/// Observer implementation staging parser callbacks for the control loop.
///
/// The parser is borrowed separately from the conversation registry, so
/// events are collected first and applied after the parse call returns.
#[derive(Debug, Default)]
struct TurnEventCollector {
    events: Vec<TurnEvent>,
}

impl StreamObserver for TurnEventCollector {
    fn on_session_start(&mut self, session_id: &str) {
        self.events.push(TurnEvent::SessionStart(session_id.to_owned()));
    }

    fn on_text_delta(&mut self, text: &str) {
        self.events.push(TurnEvent::TextDelta(text.to_owned()));
    }

    fn on_message(&mut self, text: &str) {
        self.events.push(TurnEvent::Message(text.to_owned()));
    }

    fn on_tool_use(&mut self, name: &str, input: &Value, tool_use_id: Option<&str>) {
        self.events.push(TurnEvent::ToolUse {
            name: name.to_owned(),
            input: input.clone(),
            tool_use_id: tool_use_id.map(str::to_owned),
        });
    }

    fn on_tool_result(&mut self, record: &Value) {
        self.events.push(TurnEvent::ToolResult(record.clone()));
    }

    fn on_control_request(&mut self, request: &ControlRequest) {
        self.events.push(TurnEvent::ControlRequest(request.clone()));
    }

    fn on_account_info(&mut self, record: &Value) {
        self.events.push(TurnEvent::AccountInfo(record.clone()));
    }

    fn on_token_usage(&mut self, input_tokens: u64, output_tokens: u64) {
        self.events.push(TurnEvent::TokenUsage {
            input_tokens,
            output_tokens,
        });
    }

    fn on_cost_update(&mut self, cost_usd: f64) {
        self.events.push(TurnEvent::Cost(cost_usd));
    }

    fn on_result(&mut self, record: &Value) {
        self.events.push(TurnEvent::TurnResult(record.clone()));
    }

    fn on_error(&mut self, message: &str) {
        self.events.push(TurnEvent::Error(message.to_owned()));
    }
}

// ── Multiplexer ──────────────────────────────────────────────────────────────

/// Owns all per-conversation state and the collaborating components.
#[derive(Debug)]
pub struct ConversationMultiplexer {
    config: GlobalConfig,
    conversations: HashMap<String, Conversation>,
    parsers: HashMap<String, StreamParser>,
    idle_watchers: HashMap<String, IdleWatcherHandle>,
    manager: ProcessManager,
    permissions: PermissionHandler,
    store: ConversationStore,
    process_rx: mpsc::Receiver<ProcessEvent>,
    idle_tx: mpsc::Sender<IdleEvent>,
    idle_rx: mpsc::Receiver<IdleEvent>,
    ui_tx: mpsc::Sender<UiEvent>,
}

impl ConversationMultiplexer {
    /// Build a multiplexer over the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`](crate::AppError::Store) when the
    /// conversation directory cannot be created.
    pub fn new(config: GlobalConfig, ui_tx: mpsc::Sender<UiEvent>) -> Result<Self> {
        let (process_tx, process_rx) = mpsc::channel(256);
        let (idle_tx, idle_rx) = mpsc::channel(64);

        let store = ConversationStore::new(config.conversations_dir())?;
        let rules = RuleSet::load(config.rules_path());
        let manager = ProcessManager::new(
            process_tx,
            Duration::from_secs(config.grace_period_seconds),
        );

        Ok(Self {
            config,
            conversations: HashMap::new(),
            parsers: HashMap::new(),
            idle_watchers: HashMap::new(),
            manager,
            permissions: PermissionHandler::new(rules),
            store,
            process_rx,
            idle_tx,
            idle_rx,
            ui_tx,
        })
    }

    /// Create a new conversation and return its id.
    ///
    /// Archives over-count conversations per the configured limit.
    pub async fn create_conversation(&mut self) -> String {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.conversations.insert(id.clone(), conversation);
        self.parsers.insert(id.clone(), StreamParser::new());

        let max = usize::try_from(self.config.max_conversations).unwrap_or(usize::MAX);
        if let Err(err) = self.store.prune_to(max).await {
            warn!(%err, "conversation prune failed");
        }
        id
    }

    /// Bring a conversation into memory, loading from the store if needed
    /// and creating it fresh (under the given id) when unknown anywhere.
    pub async fn ensure_conversation(&mut self, conversation_id: &str) {
        if self.conversations.contains_key(conversation_id) {
            return;
        }
        let conversation = match self.store.load(conversation_id).await {
            Ok(loaded) => loaded,
            Err(_) => {
                let mut fresh = Conversation::new();
                fresh.id = conversation_id.to_owned();
                fresh
            }
        };
        self.conversations
            .insert(conversation_id.to_owned(), conversation);
        self.parsers
            .entry(conversation_id.to_owned())
            .or_insert_with(StreamParser::new);
    }

    /// Read access to a conversation's state.
    #[must_use]
    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.get(conversation_id)
    }

    /// Mutable access to a conversation's state, for embedding callers.
    pub fn conversation_mut(&mut self, conversation_id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(conversation_id)
    }

    /// List persisted conversation summaries, newest first.
    pub async fn list_conversations(&self) -> Vec<ConversationSummary> {
        self.store.list().await
    }

    /// The process registry (observability).
    #[must_use]
    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    /// The permission handler (observability).
    #[must_use]
    pub fn permissions(&self) -> &PermissionHandler {
        &self.permissions
    }

    // ── Turn lifecycle ───────────────────────────────────────────────────────

    /// Start a turn on one conversation.
    ///
    /// If that specific conversation already has a live process it is
    /// terminated first and its partial streamed text finalized into the
    /// log; other conversations are unaffected. The conversation id is
    /// bound immutably to the new process handle at spawn time, so every
    /// later asynchronous event attributes correctly even if the user's
    /// viewed conversation changes mid-flight.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Agent`](crate::AppError::Agent) when the agent
    /// process cannot be spawned.
    pub async fn send_turn(&mut self, conversation_id: &str, text: &str) -> Result<()> {
        self.ensure_conversation(conversation_id).await;

        // A registered handle, live or exited-but-undrained, means the
        // previous turn still owns this conversation's state; close it out
        // before the new spawn takes over.
        if self
            .manager
            .get_process_for_conversation(conversation_id)
            .is_some()
        {
            info!(conversation_id, "superseding in-flight turn");
            self.manager.terminate_conversation(conversation_id).await;
            self.finalize_turn(conversation_id).await;
        }

        let resume_session = {
            // Registry entry exists after ensure_conversation.
            let Some(conversation) = self.conversations.get_mut(conversation_id) else {
                return Ok(());
            };
            conversation.append(MessageKind::User, json!({ "text": text }));
            conversation.is_active = true;
            conversation.processing = true;
            conversation.end_time = None;
            conversation.session_id.clone()
        };

        let spawn_config = SpawnConfig::from_global(&self.config, resume_session);
        self.manager.spawn(&spawn_config, conversation_id)?;
        // Fresh parser state per turn, including the session-start latch.
        self.parsers
            .entry(conversation_id.to_owned())
            .or_insert_with(StreamParser::new)
            .reset();
        self.permissions
            .set_default_conversation(Some(conversation_id.to_owned()));

        let envelope = outbound::user_turn(text, None);
        if !self
            .manager
            .write_to_conversation(conversation_id, envelope)
            .await
        {
            warn!(conversation_id, "user turn write failed at spawn");
        }

        if self.config.idle.enabled {
            let watcher = IdleWatcher::new(
                conversation_id.to_owned(),
                Duration::from_secs(self.config.idle.threshold_seconds),
                self.idle_tx.clone(),
                CancellationToken::new(),
            );
            self.idle_watchers
                .insert(conversation_id.to_owned(), watcher.spawn());
        }

        self.persist(conversation_id).await;
        Ok(())
    }

    /// Explicitly stop a conversation's in-flight turn.
    ///
    /// Any partial streamed text is committed to the log — never silently
    /// discarded. Other conversations are unaffected.
    pub async fn stop_turn(&mut self, conversation_id: &str) {
        if self.manager.terminate_conversation(conversation_id).await {
            info!(conversation_id, "turn stopped by user");
        }
        self.finalize_turn(conversation_id).await;
    }

    /// Attach to a conversation: replay its accumulated streaming buffer
    /// as one chunk and clear the unread marker.
    pub async fn attach(&mut self, conversation_id: &str) {
        self.ensure_conversation(conversation_id).await;
        let Some(conversation) = self.conversations.get_mut(conversation_id) else {
            return;
        };
        conversation.has_new_messages = false;
        let event = UiEvent::Replay {
            conversation_id: conversation_id.to_owned(),
            buffer: conversation.streaming_buffer.clone(),
            processing: conversation.processing,
        };
        self.emit(event).await;
    }

    /// Terminate every conversation's process and persist final state.
    pub async fn shutdown(&mut self) {
        info!("multiplexer shutting down");
        self.manager.terminate_all_conversations().await;

        let ids: Vec<String> = self.conversations.keys().cloned().collect();
        for id in ids {
            self.finalize_turn(&id).await;
        }
        self.permissions.cancel_all();
        self.emit(UiEvent::ShutdownComplete).await;
    }

    // ── Control loop ─────────────────────────────────────────────────────────

    /// Drive the single control loop until shutdown.
    ///
    /// Reacts to front-end commands, process I/O events, and idle notices.
    /// All conversation state is mutated here and nowhere else.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<Command>) {
        #[derive(Debug)]
        enum Step {
            Cmd(Option<Command>),
            Proc(Option<ProcessEvent>),
            Idle(Option<IdleEvent>),
        }

        loop {
            let step = tokio::select! {
                cmd = command_rx.recv() => Step::Cmd(cmd),
                event = self.process_rx.recv() => Step::Proc(event),
                event = self.idle_rx.recv() => Step::Idle(event),
            };

            match step {
                Step::Cmd(None | Some(Command::Shutdown)) => {
                    self.shutdown().await;
                    break;
                }
                Step::Cmd(Some(command)) => self.handle_command(command).await,
                Step::Proc(Some(event)) => self.handle_process_event(event).await,
                Step::Idle(Some(event)) => self.handle_idle_event(event).await,
                // The multiplexer holds senders for both channels, so
                // closure only happens during teardown.
                Step::Proc(None) | Step::Idle(None) => break,
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendTurn {
                conversation_id,
                text,
            } => {
                if let Err(err) = self.send_turn(&conversation_id, &text).await {
                    let message = err.to_string();
                    self.append_error(&conversation_id, &message).await;
                }
            }
            Command::StopTurn { conversation_id } => self.stop_turn(&conversation_id).await,
            Command::PermissionResponse {
                request_id,
                approved,
                always_allow,
            } => {
                if let Err(err) = self
                    .permissions
                    .handle_permission_response(&self.manager, &request_id, approved, always_allow)
                    .await
                {
                    warn!(request_id, %err, "rule persistence failed");
                }
            }
            Command::QuestionResponse {
                request_id,
                answers,
            } => {
                self.permissions
                    .handle_user_question_response(&self.manager, &request_id, &answers)
                    .await;
            }
            Command::ResendPending => {
                for prompt in self.permissions.resend_pending_permissions() {
                    self.emit(UiEvent::Prompt(prompt)).await;
                }
            }
            Command::Attach { conversation_id } => self.attach(&conversation_id).await,
            Command::Shutdown => {}
        }
    }

    /// Route one I/O event from a conversation's process tasks.
    ///
    /// Events from a superseded spawn generation are dropped: terminating
    /// an old process queues its `Exited` (and possibly trailing output)
    /// behind the respawn, and those leftovers must not touch the new
    /// turn's state.
    pub async fn handle_process_event(&mut self, event: ProcessEvent) {
        let (event_conversation, event_generation) = match &event {
            ProcessEvent::Line {
                conversation_id,
                generation,
                ..
            }
            | ProcessEvent::Stderr {
                conversation_id,
                generation,
                ..
            }
            | ProcessEvent::Exited {
                conversation_id,
                generation,
                ..
            } => (conversation_id, *generation),
        };
        if self
            .manager
            .is_stale_event(event_conversation, event_generation)
        {
            debug!(
                conversation_id = %event_conversation,
                generation = event_generation,
                "dropping event from superseded process"
            );
            return;
        }

        match event {
            ProcessEvent::Line {
                conversation_id,
                line,
                ..
            } => {
                self.reset_idle(&conversation_id);
                // The parser is taken out of the map so the collected
                // events can be applied with full access to the registry.
                let Some(mut parser) = self.parsers.remove(&conversation_id) else {
                    debug!(conversation_id, "line for unknown conversation, dropping");
                    return;
                };
                let mut collector = TurnEventCollector::default();
                parser.parse_line(&line, &mut collector);
                let buffer_snapshot = parser.current_message().to_owned();
                self.parsers.insert(conversation_id.clone(), parser);

                // Mirror the parser's accumulation into the conversation
                // so replay works from registry state alone.
                if let Some(conversation) = self.conversations.get_mut(&conversation_id) {
                    conversation.streaming_buffer = buffer_snapshot;
                }

                for turn_event in collector.events {
                    self.apply_turn_event(&conversation_id, turn_event).await;
                }
            }
            ProcessEvent::Stderr {
                conversation_id,
                text,
                ..
            } => {
                self.reset_idle(&conversation_id);
                self.append_error(&conversation_id, &text).await;
            }
            ProcessEvent::Exited {
                conversation_id,
                exit_code,
                ..
            } => {
                self.manager.reap(&conversation_id);
                if let Some(code) = exit_code {
                    if code != 0 {
                        let message = format!("agent process exited with code {code}");
                        self.append_error(&conversation_id, &message).await;
                    }
                }
                // Any exit clears the owning conversation's processing
                // state, regardless of exit code.
                self.finalize_turn(&conversation_id).await;
            }
        }
    }

    async fn handle_idle_event(&mut self, event: IdleEvent) {
        match event {
            IdleEvent::Idle {
                conversation_id,
                idle_seconds,
            } => {
                self.emit(UiEvent::Idle {
                    conversation_id,
                    idle_seconds,
                })
                .await;
            }
            IdleEvent::Recovered { conversation_id } => {
                self.emit(UiEvent::IdleRecovered { conversation_id }).await;
            }
        }
    }

    // ── Event application ────────────────────────────────────────────────────

    #[allow(clippy::too_many_lines)] // Event routing requires exhaustive match arms.
    async fn apply_turn_event(&mut self, conversation_id: &str, event: TurnEvent) {
        match event {
            TurnEvent::SessionStart(session_id) => {
                if let Some(conversation) = self.conversations.get_mut(conversation_id) {
                    conversation.session_id = Some(session_id.clone());
                }
                self.emit(UiEvent::SessionStarted {
                    conversation_id: conversation_id.to_owned(),
                    session_id,
                })
                .await;
            }
            TurnEvent::TextDelta(text) => {
                if let Some(conversation) = self.conversations.get_mut(conversation_id) {
                    conversation.has_new_messages = true;
                }
                self.emit(UiEvent::TextDelta {
                    conversation_id: conversation_id.to_owned(),
                    text,
                })
                .await;
            }
            TurnEvent::Message(text) => {
                if let Some(conversation) = self.conversations.get_mut(conversation_id) {
                    conversation.streaming_buffer.clear();
                    conversation.append(MessageKind::Assistant, json!({ "text": text }));
                    conversation.has_new_messages = true;
                }
                self.emit(UiEvent::MessageCompleted {
                    conversation_id: conversation_id.to_owned(),
                    text,
                })
                .await;
            }
            TurnEvent::ToolUse {
                name,
                input,
                tool_use_id,
            } => {
                if let Some(conversation) = self.conversations.get_mut(conversation_id) {
                    conversation.append(
                        MessageKind::ToolUse,
                        json!({ "name": name, "input": input, "tool_use_id": tool_use_id }),
                    );
                }
                self.emit(UiEvent::ToolUse {
                    conversation_id: conversation_id.to_owned(),
                    tool_name: name,
                    input,
                })
                .await;
            }
            TurnEvent::ToolResult(record) => {
                if let Some(conversation) = self.conversations.get_mut(conversation_id) {
                    conversation.append(MessageKind::ToolResult, record);
                }
            }
            TurnEvent::ControlRequest(request) => {
                let prompt = self
                    .permissions
                    .handle_control_request(&self.manager, &request, Some(conversation_id))
                    .await;
                if let Some(prompt) = prompt {
                    self.emit(UiEvent::Prompt(prompt)).await;
                }
            }
            TurnEvent::AccountInfo(record) => {
                self.emit(UiEvent::AccountInfo {
                    conversation_id: conversation_id.to_owned(),
                    record,
                })
                .await;
            }
            TurnEvent::TokenUsage {
                input_tokens,
                output_tokens,
            } => {
                if let Some(conversation) = self.conversations.get_mut(conversation_id) {
                    conversation.total_tokens_input += input_tokens;
                    conversation.total_tokens_output += output_tokens;
                }
            }
            TurnEvent::Cost(cost_usd) => {
                if let Some(conversation) = self.conversations.get_mut(conversation_id) {
                    conversation.total_cost += cost_usd;
                }
            }
            TurnEvent::TurnResult(record) => {
                if events::is_end_of_turn(&record) {
                    self.finalize_turn(conversation_id).await;
                }
            }
            TurnEvent::Error(message) => {
                self.append_error(conversation_id, &message).await;
            }
        }
    }

    // ── Finalization & helpers ───────────────────────────────────────────────

    /// Commit partial streamed text, clear the processing flag, persist,
    /// and announce turn completion. Idempotent: a conversation that is
    /// not processing and has an empty buffer is left untouched.
    async fn finalize_turn(&mut self, conversation_id: &str) {
        let partial = {
            let Some(conversation) = self.conversations.get_mut(conversation_id) else {
                return;
            };
            if !conversation.processing && conversation.streaming_buffer.is_empty() {
                return;
            }
            let partial = conversation.streaming_buffer.clone();
            let committed = conversation.finalize_partial();
            conversation.processing = false;
            conversation.end_time = Some(Utc::now());
            committed.then_some(partial)
        };

        if let Some(text) = partial {
            self.emit(UiEvent::MessageCompleted {
                conversation_id: conversation_id.to_owned(),
                text,
            })
            .await;
        }

        if let Some(watcher) = self.idle_watchers.remove(conversation_id) {
            watcher.stop().await;
        }
        if let Some(parser) = self.parsers.get_mut(conversation_id) {
            parser.reset();
        }

        self.persist(conversation_id).await;
        self.emit(UiEvent::TurnCompleted {
            conversation_id: conversation_id.to_owned(),
        })
        .await;
    }

    /// Append an error-type transcript entry and surface it.
    async fn append_error(&mut self, conversation_id: &str, message: &str) {
        if let Some(conversation) = self.conversations.get_mut(conversation_id) {
            conversation.append(MessageKind::Error, json!({ "message": message }));
            conversation.has_new_messages = true;
        }
        self.emit(UiEvent::ErrorMessage {
            conversation_id: conversation_id.to_owned(),
            message: message.to_owned(),
        })
        .await;
    }

    fn reset_idle(&self, conversation_id: &str) {
        if let Some(watcher) = self.idle_watchers.get(conversation_id) {
            watcher.reset();
        }
    }

    async fn persist(&mut self, conversation_id: &str) {
        let Some(conversation) = self.conversations.get(conversation_id) else {
            return;
        };
        if let Err(err) = self.store.save(conversation).await {
            warn!(conversation_id, %err, "conversation persistence failed");
        }
    }

    async fn emit(&self, event: UiEvent) {
        if self.ui_tx.send(event).await.is_err() {
            debug!("ui channel closed, dropping event");
        }
    }
}
