//! Conversation model and message log helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Message-type tag recorded alongside each log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Text the user sent.
    User,
    /// Completed assistant text.
    Assistant,
    /// Tool-use block decomposed from an assistant record.
    ToolUse,
    /// Result of a tool round-trip.
    ToolResult,
    /// Error surfaced into the transcript.
    Error,
    /// Engine-generated note (e.g. turn interrupted).
    System,
}

/// One entry in a conversation's append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ConversationMessage {
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Message-type tag.
    pub kind: MessageKind,
    /// Kind-specific payload.
    pub payload: Value,
}

/// A conversation with the agent, spanning any number of turns.
///
/// Mutated only by the multiplexer in response to events attributed to
/// this conversation's own process handle. The message log is append-only;
/// the streaming buffer is cleared exactly when its content is flushed
/// into the log or discarded on reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: String,
    /// Opaque handle the agent issues for resuming; absent until the
    /// first response arrives.
    pub session_id: Option<String>,
    /// Append-only ordered message log.
    pub messages: Vec<ConversationMessage>,
    /// Cumulative input tokens across turns.
    pub total_tokens_input: u64,
    /// Cumulative output tokens across turns.
    pub total_tokens_output: u64,
    /// Cumulative cost in USD across turns.
    pub total_cost: f64,
    /// When the conversation was created.
    pub start_time: DateTime<Utc>,
    /// When the most recent turn finished, if any has.
    pub end_time: Option<DateTime<Utc>>,
    /// Whether the conversation is open in the engine.
    pub is_active: bool,
    /// Whether messages arrived since the user last attached.
    pub has_new_messages: bool,
    /// In-progress assistant text for the current turn.
    #[serde(skip)]
    pub streaming_buffer: String,
    /// Whether a turn is currently in flight.
    #[serde(skip)]
    pub processing: bool,
}

impl Conversation {
    /// Construct a new empty conversation with a generated identifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            messages: Vec::new(),
            total_tokens_input: 0,
            total_tokens_output: 0,
            total_cost: 0.0,
            start_time: Utc::now(),
            end_time: None,
            is_active: true,
            has_new_messages: false,
            streaming_buffer: String::new(),
            processing: false,
        }
    }

    /// Append one entry to the message log.
    pub fn append(&mut self, kind: MessageKind, payload: Value) {
        self.messages.push(ConversationMessage {
            timestamp: Utc::now(),
            kind,
            payload,
        });
    }

    /// Commit the partial streamed text as one completed assistant
    /// message and clear the buffer.
    ///
    /// Returns `true` when an entry was committed; an empty buffer commits
    /// nothing, which makes finalization idempotent.
    pub fn finalize_partial(&mut self) -> bool {
        if self.streaming_buffer.is_empty() {
            return false;
        }
        let text = std::mem::take(&mut self.streaming_buffer);
        self.append(MessageKind::Assistant, json!({ "text": text }));
        true
    }

    /// Short title derived from the first user message, for listings.
    #[must_use]
    pub fn title(&self) -> String {
        self.messages
            .iter()
            .find(|m| m.kind == MessageKind::User)
            .and_then(|m| m.payload.get("text"))
            .and_then(Value::as_str)
            .map_or_else(|| "(empty conversation)".to_owned(), |text| {
                text.chars().take(64).collect()
            })
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
