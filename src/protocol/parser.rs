//! Tolerant streaming parser for the agent's stdout protocol.
//!
//! One [`StreamParser`] instance exists per conversation, reset at turn
//! boundaries so the session-start latch re-arms. Raw stdout
//! chunks are appended to an internal byte buffer, split on newlines, and
//! each complete line is parsed as JSON; lines that fail to parse are
//! silently discarded and parsing continues. Classified records are
//! delivered through the [`StreamObserver`] trait — one method per event
//! kind, implemented by the conversation multiplexer.
//!
//! Observer panics are not caught here; they propagate to the caller.

use serde_json::Value;
use tracing::debug;

use crate::protocol::events::{self, ControlRequest, StreamRecord};

// ── Observer contract ─────────────────────────────────────────────────────────

/// Receiver for classified stream events.
///
/// One method per event kind, giving a compile-time contract instead of a
/// bag of named callbacks. All methods default to no-ops so implementors
/// override only what they route.
#[allow(unused_variables)]
pub trait StreamObserver {
    /// First record carrying a session identifier; fired exactly once per
    /// parser lifetime even when later records repeat the field.
    fn on_session_start(&mut self, session_id: &str) {}

    /// Incremental assistant text fragment (already appended to the
    /// accumulation buffer; no per-delta completion is emitted).
    fn on_text_delta(&mut self, text: &str) {}

    /// Completed assistant message flushed from the accumulation buffer.
    fn on_message(&mut self, text: &str) {}

    /// Tool-use block decomposed from an assistant record.
    fn on_tool_use(&mut self, name: &str, input: &Value, tool_use_id: Option<&str>) {}

    /// Result of a tool invocation round-trip.
    fn on_tool_result(&mut self, record: &Value) {}

    /// Normalized permission/question control-request.
    fn on_control_request(&mut self, request: &ControlRequest) {}

    /// Echo of a control-response record.
    fn on_control_response(&mut self, record: &Value) {}

    /// Account/subscription information record.
    fn on_account_info(&mut self, record: &Value) {}

    /// Non-zero token totals extracted from a result record.
    fn on_token_usage(&mut self, input_tokens: u64, output_tokens: u64) {}

    /// Non-zero cost total extracted from a result record.
    fn on_cost_update(&mut self, cost_usd: f64) {}

    /// Raw result-shaped record, forwarded after usage extraction.
    /// End-of-turn is the caller's decision via
    /// [`events::is_end_of_turn`].
    fn on_result(&mut self, record: &Value) {}

    /// Error record or surfaced protocol error.
    fn on_error(&mut self, message: &str) {}
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Reassembles stdout chunks into lines and classifies each record.
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Unconsumed bytes: everything after the last newline seen.
    line_buffer: Vec<u8>,
    /// In-progress assistant text accumulated from deltas and text blocks.
    message_buffer: String,
    /// Whether `on_session_start` has fired for this parser lifetime.
    session_started: bool,
}

impl StreamParser {
    /// Create a parser with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw stdout chunk.
    ///
    /// Splits on `\n`, retains the trailing partial line, and processes
    /// every complete line. Feeding a stream in arbitrarily split chunks
    /// yields the same event sequence as feeding it whole.
    pub fn parse_chunk(&mut self, chunk: &[u8], observer: &mut dyn StreamObserver) {
        self.line_buffer.extend_from_slice(chunk);

        while let Some(newline) = self.line_buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.line_buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.parse_line(&line, observer);
        }
    }

    /// Process one complete line (without its newline terminator).
    ///
    /// Lines that are empty or fail to parse as JSON are silently
    /// discarded — robustness over crash.
    pub fn parse_line(&mut self, line: &str, observer: &mut dyn StreamObserver) {
        if line.trim().is_empty() {
            return;
        }

        let Ok(record) = serde_json::from_str::<Value>(line) else {
            debug!(raw_line = line, "discarding malformed protocol line");
            return;
        };

        self.process_record(&record, observer);
    }

    /// The in-progress assistant text, for live UI streaming.
    #[must_use]
    pub fn current_message(&self) -> &str {
        &self.message_buffer
    }

    /// Clear all parser state, including the session-start latch.
    pub fn reset(&mut self) {
        self.line_buffer.clear();
        self.message_buffer.clear();
        self.session_started = false;
    }

    // ── Record routing ────────────────────────────────────────────────────────

    fn process_record(&mut self, record: &Value, observer: &mut dyn StreamObserver) {
        // A session-identifier field fires on_session_start exactly once,
        // regardless of how the record otherwise classifies.
        if !self.session_started {
            if let Some(session_id) = record.get("session_id").and_then(Value::as_str) {
                self.session_started = true;
                observer.on_session_start(session_id);
            }
        }

        match events::classify(record) {
            StreamRecord::TextDelta(text) => {
                self.message_buffer.push_str(&text);
                observer.on_text_delta(&text);
            }
            StreamRecord::Assistant(blocks) => {
                self.process_assistant_blocks(&blocks, observer);
            }
            StreamRecord::ToolResult => observer.on_tool_result(record),
            StreamRecord::ControlRequest(request) => observer.on_control_request(&request),
            StreamRecord::ControlResponse => observer.on_control_response(record),
            StreamRecord::AccountInfo => observer.on_account_info(record),
            StreamRecord::TurnResult => self.process_result(record, observer),
            StreamRecord::Error(message) => observer.on_error(&message),
            StreamRecord::Unknown => {
                debug!("skipping unrecognized protocol record");
            }
        }
    }

    /// Decompose an assistant record's content blocks: text blocks extend
    /// the accumulated message, tool-use blocks each fire separately.
    fn process_assistant_blocks(&mut self, blocks: &[Value], observer: &mut dyn StreamObserver) {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        self.message_buffer.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let name = block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    let tool_use_id = block.get("id").and_then(Value::as_str);
                    observer.on_tool_use(name, &input, tool_use_id);
                }
                _ => {}
            }
        }
    }

    /// Flush the accumulation buffer, extract usage, forward the raw record.
    fn process_result(&mut self, record: &Value, observer: &mut dyn StreamObserver) {
        if !self.message_buffer.is_empty() {
            let flushed = std::mem::take(&mut self.message_buffer);
            observer.on_message(&flushed);
        }

        let usage = events::extract_usage(record);
        if usage.input_tokens > 0 || usage.output_tokens > 0 {
            observer.on_token_usage(usage.input_tokens, usage.output_tokens);
        }
        if usage.cost_usd > 0.0 {
            observer.on_cost_update(usage.cost_usd);
        }

        observer.on_result(record);
    }
}
