//! Record classification for the agent's stream protocol.
//!
//! The agent emits one JSON object per stdout line, but the records carry
//! no single reliable discriminator across all shapes. [`classify`]
//! normalizes every known wire layout into one internal tagged variant
//! ([`StreamRecord`]) at a single parse boundary, before any business logic
//! inspects the record.
//!
//! # Known record shapes
//!
//! | Shape                                  | Maps to                          |
//! |----------------------------------------|----------------------------------|
//! | `type: "text_delta"` (or nested delta) | [`StreamRecord::TextDelta`]      |
//! | `type: "assistant"` + content blocks   | [`StreamRecord::Assistant`]      |
//! | `type: "tool_result"`                  | [`StreamRecord::ToolResult`]     |
//! | `type: "control_request"` (flat/nested)| [`StreamRecord::ControlRequest`] |
//! | `type: "control_response"`             | [`StreamRecord::ControlResponse`]|
//! | `type: "account_info"`                 | [`StreamRecord::AccountInfo`]    |
//! | `type: "result"` / `"message"`         | [`StreamRecord::TurnResult`]     |
//! | `type: "error"`                        | [`StreamRecord::Error`]          |
//! | *(anything else)*                      | [`StreamRecord::Unknown`]        |

use serde_json::Value;

use crate::{AppError, Result};

// ── Control-request normalization ─────────────────────────────────────────────

/// A tool-permission (or question) request, normalized from either known
/// wire layout: flat `tool_name`/`input` at the top level, or nested under
/// a `request` sub-object.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRequest {
    /// Correlation identifier echoed back in the control-response.
    pub request_id: String,
    /// Name of the tool the agent wants to invoke.
    pub tool_name: String,
    /// Tool input as supplied by the agent.
    pub input: Value,
    /// Tool-use block this request corresponds to, when present.
    pub tool_use_id: Option<String>,
    /// Alternative inputs the agent suggests the user may prefer.
    pub suggestions: Option<Vec<Value>>,
}

impl ControlRequest {
    /// Normalize a `control_request` record from either known layout.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the record matches neither the
    /// flat nor the nested layout. Callers surface this rather than
    /// dropping the record silently: the agent is blocked awaiting a
    /// response, so silence would wedge the turn.
    pub fn from_record(record: &Value) -> Result<Self> {
        let request_id = record
            .get("request_id")
            .or_else(|| record.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::Protocol("control_request is missing a request identifier".into())
            })?
            .to_owned();

        // Flat layout first, then the nested `request` sub-object.
        let body = if record.get("tool_name").is_some() {
            record
        } else {
            record.get("request").ok_or_else(|| {
                AppError::Protocol(format!(
                    "control_request {request_id} matches neither known layout"
                ))
            })?
        };

        let tool_name = body
            .get("tool_name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::Protocol(format!("control_request {request_id} has no tool_name"))
            })?
            .to_owned();

        let input = body.get("input").cloned().unwrap_or(Value::Null);
        let tool_use_id = body
            .get("tool_use_id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let suggestions = body
            .get("permission_suggestions")
            .or_else(|| body.get("suggestions"))
            .and_then(Value::as_array)
            .cloned();

        Ok(Self {
            request_id,
            tool_name,
            input,
            tool_use_id,
            suggestions,
        })
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// Internal tagged variant every inbound record is normalized into.
#[derive(Debug)]
pub enum StreamRecord {
    /// Incremental assistant text fragment.
    TextDelta(String),
    /// Assistant message carrying a content-block array.
    Assistant(Vec<Value>),
    /// Result of a tool invocation round-trip.
    ToolResult,
    /// Normalized permission/question request.
    ControlRequest(ControlRequest),
    /// Echo of a control-response (observability only).
    ControlResponse,
    /// Account/subscription information record.
    AccountInfo,
    /// Message/result-shaped record carrying usage and turn-state fields.
    TurnResult,
    /// Error record with a message string.
    Error(String),
    /// Record matching no known shape; silently skipped by callers.
    Unknown,
}

/// Classify one parsed record into a [`StreamRecord`].
///
/// Classification inspects which fields are present; no single declared
/// discriminator is reliable across all shapes. A malformed
/// `control_request` is returned as [`StreamRecord::Error`] so the caller
/// surfaces it (see [`ControlRequest::from_record`]).
#[must_use]
pub fn classify(record: &Value) -> StreamRecord {
    match record.get("type").and_then(Value::as_str) {
        Some("text_delta") => {
            let text = record
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            StreamRecord::TextDelta(text.to_owned())
        }
        Some("assistant") => StreamRecord::Assistant(assistant_blocks(record)),
        Some("tool_result") => StreamRecord::ToolResult,
        Some("control_request") => match ControlRequest::from_record(record) {
            Ok(request) => StreamRecord::ControlRequest(request),
            Err(err) => StreamRecord::Error(err.to_string()),
        },
        Some("control_response") => StreamRecord::ControlResponse,
        Some("account_info") => StreamRecord::AccountInfo,
        Some("result" | "message") => StreamRecord::TurnResult,
        Some("error") => {
            let message = record
                .get("message")
                .or_else(|| record.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown agent error");
            StreamRecord::Error(message.to_owned())
        }
        _ => classify_untyped(record),
    }
}

/// Classify a record whose `type` field is absent or unrecognized.
fn classify_untyped(record: &Value) -> StreamRecord {
    // Partial-message stream events nest the delta one level down.
    if let Some(text) = nested_delta_text(record) {
        return StreamRecord::TextDelta(text);
    }
    // Tool results are sometimes emitted without a type tag.
    if record.get("tool_use_id").is_some() && record.get("content").is_some() {
        return StreamRecord::ToolResult;
    }
    if record.get("account").is_some() {
        return StreamRecord::AccountInfo;
    }
    // Result-shaped: any of the turn-state fields identifies it.
    if record.get("is_done").is_some()
        || record.get("stop_reason").is_some()
        || record.get("subtype").is_some()
        || record.get("usage").is_some()
    {
        return StreamRecord::TurnResult;
    }
    StreamRecord::Unknown
}

/// Extract the content-block array from an assistant record.
///
/// Blocks live under `message.content` in the full envelope and directly
/// under `content` in the compact one.
fn assistant_blocks(record: &Value) -> Vec<Value> {
    record
        .get("message")
        .and_then(|m| m.get("content"))
        .or_else(|| record.get("content"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Extract a nested `text_delta` fragment from a partial-message stream
/// event (`event.delta.type == "text_delta"`).
fn nested_delta_text(record: &Value) -> Option<String> {
    let delta = record.get("event").and_then(|e| e.get("delta"))?;
    if delta.get("type").and_then(Value::as_str) == Some("text_delta") {
        delta
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_owned)
    } else {
        None
    }
}

// ── Usage extraction ──────────────────────────────────────────────────────────

/// Token and cost totals extracted from a result-shaped record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    /// Input tokens billed for the turn so far.
    pub input_tokens: u64,
    /// Output tokens billed for the turn so far.
    pub output_tokens: u64,
    /// Cumulative cost in USD.
    pub cost_usd: f64,
}

impl UsageTotals {
    /// Whether any billing field is non-zero.
    #[must_use]
    pub fn is_nonzero(&self) -> bool {
        self.input_tokens > 0 || self.output_tokens > 0 || self.cost_usd > 0.0
    }
}

/// Extract token/cost totals from a result record.
///
/// Checks the nested `usage` sub-object first and falls back to top-level
/// fields, since only some result shapes carry the nested form.
#[must_use]
pub fn extract_usage(record: &Value) -> UsageTotals {
    let usage = record.get("usage");

    let field = |name: &str| -> u64 {
        usage
            .and_then(|u| u.get(name))
            .or_else(|| record.get(name))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };

    let cost_usd = usage
        .and_then(|u| u.get("total_cost_usd"))
        .or_else(|| record.get("total_cost_usd"))
        .or_else(|| record.get("cost_usd"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    UsageTotals {
        input_tokens: field("input_tokens"),
        output_tokens: field("output_tokens"),
        cost_usd,
    }
}

// ── End-of-turn rule ──────────────────────────────────────────────────────────

/// Decide whether a result-shaped record ends the current turn.
///
/// The agent emits one result-shaped record per tool round-trip and only
/// the final one carries authoritative totals, so no single field is
/// sufficient. A turn is finished when any of:
///
/// - an explicit done flag is `true`;
/// - `stop_reason` equals `"end_turn"`;
/// - `subtype` is `"success"` **and** the record carries non-zero billing;
/// - `subtype` starts with `"error"`.
#[must_use]
pub fn is_end_of_turn(record: &Value) -> bool {
    if record.get("is_done").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    if record.get("stop_reason").and_then(Value::as_str) == Some("end_turn") {
        return true;
    }
    match record.get("subtype").and_then(Value::as_str) {
        Some(subtype) if subtype.starts_with("error") => true,
        Some("success") => extract_usage(record).is_nonzero(),
        _ => false,
    }
}
