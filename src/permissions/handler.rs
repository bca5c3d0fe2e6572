//! Permission control-loop handler.
//!
//! Runs the per-request state machine:
//!
//! ```text
//! Created ─┬─ AutoApproved (synthesized, no UI) ──────────┐
//!          └─ AwaitingUserDecision ── Resolved(Approved |  ├─ Removed
//!                                              Denied) ───┘
//! ```
//!
//! The question subtype bypasses approve/deny entirely and resolves via a
//! structured answer map, tracked in the same pending table. Prompt
//! emission is decoupled from any UI surface: handler methods return the
//! prompts to raise, and [`resend_pending_permissions`] re-emits them all
//! so a recreated surface never loses in-flight requests.
//!
//! [`resend_pending_permissions`]: PermissionHandler::resend_pending_permissions

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::permissions::rules::{self, RuleSet};
use crate::process::ProcessManager;
use crate::protocol::events::ControlRequest;
use crate::protocol::outbound;
use crate::Result;

/// Tool name the agent uses for the "ask a question" request subtype.
pub const QUESTION_TOOL_NAME: &str = "AskUserQuestion";

/// Distinguishes permission requests from structured questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Tool-use permission resolved by approve/deny.
    ToolPermission,
    /// Structured question resolved by an answer map.
    Question,
}

/// A control-request awaiting a user decision.
#[derive(Debug, Clone)]
pub struct PendingPermissionRequest {
    /// Correlation identifier for the control handshake.
    pub request_id: String,
    /// Tool the agent wants to invoke.
    pub tool_name: String,
    /// Tool input as supplied by the agent.
    pub input: Value,
    /// Tool-use block this request corresponds to, when present.
    pub tool_use_id: Option<String>,
    /// Alternative inputs suggested by the agent.
    pub suggestions: Option<Vec<Value>>,
    /// Conversation the request arrived on, when known.
    pub conversation_id: Option<String>,
    /// Permission or question.
    pub kind: RequestKind,
}

/// Prompt the caller should surface to the user.
#[derive(Debug, Clone)]
pub enum PermissionPrompt {
    /// Approve/deny decision needed.
    Permission(PendingPermissionRequest),
    /// Structured answers needed.
    Question(PendingPermissionRequest),
}

/// Intercepts control-requests, consults the ruleset, and resolves
/// requests by writing control-responses through the process manager.
#[derive(Debug)]
pub struct PermissionHandler {
    pending: HashMap<String, PendingPermissionRequest>,
    rules: RuleSet,
    /// Fallback write target when a pending entry has no conversation id.
    default_conversation: Option<String>,
}

impl PermissionHandler {
    /// Create a handler over a loaded ruleset.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            pending: HashMap::new(),
            rules,
            default_conversation: None,
        }
    }

    /// The shared ruleset.
    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Set the conversation used when a request carries no attribution.
    pub fn set_default_conversation(&mut self, conversation_id: Option<String>) {
        self.default_conversation = conversation_id;
    }

    /// Number of requests awaiting a decision.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Handle an inbound control-request.
    ///
    /// Question requests and non-auto-approved permission requests are
    /// stored pending and returned as a prompt for the UI. Auto-approved
    /// requests are resolved immediately with no pending state and return
    /// `None`.
    pub async fn handle_control_request(
        &mut self,
        manager: &ProcessManager,
        request: &ControlRequest,
        conversation_id: Option<&str>,
    ) -> Option<PermissionPrompt> {
        let pending = PendingPermissionRequest {
            request_id: request.request_id.clone(),
            tool_name: request.tool_name.clone(),
            input: request.input.clone(),
            tool_use_id: request.tool_use_id.clone(),
            suggestions: request.suggestions.clone(),
            conversation_id: conversation_id.map(str::to_owned),
            kind: if request.tool_name == QUESTION_TOOL_NAME {
                RequestKind::Question
            } else {
                RequestKind::ToolPermission
            },
        };

        if pending.kind == RequestKind::Question {
            self.pending
                .insert(pending.request_id.clone(), pending.clone());
            return Some(PermissionPrompt::Question(pending));
        }

        if self
            .rules
            .should_auto_approve(&pending.tool_name, &pending.input)
        {
            info!(
                request_id = %pending.request_id,
                tool_name = %pending.tool_name,
                "auto-approving via persisted rule"
            );
            let response = outbound::approve_response(
                &pending.request_id,
                &pending.input,
                pending.tool_use_id.as_deref(),
                None,
            );
            self.send_response(manager, &pending, response).await;
            return None;
        }

        self.pending
            .insert(pending.request_id.clone(), pending.clone());
        Some(PermissionPrompt::Permission(pending))
    }

    /// Resolve a pending permission request.
    ///
    /// Unknown or already-resolved request ids are a no-op. When approving
    /// with `always_allow`, the rule is persisted before the response is
    /// sent, so a concurrent duplicate request already hits the fast path.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`](crate::AppError::Store) when rule
    /// persistence fails; the response is still sent in that case.
    pub async fn handle_permission_response(
        &mut self,
        manager: &ProcessManager,
        request_id: &str,
        approved: bool,
        always_allow: bool,
    ) -> Result<()> {
        let Some(pending) = self.pending.remove(request_id) else {
            debug!(request_id, "ignoring response for unknown request id");
            return Ok(());
        };

        let mut persist_result = Ok(());
        let response = if approved {
            let rule = if always_allow {
                let pattern = rules::pattern_for_input(&pending.input);
                persist_result = self.rules.add_rule(&pending.tool_name, &pattern);
                Some(pattern)
            } else {
                None
            };
            outbound::approve_response(
                request_id,
                &pending.input,
                pending.tool_use_id.as_deref(),
                rule.as_deref().map(|p| (pending.tool_name.as_str(), p)),
            )
        } else {
            outbound::deny_response(
                request_id,
                &format!("User denied permission for {}", pending.tool_name),
            )
        };

        self.send_response(manager, &pending, response).await;
        persist_result
    }

    /// Resolve a pending question with its answer map keyed by question id.
    ///
    /// Unknown or already-resolved request ids are a no-op.
    pub async fn handle_user_question_response(
        &mut self,
        manager: &ProcessManager,
        request_id: &str,
        answers: &Value,
    ) {
        let Some(pending) = self.pending.remove(request_id) else {
            debug!(request_id, "ignoring answers for unknown request id");
            return;
        };

        let response = outbound::question_response(request_id, answers);
        self.send_response(manager, &pending, response).await;
    }

    /// Re-emit prompts for every pending entry.
    ///
    /// Protocol state is decoupled from presentation-layer lifecycle: a UI
    /// surface can be destroyed and recreated without losing in-flight
    /// prompts.
    #[must_use]
    pub fn resend_pending_permissions(&self) -> Vec<PermissionPrompt> {
        self.pending
            .values()
            .cloned()
            .map(|pending| match pending.kind {
                RequestKind::Question => PermissionPrompt::Question(pending),
                RequestKind::ToolPermission => PermissionPrompt::Permission(pending),
            })
            .collect()
    }

    /// Drop every pending entry without responding.
    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            info!(count = self.pending.len(), "cancelling all pending permission requests");
            self.pending.clear();
        }
    }

    /// Write a control-response via the per-conversation path when known,
    /// else the default path. Delivery is best-effort.
    async fn send_response(
        &self,
        manager: &ProcessManager,
        pending: &PendingPermissionRequest,
        response: Value,
    ) {
        let target = pending
            .conversation_id
            .as_deref()
            .or(self.default_conversation.as_deref());

        let Some(conversation_id) = target else {
            warn!(
                request_id = %pending.request_id,
                "no conversation to route control-response to"
            );
            return;
        };

        if !manager.write_to_conversation(conversation_id, response).await {
            warn!(
                request_id = %pending.request_id,
                conversation_id,
                "control-response write failed; agent process not alive"
            );
        }
    }
}
