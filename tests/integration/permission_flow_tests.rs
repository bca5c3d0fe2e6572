//! Integration tests for the permission control-loop.
//!
//! These drive the handler directly with a process manager that has no
//! live processes: control-responses are then best-effort writes, which
//! lets every state transition be asserted without spawning an agent.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use agent_console::permissions::{PermissionHandler, PermissionPrompt, RuleSet};
use agent_console::process::{ProcessEvent, ProcessManager};
use agent_console::protocol::ControlRequest;

fn manager() -> (ProcessManager, mpsc::Receiver<ProcessEvent>) {
    let (tx, rx) = mpsc::channel(16);
    (ProcessManager::new(tx, Duration::from_secs(1)), rx)
}

fn handler(dir: &Path) -> PermissionHandler {
    PermissionHandler::new(RuleSet::load(dir.join("rules.json")))
}

fn bash_request(request_id: &str, command: &str) -> ControlRequest {
    ControlRequest::from_record(&json!({
        "type": "control_request",
        "request_id": request_id,
        "tool_name": "Bash",
        "input": { "command": command }
    }))
    .expect("request parses")
}

#[tokio::test]
async fn unmatched_requests_become_pending_prompts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _rx) = manager();
    let mut handler = handler(temp.path());

    let prompt = handler
        .handle_control_request(&manager, &bash_request("r1", "rm -rf target"), Some("conv-a"))
        .await;

    assert!(matches!(prompt, Some(PermissionPrompt::Permission(_))));
    assert_eq!(handler.pending_count(), 1);
}

/// A stored rule resolves the request immediately: no pending state, no
/// prompt, nothing for the user to answer.
#[tokio::test]
async fn matching_rules_auto_approve_without_pending_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _rx) = manager();

    let mut rules = RuleSet::load(temp.path().join("rules.json"));
    rules.add_rule("Bash", "npm test").expect("seed rule");
    let mut handler = PermissionHandler::new(rules);

    let prompt = handler
        .handle_control_request(&manager, &bash_request("r2", "npm test"), Some("conv-a"))
        .await;

    assert!(prompt.is_none());
    assert_eq!(handler.pending_count(), 0);
}

/// Auto-approval is exact: a longer command with the same prefix still
/// prompts.
#[tokio::test]
async fn near_miss_commands_still_prompt() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _rx) = manager();

    let mut rules = RuleSet::load(temp.path().join("rules.json"));
    rules.add_rule("Bash", "npm test").expect("seed rule");
    let mut handler = PermissionHandler::new(rules);

    let prompt = handler
        .handle_control_request(
            &manager,
            &bash_request("r3", "npm test --coverage"),
            Some("conv-a"),
        )
        .await;

    assert!(prompt.is_some());
}

/// Approving with always-allow persists the rule first, so an identical
/// request from any conversation auto-approves from then on.
#[tokio::test]
async fn always_allow_persists_and_covers_later_requests() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _rx) = manager();
    let mut handler = handler(temp.path());

    handler
        .handle_control_request(&manager, &bash_request("r4", "cargo fmt"), Some("conv-a"))
        .await;
    handler
        .handle_permission_response(&manager, "r4", true, true)
        .await
        .expect("approval");

    assert_eq!(handler.pending_count(), 0);
    assert!(handler
        .rules()
        .should_auto_approve("Bash", &json!({ "command": "cargo fmt" })));

    // The rule reaches disk, not just memory.
    let reloaded = RuleSet::load(temp.path().join("rules.json"));
    assert!(reloaded.should_auto_approve("Bash", &json!({ "command": "cargo fmt" })));

    // The same request from another conversation now skips the prompt.
    let prompt = handler
        .handle_control_request(&manager, &bash_request("r5", "cargo fmt"), Some("conv-b"))
        .await;
    assert!(prompt.is_none());
}

#[tokio::test]
async fn plain_approval_stores_no_rule() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _rx) = manager();
    let mut handler = handler(temp.path());

    handler
        .handle_control_request(&manager, &bash_request("r6", "git push"), Some("conv-a"))
        .await;
    handler
        .handle_permission_response(&manager, "r6", true, false)
        .await
        .expect("approval");

    assert!(handler.rules().rules().is_empty());
}

/// Responding to an unknown or already-resolved id is a harmless no-op.
#[tokio::test]
async fn resolution_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _rx) = manager();
    let mut handler = handler(temp.path());

    handler
        .handle_control_request(&manager, &bash_request("r7", "ls"), Some("conv-a"))
        .await;
    handler
        .handle_permission_response(&manager, "r7", false, false)
        .await
        .expect("denial");

    // Second resolution of the same id, and one for an id never seen.
    handler
        .handle_permission_response(&manager, "r7", true, false)
        .await
        .expect("no-op");
    handler
        .handle_permission_response(&manager, "ghost", true, false)
        .await
        .expect("no-op");

    assert_eq!(handler.pending_count(), 0);
    assert!(handler.rules().rules().is_empty());
}

/// The question tool maps to a question prompt and resolves through the
/// answer path.
#[tokio::test]
async fn questions_prompt_and_resolve_with_answers() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _rx) = manager();
    let mut handler = handler(temp.path());

    let request = ControlRequest::from_record(&json!({
        "request_id": "q1",
        "tool_name": "AskUserQuestion",
        "input": { "questions": [{ "id": "fmt", "text": "Which formatter?" }] }
    }))
    .expect("question parses");

    let prompt = handler
        .handle_control_request(&manager, &request, Some("conv-a"))
        .await;
    assert!(matches!(prompt, Some(PermissionPrompt::Question(_))));
    assert_eq!(handler.pending_count(), 1);

    handler
        .handle_user_question_response(&manager, "q1", &json!({ "fmt": "rustfmt" }))
        .await;
    assert_eq!(handler.pending_count(), 0);
}

/// Pending prompts can be re-emitted for a recreated UI surface.
#[tokio::test]
async fn pending_prompts_can_be_resent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (manager, _rx) = manager();
    let mut handler = handler(temp.path());

    handler
        .handle_control_request(&manager, &bash_request("r8", "make"), Some("conv-a"))
        .await;
    handler
        .handle_control_request(&manager, &bash_request("r9", "make install"), Some("conv-b"))
        .await;

    let resent = handler.resend_pending_permissions();
    assert_eq!(resent.len(), 2);

    handler.cancel_all();
    assert_eq!(handler.pending_count(), 0);
    assert!(handler.resend_pending_permissions().is_empty());
}
