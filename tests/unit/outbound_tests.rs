//! Unit tests for outbound stdin envelopes.

use serde_json::{json, Value};

use agent_console::protocol::outbound;

#[test]
fn user_turn_carries_role_and_content() {
    let turn = outbound::user_turn("hello", None);

    assert_eq!(turn["type"], "user");
    assert_eq!(turn["message"]["role"], "user");
    assert_eq!(turn["message"]["content"][0]["type"], "text");
    assert_eq!(turn["message"]["content"][0]["text"], "hello");
    assert_eq!(turn["parent_tool_use_id"], Value::Null);
}

#[test]
fn user_turn_correlates_to_a_parent_tool_use() {
    let turn = outbound::user_turn("answer", Some("tu-3"));
    assert_eq!(turn["parent_tool_use_id"], "tu-3");
}

#[test]
fn approval_echoes_input_and_tool_use_id() {
    let input = json!({ "command": "ls" });
    let response = outbound::approve_response("req-1", &input, Some("tu-1"), None);

    assert_eq!(response["type"], "control_response");
    assert_eq!(response["request_id"], "req-1");
    assert_eq!(response["subtype"], "success");
    assert_eq!(response["response"]["behavior"], "allow");
    assert_eq!(response["response"]["updatedInput"], input);
    assert_eq!(response["response"]["toolUseId"], "tu-1");
    assert!(response["response"].get("updatedPermissions").is_none());
}

#[test]
fn always_allow_embeds_a_permission_update() {
    let input = json!({ "command": "npm test" });
    let response =
        outbound::approve_response("req-2", &input, None, Some(("Bash", "npm test")));

    let update = &response["response"]["updatedPermissions"][0];
    assert_eq!(update["type"], "addRules");
    assert_eq!(update["behavior"], "allow");
    assert_eq!(update["destination"], "session");
    assert_eq!(update["rules"][0]["toolName"], "Bash");
    assert_eq!(update["rules"][0]["ruleContent"], "npm test");
}

#[test]
fn denial_interrupts_the_tool_use() {
    let response = outbound::deny_response("req-3", "User denied permission for Bash");

    assert_eq!(response["request_id"], "req-3");
    assert_eq!(response["response"]["behavior"], "deny");
    assert_eq!(
        response["response"]["message"],
        "User denied permission for Bash"
    );
    assert_eq!(response["response"]["interrupt"], true);
}

#[test]
fn question_answers_ride_the_same_envelope() {
    let answers = json!({ "q1": "option-b" });
    let response = outbound::question_response("req-4", &answers);

    assert_eq!(response["type"], "control_response");
    assert_eq!(response["subtype"], "success");
    assert_eq!(response["response"]["answers"], answers);
}
