//! Outbound stdin envelopes.
//!
//! The agent accepts one JSON object per stdin line. Two envelope families
//! exist: the user turn (role/content array with a nullable parent
//! tool-use correlation id) and the control-response
//! (`{type: control_response, request_id, subtype: success, response}`),
//! whose `response` body varies by kind — tool allow/deny or question
//! answers. All builders return a [`Value`] the writer serialises to a
//! single NDJSON line.

use serde_json::{json, Map, Value};

/// Build a user turn envelope.
///
/// `parent_tool_use_id` correlates a reply to an earlier tool-use block
/// and is serialised as JSON `null` when absent.
#[must_use]
pub fn user_turn(text: &str, parent_tool_use_id: Option<&str>) -> Value {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [
                { "type": "text", "text": text }
            ]
        },
        "parent_tool_use_id": parent_tool_use_id,
    })
}

/// Build an approval control-response.
///
/// Echoes the original `input` and tool-use correlation id so the agent
/// proceeds with exactly what was approved. When `always_allow_rule` is
/// set, the response additionally embeds a permission-update directive
/// naming the tool, so the agent's own in-session policy updates too.
#[must_use]
pub fn approve_response(
    request_id: &str,
    input: &Value,
    tool_use_id: Option<&str>,
    always_allow_rule: Option<(&str, &str)>,
) -> Value {
    let mut response = Map::new();
    response.insert("behavior".into(), json!("allow"));
    response.insert("updatedInput".into(), input.clone());
    if let Some(id) = tool_use_id {
        response.insert("toolUseId".into(), json!(id));
    }
    if let Some((tool_name, pattern)) = always_allow_rule {
        response.insert(
            "updatedPermissions".into(),
            json!([{
                "type": "addRules",
                "rules": [{ "toolName": tool_name, "ruleContent": pattern }],
                "behavior": "allow",
                "destination": "session",
            }]),
        );
    }

    control_response(request_id, Value::Object(response))
}

/// Build a denial control-response.
///
/// The `interrupt` flag tells the agent to abort the pending tool use
/// rather than retry it.
#[must_use]
pub fn deny_response(request_id: &str, message: &str) -> Value {
    control_response(
        request_id,
        json!({
            "behavior": "deny",
            "message": message,
            "interrupt": true,
        }),
    )
}

/// Build a question control-response carrying the answer map keyed by
/// question id. Wrapped in the same outer envelope as permission
/// responses for protocol consistency.
#[must_use]
pub fn question_response(request_id: &str, answers: &Value) -> Value {
    control_response(request_id, json!({ "answers": answers }))
}

/// Common control-response envelope.
fn control_response(request_id: &str, response: Value) -> Value {
    json!({
        "type": "control_response",
        "request_id": request_id,
        "subtype": "success",
        "response": response,
    })
}
