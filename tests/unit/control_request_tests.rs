//! Unit tests for control-request layout normalization.

use serde_json::json;

use agent_console::protocol::ControlRequest;

#[test]
fn flat_layout_normalizes() {
    let record = json!({
        "type": "control_request",
        "request_id": "req-1",
        "tool_name": "Bash",
        "input": { "command": "cargo test" },
        "tool_use_id": "tu-1"
    });

    let request = ControlRequest::from_record(&record).expect("flat layout parses");
    assert_eq!(request.request_id, "req-1");
    assert_eq!(request.tool_name, "Bash");
    assert_eq!(request.input, json!({ "command": "cargo test" }));
    assert_eq!(request.tool_use_id.as_deref(), Some("tu-1"));
    assert!(request.suggestions.is_none());
}

#[test]
fn nested_layout_normalizes() {
    let record = json!({
        "type": "control_request",
        "request_id": "req-2",
        "request": {
            "tool_name": "Write",
            "input": { "file_path": "src/lib.rs" },
            "permission_suggestions": [{ "mode": "acceptEdits" }]
        }
    });

    let request = ControlRequest::from_record(&record).expect("nested layout parses");
    assert_eq!(request.tool_name, "Write");
    assert_eq!(request.input, json!({ "file_path": "src/lib.rs" }));
    assert_eq!(
        request.suggestions,
        Some(vec![json!({ "mode": "acceptEdits" })])
    );
}

/// `id` is accepted as a fallback for `request_id`.
#[test]
fn id_field_substitutes_for_request_id() {
    let record = json!({
        "id": "req-3",
        "tool_name": "Read",
        "input": {}
    });

    let request = ControlRequest::from_record(&record).expect("id fallback parses");
    assert_eq!(request.request_id, "req-3");
}

#[test]
fn missing_request_id_is_an_error() {
    let record = json!({ "tool_name": "Bash", "input": {} });
    let err = ControlRequest::from_record(&record).expect_err("no id");
    assert!(err.to_string().contains("request identifier"));
}

#[test]
fn matching_neither_layout_is_an_error() {
    let record = json!({ "request_id": "req-4", "payload": {} });
    let err = ControlRequest::from_record(&record).expect_err("no layout");
    assert!(err.to_string().contains("neither known layout"));
}

#[test]
fn missing_input_defaults_to_null() {
    let record = json!({ "request_id": "req-5", "tool_name": "Glob" });
    let request = ControlRequest::from_record(&record).expect("parses without input");
    assert!(request.input.is_null());
}
