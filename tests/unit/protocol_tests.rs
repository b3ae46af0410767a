//! Unit tests for wire-protocol encoding and response parsing.

use std::collections::HashSet;

use agent_relay::protocol::{new_query_id, parse_line, EventPayload, QueryOptions, Request};
use serde_json::{json, Value};

// ── Request encoding ──────────────────────────────────────────────────────────

#[test]
fn query_request_encodes_to_single_line() {
    let request = Request::Query {
        query_id: "q1".into(),
        prompt: "line one\nline two".into(),
        options: QueryOptions::default(),
    };

    let line = request.to_line().expect("encodes");
    assert!(
        !line.contains('\n'),
        "embedded newlines must be escaped: {line}"
    );

    let value: Value = serde_json::from_str(&line).expect("valid json");
    assert_eq!(value["type"], "query");
    assert_eq!(value["query_id"], "q1");
    assert_eq!(value["prompt"], "line one\nline two");
}

#[test]
fn ping_request_carries_only_type_and_id() {
    let request = Request::Ping {
        query_id: "p1".into(),
    };
    let value: Value =
        serde_json::from_str(&request.to_line().expect("encodes")).expect("valid json");
    assert_eq!(value["type"], "ping");
    assert_eq!(value["query_id"], "p1");
    assert!(value.get("prompt").is_none());
}

#[test]
fn unset_option_fields_are_omitted_from_the_wire() {
    let request = Request::Query {
        query_id: "q1".into(),
        prompt: "hi".into(),
        options: QueryOptions {
            model: Some("claude-sonnet".into()),
            ..QueryOptions::default()
        },
    };
    let value: Value =
        serde_json::from_str(&request.to_line().expect("encodes")).expect("valid json");
    assert_eq!(value["options"]["model"], "claude-sonnet");
    assert!(value["options"].get("system_prompt").is_none());
    assert!(value["options"].get("working_dir").is_none());
    assert!(value["options"].get("tools").is_none());
}

// ── Correlation ids ───────────────────────────────────────────────────────────

#[test]
fn query_ids_are_unique_at_volume() {
    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        assert!(seen.insert(new_query_id()), "collision in 10k generated ids");
    }
}

// ── Response parsing ──────────────────────────────────────────────────────────

#[test]
fn parses_pong() {
    let event = parse_line(r#"{"type":"pong","query_id":"p1"}"#)
        .expect("parses")
        .expect("recognized");
    assert_eq!(event.query_id, "p1");
    assert_eq!(event.payload, EventPayload::Pong);
    assert!(!event.payload.is_terminal());
}

#[test]
fn parses_message_with_data() {
    let event = parse_line(r#"{"type":"message","query_id":"q1","data":{"role":"assistant"}}"#)
        .expect("parses")
        .expect("recognized");
    assert_eq!(
        event.payload,
        EventPayload::Message {
            data: json!({"role": "assistant"})
        }
    );
}

#[test]
fn parses_tool_use() {
    let line = r#"{"type":"tool_use","query_id":"q1","tool":"calculator","args":{"expr":"2+2"},"tool_use_id":"tu1"}"#;
    let event = parse_line(line).expect("parses").expect("recognized");
    assert_eq!(
        event.payload,
        EventPayload::ToolUse {
            tool: "calculator".into(),
            args: json!({"expr": "2+2"}),
            tool_use_id: "tu1".into(),
        }
    );
}

#[test]
fn parses_tool_result() {
    let line = r#"{"type":"tool_result","query_id":"q1","tool_use_id":"tu1","result":"4"}"#;
    let event = parse_line(line).expect("parses").expect("recognized");
    assert_eq!(
        event.payload,
        EventPayload::ToolResult {
            tool_use_id: "tu1".into(),
            result: json!("4"),
        }
    );
}

#[test]
fn parses_text_thinking_partial_and_system() {
    let cases = [
        (r#"{"type":"thinking","query_id":"q","thinking":"hmm"}"#, "thinking"),
        (r#"{"type":"text","query_id":"q","text":"4"}"#, "text"),
        (
            r#"{"type":"partial_message","query_id":"q","delta":{"t":"4"}}"#,
            "partial_message",
        ),
        (
            r#"{"type":"system","query_id":"q","system_message":"ready"}"#,
            "system",
        ),
    ];
    for (line, expected_type) in cases {
        let event = parse_line(line).expect("parses").expect("recognized");
        assert_eq!(event.payload.event_type(), expected_type);
        assert!(!event.payload.is_terminal());
    }
}

#[test]
fn done_and_error_are_terminal() {
    let done = parse_line(r#"{"type":"done","query_id":"q1"}"#)
        .expect("parses")
        .expect("recognized");
    assert!(done.payload.is_terminal());

    let error = parse_line(r#"{"type":"error","query_id":"q1","error":"boom"}"#)
        .expect("parses")
        .expect("recognized");
    assert!(error.payload.is_terminal());
    assert_eq!(
        error.payload,
        EventPayload::Error {
            error: "boom".into()
        }
    );
}

#[test]
fn malformed_json_yields_decode_error() {
    let err = parse_line(r#"{"type":"text", not json"#).unwrap_err();
    assert!(err.to_string().starts_with("decode:"), "got: {err}");
}

#[test]
fn known_type_with_missing_field_yields_decode_error() {
    let err = parse_line(r#"{"type":"text","query_id":"q1"}"#).unwrap_err();
    assert!(
        err.to_string().contains("missing required field"),
        "got: {err}"
    );
}

#[test]
fn unknown_type_is_skipped_not_fatal() {
    let parsed = parse_line(r#"{"type":"telemetry","query_id":"q1","data":{}}"#).expect("no error");
    assert!(parsed.is_none(), "unknown type must be skipped");
}

#[test]
fn empty_line_is_skipped() {
    assert!(parse_line("").expect("no error").is_none());
    assert!(parse_line("   ").expect("no error").is_none());
}
