//! Unit tests for option merging: call-time overrides win field by field.

use std::path::PathBuf;

use agent_relay::protocol::QueryOptions;
use agent_relay::Tool;
use serde_json::json;

fn defaults() -> QueryOptions {
    QueryOptions {
        working_dir: Some(PathBuf::from("/workspace/default")),
        tools: Some(vec![Tool::new("grep", "search files", json!({}))]),
        system_prompt: Some("default prompt".into()),
        model: Some("claude-default".into()),
    }
}

#[test]
fn unset_overrides_fall_back_to_defaults() {
    let merged = QueryOptions::default().merged_over(&defaults());

    assert_eq!(merged.working_dir, Some(PathBuf::from("/workspace/default")));
    assert_eq!(merged.system_prompt.as_deref(), Some("default prompt"));
    assert_eq!(merged.model.as_deref(), Some("claude-default"));
    assert_eq!(merged.tools.as_ref().map(Vec::len), Some(1));
}

#[test]
fn call_time_values_win_over_defaults() {
    let overrides = QueryOptions {
        model: Some("claude-override".into()),
        system_prompt: Some("override prompt".into()),
        ..QueryOptions::default()
    };

    let merged = overrides.merged_over(&defaults());

    assert_eq!(merged.model.as_deref(), Some("claude-override"));
    assert_eq!(merged.system_prompt.as_deref(), Some("override prompt"));
    // Untouched fields still come from the defaults.
    assert_eq!(merged.working_dir, Some(PathBuf::from("/workspace/default")));
}

#[test]
fn tool_list_is_replaced_wholesale_not_concatenated() {
    let overrides = QueryOptions {
        tools: Some(vec![
            Tool::new("read", "read a file", json!({})),
            Tool::new("write", "write a file", json!({})),
        ]),
        ..QueryOptions::default()
    };

    let merged = overrides.merged_over(&defaults());
    let tools = merged.tools.expect("tools set");
    assert_eq!(tools.len(), 2);
    assert!(tools.iter().all(|t| t.name != "grep"));
}

#[test]
fn merging_over_empty_defaults_is_identity() {
    let overrides = QueryOptions {
        model: Some("m".into()),
        ..QueryOptions::default()
    };
    let merged = overrides.merged_over(&QueryOptions::default());
    assert_eq!(merged.model.as_deref(), Some("m"));
    assert!(merged.working_dir.is_none());
    assert!(merged.system_prompt.is_none());
    assert!(merged.tools.is_none());
}
