//! Event router: decides the fate of each decoded worker response.
//!
//! Dispatch table, one rule per response type:
//!
//! | type | effect |
//! |------|--------|
//! | `pong` | pending ping for the id → reply success, remove entry; else ignore |
//! | `message` | append to accumulated messages; forward as intermediate event |
//! | `tool_use` / `tool_result` / `thinking` / `text` / `partial_message` / `system` | forward as intermediate event only |
//! | `done` | complete entry; reply success with the ordered message list |
//! | `error` | complete entry; reply failure with the worker's reason |
//!
//! Events for unknown correlation ids are logged and dropped without side
//! effects. A duplicate terminal event after completion finds no entry and is
//! likewise an idempotent drop.

use tracing::{debug, warn};

use crate::bridge::registry::{PendingEntry, RequestKind, RequestRegistry};
use crate::bridge::QueryEvent;
use crate::protocol::{EventPayload, WorkerEvent};
use crate::AppError;

/// Route one decoded worker event against the registry.
///
/// Runs inside the bridge actor loop; never panics and never escalates —
/// transport-level oddities (unknown ids, stray pongs, duplicate terminals)
/// are logged and absorbed here.
pub fn route(registry: &mut RequestRegistry, event: WorkerEvent) {
    let WorkerEvent { query_id, payload } = event;

    match payload {
        EventPayload::Pong => match registry.kind_of(&query_id) {
            Some(RequestKind::Ping) => {
                if let Some(entry) = registry.complete(&query_id) {
                    entry.caller.finish(Ok(Vec::new()));
                    debug!(query_id, "pong resolved pending ping");
                }
            }
            Some(RequestKind::Query) => {
                debug!(query_id, "pong for a query entry, ignoring");
            }
            None => {
                debug!(query_id, "pong for unknown or completed id, ignoring");
            }
        },

        EventPayload::Message { data } => {
            if registry.append(&query_id, data.clone()) {
                registry.forward(&query_id, QueryEvent::Message { data });
            }
        }

        EventPayload::ToolUse {
            tool,
            args,
            tool_use_id,
        } => forward_or_drop(
            registry,
            &query_id,
            QueryEvent::ToolUse {
                tool,
                args,
                tool_use_id,
            },
        ),

        EventPayload::ToolResult {
            tool_use_id,
            result,
        } => forward_or_drop(
            registry,
            &query_id,
            QueryEvent::ToolResult {
                tool_use_id,
                result,
            },
        ),

        EventPayload::Thinking { thinking } => {
            forward_or_drop(registry, &query_id, QueryEvent::Thinking { thinking });
        }

        EventPayload::Text { text } => {
            forward_or_drop(registry, &query_id, QueryEvent::Text { text });
        }

        EventPayload::PartialMessage { delta } => {
            forward_or_drop(registry, &query_id, QueryEvent::PartialMessage { delta });
        }

        EventPayload::System { system_message } => {
            forward_or_drop(registry, &query_id, QueryEvent::System { system_message });
        }

        EventPayload::Done => match registry.complete(&query_id) {
            Some(PendingEntry {
                caller, messages, ..
            }) => {
                caller.finish(Ok(messages));
                debug!(query_id, "query completed");
            }
            None => {
                warn!(query_id, "done for unknown or completed id, dropping");
            }
        },

        EventPayload::Error { error } => match registry.complete(&query_id) {
            Some(PendingEntry { caller, .. }) => {
                caller.finish(Err(AppError::Domain(error)));
                debug!(query_id, "query failed with worker error");
            }
            None => {
                warn!(query_id, "error for unknown or completed id, dropping");
            }
        },
    }
}

/// Forward an intermediate event, dropping it when the id is unknown.
fn forward_or_drop(registry: &RequestRegistry, query_id: &str, event: QueryEvent) {
    if !registry.forward(query_id, event) {
        warn!(query_id, "intermediate event for unknown id, dropping");
    }
}
