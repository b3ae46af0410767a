//! Inbound wire responses (worker → caller).
//!
//! Each stdout line from the worker is one JSON object tagged by `type`.
//! Parsing is envelope-first: the `type` and `query_id` fields are extracted,
//! then the type-specific payload is deserialized. Malformed JSON yields
//! [`AppError::Decode`] so the reader can log and drop the line; a
//! syntactically valid line with an unrecognized `type` is skipped (logged at
//! `DEBUG`), never treated as fatal.
//!
//! # Known inbound types
//!
//! | type              | terminal | payload                          |
//! |-------------------|----------|----------------------------------|
//! | `pong`            | —        | none                             |
//! | `message`         | no       | `data` (accumulated)             |
//! | `tool_use`        | no       | `tool`, `args`, `tool_use_id`    |
//! | `tool_result`     | no       | `tool_use_id`, `result`          |
//! | `thinking`        | no       | `thinking`                       |
//! | `text`            | no       | `text`                           |
//! | `partial_message` | no       | `delta`                          |
//! | `system`          | no       | `system_message`                 |
//! | `done`            | yes      | none                             |
//! | `error`           | yes      | `error`                          |

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{AppError, Result};

// ── Inbound envelope ──────────────────────────────────────────────────────────

/// Top-level response envelope (worker → caller).
#[derive(Debug, Deserialize)]
struct Envelope {
    /// Response type identifier (e.g., `text`, `done`).
    #[serde(rename = "type")]
    kind: String,
    /// Correlation id linking the event to its originating request.
    query_id: String,
    /// Type-specific payload fields, captured for a second-stage parse.
    #[serde(flatten)]
    rest: Value,
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ToolUseParams {
    tool: String,
    args: Value,
    tool_use_id: String,
}

#[derive(Debug, Deserialize)]
struct ToolResultParams {
    tool_use_id: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ThinkingParams {
    thinking: String,
}

#[derive(Debug, Deserialize)]
struct TextParams {
    text: String,
}

#[derive(Debug, Deserialize)]
struct PartialMessageParams {
    delta: Value,
}

#[derive(Debug, Deserialize)]
struct SystemParams {
    system_message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorParams {
    error: String,
}

// ── Decoded event ─────────────────────────────────────────────────────────────

/// One decoded response event from the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerEvent {
    /// Correlation id of the originating request.
    pub query_id: String,
    /// Type-specific payload.
    pub payload: EventPayload,
}

/// Type-specific payload of a [`WorkerEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Reply to a ping.
    Pong,
    /// A complete assistant message; accumulated for the aggregate result.
    Message {
        /// Message body as emitted by the worker.
        data: Value,
    },
    /// The model invoked a tool.
    ToolUse {
        /// Tool name.
        tool: String,
        /// Tool arguments.
        args: Value,
        /// Id linking this invocation to its result.
        tool_use_id: String,
    },
    /// A tool invocation produced a result.
    ToolResult {
        /// Id of the originating invocation.
        tool_use_id: String,
        /// Tool output.
        result: Value,
    },
    /// Model reasoning text.
    Thinking {
        /// Reasoning content.
        thinking: String,
    },
    /// Assistant text fragment.
    Text {
        /// Text content.
        text: String,
    },
    /// Incremental message delta.
    PartialMessage {
        /// Delta body.
        delta: Value,
    },
    /// Out-of-band system notification from the worker.
    System {
        /// Notification text.
        system_message: String,
    },
    /// Terminal: the query completed successfully.
    Done,
    /// Terminal: the query failed; the reason is opaque to the bridge.
    Error {
        /// Worker-provided failure reason.
        error: String,
    },
}

impl EventPayload {
    /// Whether this payload completes (and removes) the registry entry.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// Wire name of this payload's type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::Message { .. } => "message",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Thinking { .. } => "thinking",
            Self::Text { .. } => "text",
            Self::PartialMessage { .. } => "partial_message",
            Self::System { .. } => "system",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a single NDJSON line from the worker into a [`WorkerEvent`].
///
/// # Return value
///
/// - `Ok(Some(event))` — the line is a recognized, complete response.
/// - `Ok(None)` — the line is empty/whitespace or has an unknown `type`
///   (skipped; unknown types are logged at `DEBUG` level).
/// - `Err(AppError::Decode(...))` — not valid JSON, or a known type with a
///   missing required field. The caller logs and drops the line, continuing
///   to read subsequent lines.
///
/// # Errors
///
/// - [`AppError::Decode`]`("malformed json: …")` — not valid JSON.
/// - [`AppError::Decode`]`("missing required field: …")` — recognized type
///   but a required payload field is absent.
pub fn parse_line(line: &str) -> Result<Option<WorkerEvent>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let envelope: Envelope =
        serde_json::from_str(line).map_err(|e| AppError::Decode(format!("malformed json: {e}")))?;

    let query_id = envelope.query_id;
    let payload = match envelope.kind.as_str() {
        "pong" => EventPayload::Pong,
        "done" => EventPayload::Done,
        "message" => {
            let p: MessageParams = parse_params("message", envelope.rest)?;
            EventPayload::Message { data: p.data }
        }
        "tool_use" => {
            let p: ToolUseParams = parse_params("tool_use", envelope.rest)?;
            EventPayload::ToolUse {
                tool: p.tool,
                args: p.args,
                tool_use_id: p.tool_use_id,
            }
        }
        "tool_result" => {
            let p: ToolResultParams = parse_params("tool_result", envelope.rest)?;
            EventPayload::ToolResult {
                tool_use_id: p.tool_use_id,
                result: p.result,
            }
        }
        "thinking" => {
            let p: ThinkingParams = parse_params("thinking", envelope.rest)?;
            EventPayload::Thinking {
                thinking: p.thinking,
            }
        }
        "text" => {
            let p: TextParams = parse_params("text", envelope.rest)?;
            EventPayload::Text { text: p.text }
        }
        "partial_message" => {
            let p: PartialMessageParams = parse_params("partial_message", envelope.rest)?;
            EventPayload::PartialMessage { delta: p.delta }
        }
        "system" => {
            let p: SystemParams = parse_params("system", envelope.rest)?;
            EventPayload::System {
                system_message: p.system_message,
            }
        }
        "error" => {
            let p: ErrorParams = parse_params("error", envelope.rest)?;
            EventPayload::Error { error: p.error }
        }
        other => {
            debug!(
                kind = other,
                query_id, "response parser: skipping unknown inbound type"
            );
            return Ok(None);
        }
    };

    Ok(Some(WorkerEvent { query_id, payload }))
}

/// Deserialize the payload fields of a recognized response type.
fn parse_params<T: for<'de> Deserialize<'de>>(kind: &str, rest: Value) -> Result<T> {
    serde_json::from_value(rest)
        .map_err(|e| AppError::Decode(format!("missing required field: {kind} payload: {e}")))
}
