//! Outbound wire requests (caller → worker).
//!
//! Each request serializes to exactly one line of compact JSON. Embedded
//! newlines in prompt text are escaped by JSON string encoding, so the
//! NDJSON framing invariant holds for arbitrary caller input.

use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::protocol::Tool;
use crate::{AppError, Result};

/// Per-query settings merged from conversation defaults and call-time
/// overrides. Field-level precedence: call-time values always win.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOptions {
    /// Working directory the worker should operate in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Tools advertised to the model for this query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// System prompt prepended to the query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Model identifier override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl QueryOptions {
    /// Merge `self` (call-time overrides) over `defaults` (conversation
    /// settings). Each field set at call time replaces the default wholesale;
    /// unset fields fall back to the default.
    #[must_use]
    pub fn merged_over(self, defaults: &Self) -> Self {
        Self {
            working_dir: self.working_dir.or_else(|| defaults.working_dir.clone()),
            tools: self.tools.or_else(|| defaults.tools.clone()),
            system_prompt: self
                .system_prompt
                .or_else(|| defaults.system_prompt.clone()),
            model: self.model.or_else(|| defaults.model.clone()),
        }
    }
}

/// Outbound request envelope, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// A prompt for the worker's agent loop.
    Query {
        /// Correlation id linking all response events back to this request.
        query_id: String,
        /// Prompt text.
        prompt: String,
        /// Merged per-query settings.
        options: QueryOptions,
    },
    /// Liveness probe; the worker answers with a `pong` carrying the same id.
    Ping {
        /// Correlation id echoed back in the pong.
        query_id: String,
    },
}

impl Request {
    /// Correlation id of this request.
    #[must_use]
    pub fn query_id(&self) -> &str {
        match self {
            Self::Query { query_id, .. } | Self::Ping { query_id } => query_id,
        }
    }

    /// Serialize to a single compact JSON line (without the trailing `\n`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` if serialization fails (should not occur
    /// for well-formed options).
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| AppError::Decode(format!("failed to serialize request: {err}")))
    }
}

/// Generate a fresh correlation id.
///
/// UUID v4 rendered without hyphens: 122 bits of randomness, which makes a
/// collision across concurrently outstanding requests negligible.
#[must_use]
pub fn new_query_id() -> String {
    Uuid::new_v4().simple().to_string()
}
