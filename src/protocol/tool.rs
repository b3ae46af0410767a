//! Tool descriptors advertised to the worker process.
//!
//! Only the declarative descriptor (name, description, input schema) crosses
//! the wire; tool execution happens inside the worker and is outside the
//! bridge's responsibility. A handler callable can be attached for callers
//! that dispatch tool work host-side, but the bridge itself never invokes it.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// Callable tool implementation: validated arguments in, result or error out.
pub type ToolHandler = dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync;

/// Declarative tool definition sent to the worker as part of query options.
#[derive(Clone, Serialize)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema describing the tool's argument structure.
    pub input_schema: Value,
    /// Optional host-side implementation. Never serialized; tools are not
    /// persisted — store identity plus static arguments and reconstruct the
    /// callable when persistence is needed.
    #[serde(skip)]
    pub handler: Option<Arc<ToolHandler>>,
}

impl Tool {
    /// Create a descriptor-only tool (no host-side handler).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: None,
        }
    }

    /// Attach a host-side handler to this tool.
    #[must_use]
    pub fn with_handler(
        mut self,
        handler: impl Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl PartialEq for Tool {
    fn eq(&self, other: &Self) -> bool {
        // Handlers are identity-less; equality covers the wire-visible parts.
        self.name == other.name
            && self.description == other.description
            && self.input_schema == other.input_schema
    }
}
