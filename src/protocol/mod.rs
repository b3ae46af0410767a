//! Wire protocol: newline-delimited JSON, one object per line, UTF-8.
//!
//! The protocol is stateless — [`request`] covers the outbound direction
//! (caller → worker), [`response`] the inbound direction (worker → caller).
//! Framing lives in [`crate::worker::codec`].

pub mod request;
pub mod response;
pub mod tool;

pub use request::{new_query_id, QueryOptions, Request};
pub use response::{parse_line, EventPayload, WorkerEvent};
pub use tool::{Tool, ToolHandler};
