#![forbid(unsafe_code)]

//! `agent-relay` — bridge a long-running caller to a single persistent
//! AI-agent worker process, multiplexing many concurrent logical requests
//! over one newline-delimited JSON stdio stream.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod worker;

pub use bridge::{Bridge, BridgeHandle, Conversation, ConversationState, QueryEvent, QueryStream};
pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use protocol::{QueryOptions, Tool};
