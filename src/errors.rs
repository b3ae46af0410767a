//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Propagation policy:
/// - transport-layer faults ([`Decode`](Self::Decode) and events for unknown
///   correlation ids) are absorbed and logged by the bridge, never escalated;
/// - process-layer faults ([`ChildExit`](Self::ChildExit)) are fatal to the
///   bridge and fail every pending request with the same reason;
/// - application-layer faults ([`Domain`](Self::Domain)) are delivered as
///   ordinary failure results to the one affected caller only.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Configuration parsing, validation, or credential-loading failure.
    Config(String),
    /// Worker executable or entry script could not be located at startup.
    Startup(String),
    /// Malformed inbound line; logged and dropped, never fatal.
    Decode(String),
    /// Registry misuse, e.g. registering a duplicate correlation id.
    Registry(String),
    /// The worker process terminated while requests were pending.
    ChildExit {
        /// OS exit code when the worker exited normally; `None` on signal.
        exit_code: Option<i32>,
        /// Human-readable description of why the worker is gone.
        reason: String,
    },
    /// A caller-observed timeout (ping window or stream idle window).
    Timeout(String),
    /// An `error` event emitted by the worker, surfaced verbatim.
    Domain(String),
    /// Query issued against a conversation that has been stopped.
    Stopped(String),
    /// The bridge actor has terminated and no longer accepts requests.
    Closed(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Startup(msg) => write!(f, "startup: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Registry(msg) => write!(f, "registry: {msg}"),
            Self::ChildExit { exit_code, reason } => match exit_code {
                Some(code) => write!(f, "worker exit (code {code}): {reason}"),
                None => write!(f, "worker exit: {reason}"),
            },
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Domain(msg) => write!(f, "worker error: {msg}"),
            Self::Stopped(msg) => write!(f, "conversation stopped: {msg}"),
            Self::Closed(msg) => write!(f, "bridge closed: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
