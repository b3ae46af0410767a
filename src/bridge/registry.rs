//! Pending-request registry.
//!
//! Maps correlation ids to in-flight request state. The registry is owned and
//! mutated exclusively by the bridge actor's sequential loop, so it needs no
//! locking: all mutation is funnelled through that single control point.
//!
//! Invariants:
//! - at most one [`PendingEntry`] per correlation id at any time;
//! - once removed (terminal event or fatal worker exit), an id is never
//!   recreated;
//! - accumulated messages are kept in arrival order, which matches the
//!   worker's emission order because lines are processed sequentially.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::bridge::QueryEvent;
use crate::{AppError, Result};

/// Kind of an in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A prompt for the worker's agent loop.
    Query,
    /// A liveness probe.
    Ping,
}

/// Reply target for a pending request.
///
/// The variant fixes the delivery style chosen by the public API call that
/// registered the request.
#[derive(Debug)]
pub enum Caller {
    /// Blocking `query`: one terminal reply carrying the aggregate result.
    Aggregate(oneshot::Sender<Result<Vec<Value>>>),
    /// `query_async` / stream: every event, intermediate and terminal, is
    /// pushed through this channel in arrival order.
    Subscriber(mpsc::UnboundedSender<QueryEvent>),
    /// `ping`: one terminal reply, success or tagged failure.
    Ping(oneshot::Sender<Result<()>>),
}

impl Caller {
    /// Forward an intermediate event. Aggregate and ping callers only observe
    /// terminal outcomes, so forwarding is a no-op for them.
    pub fn forward(&self, event: QueryEvent) {
        if let Self::Subscriber(tx) = self {
            // A dropped receiver means the caller abandoned the stream; the
            // entry still completes normally on the terminal event.
            let _ = tx.send(event);
        }
    }

    /// Deliver the terminal outcome and consume the reply target.
    pub fn finish(self, outcome: Result<Vec<Value>>) {
        match self {
            Self::Aggregate(tx) => {
                let _ = tx.send(outcome);
            }
            Self::Subscriber(tx) => {
                let event = match outcome {
                    Ok(messages) => QueryEvent::Done { messages },
                    Err(err) => QueryEvent::Error {
                        error: err.to_string(),
                    },
                };
                let _ = tx.send(event);
            }
            Self::Ping(tx) => {
                let _ = tx.send(outcome.map(|_| ()));
            }
        }
    }
}

/// State of one in-flight request.
#[derive(Debug)]
pub struct PendingEntry {
    /// Reply target.
    pub caller: Caller,
    /// Request kind.
    pub kind: RequestKind,
    /// Accumulated `message` events, in arrival order (query kind only).
    pub messages: Vec<Value>,
}

/// Correlation-id → pending-request map.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    entries: HashMap<String, PendingEntry>,
}

impl RequestRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no requests are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a request with this id is pending.
    #[must_use]
    pub fn contains(&self, query_id: &str) -> bool {
        self.entries.contains_key(query_id)
    }

    /// Kind of the pending request with this id, if any.
    #[must_use]
    pub fn kind_of(&self, query_id: &str) -> Option<RequestKind> {
        self.entries.get(query_id).map(|entry| entry.kind)
    }

    /// Register a new pending request.
    ///
    /// # Errors
    ///
    /// A duplicate id hands `caller` back together with
    /// [`AppError::Registry`] so the submitter can deliver the failure to it.
    /// Ids carry 122 bits of randomness, so a collision is a programmer
    /// error, not an operational condition.
    pub fn register(
        &mut self,
        query_id: &str,
        caller: Caller,
        kind: RequestKind,
    ) -> std::result::Result<(), (Caller, AppError)> {
        if self.entries.contains_key(query_id) {
            return Err((
                caller,
                AppError::Registry(format!(
                    "correlation id '{query_id}' is already registered"
                )),
            ));
        }
        self.entries.insert(
            query_id.to_owned(),
            PendingEntry {
                caller,
                kind,
                messages: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append an accumulated message to a pending entry.
    ///
    /// Returns `false` (with a logged warning) when the id is absent — the
    /// response arrived after completion or for an unknown id, which is
    /// informational, never fatal.
    pub fn append(&mut self, query_id: &str, message: Value) -> bool {
        match self.entries.get_mut(query_id) {
            Some(entry) => {
                entry.messages.push(message);
                true
            }
            None => {
                warn!(query_id, "message for unknown or completed id, dropping");
                false
            }
        }
    }

    /// Remove and return the entry for a terminal event.
    ///
    /// Returns `None` when the id is absent (already completed or never
    /// registered); the caller logs and drops the event. The returned
    /// `messages` are in original chronological order.
    pub fn complete(&mut self, query_id: &str) -> Option<PendingEntry> {
        self.entries.remove(query_id)
    }

    /// Forward an intermediate event to the entry's caller.
    ///
    /// Returns `false` when the id is absent; the event is dropped without
    /// side effects.
    pub fn forward(&self, query_id: &str, event: QueryEvent) -> bool {
        match self.entries.get(query_id) {
            Some(entry) => {
                entry.caller.forward(event);
                true
            }
            None => false,
        }
    }

    /// Remove the entry and signal `reason` to its caller.
    ///
    /// Returns `false` when the id is absent.
    pub fn fail(&mut self, query_id: &str, reason: AppError) -> bool {
        match self.entries.remove(query_id) {
            Some(entry) => {
                entry.caller.finish(Err(reason));
                true
            }
            None => {
                debug!(query_id, "fail for unknown or completed id, ignoring");
                false
            }
        }
    }

    /// Fatal worker exit: signal `reason` to every pending caller and empty
    /// the map.
    pub fn drain_all(&mut self, reason: &AppError) {
        let drained = self.entries.len();
        for (query_id, entry) in self.entries.drain() {
            debug!(query_id, %reason, "failing pending request on worker exit");
            entry.caller.finish(Err(reason.clone()));
        }
        if drained > 0 {
            warn!(count = drained, %reason, "drained pending requests");
        }
    }
}
