//! Pull-based stream adapter over one query's event flow.
//!
//! Wraps the per-request event channel in a lazy, single-pass sequence of
//! [`QueryEvent`]s. The sequence is finite (it closes after `done`/`error`)
//! and each pull suspends until the next event arrives or the idle window
//! elapses, in which case the stream yields one final timeout-error element
//! and then halts.
//!
//! Cleanup is ownership-aware: a stream created by
//! [`BridgeHandle::query_stream`](crate::bridge::BridgeHandle::query_stream)
//! owns the throwaway conversation backing it and stops it on halt (normal
//! end, error, timeout, or early drop); a stream obtained from
//! [`Conversation::query_stream`](crate::bridge::Conversation::query_stream)
//! never touches the caller's conversation.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::bridge::{Conversation, QueryEvent};

/// Single-pass event stream for one correlation id.
#[derive(Debug)]
pub struct QueryStream {
    query_id: String,
    event_rx: mpsc::UnboundedReceiver<QueryEvent>,
    idle_timeout: Duration,
    conversation: Conversation,
    owns_conversation: bool,
    finished: bool,
}

impl QueryStream {
    pub(crate) fn new(
        query_id: String,
        event_rx: mpsc::UnboundedReceiver<QueryEvent>,
        idle_timeout: Duration,
        conversation: Conversation,
        owns_conversation: bool,
    ) -> Self {
        Self {
            query_id,
            event_rx,
            idle_timeout,
            conversation,
            owns_conversation,
            finished: false,
        }
    }

    /// Correlation id of the underlying query.
    #[must_use]
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Override the idle window between pulls.
    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    /// Pull the next event.
    ///
    /// Suspends until an event for this query arrives or the idle window
    /// elapses. A timeout yields one final
    /// [`QueryEvent::Error`] element; after any terminal element (or `None`)
    /// every subsequent call returns `None`.
    pub async fn next(&mut self) -> Option<QueryEvent> {
        if self.finished {
            return None;
        }

        match tokio::time::timeout(self.idle_timeout, self.event_rx.recv()).await {
            Ok(Some(event)) => {
                if event.is_terminal() {
                    self.halt();
                }
                Some(event)
            }
            Ok(None) => {
                // Channel closed without a terminal event — bridge is gone.
                self.halt();
                None
            }
            Err(_) => {
                debug!(
                    query_id = self.query_id,
                    idle = ?self.idle_timeout,
                    "stream idle timeout, halting"
                );
                self.halt();
                Some(QueryEvent::Error {
                    error: format!("stream idle timeout after {:?}", self.idle_timeout),
                })
            }
        }
    }

    /// Collect every remaining event until the stream halts.
    pub async fn collect_events(mut self) -> Vec<QueryEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    /// Whether the stream has yielded its final element.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The conversation backing this stream.
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    fn halt(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if self.owns_conversation {
            self.conversation.stop();
        }
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        // Early abandonment runs the same ownership-aware cleanup.
        self.halt();
    }
}
