//! Conversations: reusable settings merged into each query.
//!
//! A conversation captures defaults (system prompt, tools, model, working
//! directory) once and re-merges them with per-query overrides on every call
//! — call-time values always win, field by field. The conversation never sits
//! in the event path: a query issued through it designates the original
//! issuing context as the recipient of intermediate and terminal events, so
//! events are not funnelled through an extra hop.
//!
//! State machine: `Created` (settings captured, no queries yet) → `Active`
//! (one or more queries issued) → `Stopped` (terminal; further queries fail
//! with [`AppError::Stopped`]).

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::bridge::{BridgeHandle, QueryEvent, QueryStream};
use crate::protocol::{new_query_id, QueryOptions};
use crate::{AppError, Result};

/// Lifecycle state of a [`Conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Settings captured, no queries issued yet.
    Created,
    /// At least one query issued; settings remain fixed.
    Active,
    /// Terminal; further queries fail.
    Stopped,
}

#[derive(Debug)]
struct ConversationInner {
    id: String,
    bridge: BridgeHandle,
    defaults: QueryOptions,
    state: Mutex<ConversationState>,
}

/// Cloneable handle to a conversation. Clones share the same state.
#[derive(Debug, Clone)]
pub struct Conversation {
    inner: Arc<ConversationInner>,
}

impl Conversation {
    /// Capture `defaults` for queries issued through this conversation.
    #[must_use]
    pub fn new(bridge: BridgeHandle, defaults: QueryOptions) -> Self {
        Self {
            inner: Arc::new(ConversationInner {
                id: new_query_id(),
                bridge,
                defaults,
                state: Mutex::new(ConversationState::Created),
            }),
        }
    }

    /// Conversation identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConversationState {
        *lock_state(&self.inner.state)
    }

    /// Stop the conversation. Terminal and idempotent; in-flight queries are
    /// unaffected, but subsequent ones fail with [`AppError::Stopped`].
    pub fn stop(&self) {
        *lock_state(&self.inner.state) = ConversationState::Stopped;
    }

    /// Blocking query with this conversation's defaults merged under
    /// `overrides`.
    ///
    /// # Errors
    ///
    /// [`AppError::Stopped`] when the conversation has been stopped; otherwise
    /// the same failure modes as [`BridgeHandle::query`].
    pub async fn query(&self, prompt: &str, overrides: QueryOptions) -> Result<Vec<Value>> {
        self.activate()?;
        let merged = overrides.merged_over(&self.inner.defaults);
        self.inner.bridge.query(prompt, merged).await
    }

    /// Non-blocking query with merged options; see
    /// [`BridgeHandle::query_async`] for the fan-out delivery contract.
    ///
    /// # Errors
    ///
    /// [`AppError::Stopped`] when the conversation has been stopped; otherwise
    /// the same failure modes as [`BridgeHandle::query_async`].
    pub async fn query_async<F>(
        &self,
        prompt: &str,
        overrides: QueryOptions,
        callback: F,
    ) -> Result<(String, mpsc::UnboundedReceiver<QueryEvent>)>
    where
        F: Fn(QueryEvent) + Send + 'static,
    {
        self.activate()?;
        let merged = overrides.merged_over(&self.inner.defaults);
        self.inner.bridge.query_async(prompt, merged, callback).await
    }

    /// Pull-based event stream with merged options. The stream does **not**
    /// own this conversation: its cleanup leaves the conversation running.
    ///
    /// # Errors
    ///
    /// [`AppError::Stopped`] when the conversation has been stopped; otherwise
    /// [`AppError::Closed`] when the bridge actor has terminated.
    pub async fn query_stream(&self, prompt: &str, overrides: QueryOptions) -> Result<QueryStream> {
        self.stream_with_ownership(prompt, overrides, false).await
    }

    /// Stream constructor shared with [`BridgeHandle::query_stream`], which
    /// passes `owns_conversation = true` for its throwaway conversation.
    pub(crate) async fn stream_with_ownership(
        &self,
        prompt: &str,
        overrides: QueryOptions,
        owns_conversation: bool,
    ) -> Result<QueryStream> {
        self.activate()?;
        let merged = overrides.merged_over(&self.inner.defaults);
        let (query_id, event_rx) = self.inner.bridge.subscribe(prompt, merged).await?;
        Ok(QueryStream::new(
            query_id,
            event_rx,
            self.inner.bridge.stream_idle_timeout(),
            self.clone(),
            owns_conversation,
        ))
    }

    /// Transition Created → Active, rejecting stopped conversations.
    fn activate(&self) -> Result<()> {
        let mut state = lock_state(&self.inner.state);
        match *state {
            ConversationState::Stopped => Err(AppError::Stopped(format!(
                "conversation '{}' no longer accepts queries",
                self.inner.id
            ))),
            ConversationState::Created => {
                *state = ConversationState::Active;
                Ok(())
            }
            ConversationState::Active => Ok(()),
        }
    }
}

/// Lock the state mutex, recovering from poisoning (state is a plain enum,
/// always valid).
fn lock_state(state: &Mutex<ConversationState>) -> std::sync::MutexGuard<'_, ConversationState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
