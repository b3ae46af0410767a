//! The bridge actor and its public API.
//!
//! One single-threaded actor task exclusively owns the worker's stdin, the
//! pending-request registry, and the event router. All writes are serialized
//! through it, eliminating interleaved-write corruption on the wire; the
//! registry is mutated only inside the actor's sequential loop, so no lock is
//! needed. A reader task feeds decoded stdout lines into the actor's channel
//! and an exit monitor feeds the fatal termination notice into the same
//! select loop.
//!
//! Any number of callers may have requests outstanding concurrently; a
//! suspended `query` awaits only its own oneshot reply and never blocks the
//! actor's read/dispatch loop. Events sharing a correlation id are delivered
//! in the exact order the worker emitted them; no ordering holds across
//! distinct ids.
//!
//! On worker exit the actor first routes any response lines the worker
//! flushed before dying, then drains every still-pending entry with the same
//! tagged reason and terminates itself — restart is the enclosing supervisor's job
//! (crash-and-recreate), because worker-side in-flight state cannot be
//! resumed.

pub mod conversation;
pub mod registry;
pub mod router;
pub mod stream;

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::GlobalConfig;
use crate::protocol::{new_query_id, QueryOptions, Request};
use crate::worker::{monitor_exit, run_reader, spawn_worker, ExitNotice, ReaderSignal};
use crate::{AppError, Result};

pub use conversation::{Conversation, ConversationState};
pub use registry::{Caller, PendingEntry, RequestKind, RequestRegistry};
pub use stream::QueryStream;

/// Command channel depth for caller submissions.
const CMD_BUFFER: usize = 64;
/// Line channel depth between the reader task and the actor.
const LINE_BUFFER: usize = 256;
/// How long the exit notice and the reader's EOF wait for each other, in
/// either order: failures carry the real exit code instead of a generic
/// stream-closed reason, and lines the worker flushed before dying are still
/// routed.
const EXIT_NOTICE_GRACE: Duration = Duration::from_secs(5);

/// Default ping window for handles not built from a config file.
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);
/// Default stream idle window for handles not built from a config file.
const DEFAULT_STREAM_IDLE: Duration = Duration::from_secs(30);

// ── Events delivered to callers ───────────────────────────────────────────────

/// One `(event type, payload)` pair observed by a caller.
///
/// Intermediate variants mirror the wire events; the terminal variants fold
/// in the aggregate state ([`Done`](Self::Done) carries the ordered message
/// list, [`Error`](Self::Error) the failure reason).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    /// A complete assistant message (also accumulated for the aggregate).
    Message {
        /// Message body.
        data: Value,
    },
    /// The model invoked a tool.
    ToolUse {
        /// Tool name.
        tool: String,
        /// Tool arguments.
        args: Value,
        /// Id linking the invocation to its result.
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
    /// Out-of-band system notification.
    System {
        /// Notification text.
        system_message: String,
    },
    /// Terminal: the query completed; messages are in arrival order.
    Done {
        /// Ordered accumulated messages.
        messages: Vec<Value>,
    },
    /// Terminal: the query failed (worker error, timeout, or worker exit).
    Error {
        /// Failure reason.
        error: String,
    },
}

impl QueryEvent {
    /// Whether this event ends the request's event flow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Wire-style name of this event's type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Thinking { .. } => "thinking",
            Self::Text { .. } => "text",
            Self::PartialMessage { .. } => "partial_message",
            Self::System { .. } => "system",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

// ── Actor plumbing ────────────────────────────────────────────────────────────

/// Caller submissions into the actor loop.
#[derive(Debug)]
enum Command {
    /// Register a pending entry and write the request line to the worker.
    Submit {
        /// Encoded-on-demand outbound request.
        request: Request,
        /// Reply target stored in the registry.
        caller: Caller,
    },
}

/// Bridge constructors.
///
/// [`Bridge::start`] spawns and supervises a worker process;
/// [`Bridge::attach`] drives an already-connected pair of byte streams,
/// which is how the in-memory tests exercise the full actor without a child
/// process.
#[derive(Debug)]
pub struct Bridge;

impl Bridge {
    /// Spawn the worker described by `config` and start the bridge actor.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Startup`] when the worker executable or entry
    /// script cannot be located, or the OS spawn fails.
    pub fn start(config: &GlobalConfig) -> Result<BridgeHandle> {
        let connection = spawn_worker(config)?;
        let cancel = CancellationToken::new();

        let (exit_tx, exit_rx) = mpsc::channel(1);
        let _monitor = monitor_exit(connection.child, exit_tx, cancel.clone());

        let handle = start_actor(
            connection.stdout,
            connection.stdin,
            Some(exit_rx),
            cancel,
            config.ping_timeout(),
            config.stream_idle_timeout(),
        );
        Ok(handle)
    }

    /// Attach the bridge actor to an existing stream pair (worker stdout as
    /// `reader`, worker stdin as `writer`).
    ///
    /// No process is supervised: when `reader` reaches EOF the bridge fails
    /// pending requests with a stream-closed reason and terminates.
    pub fn attach<R, W>(reader: R, writer: W) -> BridgeHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        start_actor(
            reader,
            writer,
            None,
            CancellationToken::new(),
            DEFAULT_PING_TIMEOUT,
            DEFAULT_STREAM_IDLE,
        )
    }
}

/// Wire the reader and actor tasks together and hand back the public handle.
fn start_actor<R, W>(
    stdout: R,
    stdin: W,
    exit_rx: Option<mpsc::Receiver<ExitNotice>>,
    cancel: CancellationToken,
    ping_timeout: Duration,
    stream_idle: Duration,
) -> BridgeHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(CMD_BUFFER);
    let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);

    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = run_reader(stdout, line_tx, reader_cancel).await {
            warn!(%err, "worker reader task ended with error");
        }
    });

    tokio::spawn(run_loop(stdin, cmd_rx, line_rx, exit_rx, cancel));

    BridgeHandle {
        cmd_tx,
        ping_timeout,
        stream_idle,
    }
}

// ── Public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to a running bridge actor.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    cmd_tx: mpsc::Sender<Command>,
    ping_timeout: Duration,
    stream_idle: Duration,
}

impl BridgeHandle {
    /// Health check: send a ping and wait for the pong within the configured
    /// window.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] when no pong arrives in time. The pending
    ///   registry entry is deliberately left in place for the router to reap
    ///   on a late pong — an accepted leak risk when the worker never
    ///   answers, since requests cannot be cancelled client-side.
    /// - [`AppError::Closed`] when the bridge actor has terminated.
    pub async fn ping(&self) -> Result<()> {
        self.ping_with_timeout(self.ping_timeout).await
    }

    /// [`ping`](Self::ping) with an explicit timeout window.
    ///
    /// # Errors
    ///
    /// See [`ping`](Self::ping).
    pub async fn ping_with_timeout(&self, window: Duration) -> Result<()> {
        let query_id = new_query_id();
        let (tx, rx) = oneshot::channel();
        self.submit(Request::Ping { query_id }, Caller::Ping(tx))
            .await?;

        match tokio::time::timeout(window, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(AppError::Closed("bridge dropped the ping reply".into())),
            Err(_) => Err(AppError::Timeout(format!("no pong within {window:?}"))),
        }
    }

    /// Blocking query: suspends the calling task until the terminal event,
    /// then returns the accumulated messages in arrival order.
    ///
    /// Only this caller suspends — the bridge keeps servicing every other
    /// pending request concurrently.
    ///
    /// # Errors
    ///
    /// - [`AppError::Domain`] when the worker answers with an `error` event.
    /// - [`AppError::ChildExit`] when the worker terminates mid-query.
    /// - [`AppError::Closed`] when the bridge actor has terminated.
    pub async fn query(&self, prompt: &str, options: QueryOptions) -> Result<Vec<Value>> {
        let (tx, rx) = oneshot::channel();
        let request = Request::Query {
            query_id: new_query_id(),
            prompt: prompt.to_owned(),
            options,
        };
        self.submit(request, Caller::Aggregate(tx)).await?;

        rx.await
            .map_err(|_| AppError::Closed("bridge dropped the query reply".into()))?
    }

    /// Non-blocking query: returns the correlation id and a mailbox receiver
    /// immediately.
    ///
    /// Delivery is a fan-out over one internal event channel with two
    /// independent consumers: `callback` is invoked for every event
    /// (intermediate and terminal), and the same events are forwarded into
    /// the returned mailbox, so push- and pull-style integrations coexist
    /// without conflicting semantics.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] when the bridge actor has terminated.
    pub async fn query_async<F>(
        &self,
        prompt: &str,
        options: QueryOptions,
        callback: F,
    ) -> Result<(String, mpsc::UnboundedReceiver<QueryEvent>)>
    where
        F: Fn(QueryEvent) + Send + 'static,
    {
        let (query_id, mut event_rx) = self.subscribe(prompt, options).await?;
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                callback(event.clone());
                // Mailbox receiver may be dropped; the callback consumer is
                // unaffected.
                let _ = mailbox_tx.send(event);
            }
        });

        Ok((query_id, mailbox_rx))
    }

    /// Lazy, pull-based event stream for one query.
    ///
    /// The bridge creates a conversation solely for the stream's lifetime;
    /// the stream owns it and stops it on halt. To stream against your own
    /// conversation use [`Conversation::query_stream`], which leaves the
    /// conversation untouched on cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Closed`] when the bridge actor has terminated.
    pub async fn query_stream(&self, prompt: &str, options: QueryOptions) -> Result<QueryStream> {
        let conversation = Conversation::new(self.clone(), QueryOptions::default());
        conversation
            .stream_with_ownership(prompt, options, true)
            .await
    }

    /// Start a conversation holding reusable settings merged into each query
    /// issued through it.
    #[must_use]
    pub fn conversation(&self, defaults: QueryOptions) -> Conversation {
        Conversation::new(self.clone(), defaults)
    }

    /// Configured stream idle window.
    #[must_use]
    pub fn stream_idle_timeout(&self) -> Duration {
        self.stream_idle
    }

    /// Register a subscriber entry and return its raw event channel.
    pub(crate) async fn subscribe(
        &self,
        prompt: &str,
        options: QueryOptions,
    ) -> Result<(String, mpsc::UnboundedReceiver<QueryEvent>)> {
        let query_id = new_query_id();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let request = Request::Query {
            query_id: query_id.clone(),
            prompt: prompt.to_owned(),
            options,
        };
        self.submit(request, Caller::Subscriber(event_tx)).await?;
        Ok((query_id, event_rx))
    }

    async fn submit(&self, request: Request, caller: Caller) -> Result<()> {
        self.cmd_tx
            .send(Command::Submit { request, caller })
            .await
            .map_err(|_| AppError::Closed("bridge actor is no longer running".into()))
    }
}

// ── Actor loop ────────────────────────────────────────────────────────────────

/// The bridge actor: sole owner of worker stdin and the registry.
async fn run_loop<W>(
    mut stdin: W,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut line_rx: mpsc::Receiver<ReaderSignal>,
    mut exit_rx: Option<mpsc::Receiver<ExitNotice>>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut registry = RequestRegistry::new();

    let fatal = loop {
        tokio::select! {
            biased;

            // Lines are polled before the exit notice: responses the worker
            // flushed before dying must reach their callers, not be
            // clobbered by the exit path.
            signal = line_rx.recv() => match signal {
                Some(ReaderSignal::Event(event)) => router::route(&mut registry, event),
                Some(ReaderSignal::Closed { reason }) => {
                    // The stream usually closes because the process died;
                    // give the exit monitor a moment so failures carry the
                    // real exit code.
                    break await_exit_notice(&mut exit_rx, reason).await;
                }
                None => {
                    break AppError::ChildExit {
                        exit_code: None,
                        reason: "worker reader terminated".into(),
                    };
                }
            },

            notice = recv_exit(&mut exit_rx) => {
                info!(exit_code = ?notice.exit_code, reason = %notice.reason, "worker exited");
                break flush_lines_then_fail(&mut registry, &mut line_rx, notice).await;
            }

            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Submit { request, caller }) => {
                    handle_submit(&mut stdin, &mut registry, request, caller).await;
                }
                None => {
                    debug!("all bridge handles dropped, shutting down");
                    registry.drain_all(&AppError::Closed("bridge shut down".into()));
                    cancel.cancel();
                    return;
                }
            },
        }
    };

    registry.drain_all(&fatal);
    cancel.cancel();
}

/// Register a pending entry and write the encoded request line to the worker.
async fn handle_submit<W>(
    stdin: &mut W,
    registry: &mut RequestRegistry,
    request: Request,
    caller: Caller,
) where
    W: AsyncWrite + Unpin + Send,
{
    let query_id = request.query_id().to_owned();
    let kind = match &request {
        Request::Query { .. } => RequestKind::Query,
        Request::Ping { .. } => RequestKind::Ping,
    };

    let line = match request.to_line() {
        Ok(line) => line,
        Err(err) => {
            caller.finish(Err(err));
            return;
        }
    };

    if let Err((caller, err)) = registry.register(&query_id, caller, kind) {
        error!(query_id, %err, "rejected duplicate correlation id");
        caller.finish(Err(err));
        return;
    }

    let mut bytes = line.into_bytes();
    bytes.push(b'\n');

    let write_result = async {
        stdin.write_all(&bytes).await?;
        stdin.flush().await
    }
    .await;

    if let Err(err) = write_result {
        warn!(query_id, %err, "write to worker stdin failed");
        registry.fail(
            &query_id,
            AppError::Io(format!("write to worker stdin failed: {err}")),
        );
    }
}

/// Await the exit monitor's notice; pends forever in attach mode.
async fn recv_exit(exit_rx: &mut Option<mpsc::Receiver<ExitNotice>>) -> ExitNotice {
    loop {
        match exit_rx {
            Some(rx) => {
                if let Some(notice) = rx.recv().await {
                    return notice;
                }
                *exit_rx = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// After the exit notice: keep routing lines the worker flushed before dying
/// until the reader reports EOF (or the grace window elapses), then return
/// the fatal reason for the entries still pending.
async fn flush_lines_then_fail(
    registry: &mut RequestRegistry,
    line_rx: &mut mpsc::Receiver<ReaderSignal>,
    notice: ExitNotice,
) -> AppError {
    let deadline = tokio::time::Instant::now() + EXIT_NOTICE_GRACE;
    loop {
        match tokio::time::timeout_at(deadline, line_rx.recv()).await {
            Ok(Some(ReaderSignal::Event(event))) => router::route(registry, event),
            Ok(Some(ReaderSignal::Closed { .. }) | None) | Err(_) => break,
        }
    }
    AppError::ChildExit {
        exit_code: notice.exit_code,
        reason: notice.reason,
    }
}

/// After stdout closed: prefer the real exit notice over a generic reason.
async fn await_exit_notice(
    exit_rx: &mut Option<mpsc::Receiver<ExitNotice>>,
    fallback_reason: String,
) -> AppError {
    if let Some(rx) = exit_rx {
        if let Ok(Some(notice)) = tokio::time::timeout(EXIT_NOTICE_GRACE, rx.recv()).await {
            return AppError::ChildExit {
                exit_code: notice.exit_code,
                reason: notice.reason,
            };
        }
    }
    AppError::ChildExit {
        exit_code: None,
        reason: fallback_reason,
    }
}
