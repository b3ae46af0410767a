//! Worker stdout reader task.
//!
//! Reads newline-delimited JSON from the worker's stdout, decodes each line
//! into a [`WorkerEvent`], and forwards the events to the bridge actor over a
//! tokio [`mpsc`] channel. Framing is driven by [`FramedRead`] backed by
//! [`LineCodec`], which enforces the 1 MiB per-line limit before any heap
//! allocation for JSON parsing.
//!
//! Malformed lines and unknown response types are logged and skipped — they
//! never terminate the reader; subsequent lines are still delivered. EOF and
//! unrecoverable I/O errors produce a final [`ReaderSignal::Closed`] so the
//! bridge can fail pending requests with an explicit reason.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{parse_line, WorkerEvent};
use crate::worker::codec::LineCodec;
use crate::{AppError, Result};

/// Items delivered from the reader task to the bridge actor.
#[derive(Debug)]
pub enum ReaderSignal {
    /// One decoded response event, in worker emission order.
    Event(WorkerEvent),
    /// The stream ended (EOF or unrecoverable I/O error); no further events
    /// will follow.
    Closed {
        /// Why the stream ended.
        reason: String,
    },
}

/// Reader task — decodes NDJSON lines from `stdout` into [`ReaderSignal`]s.
///
/// Per-line handling:
/// - decoded event → forwarded through `line_tx` (order preserved);
/// - malformed JSON or missing payload field → logged at `WARN`, skipped;
/// - oversize line (codec limit) → logged at `WARN`, skipped;
/// - empty line or unknown `type` → silently skipped;
/// - EOF / I/O error → [`ReaderSignal::Closed`] is sent, then the task ends.
///
/// # Cancellation
///
/// Respects `cancel`: when the token fires the reader exits cleanly without
/// emitting a `Closed` signal.
///
/// # Errors
///
/// Returns `Ok(())` on clean EOF or cancellation; unrecoverable I/O errors
/// are reported through the `Closed` signal rather than the return value.
pub async fn run_reader<R>(
    stdout: R,
    line_tx: mpsc::Sender<ReaderSignal>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("worker reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("worker reader: EOF detected");
                        send_closed(&line_tx, "stream closed").await;
                        break;
                    }

                    Some(Err(AppError::Decode(ref msg))) => {
                        // Oversize line — log and continue reading.
                        warn!(error = msg.as_str(), "worker reader: framing error, skipping");
                    }

                    Some(Err(e)) => {
                        // I/O error on the underlying stream — non-recoverable.
                        warn!(error = %e, "worker reader: IO error, stopping");
                        send_closed(&line_tx, &format!("stream error: {e}")).await;
                        break;
                    }

                    Some(Ok(line)) => {
                        match parse_line(&line) {
                            Ok(Some(event)) => {
                                if line_tx.send(ReaderSignal::Event(event)).await.is_err() {
                                    debug!("worker reader: bridge gone, stopping");
                                    break;
                                }
                            }
                            Ok(None) => {
                                // Empty line or unknown type — silently skipped.
                            }
                            Err(e) => {
                                warn!(
                                    error = %e,
                                    raw_line = %line,
                                    "worker reader: decode error, dropping line"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Send [`ReaderSignal::Closed`] through `line_tx`, logging on failure.
async fn send_closed(line_tx: &mpsc::Sender<ReaderSignal>, reason: &str) {
    let signal = ReaderSignal::Closed {
        reason: reason.to_owned(),
    };

    if line_tx.send(signal).await.is_err() {
        debug!("worker reader: bridge gone before Closed could be delivered");
    }
}
