//! Tailing reader over a growing log artifact.

use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Largest chunk handed out when a line has no terminator yet.
pub const MAX_CHUNK_BYTES: u64 = 64 * 1024;

/// Event produced by a [`LogCursor`].
#[derive(Debug)]
pub enum CursorEvent {
    /// Next chunk in file order; the cursor reads on once `ack` fires.
    Chunk {
        /// Content.
        bytes: Bytes,
        /// Acknowledgement that the chunk was accepted for delivery.
        ack: oneshot::Sender<()>,
    },
    /// Reading failed; no further events follow.
    Failed(io::Error),
    /// Draining reached the end of the artifact; no further events follow.
    Exhausted,
}

/// Tailing cursor reading line-delimited chunks on a background task.
///
/// At the current end of the artifact the reader waits `backoff` before
/// looking again. Once [`LogCursor::drain`] is called, reaching the end
/// yields [`CursorEvent::Exhausted`] instead. Dropping the cursor stops the
/// reader and closes the file.
#[derive(Debug)]
pub struct LogCursor {
    events: mpsc::Receiver<CursorEvent>,
    drain: CancellationToken,
    stop: CancellationToken,
    reader: JoinHandle<()>,
}

impl LogCursor {
    /// Starts tailing `file` from its current position.
    #[must_use]
    pub fn spawn(file: File, backoff: Duration) -> Self {
        let (sender, events) = mpsc::channel(1);
        let drain = CancellationToken::new();
        let stop = CancellationToken::new();
        let reader = tokio::spawn(tail(
            BufReader::new(file),
            backoff,
            sender,
            drain.clone(),
            stop.clone(),
        ));
        Self {
            events,
            drain,
            stop,
            reader,
        }
    }

    /// Returns the next event, or `None` once the reader has stopped.
    ///
    /// Cancel-safe: no content is lost when the future is dropped.
    pub async fn next(&mut self) -> Option<CursorEvent> {
        self.events.recv().await
    }

    /// Switches to draining: the next end of file ends the stream.
    pub fn drain(&self) {
        self.drain.cancel();
    }
}

impl Drop for LogCursor {
    fn drop(&mut self) {
        self.stop.cancel();
        self.reader.abort();
    }
}

async fn tail(
    mut reader: BufReader<File>,
    backoff: Duration,
    events: mpsc::Sender<CursorEvent>,
    drain: CancellationToken,
    stop: CancellationToken,
) {
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let read = (&mut reader)
            .take(MAX_CHUNK_BYTES)
            .read_until(b'\n', &mut buffer)
            .await;
        match read {
            Ok(0) => {
                if drain.is_cancelled() {
                    let _sent = events.send(CursorEvent::Exhausted).await;
                    return;
                }
                tokio::select! {
                    () = stop.cancelled() => return,
                    () = drain.cancelled() => {}
                    () = tokio::time::sleep(backoff) => {}
                }
            }
            Ok(_) => {
                let (ack, accepted) = oneshot::channel();
                let chunk = CursorEvent::Chunk {
                    bytes: Bytes::copy_from_slice(&buffer),
                    ack,
                };
                if events.send(chunk).await.is_err() || accepted.await.is_err() {
                    return;
                }
            }
            Err(err) => {
                let _sent = events.send(CursorEvent::Failed(err)).await;
                return;
            }
        }
    }
}
