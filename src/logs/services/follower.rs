//! Live follow sessions over task log artifacts.

use super::cursor::{CursorEvent, LogCursor};
use crate::logs::adapters::{LogError, LogStore};
use crate::logs::domain::{FollowEnd, LogLocation};
use crate::logs::ports::{ExitWaitError, LogSink, SinkError, TaskExitSource};
use crate::runner::domain::{TaskExit, TaskOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Streams task log artifacts to connected clients.
#[derive(Clone)]
pub struct LogFollower {
    store: LogStore,
    exits: Arc<dyn TaskExitSource>,
    backoff: Duration,
    shutdown: CancellationToken,
}

impl LogFollower {
    /// Creates a follower.
    ///
    /// Cancelling `shutdown` ends every open session with a going-away
    /// frame.
    #[must_use]
    pub fn new(
        store: LogStore,
        exits: Arc<dyn TaskExitSource>,
        backoff: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            exits,
            backoff,
            shutdown,
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &LogStore {
        &self.store
    }

    /// Runs one follow session from `offset` until it ends.
    ///
    /// Content is forwarded in file order, each chunk only after the
    /// previous one was accepted by `sink`. The session ends normally once
    /// the task is terminal and the artifact is drained, abnormally on a
    /// read failure or a failed task, and silently when `peer_closed`
    /// fires. The cursor and the exit wait are released before returning.
    pub async fn follow(
        &self,
        location: LogLocation,
        offset: u64,
        sink: &mut dyn LogSink,
        peer_closed: CancellationToken,
    ) -> FollowEnd {
        info!(task_id = %location.task_id(), offset, "follow session started");
        let end = match self.store.open_at(location, offset).await {
            Ok(file) => {
                let cursor = LogCursor::spawn(file, self.backoff);
                self.pump(location, cursor, sink, &peer_closed).await
            }
            Err(err) => FollowEnd::Failed(open_failure(&err)),
        };

        if let Some(frame) = end.close_frame()
            && let Err(err) = sink.close(frame).await
        {
            debug!(task_id = %location.task_id(), error = %err, "close frame not delivered");
        }
        info!(task_id = %location.task_id(), end = end.as_str(), "follow session ended");
        end
    }

    async fn pump(
        &self,
        location: LogLocation,
        mut cursor: LogCursor,
        sink: &mut dyn LogSink,
        peer_closed: &CancellationToken,
    ) -> FollowEnd {
        let scope = self.shutdown.child_token();
        let exit_wait = self.exits.wait_exit(location.task_id(), scope.clone());
        tokio::pin!(exit_wait);
        let mut exit: Option<TaskExit> = None;

        let end = loop {
            tokio::select! {
                biased;
                () = peer_closed.cancelled() => break FollowEnd::PeerClosed,
                () = self.shutdown.cancelled() => break FollowEnd::Shutdown,
                result = &mut exit_wait, if exit.is_none() => match result {
                    Ok(task_exit) => {
                        debug!(task_id = %location.task_id(), outcome = ?task_exit.outcome, "task exited; draining");
                        exit = Some(task_exit);
                        cursor.drain();
                    }
                    Err(ExitWaitError::Cancelled(_)) => break FollowEnd::Shutdown,
                    Err(err) => break FollowEnd::Failed(err.to_string()),
                },
                event = cursor.next() => match event {
                    Some(CursorEvent::Chunk { bytes, ack }) => {
                        match sink.send(bytes).await {
                            Ok(()) => {
                                if ack.send(()).is_err() {
                                    debug!(
                                        task_id = %location.task_id(),
                                        "log reader gone before acknowledgement"
                                    );
                                }
                            }
                            Err(SinkError::Closed) => break FollowEnd::PeerClosed,
                            Err(err) => {
                                warn!(task_id = %location.task_id(), error = %err, "follow delivery failed");
                                break FollowEnd::PeerClosed;
                            }
                        }
                    }
                    Some(CursorEvent::Failed(err)) => {
                        warn!(task_id = %location.task_id(), error = %err, "log read failed");
                        break FollowEnd::Failed(format!("log read failed: {err}"));
                    }
                    Some(CursorEvent::Exhausted) | None => break exit_end(exit.as_ref()),
                },
            }
        };
        scope.cancel();
        drop(cursor);
        end
    }
}

fn exit_end(exit: Option<&TaskExit>) -> FollowEnd {
    match exit {
        Some(TaskExit {
            outcome: TaskOutcome::Success | TaskOutcome::Cancelled,
            ..
        }) => FollowEnd::Completed,
        Some(TaskExit {
            outcome,
            message,
            ..
        }) => FollowEnd::Failed(
            message
                .clone()
                .unwrap_or_else(|| format!("task {}", outcome.as_str())),
        ),
        None => FollowEnd::Failed("log reader stopped before task exit".to_owned()),
    }
}

fn open_failure(err: &LogError) -> String {
    if err.is_not_found() {
        "log artifact not found".to_owned()
    } else {
        format!("log open failed: {err}")
    }
}
