//! Test doubles for follow sessions.

use crate::logs::adapters::LogStore;
use crate::logs::domain::{CloseFrame, LogLocation};
use crate::logs::ports::{ExitWaitError, LogSink, SinkError, TaskExitSource};
use crate::runner::domain::{TaskExit, TaskOutcome};
use crate::task::domain::{TaskId, TemplateId};
use async_trait::async_trait;
use bytes::Bytes;
use camino::Utf8Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub(super) fn store() -> (LogStore, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8Path::from_path(dir.path()).expect("utf-8 temp dir");
    let store = LogStore::open(root).expect("open log store");
    (store, dir)
}

pub(super) fn location() -> LogLocation {
    LogLocation::new(TemplateId::new(), TaskId::new())
}

pub(super) fn exit(task_id: TaskId, outcome: TaskOutcome, message: Option<&str>) -> TaskExit {
    TaskExit {
        task_id,
        outcome,
        message: message.map(str::to_owned),
    }
}

/// Exit source resolved by the test.
#[derive(Clone)]
pub(super) struct ControlledExits {
    sender: Arc<watch::Sender<Option<TaskExit>>>,
}

impl ControlledExits {
    pub(super) fn pending() -> Self {
        Self {
            sender: Arc::new(watch::channel(None).0),
        }
    }

    pub(super) fn resolved(exit: TaskExit) -> Self {
        let source = Self::pending();
        source.publish(exit);
        source
    }

    pub(super) fn publish(&self, exit: TaskExit) {
        self.sender.send_replace(Some(exit));
    }
}

#[async_trait]
impl TaskExitSource for ControlledExits {
    async fn wait_exit(
        &self,
        task_id: TaskId,
        cancel: CancellationToken,
    ) -> Result<TaskExit, ExitWaitError> {
        let mut receiver = self.sender.subscribe();
        tokio::select! {
            () = cancel.cancelled() => Err(ExitWaitError::Cancelled(task_id)),
            exit = async {
                receiver
                    .wait_for(Option::is_some)
                    .await
                    .ok()
                    .and_then(|value| value.clone())
            } => exit.ok_or_else(|| ExitWaitError::Unavailable("exit channel closed".to_owned())),
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct Recorded {
    pub(super) content: Vec<u8>,
    pub(super) chunks: usize,
    pub(super) close: Option<CloseFrame>,
}

/// Sink recording everything it is sent.
#[derive(Debug, Clone, Default)]
pub(super) struct RecordingSink {
    recorded: Arc<Mutex<Recorded>>,
    reject_after: Option<usize>,
}

impl RecordingSink {
    /// Sink reporting a closed connection once `chunks` were delivered.
    pub(super) fn rejecting_after(chunks: usize) -> Self {
        Self {
            reject_after: Some(chunks),
            ..Self::default()
        }
    }

    pub(super) fn content(&self) -> String {
        let recorded = self.recorded.lock().expect("sink lock");
        String::from_utf8_lossy(&recorded.content).into_owned()
    }

    pub(super) fn close_frame(&self) -> Option<CloseFrame> {
        self.recorded.lock().expect("sink lock").close.clone()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn send(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        let mut recorded = self.recorded.lock().expect("sink lock");
        if self.reject_after.is_some_and(|limit| recorded.chunks >= limit) {
            return Err(SinkError::Closed);
        }
        recorded.content.extend_from_slice(&chunk);
        recorded.chunks += 1;
        Ok(())
    }

    async fn close(&mut self, frame: CloseFrame) -> Result<(), SinkError> {
        self.recorded.lock().expect("sink lock").close = Some(frame);
        Ok(())
    }
}
