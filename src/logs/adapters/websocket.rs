//! WebSocket transport for follow sessions.

use crate::logs::domain::CloseFrame;
use crate::logs::ports::{LogSink, SinkError};
use async_trait::async_trait;
use axum::extract::ws::{self, Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Write half of an upgraded follow connection.
pub struct WebSocketSink {
    sink: SplitSink<WebSocket, Message>,
}

/// Background listener raising a signal when the client disconnects.
///
/// Incoming client messages are read and discarded. Dropping the watcher
/// stops the listener.
pub struct DisconnectWatcher {
    peer_closed: CancellationToken,
    handle: JoinHandle<()>,
}

impl DisconnectWatcher {
    /// Returns the token cancelled when the client goes away.
    #[must_use]
    pub fn peer_closed(&self) -> CancellationToken {
        self.peer_closed.clone()
    }
}

impl Drop for DisconnectWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Splits an upgraded socket into a sink and a disconnect watcher.
#[must_use]
pub fn split(socket: WebSocket) -> (WebSocketSink, DisconnectWatcher) {
    let (sink, stream) = socket.split();
    let peer_closed = CancellationToken::new();
    let handle = tokio::spawn(watch_disconnect(stream, peer_closed.clone()));
    (
        WebSocketSink { sink },
        DisconnectWatcher {
            peer_closed,
            handle,
        },
    )
}

async fn watch_disconnect(mut stream: SplitStream<WebSocket>, peer_closed: CancellationToken) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(err)) => {
                debug!(error = %err, "follow connection read failed");
                break;
            }
            Some(Ok(_)) => {}
        }
    }
    peer_closed.cancel();
}

#[async_trait]
impl LogSink for WebSocketSink {
    async fn send(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        let message = match std::str::from_utf8(&chunk) {
            Ok(text) => Message::Text(text.into()),
            Err(_) => Message::Binary(chunk),
        };
        self.sink
            .send(message)
            .await
            .map_err(|err| SinkError::Transport(err.to_string()))
    }

    async fn close(&mut self, frame: CloseFrame) -> Result<(), SinkError> {
        let close = ws::CloseFrame {
            code: frame.code,
            reason: frame.reason.into(),
        };
        self.sink
            .send(Message::Close(Some(close)))
            .await
            .map_err(|err| SinkError::Transport(err.to_string()))?;
        self.sink
            .close()
            .await
            .map_err(|err| SinkError::Transport(err.to_string()))
    }
}
