//! Client transport receiving follow session output.

use crate::logs::domain::CloseFrame;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Client connection a follow session writes to.
///
/// `send` returns only once the chunk has been accepted by the transport,
/// which is what bounds reading ahead of a slow client.
#[async_trait]
pub trait LogSink: Send {
    /// Delivers one content chunk.
    async fn send(&mut self, chunk: Bytes) -> Result<(), SinkError>;

    /// Sends the closure frame and shuts the connection.
    async fn close(&mut self, frame: CloseFrame) -> Result<(), SinkError>;
}

/// Errors returned by sink implementations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The client connection is gone.
    #[error("client connection closed")]
    Closed,
    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}
