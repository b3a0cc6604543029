//! How a follow session ended and what the client is told.

/// Reason a follow session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowEnd {
    /// The task finished and all content was delivered.
    Completed,
    /// Reading failed or the task ended with an execution error.
    Failed(String),
    /// The client went away; nothing more is written.
    PeerClosed,
    /// The server is shutting down.
    Shutdown,
}

/// Closure frame sent to the client at session end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason, at most [`CloseFrame::MAX_REASON_BYTES`] bytes.
    pub reason: String,
}

impl CloseFrame {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away.
    pub const GOING_AWAY: u16 = 1001;
    /// Internal server error.
    pub const INTERNAL_ERROR: u16 = 1011;
    /// Largest reason a close frame can carry.
    pub const MAX_REASON_BYTES: usize = 123;

    /// Builds a frame, truncating `reason` on a character boundary.
    #[must_use]
    pub fn new(code: u16, reason: &str) -> Self {
        let mut end = reason.len().min(Self::MAX_REASON_BYTES);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        let truncated = reason.get(..end).unwrap_or_default();
        Self {
            code,
            reason: truncated.to_owned(),
        }
    }
}

impl FollowEnd {
    /// Returns the frame to send, or `None` when the peer is gone.
    #[must_use]
    pub fn close_frame(&self) -> Option<CloseFrame> {
        match self {
            Self::Completed => Some(CloseFrame::new(CloseFrame::NORMAL, "")),
            Self::Failed(reason) => Some(CloseFrame::new(CloseFrame::INTERNAL_ERROR, reason)),
            Self::PeerClosed => None,
            Self::Shutdown => Some(CloseFrame::new(CloseFrame::GOING_AWAY, "server shutting down")),
        }
    }

    /// Returns the label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
            Self::PeerClosed => "peer_closed",
            Self::Shutdown => "shutdown",
        }
    }
}
