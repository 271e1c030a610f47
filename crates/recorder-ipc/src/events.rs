//! Events sent from the worker to the controller.

use serde::{Deserialize, Serialize};

use crate::types::{ErrorCode, EventKind};

/// Lifecycle and error events reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Init completed.
    Inited,

    /// Recording output reported start.
    RecordingStarted,

    /// Recording output began a graceful stop.
    RecordingStopping,

    /// Recording finished cleanly.
    RecordingStopped { path: String },

    /// Streaming output is starting, after the given delay.
    StreamingStarting { delay_secs: u32 },

    /// Streaming output reported start.
    StreamingStarted,

    /// Streaming output began a graceful stop.
    StreamingStopping { delay_secs: u32 },

    /// Streaming finished cleanly.
    StreamingStopped,

    /// A command or output failed.
    ErrorOccurred { code: ErrorCode, message: String },
}

impl Event {
    /// Shorthand for an `ErrorOccurred` event.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::ErrorOccurred {
            code,
            message: message.into(),
        }
    }

    /// Wire kind of this event, or `None` for events the protocol cannot carry.
    pub fn wire_kind(&self) -> Option<EventKind> {
        match self {
            Self::Inited => Some(EventKind::Inited),
            Self::RecordingStarted => Some(EventKind::RecordingStarted),
            Self::RecordingStopped { .. } => Some(EventKind::RecordingStopped),
            Self::StreamingStarted => Some(EventKind::StreamingStarted),
            Self::StreamingStopped => Some(EventKind::StreamingStopped),
            Self::ErrorOccurred { .. } => Some(EventKind::ErrorOccurred),
            Self::RecordingStopping
            | Self::StreamingStarting { .. }
            | Self::StreamingStopping { .. } => None,
        }
    }
}
