//! Output stop codes and the messages reported for them.

use crate::messages::{Language, Message};

/// Stop code raised by an output's `stop` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCode {
    Success,
    BadPath,
    ConnectFailed,
    InvalidStream,
    Error,
    Disconnected,
    Unsupported,
    NoSpace,
    Other(i32),
}

impl From<i32> for StopCode {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::BadPath,
            -2 => Self::ConnectFailed,
            -3 => Self::InvalidStream,
            -4 => Self::Error,
            -5 => Self::Disconnected,
            -6 => Self::Unsupported,
            -7 => Self::NoSpace,
            other => Self::Other(other),
        }
    }
}

impl StopCode {
    pub fn raw(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::BadPath => -1,
            Self::ConnectFailed => -2,
            Self::InvalidStream => -3,
            Self::Error => -4,
            Self::Disconnected => -5,
            Self::Unsupported => -6,
            Self::NoSpace => -7,
            Self::Other(code) => code,
        }
    }
}

/// Message for a streaming stop, or `None` on success.
pub fn streaming_stop_message(code: StopCode, language: Language) -> Option<String> {
    let message = match code {
        StopCode::Success => return None,
        StopCode::BadPath => Message::StreamBadPath,
        StopCode::ConnectFailed => Message::StreamConnectFailed,
        StopCode::InvalidStream => Message::StreamInvalidStream,
        StopCode::Error => Message::StreamError,
        StopCode::Disconnected => Message::StreamDisconnected,
        other => return Some(language.unspecified_error(other.raw())),
    };
    Some(language.text(message).to_string())
}

/// Message for a recording stop, or `None` on success.
pub fn recording_stop_message(code: StopCode, language: Language) -> Option<String> {
    let message = match code {
        StopCode::Success => return None,
        StopCode::NoSpace => Message::RecordingNoSpace,
        StopCode::Unsupported => Message::RecordingUnsupported,
        other => return Some(language.unspecified_error(other.raw())),
    };
    Some(language.text(message).to_string())
}
