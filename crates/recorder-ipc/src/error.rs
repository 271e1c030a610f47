//! Error types for the wire codec.

use thiserror::Error;

/// Errors that can occur while decoding frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer is shorter than one frame header.
    #[error("Buffer too short: {0} bytes, need at least 3")]
    BufferTooShort(usize),

    /// A field ran past the end of the buffer.
    #[error("Truncated {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// Kind byte outside the protocol.
    #[error("Unknown message kind: {0}")]
    UnknownKind(u8),

    /// Encoded frame does not fit the 16-bit length field.
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// String payload is not valid UTF-16.
    #[error("Invalid UTF-16 string")]
    InvalidString,
}
