//! Typed controller<->worker messages for the recorder.
//!
//! This crate defines the commands a parent controller sends to the recorder
//! worker, the events the worker reports back, and the length-prefixed binary
//! framing both sides use on the local channel.

mod codec;
mod commands;
mod error;
mod events;
mod types;

pub use codec::{
    decode_commands, decode_events, encode_command, encode_event, encode_frame, HEADER_LEN,
    MIN_FRAME_LEN,
};
pub use commands::Command;
pub use error::CodecError;
pub use events::Event;
pub use types::{ErrorCode, EventKind, Rect, Size};
