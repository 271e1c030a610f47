//! Length-prefixed binary framing for the local channel.
//!
//! One frame is laid out as:
//!
//! ```text
//! [u16 len][u8 kind][fields...]
//! ```
//!
//! `len` counts the bytes that follow the length field. All integers are
//! little-endian. Strings are a `u32` byte count followed by UTF-16LE code
//! units, with `0xFFFFFFFF` marking a null string. Several frames may arrive
//! in one read and are decoded in order until the buffer is exhausted.
//!
//! Commands are parsed by their fixed per-kind schema, matching how
//! controllers in the field fill the length field. Events are parsed by the
//! length field, since the optional error code is only recoverable from it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::commands::Command;
use crate::error::CodecError;
use crate::events::Event;
use crate::types::{ErrorCode, EventKind, Rect, Size};

/// Size of the length field plus the kind byte.
pub const HEADER_LEN: usize = 3;

/// Smallest buffer the decoder will look at.
pub const MIN_FRAME_LEN: usize = HEADER_LEN;

const LENGTH_FIELD_LEN: usize = 2;
const NULL_STRING: u32 = u32::MAX;

/// Builds one frame, patching the length field on `finish`.
struct FrameWriter {
    buf: BytesMut,
}

impl FrameWriter {
    fn new(kind: EventKind) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u16_le(0);
        buf.put_u8(kind as u8);
        Self { buf }
    }

    fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    fn put_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    fn put_size(&mut self, size: Size) {
        self.put_i32(size.width);
        self.put_i32(size.height);
    }

    fn put_rect(&mut self, rect: Rect) {
        self.put_i32(rect.left);
        self.put_i32(rect.top);
        self.put_i32(rect.width);
        self.put_i32(rect.height);
    }

    fn put_string(&mut self, value: &str) {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.buf.put_u32_le((units.len() * 2) as u32);
        for unit in units {
            self.buf.put_u16_le(unit);
        }
    }

    fn finish(mut self) -> Result<Bytes, CodecError> {
        let len = self.buf.len() - LENGTH_FIELD_LEN;
        let len = u16::try_from(len).map_err(|_| CodecError::FrameTooLarge(len))?;
        self.buf[..LENGTH_FIELD_LEN].copy_from_slice(&len.to_le_bytes());
        Ok(self.buf.freeze())
    }
}

/// Bounds-checked field reader over a borrowed buffer.
struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                field,
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        self.ensure(field, 1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, CodecError> {
        self.ensure(field, 2)?;
        Ok(self.buf.get_u16_le())
    }

    fn bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
        Ok(self.u8(field)? != 0)
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, CodecError> {
        self.ensure(field, 4)?;
        Ok(self.buf.get_i32_le())
    }

    fn size(&mut self) -> Result<Size, CodecError> {
        let width = self.i32("size.width")?;
        let height = self.i32("size.height")?;
        Ok(Size::new(width, height))
    }

    fn rect(&mut self) -> Result<Rect, CodecError> {
        let left = self.i32("rect.left")?;
        let top = self.i32("rect.top")?;
        let width = self.i32("rect.width")?;
        let height = self.i32("rect.height")?;
        Ok(Rect::new(left, top, width, height))
    }

    fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        self.ensure(field, 4)?;
        let byte_len = self.buf.get_u32_le();
        if byte_len == NULL_STRING {
            return Ok(String::new());
        }

        let byte_len = byte_len as usize;
        if byte_len % 2 != 0 {
            return Err(CodecError::InvalidString);
        }
        self.ensure(field, byte_len)?;

        let units: Vec<u16> = self.buf[..byte_len]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        self.buf.advance(byte_len);

        String::from_utf16(&units).map_err(|_| CodecError::InvalidString)
    }

    fn skip(&mut self, count: usize) -> usize {
        let count = count.min(self.buf.remaining());
        self.buf.advance(count);
        count
    }

    fn split_to(&mut self, count: usize) -> FieldReader<'a> {
        let (head, tail) = self.buf.split_at(count);
        self.buf = tail;
        FieldReader::new(head)
    }
}

/// Encode a frame from a kind plus optional parameters.
///
/// The code byte is written only when it is not [`ErrorCode::None`] and the
/// string only when it is non-empty.
pub fn encode_frame(kind: EventKind, code: ErrorCode, text: &str) -> Result<Bytes, CodecError> {
    let mut writer = FrameWriter::new(kind);
    if code != ErrorCode::None {
        writer.buf.put_u8(code as u8);
    }
    if !text.is_empty() {
        writer.put_string(text);
    }
    writer.finish()
}

/// Encode an event, or return `None` if it has no wire representation.
pub fn encode_event(event: &Event) -> Result<Option<Bytes>, CodecError> {
    let Some(kind) = event.wire_kind() else {
        return Ok(None);
    };

    let frame = match event {
        Event::RecordingStopped { path } => encode_frame(kind, ErrorCode::None, path)?,
        Event::ErrorOccurred { code, message } => encode_frame(kind, *code, message)?,
        _ => encode_frame(kind, ErrorCode::None, "")?,
    };
    Ok(Some(frame))
}

/// Encode a command with every schema field present.
pub fn encode_command(command: &Command) -> Result<Bytes, CodecError> {
    let mut writer = FrameWriter::new(command.kind());

    match command {
        Command::Init | Command::Exit => {}
        Command::UpdateWindow { title } => writer.put_string(title),
        Command::ScaleVideo(size) => writer.put_size(*size),
        Command::CropVideo(rect) => writer.put_rect(*rect),
        Command::UpdateCaptureConfig {
            cursor,
            compatibility,
        } => {
            writer.put_bool(*cursor);
            writer.put_bool(*compatibility);
        }
        Command::ResetAudioInput {
            device_id,
            device_desc,
        }
        | Command::ResetAudioOutput {
            device_id,
            device_desc,
        } => {
            writer.put_string(device_id);
            writer.put_string(device_desc);
        }
        Command::DownmixMonoInput(value)
        | Command::DownmixMonoOutput(value)
        | Command::MuteAudioInput(value)
        | Command::MuteAudioOutput(value) => writer.put_bool(*value),
        Command::StartRecording { path } => writer.put_string(path),
        Command::StopRecording { force } | Command::StopStreaming { force } => {
            writer.put_bool(*force)
        }
        Command::StartStreaming { server, key } => {
            writer.put_string(server);
            writer.put_string(key);
        }
    }

    writer.finish()
}

fn read_command(kind: EventKind, reader: &mut FieldReader<'_>) -> Result<Command, CodecError> {
    let command = match kind {
        EventKind::Init => Command::Init,
        EventKind::UpdateWindow => Command::UpdateWindow {
            title: reader.string("title")?,
        },
        EventKind::ScaleVideo => Command::ScaleVideo(reader.size()?),
        EventKind::CropVideo => Command::CropVideo(reader.rect()?),
        EventKind::UpdateCaptureConfig => Command::UpdateCaptureConfig {
            cursor: reader.bool("cursor")?,
            compatibility: reader.bool("compatibility")?,
        },
        EventKind::ResetAudioInput => Command::ResetAudioInput {
            device_id: reader.string("device_id")?,
            device_desc: reader.string("device_desc")?,
        },
        EventKind::ResetAudioOutput => Command::ResetAudioOutput {
            device_id: reader.string("device_id")?,
            device_desc: reader.string("device_desc")?,
        },
        EventKind::DownmixMonoInput => Command::DownmixMonoInput(reader.bool("enable")?),
        EventKind::DownmixMonoOutput => Command::DownmixMonoOutput(reader.bool("enable")?),
        EventKind::MuteAudioInput => Command::MuteAudioInput(reader.bool("mute")?),
        EventKind::MuteAudioOutput => Command::MuteAudioOutput(reader.bool("mute")?),
        EventKind::StartRecording => Command::StartRecording {
            path: reader.string("path")?,
        },
        EventKind::StopRecording => Command::StopRecording {
            force: reader.bool("force")?,
        },
        EventKind::StartStreaming => Command::StartStreaming {
            server: reader.string("server")?,
            key: reader.string("key")?,
        },
        EventKind::StopStreaming => Command::StopStreaming {
            force: reader.bool("force")?,
        },
        EventKind::Exit => Command::Exit,
        other => return Err(CodecError::UnknownKind(other as u8)),
    };
    Ok(command)
}

/// Decode every command frame in `buf`.
///
/// A buffer shorter than one header is rejected. Unknown kinds are skipped
/// using their length field. A truncated frame ends decoding; commands
/// decoded before it are kept.
pub fn decode_commands(buf: &[u8]) -> Result<Vec<Command>, CodecError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(CodecError::BufferTooShort(buf.len()));
    }

    let mut reader = FieldReader::new(buf);
    let mut commands = Vec::new();

    while reader.remaining() > 0 {
        if reader.remaining() < HEADER_LEN {
            warn!(remaining = reader.remaining(), "Trailing bytes shorter than a frame header, dropping");
            break;
        }

        let len = reader.u16("length")? as usize;
        let raw_kind = reader.u8("kind")?;
        let payload_len = len.saturating_sub(1);
        let before = reader.remaining();

        let kind = match EventKind::try_from(raw_kind) {
            Ok(kind) if kind.is_command() => kind,
            _ => {
                let skipped = reader.skip(payload_len);
                warn!(kind = raw_kind, skipped, "Unknown command kind, skipping frame");
                continue;
            }
        };

        match read_command(kind, &mut reader) {
            Ok(command) => {
                let consumed = before - reader.remaining();
                if consumed != payload_len {
                    debug!(?kind, len, consumed, "Frame length disagrees with schema");
                }
                commands.push(command);
            }
            Err(e) => {
                warn!(?kind, error = %e, "Malformed frame, dropping rest of buffer");
                break;
            }
        }
    }

    Ok(commands)
}

fn read_event(kind: EventKind, payload: &mut FieldReader<'_>) -> Result<Event, CodecError> {
    let event = match kind {
        EventKind::Inited => Event::Inited,
        EventKind::RecordingStarted => Event::RecordingStarted,
        EventKind::RecordingStopped => {
            let path = if payload.remaining() > 0 {
                payload.string("path")?
            } else {
                String::new()
            };
            Event::RecordingStopped { path }
        }
        EventKind::StreamingStarted => Event::StreamingStarted,
        EventKind::StreamingStopped => Event::StreamingStopped,
        EventKind::ErrorOccurred => {
            // A string is 4 + 2n bytes, so an odd payload carries the code byte.
            let code = if payload.remaining() % 2 == 1 {
                ErrorCode::from(payload.u8("code")?)
            } else {
                ErrorCode::None
            };
            let message = if payload.remaining() > 0 {
                payload.string("message")?
            } else {
                String::new()
            };
            Event::ErrorOccurred { code, message }
        }
        other => return Err(CodecError::UnknownKind(other as u8)),
    };
    Ok(event)
}

/// Decode every event frame in `buf`, as a controller would.
pub fn decode_events(buf: &[u8]) -> Result<Vec<Event>, CodecError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(CodecError::BufferTooShort(buf.len()));
    }

    let mut reader = FieldReader::new(buf);
    let mut events = Vec::new();

    while reader.remaining() >= HEADER_LEN {
        let len = reader.u16("length")? as usize;
        let raw_kind = reader.u8("kind")?;
        let payload_len = len.saturating_sub(1);
        reader.ensure("payload", payload_len)?;
        let mut payload = reader.split_to(payload_len);

        match EventKind::try_from(raw_kind) {
            Ok(kind) if !kind.is_command() => events.push(read_event(kind, &mut payload)?),
            _ => warn!(kind = raw_kind, "Unknown event kind, skipping frame"),
        }
    }

    Ok(events)
}
