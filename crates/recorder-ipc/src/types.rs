//! Numeric tags and geometry shared by commands and events.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Message kind carried in the third byte of every frame.
///
/// Commands and events share one numbering space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    Init = 0,
    UpdateWindow = 1,
    ScaleVideo = 2,
    CropVideo = 3,
    UpdateCaptureConfig = 4,
    ResetAudioInput = 5,
    ResetAudioOutput = 6,
    DownmixMonoInput = 7,
    DownmixMonoOutput = 8,
    MuteAudioInput = 9,
    MuteAudioOutput = 10,
    StartRecording = 11,
    StopRecording = 12,
    StartStreaming = 13,
    StopStreaming = 14,
    Exit = 15,
    Inited = 16,
    RecordingStarted = 17,
    RecordingStopped = 18,
    StreamingStarted = 19,
    StreamingStopped = 20,
    /// Reserved, never emitted.
    StateNotify = 21,
    ErrorOccurred = 22,
}

impl EventKind {
    /// Returns true for kinds sent from the controller to the worker.
    pub fn is_command(self) -> bool {
        (self as u8) <= EventKind::Exit as u8
    }
}

impl TryFrom<u8> for EventKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let kind = match value {
            0 => Self::Init,
            1 => Self::UpdateWindow,
            2 => Self::ScaleVideo,
            3 => Self::CropVideo,
            4 => Self::UpdateCaptureConfig,
            5 => Self::ResetAudioInput,
            6 => Self::ResetAudioOutput,
            7 => Self::DownmixMonoInput,
            8 => Self::DownmixMonoOutput,
            9 => Self::MuteAudioInput,
            10 => Self::MuteAudioOutput,
            11 => Self::StartRecording,
            12 => Self::StopRecording,
            13 => Self::StartStreaming,
            14 => Self::StopStreaming,
            15 => Self::Exit,
            16 => Self::Inited,
            17 => Self::RecordingStarted,
            18 => Self::RecordingStopped,
            19 => Self::StreamingStarted,
            20 => Self::StreamingStopped,
            21 => Self::StateNotify,
            22 => Self::ErrorOccurred,
            other => return Err(CodecError::UnknownKind(other)),
        };
        Ok(kind)
    }
}

/// Error category reported with `ErrorOccurred`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    /// Sentinel; never written to the wire.
    #[default]
    None = 0,
    ClientStartup = 1,
    ClientInit = 2,
    ClientWindowCapture = 3,
    ClientRecording = 4,
    ClientStreaming = 5,
    ClientUnknown = 6,
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::ClientStartup,
            2 => Self::ClientInit,
            3 => Self::ClientWindowCapture,
            4 => Self::ClientRecording,
            5 => Self::ClientStreaming,
            _ => Self::ClientUnknown,
        }
    }
}

/// Width/height pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is non-positive.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// A region in capture-source pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Returns true if the rect has zero area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
