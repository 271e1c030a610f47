//! Commands sent from the controller to the worker.

use serde::{Deserialize, Serialize};

use crate::types::{EventKind, Rect, Size};

/// Commands that the controller can send to the recorder worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Bring up the engine, outputs, and scene.
    Init,

    /// Capture the window whose title matches exactly (ignoring case).
    UpdateWindow { title: String },

    /// Fit the captured content of this size into the canvas.
    ScaleVideo(Size),

    /// Crop the captured window to this region.
    CropVideo(Rect),

    /// Window capture flags.
    UpdateCaptureConfig { cursor: bool, compatibility: bool },

    /// Bind the microphone whose name contains `device_desc`.
    ResetAudioInput {
        device_id: String,
        device_desc: String,
    },

    /// Bind the desktop audio device whose name contains `device_desc`.
    ResetAudioOutput {
        device_id: String,
        device_desc: String,
    },

    /// Force the microphone to mono.
    DownmixMonoInput(bool),

    /// Force desktop audio to mono.
    DownmixMonoOutput(bool),

    /// Mute or unmute the microphone.
    MuteAudioInput(bool),

    /// Mute or unmute desktop audio.
    MuteAudioOutput(bool),

    /// Record to the given file path.
    StartRecording { path: String },

    /// Stop recording; `force` skips the flush.
    StopRecording { force: bool },

    /// Stream to an RTMP server.
    StartStreaming { server: String, key: String },

    /// Stop streaming; `force` skips the flush.
    StopStreaming { force: bool },

    /// Terminate the worker process.
    Exit,
}

impl Command {
    /// Wire kind of this command.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Init => EventKind::Init,
            Self::UpdateWindow { .. } => EventKind::UpdateWindow,
            Self::ScaleVideo(_) => EventKind::ScaleVideo,
            Self::CropVideo(_) => EventKind::CropVideo,
            Self::UpdateCaptureConfig { .. } => EventKind::UpdateCaptureConfig,
            Self::ResetAudioInput { .. } => EventKind::ResetAudioInput,
            Self::ResetAudioOutput { .. } => EventKind::ResetAudioOutput,
            Self::DownmixMonoInput(_) => EventKind::DownmixMonoInput,
            Self::DownmixMonoOutput(_) => EventKind::DownmixMonoOutput,
            Self::MuteAudioInput(_) => EventKind::MuteAudioInput,
            Self::MuteAudioOutput(_) => EventKind::MuteAudioOutput,
            Self::StartRecording { .. } => EventKind::StartRecording,
            Self::StopRecording { .. } => EventKind::StopRecording,
            Self::StartStreaming { .. } => EventKind::StartStreaming,
            Self::StopStreaming { .. } => EventKind::StopStreaming,
            Self::Exit => EventKind::Exit,
        }
    }

    /// Returns true if this command ends the session.
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit)
    }
}
