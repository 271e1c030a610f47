//! Media side of the recorder.
//!
//! This crate drives the underlying media engine through [`MediaEngine`]:
//! the [`MediaContext`] executes protocol commands, the [`OutputHandler`]
//! owns recording and streaming outputs, and [`WorkerHandle`] runs a context
//! on its own serial thread.

mod config;
mod context;
mod error;
mod media;
mod messages;
mod output;
pub mod sim;
mod worker;

pub use config::{
    AudioConfig, ChannelSetup, ColorFormat, ColorRange, ColorSpace, GeneralConfig, OutputConfig,
    RecorderConfig, RecordingFormat, RecordingMode, ScaleType, VideoConfig,
};
pub use context::{
    fit_to_canvas, AudioChannel, EventSink, InitStep, MediaContext, DEFAULT_DEVICE_ID,
    DISABLED_DEVICE_ID,
};
pub use error::{ConfigError, EngineError, EngineResult};
pub use media::{
    settings, setting_str, AudioInfo, Handle, ListItem, MediaEngine, ObjectId, ObjectKind,
    OutputCounters, OutputRole, OutputSignal, Settings, SignalKind, SignalSink, Transform,
    VideoInfo,
};
pub use messages::{Language, Message};
pub use output::{EncoderPreference, OutputHandler, OutputState, StopCode, StreamSample};
pub use worker::{WorkerHandle, WorkerMessage, SHUTDOWN_TIMEOUT};

use std::sync::Arc;

use tracing::Dispatch;

/// Create the engine backend compiled into this build.
pub fn create_engine() -> Arc<dyn MediaEngine> {
    Arc::new(sim::SimEngine::new())
}

/// Start a worker thread owning a fresh media context.
pub fn spawn_worker(
    engine: Arc<dyn MediaEngine>,
    config: RecorderConfig,
    events: Box<dyn EventSink>,
    dispatch: Dispatch,
) -> std::io::Result<WorkerHandle> {
    WorkerHandle::spawn(engine, config, events, dispatch)
}
