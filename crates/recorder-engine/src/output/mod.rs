//! Recording and streaming outputs.
//!
//! [`OutputHandler`] owns both outputs and their encoders, tracks the state
//! of each session, and turns engine output signals into protocol events.

mod encoder;
mod stats;
mod status;

pub use encoder::{
    audio_settings, calc_crf, detect_encoders, ffmpeg_output_settings, muxer_settings,
    recording_video_settings, stream_video_settings, EncoderPreference, AAC_ENCODER_ID,
};
pub use stats::{StreamSample, StreamStats};
pub use status::{recording_stop_message, streaming_stop_message, StopCode};

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use recorder_ipc::{ErrorCode, Event};

use crate::config::{RecorderConfig, RecordingMode};
use crate::error::EngineResult;
use crate::media::{
    Handle, MediaEngine, ObjectId, ObjectKind, OutputRole, OutputSignal, Settings, SignalKind,
    SignalSink,
};

/// State of one output session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl OutputState {
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Owns the recording and streaming outputs.
pub struct OutputHandler {
    // Outputs are declared first so they are released before their encoders.
    stream_output: Handle,
    file_output: Handle,
    stream_video: Handle,
    record_video: Option<Handle>,
    audio: Handle,
    engine: Arc<dyn MediaEngine>,
    config: RecorderConfig,
    recording: OutputState,
    streaming: OutputState,
    recording_path: String,
    stats: StreamStats,
}

impl OutputHandler {
    /// Build encoders and outputs, and route their signals to `sink`.
    #[instrument(name = "output_handler_new", skip_all)]
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        config: &RecorderConfig,
        sink: Arc<dyn SignalSink>,
    ) -> EngineResult<Self> {
        let output = &config.output;

        let stream_video = Handle::create(
            &engine,
            ObjectKind::VideoEncoder,
            output.stream_encoder.engine_id(),
            "streaming_h264",
            None,
        )?;
        let audio = Handle::create(
            &engine,
            ObjectKind::AudioEncoder,
            AAC_ENCODER_ID,
            "streaming_aac",
            Some(&audio_settings(output.audio_bitrate)),
        )?;

        let (file_output, record_video) = match output.recording_mode {
            RecordingMode::Ffmpeg => {
                let file_output = Handle::create(
                    &engine,
                    ObjectKind::Output,
                    "ffmpeg_output",
                    "ffmpeg_output",
                    None,
                )?;
                (file_output, None)
            }
            RecordingMode::Muxer => {
                let record_video = Handle::create(
                    &engine,
                    ObjectKind::VideoEncoder,
                    output.recording_encoder.engine_id(),
                    "recording_h264",
                    None,
                )?;
                let file_output = Handle::create(
                    &engine,
                    ObjectKind::Output,
                    "ffmpeg_muxer",
                    "ffmpeg_muxer",
                    None,
                )?;
                (file_output, Some(record_video))
            }
        };

        let stream_output = Handle::create(
            &engine,
            ObjectKind::Output,
            "rtmp_output",
            "streaming_output",
            None,
        )?;

        engine.connect_output_signals(file_output.id(), OutputRole::Recording, Arc::clone(&sink));
        engine.connect_output_signals(stream_output.id(), OutputRole::Streaming, sink);

        info!(
            mode = ?output.recording_mode,
            stream_encoder = output.stream_encoder.engine_id(),
            "Outputs created"
        );

        Ok(Self {
            stream_output,
            file_output,
            stream_video,
            record_video,
            audio,
            engine,
            config: config.clone(),
            recording: OutputState::Idle,
            streaming: OutputState::Idle,
            recording_path: String::new(),
            stats: StreamStats::new(Instant::now()),
        })
    }

    pub fn recording_state(&self) -> OutputState {
        self.recording
    }

    pub fn streaming_state(&self) -> OutputState {
        self.streaming
    }

    /// True from a successful start until the stop signal arrives.
    pub fn recording_active(&self) -> bool {
        !self.recording.is_idle()
    }

    pub fn streaming_active(&self) -> bool {
        !self.streaming.is_idle()
    }

    /// Returns true if neither output is doing anything.
    pub fn is_idle(&self) -> bool {
        self.recording.is_idle() && self.streaming.is_idle()
    }

    pub fn recording_path(&self) -> &str {
        &self.recording_path
    }

    fn update_streaming_settings(&self, service: ObjectId) {
        let mut video = stream_video_settings();
        let mut audio = audio_settings(self.config.output.audio_bitrate);
        self.engine.apply_service_settings(service, &mut video, &mut audio);

        self.engine.update(self.stream_video.id(), &video);
        self.engine.update(self.audio.id(), &audio);
        self.engine.bind_encoder(self.stream_video.id());
        self.engine.bind_encoder(self.audio.id());

        let output = self.stream_output.id();
        self.engine
            .set_output_encoders(output, self.stream_video.id(), self.audio.id());
        self.engine.set_output_service(output, service);
        // Reconnect policy belongs to the controller.
        self.engine.set_reconnect(output, 0, 0);
    }

    /// Start the streaming output against `service`.
    #[instrument(name = "start_streaming_output", skip(self))]
    pub fn start_streaming(&mut self, service: ObjectId) -> bool {
        if self.streaming_active() {
            debug!(state = ?self.streaming, "Streaming busy, ignoring start");
            return true;
        }

        self.update_streaming_settings(service);

        let output = self.stream_output.id();
        if self.engine.start_output(output) {
            let counters = self.engine.output_counters(output);
            self.stats.start(counters, Instant::now());
            self.streaming = OutputState::Starting;
            info!(
                first_total = counters.total_frames,
                first_dropped = counters.frames_dropped,
                "Streaming output starting"
            );
            return true;
        }

        let last_error = self.engine.output_last_error(output).unwrap_or_default();
        warn!(%last_error, "Stream output failed to start");
        false
    }

    fn update_recording_settings(&self, path: &str) {
        let video = &self.config.video;
        let output_config = &self.config.output;
        let crf = calc_crf(
            output_config.recording_crf,
            video.output_width,
            video.output_height,
        );
        let output = self.file_output.id();

        match &self.record_video {
            None => {
                let settings = ffmpeg_output_settings(path, video, output_config, crf);
                self.engine.update(output, &settings);
                self.engine.bind_output_media(output);
            }
            Some(encoder) => {
                let icq = output_config.recording_encoder == EncoderPreference::Qsv
                    && self
                        .engine
                        .list_property(encoder.id(), "rate_control")
                        .iter()
                        .any(|item| item.value == "ICQ");
                let settings = recording_video_settings(
                    output_config.recording_encoder,
                    crf,
                    &output_config.preset,
                    icq,
                );
                self.engine.update(encoder.id(), &settings);
                self.engine.bind_encoder(encoder.id());
                self.engine.bind_encoder(self.audio.id());
                self.engine
                    .set_output_encoders(output, encoder.id(), self.audio.id());
                self.engine.update(output, &muxer_settings(path));
            }
        }
    }

    /// Start recording to `path`. The path is kept for the session's stop event.
    #[instrument(name = "start_recording_output", skip(self))]
    pub fn start_recording(&mut self, path: &str) -> bool {
        if self.recording_active() {
            debug!(state = ?self.recording, "Recording busy, ignoring start");
            return true;
        }

        self.update_recording_settings(path);

        let output = self.file_output.id();
        if self.engine.start_output(output) {
            self.recording = OutputState::Starting;
            self.recording_path = path.to_string();
            info!(path, "Recording output starting");
            return true;
        }

        let last_error = self.engine.output_last_error(output).unwrap_or_default();
        error!(%last_error, "Recording start failed");
        false
    }

    /// Stop streaming. A forced stop may follow a graceful one.
    pub fn stop_streaming(&mut self, force: bool) {
        if self.streaming.is_idle() || (self.streaming == OutputState::Stopping && !force) {
            return;
        }
        self.streaming = OutputState::Stopping;
        stop_output(self.engine.as_ref(), self.stream_output.id(), force);
    }

    pub fn stop_recording(&mut self, force: bool) {
        if self.recording.is_idle() || (self.recording == OutputState::Stopping && !force) {
            return;
        }
        self.recording = OutputState::Stopping;
        stop_output(self.engine.as_ref(), self.file_output.id(), force);
    }

    /// Apply an output signal, returning the event to report.
    pub fn handle_signal(&mut self, signal: OutputSignal) -> Option<Event> {
        debug!(?signal, "Output signal");
        let language = self.config.general.language;

        match (signal.role, signal.kind) {
            (OutputRole::Streaming, SignalKind::Starting) => Some(Event::StreamingStarting {
                delay_secs: self.engine.output_delay_secs(self.stream_output.id()),
            }),
            (OutputRole::Streaming, SignalKind::Start) => {
                self.streaming = OutputState::Active;
                Some(Event::StreamingStarted)
            }
            (OutputRole::Streaming, SignalKind::Stopping) => Some(Event::StreamingStopping {
                delay_secs: self.engine.output_delay_secs(self.stream_output.id()),
            }),
            (OutputRole::Streaming, SignalKind::Stop { code, last_error }) => {
                self.streaming = OutputState::Idle;
                let code = StopCode::from(code);
                match streaming_stop_message(code, language) {
                    Some(message) => {
                        warn!(?code, ?last_error, %message, "Streaming stopped with error");
                        Some(Event::error(ErrorCode::ClientStreaming, message))
                    }
                    None => Some(Event::StreamingStopped),
                }
            }
            (OutputRole::Recording, SignalKind::Starting) => None,
            (OutputRole::Recording, SignalKind::Start) => {
                self.recording = OutputState::Active;
                Some(Event::RecordingStarted)
            }
            (OutputRole::Recording, SignalKind::Stopping) => Some(Event::RecordingStopping),
            (OutputRole::Recording, SignalKind::Stop { code, last_error }) => {
                self.recording = OutputState::Idle;
                let code = StopCode::from(code);
                match recording_stop_message(code, language) {
                    Some(message) => {
                        warn!(?code, ?last_error, %message, "Recording stopped with error");
                        Some(Event::error(ErrorCode::ClientRecording, message))
                    }
                    None => Some(Event::RecordingStopped {
                        path: self.recording_path.clone(),
                    }),
                }
            }
        }
    }

    /// Log a statistics sample of the streaming output.
    pub fn log_streaming(&mut self) -> Option<StreamSample> {
        if self.streaming.is_idle() {
            return None;
        }

        let counters = self.engine.output_counters(self.stream_output.id());
        let sample = self.stats.sample(counters, Instant::now());
        info!(
            kbps = format!("{:.2}", sample.kbps),
            dropped = sample.dropped_frames,
            total = sample.total_frames,
            percent = format!("{:.1}", sample.drop_percent),
            "Streaming stats"
        );
        Some(sample)
    }

    /// Settings currently applied to the stream video encoder.
    pub fn stream_encoder_settings(&self) -> Settings {
        self.engine.settings(self.stream_video.id())
    }
}

fn stop_output(engine: &dyn MediaEngine, output: ObjectId, force: bool) {
    if force {
        engine.force_stop_output(output);
    } else {
        engine.stop_output(output);
    }
}

impl Drop for OutputHandler {
    fn drop(&mut self) {
        self.engine.disconnect_output_signals(self.stream_output.id());
        self.engine.disconnect_output_signals(self.file_output.id());
    }
}
