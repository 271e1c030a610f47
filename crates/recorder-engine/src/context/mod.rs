//! Media context: capture, scene, audio bindings and outputs.
//!
//! [`MediaContext`] turns protocol commands into engine operations and
//! reports results as [`Event`]s. It is owned by exactly one execution
//! context; engine signals reach it as [`OutputSignal`] messages.

mod audio;
mod capture;

pub use audio::{AudioChannel, DEFAULT_DEVICE_ID, DISABLED_DEVICE_ID};
pub use capture::fit_to_canvas;

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use recorder_ipc::{Command, ErrorCode, Event, Size};

use crate::config::RecorderConfig;
use crate::error::{EngineError, EngineResult};
use crate::media::{
    setting_str, settings, Handle, MediaEngine, ObjectKind, OutputSignal, SignalSink,
};
use crate::messages::{Language, Message};
use crate::output::{detect_encoders, OutputHandler};

/// Output channels 0..=5; channel 0 carries the scene transition.
const OUTPUT_CHANNELS: u32 = 6;
const TRANSITION_CHANNEL: u32 = 0;
const UNUSED_AUDIO_CHANNELS: [u32; 3] = [2, 4, 5];

const SERVICE_TYPE: &str = "rtmp_custom";
const TRANSITION_TYPE: &str = "fade_transition";

/// Receives events produced by the context.
pub trait EventSink: Send {
    fn emit(&self, event: Event);
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<Event> {
    fn emit(&self, event: Event) {
        if self.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

impl EventSink for crossbeam_channel::Sender<Event> {
    fn emit(&self, event: Event) {
        if self.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

/// Steps of `Init`, run in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Startup,
    ResetAudio,
    ResetVideo,
    Service,
    Outputs,
    Scene,
}

impl InitStep {
    pub const ALL: [InitStep; 6] = [
        Self::Startup,
        Self::ResetAudio,
        Self::ResetVideo,
        Self::Service,
        Self::Outputs,
        Self::Scene,
    ];

    fn message(self) -> Message {
        match self {
            Self::Startup => Message::InitStartup,
            Self::ResetAudio => Message::InitResetAudio,
            Self::ResetVideo => Message::InitResetVideo,
            Self::Service => Message::InitService,
            Self::Outputs => Message::InitOutputs,
            Self::Scene => Message::InitScene,
        }
    }
}

/// Owns every engine object the recorder creates.
pub struct MediaContext {
    outputs: Option<OutputHandler>,
    capture: Option<Handle>,
    scene: Option<Handle>,
    transition: Option<Handle>,
    service: Option<Handle>,
    engine: Arc<dyn MediaEngine>,
    config: RecorderConfig,
    events: Box<dyn EventSink>,
    signals: Arc<dyn SignalSink>,
    content_size: Size,
}

impl MediaContext {
    /// Create a context. Nothing touches the engine until `init`.
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        config: RecorderConfig,
        events: Box<dyn EventSink>,
        signals: Arc<dyn SignalSink>,
    ) -> Self {
        Self {
            outputs: None,
            capture: None,
            scene: None,
            transition: None,
            service: None,
            engine,
            config,
            events,
            signals,
            content_size: Size::default(),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn outputs(&self) -> Option<&OutputHandler> {
        self.outputs.as_ref()
    }

    pub fn has_capture(&self) -> bool {
        self.capture.is_some()
    }

    /// Size most recently passed to `scale_video`.
    pub fn content_size(&self) -> Size {
        self.content_size
    }

    fn language(&self) -> Language {
        self.config.general.language
    }

    fn emit(&self, event: Event) {
        info!(?event, "Emitting event");
        self.events.emit(event);
    }

    fn emit_error(&self, code: ErrorCode, message: Message) {
        let text = self.language().text(message);
        warn!(?code, text, "Reporting error");
        self.emit(Event::error(code, text));
    }

    /// Run one decoded command. `Exit` is owned by the dispatcher.
    pub fn execute(&mut self, command: Command) {
        match command {
            Command::Init => {
                self.init();
            }
            Command::UpdateWindow { title } => {
                self.update_window_capture(&title);
            }
            Command::ScaleVideo(size) => self.scale_video(size),
            Command::CropVideo(rect) => self.crop_video(rect),
            Command::UpdateCaptureConfig {
                cursor,
                compatibility,
            } => self.update_capture_config(cursor, compatibility),
            Command::ResetAudioInput {
                device_id,
                device_desc,
            } => self.reset_audio_input(&device_id, &device_desc),
            Command::ResetAudioOutput {
                device_id,
                device_desc,
            } => self.reset_audio_output(&device_id, &device_desc),
            Command::DownmixMonoInput(enable) => self.downmix_mono(AudioChannel::Input, enable),
            Command::DownmixMonoOutput(enable) => self.downmix_mono(AudioChannel::Output, enable),
            Command::MuteAudioInput(mute) => self.mute(AudioChannel::Input, mute),
            Command::MuteAudioOutput(mute) => self.mute(AudioChannel::Output, mute),
            Command::StartRecording { path } => self.start_recording(&path),
            Command::StopRecording { force } => self.stop_recording(force),
            Command::StartStreaming { server, key } => self.start_streaming(&server, &key),
            Command::StopStreaming { force } => self.stop_streaming(force),
            Command::Exit => debug!("Exit reached the media context, ignoring"),
        }
    }

    /// Bring up the engine, outputs and scene.
    ///
    /// Steps that already succeeded stay initialized when a later one fails,
    /// so a retry picks up where the last attempt stopped.
    #[instrument(name = "media_init", skip(self))]
    pub fn init(&mut self) -> bool {
        for step in InitStep::ALL {
            let result = match step {
                InitStep::Startup => self.startup(),
                InitStep::ResetAudio => self.engine.reset_audio(&self.config.audio_info()),
                InitStep::ResetVideo => self.engine.reset_video(&self.config.video_info()),
                InitStep::Service => self.init_service(),
                InitStep::Outputs => self.reset_outputs(),
                InitStep::Scene => self.create_scene(),
            };

            if let Err(e) = result {
                error!(?step, error = %e, "Init step failed");
                self.emit_error(ErrorCode::ClientInit, step.message());
                return false;
            }
            debug!(?step, "Init step done");
        }

        self.bind_default_audio();
        for channel in UNUSED_AUDIO_CHANNELS {
            self.engine.set_channel_source(channel, None);
        }

        self.emit(Event::Inited);
        true
    }

    fn startup(&mut self) -> EngineResult<()> {
        if self.engine.is_initialized() {
            return Ok(());
        }

        info!(version = %self.engine.version(), "Starting engine");
        self.engine.startup(self.language().locale())?;
        detect_encoders(&mut self.config.output, &self.engine.encoder_types());
        Ok(())
    }

    fn init_service(&mut self) -> EngineResult<()> {
        if self.service.is_none() {
            let service = Handle::create(
                &self.engine,
                ObjectKind::Service,
                SERVICE_TYPE,
                "RtmpService",
                None,
            )?;
            self.service = Some(service);
        }
        Ok(())
    }

    fn reset_outputs(&mut self) -> EngineResult<()> {
        if self.outputs.as_ref().is_some_and(|o| !o.is_idle()) {
            debug!("Outputs busy, keeping them");
            return Ok(());
        }

        self.outputs = None;
        let outputs = OutputHandler::new(
            Arc::clone(&self.engine),
            &self.config,
            Arc::clone(&self.signals),
        )?;
        self.outputs = Some(outputs);
        Ok(())
    }

    fn create_scene(&mut self) -> EngineResult<()> {
        if self.scene.is_some() {
            return Ok(());
        }

        if !self
            .engine
            .transition_types()
            .iter()
            .any(|id| id == TRANSITION_TYPE)
        {
            return Err(EngineError::Scene(format!("{TRANSITION_TYPE} not found")));
        }

        let transition = Handle::create(
            &self.engine,
            ObjectKind::Source,
            TRANSITION_TYPE,
            "FadeTransition",
            None,
        )?;
        self.engine
            .set_channel_source(TRANSITION_CHANNEL, Some(transition.id()));

        let scene = Handle::create(&self.engine, ObjectKind::Scene, "scene", "Scene", None)?;
        self.engine
            .set_transition_target(transition.id(), scene.id());

        self.transition = Some(transition);
        self.scene = Some(scene);
        Ok(())
    }

    #[instrument(name = "start_recording", skip(self))]
    pub fn start_recording(&mut self, path: &str) {
        if self.outputs.as_ref().is_some_and(OutputHandler::recording_active) {
            debug!("Recording busy, ignoring start");
            return;
        }
        if path.is_empty() {
            self.emit_error(ErrorCode::ClientRecording, Message::InvalidParameter);
            return;
        }
        if self.outputs.is_none() {
            warn!("Outputs not initialized");
            self.emit_error(ErrorCode::ClientRecording, Message::StartFailed);
            return;
        }

        self.downmix_mono(AudioChannel::Input, true);

        let started = self
            .outputs
            .as_mut()
            .is_some_and(|outputs| outputs.start_recording(path));
        if !started {
            self.emit_error(ErrorCode::ClientRecording, Message::StartFailed);
        }
    }

    pub fn stop_recording(&mut self, force: bool) {
        if let Some(outputs) = self.outputs.as_mut() {
            outputs.stop_recording(force);
        }
    }

    #[instrument(name = "start_streaming", skip(self, key))]
    pub fn start_streaming(&mut self, server: &str, key: &str) {
        if self.outputs.as_ref().is_some_and(OutputHandler::streaming_active) {
            debug!("Streaming busy, ignoring start");
            return;
        }
        if server.is_empty() || key.is_empty() {
            self.emit_error(ErrorCode::ClientStreaming, Message::InvalidParameter);
            return;
        }
        if self.outputs.is_none() || !self.ensure_service(server, key) {
            self.emit_error(ErrorCode::ClientStreaming, Message::StartFailed);
            return;
        }

        let Some(service) = self.service.as_ref().map(Handle::id) else {
            return;
        };
        let started = self
            .outputs
            .as_mut()
            .is_some_and(|outputs| outputs.start_streaming(service));
        if !started {
            self.emit_error(ErrorCode::ClientStreaming, Message::StartFailed);
        }
    }

    /// Point the service at `server`/`key`, recreating it only on change.
    fn ensure_service(&mut self, server: &str, key: &str) -> bool {
        if let Some(service) = &self.service {
            let current = self.engine.settings(service.id());
            if setting_str(&current, "server") == server && setting_str(&current, "key") == key {
                return true;
            }
        }

        let service_settings = settings(json!({
            "server": server,
            "key": key,
            "use_auth": false,
        }));
        match Handle::create(
            &self.engine,
            ObjectKind::Service,
            SERVICE_TYPE,
            "RtmpService",
            Some(&service_settings),
        ) {
            Ok(service) => {
                info!(server, "Streaming service updated");
                self.service = Some(service);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to create streaming service");
                false
            }
        }
    }

    pub fn stop_streaming(&mut self, force: bool) {
        if let Some(outputs) = self.outputs.as_mut() {
            outputs.stop_streaming(force);
        }
    }

    /// Apply an engine output signal.
    pub fn handle_signal(&mut self, signal: OutputSignal) {
        let event = self
            .outputs
            .as_mut()
            .and_then(|outputs| outputs.handle_signal(signal));
        if let Some(event) = event {
            self.emit(event);
        }
    }

    /// Log streaming bitrate and drops, if streaming.
    pub fn log_stream_stats(&mut self) {
        if let Some(outputs) = self.outputs.as_mut() {
            outputs.log_streaming();
        }
    }
}

impl Drop for MediaContext {
    fn drop(&mut self) {
        self.outputs = None;
        for channel in 0..OUTPUT_CHANNELS {
            self.engine.set_channel_source(channel, None);
        }
        debug!("Media context released");
    }
}

#[cfg(test)]
mod tests;
