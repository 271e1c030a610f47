//! Audio device bindings on the input and output channels.

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::AudioConfig;
use crate::media::{setting_str, settings, Handle, ObjectId, ObjectKind};

use super::MediaContext;

/// Device id of the system default device.
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Device id that detaches the channel.
pub const DISABLED_DEVICE_ID: &str = "disabled";

const NOISE_SUPPRESS_TYPE: &str = "noise_suppress_filter";
const NOISE_SUPPRESS_NAME: &str = "NoiseSuppress";

/// Logical audio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioChannel {
    /// Desktop audio.
    Output,
    /// Microphone.
    Input,
}

impl AudioChannel {
    /// Engine output channel index.
    pub fn index(self) -> u32 {
        match self {
            Self::Output => 1,
            Self::Input => 3,
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            Self::Output => "Default Desktop Audio",
            Self::Input => "Default Mic/Aux",
        }
    }

    pub fn source_type(self, config: &AudioConfig) -> &str {
        match self {
            Self::Output => &config.output_source_type,
            Self::Input => &config.input_source_type,
        }
    }
}

impl MediaContext {
    /// Bind the microphone whose name contains `device_desc`.
    ///
    /// `device_id` is accepted for compatibility and not used.
    pub fn reset_audio_input(&mut self, device_id: &str, device_desc: &str) {
        self.reset_audio_device(AudioChannel::Input, device_id, device_desc);
    }

    /// Bind the desktop audio device whose name contains `device_desc`.
    pub fn reset_audio_output(&mut self, device_id: &str, device_desc: &str) {
        self.reset_audio_device(AudioChannel::Output, device_id, device_desc);
    }

    #[instrument(name = "reset_audio_device", skip(self, _device_id))]
    fn reset_audio_device(&mut self, channel: AudioChannel, _device_id: &str, device_desc: &str) {
        let source_type = channel.source_type(&self.config.audio).to_string();
        let devices = self.engine.type_list_property(&source_type, "device_id");
        let current = self.bound_device_id(channel);

        match devices.iter().find(|device| device.name.contains(device_desc)) {
            Some(device) => {
                info!(name = %device.name, "Using matching audio device");
                self.bind_audio_device(channel, &device.value, &device.name);
            }
            None if current.as_deref() != Some(DEFAULT_DEVICE_ID) => {
                info!("No matching audio device, using default");
                self.bind_audio_device(channel, DEFAULT_DEVICE_ID, channel.default_name());
            }
            None => debug!("No matching audio device, default already bound"),
        }

        if channel == AudioChannel::Input {
            self.add_noise_suppression();
        }
    }

    fn bound_device_id(&self, channel: AudioChannel) -> Option<String> {
        let source = self.engine.channel_source(channel.index())?;
        let current = self.engine.settings(source);
        Some(setting_str(&current, "device_id").to_string())
    }

    /// Bind `device_id` to the channel, creating the source on first use.
    pub(super) fn bind_audio_device(&mut self, channel: AudioChannel, device_id: &str, name: &str) {
        let index = channel.index();
        let disable = device_id == DISABLED_DEVICE_ID;

        match self.engine.channel_source(index) {
            Some(_) if disable => {
                info!(?channel, "Audio channel disabled");
                self.engine.set_channel_source(index, None);
            }
            Some(source) => {
                let mut current = self.engine.settings(source);
                if setting_str(&current, "device_id") == device_id {
                    debug!(?channel, device_id, "Device already bound");
                    return;
                }
                current.insert("device_id".into(), Value::from(device_id));
                current.insert("use_device_timing".into(), Value::Bool(false));
                self.engine.update(source, &current);
                self.engine.set_audio_routing(source, 1, false);
                info!(?channel, device_id, "Audio device rebound");
            }
            None if disable => debug!(?channel, "Channel already detached"),
            None => {
                let source_settings = settings(json!({
                    "device_id": device_id,
                    "use_device_timing": false,
                }));
                let source_type = channel.source_type(&self.config.audio).to_string();
                match Handle::create(
                    &self.engine,
                    ObjectKind::Source,
                    &source_type,
                    name,
                    Some(&source_settings),
                ) {
                    // The channel keeps its own reference once bound.
                    Ok(source) => {
                        self.engine.set_audio_routing(source.id(), 1, false);
                        self.engine.set_channel_source(index, Some(source.id()));
                        info!(?channel, device_id, "Audio device bound");
                    }
                    Err(e) => warn!(?channel, error = %e, "Failed to create audio source"),
                }
            }
        }
    }

    /// Bind default devices where the engine reports any devices at all.
    pub(super) fn bind_default_audio(&mut self) {
        for channel in [AudioChannel::Output, AudioChannel::Input] {
            let source_type = channel.source_type(&self.config.audio).to_string();
            if self
                .engine
                .type_list_property(&source_type, "device_id")
                .is_empty()
            {
                warn!(source_type, "No audio devices found");
                continue;
            }

            self.bind_audio_device(channel, DEFAULT_DEVICE_ID, channel.default_name());
            if channel == AudioChannel::Input {
                self.add_noise_suppression();
            }
        }
    }

    fn add_noise_suppression(&self) {
        if let Some(source) = self.engine.channel_source(AudioChannel::Input.index()) {
            self.attach_filter(source, NOISE_SUPPRESS_TYPE, NOISE_SUPPRESS_NAME);
        }
    }

    /// Add a named filter to `source` unless one already exists.
    pub(super) fn attach_filter(&self, source: ObjectId, type_id: &str, name: &str) -> bool {
        if self.engine.find_filter(source, name).is_some() {
            return true;
        }

        match Handle::create(&self.engine, ObjectKind::Filter, type_id, name, None) {
            Ok(filter) => {
                self.engine.add_filter(source, filter.id());
                true
            }
            Err(e) => {
                warn!(type_id, error = %e, "Failed to create filter");
                false
            }
        }
    }

    /// Set force-mono only when it changes.
    pub fn downmix_mono(&mut self, channel: AudioChannel, enable: bool) {
        let Some(source) = self.engine.channel_source(channel.index()) else {
            debug!(?channel, "No audio source bound");
            return;
        };

        if self.engine.force_mono(source) != enable {
            self.engine.set_force_mono(source, enable);
            info!(?channel, enable, "Force mono changed");
        }
    }

    /// Set the mute flag, even if it is already in that state.
    pub fn mute(&mut self, channel: AudioChannel, mute: bool) {
        let Some(source) = self.engine.channel_source(channel.index()) else {
            debug!(?channel, "No audio source bound");
            return;
        };

        let was_muted = self.engine.muted(source);
        self.engine.set_muted(source, mute);
        info!(?channel, was_muted, mute, "Mute applied");
    }
}
