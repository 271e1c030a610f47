//! Abstraction over the underlying audio/video engine.
//!
//! The recorder drives the engine only through [`MediaEngine`]. Objects are
//! identified by opaque [`ObjectId`]s; ownership is expressed with [`Handle`],
//! which releases its object when dropped.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::{ChannelSetup, ColorFormat, ColorRange, ColorSpace, ScaleType};
use crate::error::EngineResult;

/// Engine object settings, keyed by setting name.
pub type Settings = serde_json::Map<String, Value>;

/// Build a [`Settings`] map from a `json!` object literal.
pub fn settings(value: Value) -> Settings {
    match value {
        Value::Object(map) => map,
        _ => Settings::new(),
    }
}

/// Read a string setting, empty if absent.
pub fn setting_str<'a>(settings: &'a Settings, key: &str) -> &'a str {
    settings.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Opaque engine object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Category of engine object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Source,
    Filter,
    VideoEncoder,
    AudioEncoder,
    Output,
    Service,
    Scene,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Filter => "filter",
            Self::VideoEncoder => "video encoder",
            Self::AudioEncoder => "audio encoder",
            Self::Output => "output",
            Self::Service => "service",
            Self::Scene => "scene",
        };
        f.write_str(name)
    }
}

/// One entry of an enumerated list property (windows, devices...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    /// Display name.
    pub name: String,
    /// Value to store in settings when selected.
    pub value: String,
}

impl ListItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Audio pipeline parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub samples_per_sec: u32,
    pub speakers: ChannelSetup,
}

/// Video pipeline parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub adapter: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub output_format: ColorFormat,
    pub colorspace: ColorSpace,
    pub range: ColorRange,
    pub scale_type: ScaleType,
}

/// Position and uniform scale of a scene item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f32,
    pub x: f32,
    pub y: f32,
}

/// Cumulative counters of an output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCounters {
    pub total_bytes: u64,
    pub total_frames: i32,
    pub frames_dropped: i32,
}

/// Which output a signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputRole {
    Recording,
    Streaming,
}

/// Lifecycle signal raised by an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    Starting,
    Start,
    Stopping,
    Stop {
        code: i32,
        last_error: Option<String>,
    },
}

/// Output signal as delivered to the context that owns the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSignal {
    pub role: OutputRole,
    pub kind: SignalKind,
}

impl OutputSignal {
    pub fn new(role: OutputRole, kind: SignalKind) -> Self {
        Self { role, kind }
    }
}

/// Receives output signals from engine threads.
///
/// Implementations only enqueue; handling happens on the owning context.
pub trait SignalSink: Send + Sync {
    fn post(&self, signal: OutputSignal);
}

impl SignalSink for tokio::sync::mpsc::UnboundedSender<OutputSignal> {
    fn post(&self, signal: OutputSignal) {
        if self.send(signal).is_err() {
            debug!("Signal receiver dropped");
        }
    }
}

impl SignalSink for crossbeam_channel::Sender<OutputSignal> {
    fn post(&self, signal: OutputSignal) {
        if self.send(signal).is_err() {
            debug!("Signal receiver dropped");
        }
    }
}

/// Operations the recorder needs from the media engine.
///
/// Methods take `&self`; implementations synchronize internally.
pub trait MediaEngine: Send + Sync {
    fn version(&self) -> String;
    fn is_initialized(&self) -> bool;
    fn startup(&self, locale: &str) -> EngineResult<()>;
    fn reset_audio(&self, info: &AudioInfo) -> EngineResult<()>;
    fn reset_video(&self, info: &VideoInfo) -> EngineResult<()>;
    /// Registered video encoder type ids.
    fn encoder_types(&self) -> Vec<String>;
    /// Allow or forbid OS audio ducking. Returns false if unsupported.
    fn set_audio_ducking(&self, enabled: bool) -> bool;

    fn create(
        &self,
        kind: ObjectKind,
        type_id: &str,
        name: &str,
        settings: Option<&Settings>,
    ) -> EngineResult<ObjectId>;
    /// Drop one reference to an object.
    fn release(&self, id: ObjectId);
    fn settings(&self, id: ObjectId) -> Settings;
    fn update(&self, id: ObjectId, settings: &Settings);
    /// Items of a list property on a live object.
    fn list_property(&self, id: ObjectId, property: &str) -> Vec<ListItem>;
    /// Items of a list property for an object type.
    fn type_list_property(&self, type_id: &str, property: &str) -> Vec<ListItem>;

    fn find_filter(&self, source: ObjectId, name: &str) -> Option<ObjectId>;
    fn add_filter(&self, source: ObjectId, filter: ObjectId);
    fn force_mono(&self, source: ObjectId) -> bool;
    fn set_force_mono(&self, source: ObjectId, enabled: bool);
    fn muted(&self, source: ObjectId) -> bool;
    fn set_muted(&self, source: ObjectId, muted: bool);
    fn set_audio_routing(&self, source: ObjectId, mixers: u32, monitoring: bool);
    fn channel_source(&self, channel: u32) -> Option<ObjectId>;
    /// Bind a source to an output channel; the channel holds its own reference.
    fn set_channel_source(&self, channel: u32, source: Option<ObjectId>);

    /// Registered transition type ids.
    fn transition_types(&self) -> Vec<String>;
    fn set_transition_target(&self, transition: ObjectId, scene: ObjectId);
    fn scene_items(&self, scene: ObjectId) -> Vec<ObjectId>;
    fn add_scene_item(&self, scene: ObjectId, source: ObjectId) -> EngineResult<ObjectId>;
    fn remove_scene_item(&self, item: ObjectId);
    fn set_item_transform(&self, item: ObjectId, transform: &Transform);

    /// Attach an encoder to the current video or audio pipeline.
    fn bind_encoder(&self, encoder: ObjectId);
    fn set_output_encoders(&self, output: ObjectId, video: ObjectId, audio: ObjectId);
    fn set_output_service(&self, output: ObjectId, service: ObjectId);
    fn set_reconnect(&self, output: ObjectId, max_retries: u32, retry_delay_secs: u32);
    /// Feed raw pipeline media to an output that encodes by itself.
    fn bind_output_media(&self, output: ObjectId);
    fn apply_service_settings(&self, service: ObjectId, video: &mut Settings, audio: &mut Settings);
    fn start_output(&self, output: ObjectId) -> bool;
    fn stop_output(&self, output: ObjectId);
    fn force_stop_output(&self, output: ObjectId);
    fn output_active(&self, output: ObjectId) -> bool;
    fn output_last_error(&self, output: ObjectId) -> Option<String>;
    fn output_counters(&self, output: ObjectId) -> OutputCounters;
    fn output_delay_secs(&self, output: ObjectId) -> u32;
    fn connect_output_signals(&self, output: ObjectId, role: OutputRole, sink: Arc<dyn SignalSink>);
    fn disconnect_output_signals(&self, output: ObjectId);
}

/// Exclusive owner of one engine object.
pub struct Handle {
    id: ObjectId,
    engine: Arc<dyn MediaEngine>,
}

impl Handle {
    /// Create an object and take ownership of it.
    pub fn create(
        engine: &Arc<dyn MediaEngine>,
        kind: ObjectKind,
        type_id: &str,
        name: &str,
        settings: Option<&Settings>,
    ) -> EngineResult<Self> {
        let id = engine.create(kind, type_id, name, settings)?;
        Ok(Self {
            id,
            engine: Arc::clone(engine),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.id.0).finish()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.engine.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimEngine;

    #[test]
    fn test_handle_releases_on_drop() {
        let sim = Arc::new(SimEngine::new());
        let engine: Arc<dyn MediaEngine> = sim.clone();

        let handle = Handle::create(&engine, ObjectKind::Scene, "scene", "Scene", None).unwrap();
        let id = handle.id();
        assert!(sim.is_live(id));

        drop(handle);
        assert!(!sim.is_live(id));
    }

    #[test]
    fn test_settings_helpers() {
        let map = settings(serde_json::json!({ "server": "rtmp://a", "port": 1935 }));
        assert_eq!(setting_str(&map, "server"), "rtmp://a");
        assert_eq!(setting_str(&map, "port"), "");
        assert_eq!(setting_str(&map, "missing"), "");
        assert!(settings(serde_json::json!([1, 2])).is_empty());
    }
}
