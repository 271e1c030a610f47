//! In-process engine that simulates objects and outputs without media.
//!
//! Used by the tests and as the recorder binary's built-in backend. Every mutating
//! call is recorded in a journal so callers can assert on engine traffic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::media::{
    AudioInfo, ListItem, MediaEngine, ObjectId, ObjectKind, OutputCounters, OutputRole,
    OutputSignal, Settings, SignalKind, SignalSink, Transform, VideoInfo,
};

/// Failure the simulation can be told to produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimFailure {
    Startup,
    ResetAudio,
    ResetVideo,
    /// Creating an object of this type id fails.
    Create(String),
}

struct SimObject {
    kind: ObjectKind,
    type_id: String,
    name: String,
    settings: Settings,
    refs: u32,
    filters: Vec<ObjectId>,
    force_mono: bool,
    muted: bool,
    active: bool,
    reconnect: Option<(u32, u32)>,
    counters: OutputCounters,
    start_error: Option<String>,
    last_error: Option<String>,
    signals: Option<(OutputRole, Arc<dyn SignalSink>)>,
}

struct SimItem {
    scene: ObjectId,
    transform: Option<Transform>,
}

struct SimState {
    initialized: bool,
    next_id: u64,
    objects: HashMap<ObjectId, SimObject>,
    items: HashMap<ObjectId, SimItem>,
    channels: HashMap<u32, ObjectId>,
    encoder_types: Vec<String>,
    transition_types: Vec<String>,
    windows: Vec<ListItem>,
    devices: HashMap<String, Vec<ListItem>>,
    qsv_icq: bool,
    failures: HashSet<SimFailure>,
    ducking: Option<bool>,
    journal: Vec<String>,
}

impl SimState {
    fn record(&mut self, entry: String) {
        self.journal.push(entry);
    }

    fn name_of(&self, id: ObjectId) -> String {
        self.objects
            .get(&id)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| format!("#{}", id.0))
    }

    fn latest_named(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .filter(|(_, o)| o.name == name)
            .map(|(id, _)| *id)
            .max()
    }

    fn retain(&mut self, id: ObjectId) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.refs += 1;
        }
    }

    fn release(&mut self, id: ObjectId) {
        let Some(object) = self.objects.get_mut(&id) else {
            return;
        };
        object.refs = object.refs.saturating_sub(1);
        if object.refs > 0 {
            return;
        }

        if let Some(object) = self.objects.remove(&id) {
            debug!(?id, kind = %object.kind, name = %object.name, "Simulated object destroyed");
            for filter in object.filters {
                self.release(filter);
            }
        }
        self.items.retain(|_, item| item.scene != id);
    }

    fn sink_of(&self, id: ObjectId) -> Option<(OutputRole, Arc<dyn SignalSink>)> {
        self.objects
            .get(&id)
            .and_then(|o| o.signals.as_ref())
            .map(|(role, sink)| (*role, Arc::clone(sink)))
    }
}

/// Simulated media engine.
pub struct SimEngine {
    state: Mutex<SimState>,
}

impl SimEngine {
    /// A simulation with x264 only, a fade transition, two windows and one
    /// named device per audio source type.
    pub fn new() -> Self {
        let mut devices = HashMap::new();
        devices.insert(
            "wasapi_input_capture".to_string(),
            vec![
                ListItem::new("Default", "default"),
                ListItem::new("Microphone (USB Audio)", "{mic-usb}"),
            ],
        );
        devices.insert(
            "wasapi_output_capture".to_string(),
            vec![
                ListItem::new("Default", "default"),
                ListItem::new("Speakers (Realtek Audio)", "{spk-realtek}"),
            ],
        );

        Self {
            state: Mutex::new(SimState {
                initialized: false,
                next_id: 1,
                objects: HashMap::new(),
                items: HashMap::new(),
                channels: HashMap::new(),
                encoder_types: vec!["obs_x264".to_string()],
                transition_types: vec!["cut_transition".to_string(), "fade_transition".to_string()],
                windows: vec![
                    ListItem::new("Notepad", "Untitled - Notepad:Notepad:notepad.exe"),
                    ListItem::new("Calculator", "Calculator:CalcFrame:calc.exe"),
                ],
                devices,
                qsv_icq: true,
                failures: HashSet::new(),
                ducking: None,
                journal: Vec::new(),
            }),
        }
    }

    pub fn set_windows(&self, windows: Vec<ListItem>) {
        self.state.lock().windows = windows;
    }

    pub fn set_devices(&self, source_type: &str, devices: Vec<ListItem>) {
        self.state
            .lock()
            .devices
            .insert(source_type.to_string(), devices);
    }

    pub fn set_encoder_types(&self, types: Vec<String>) {
        self.state.lock().encoder_types = types;
    }

    pub fn set_transition_types(&self, types: Vec<String>) {
        self.state.lock().transition_types = types;
    }

    pub fn set_qsv_icq(&self, available: bool) {
        self.state.lock().qsv_icq = available;
    }

    pub fn fail(&self, failure: SimFailure) {
        self.state.lock().failures.insert(failure);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Make the next starts of output `name` fail with `error`.
    pub fn fail_start(&self, name: &str, error: &str) {
        let mut state = self.state.lock();
        if let Some(id) = state.latest_named(name) {
            if let Some(object) = state.objects.get_mut(&id) {
                object.start_error = Some(error.to_string());
            }
        }
    }

    pub fn set_counters(&self, name: &str, counters: OutputCounters) {
        let mut state = self.state.lock();
        if let Some(id) = state.latest_named(name) {
            if let Some(object) = state.objects.get_mut(&id) {
                object.counters = counters;
            }
        }
    }

    /// Raise a `stop` signal with `code` on output `name`.
    pub fn emit_stop(&self, name: &str, code: i32) {
        let (sink, last_error) = {
            let mut state = self.state.lock();
            let Some(id) = state.latest_named(name) else {
                return;
            };
            let sink = state.sink_of(id);
            let last_error = state.objects.get_mut(&id).and_then(|object| {
                object.active = false;
                object.last_error.clone()
            });
            (sink, last_error)
        };

        if let Some((role, sink)) = sink {
            sink.post(OutputSignal::new(role, SignalKind::Stop { code, last_error }));
        }
    }

    pub fn is_live(&self, id: ObjectId) -> bool {
        self.state.lock().objects.contains_key(&id)
    }

    pub fn object_named(&self, name: &str) -> Option<ObjectId> {
        self.state.lock().latest_named(name)
    }

    /// Number of live objects named `name`.
    pub fn count_named(&self, name: &str) -> usize {
        self.state
            .lock()
            .objects
            .values()
            .filter(|o| o.name == name)
            .count()
    }

    pub fn settings_named(&self, name: &str) -> Option<Settings> {
        let state = self.state.lock();
        let id = state.latest_named(name)?;
        state.objects.get(&id).map(|o| o.settings.clone())
    }

    /// Names of the filters attached to `source`.
    pub fn filter_names(&self, source: ObjectId) -> Vec<String> {
        let state = self.state.lock();
        state
            .objects
            .get(&source)
            .map(|o| o.filters.iter().map(|f| state.name_of(*f)).collect())
            .unwrap_or_default()
    }

    pub fn reconnect_of(&self, name: &str) -> Option<(u32, u32)> {
        let state = self.state.lock();
        let id = state.latest_named(name)?;
        state.objects.get(&id).and_then(|o| o.reconnect)
    }

    /// Transforms of every scene item, in item order.
    pub fn item_transforms(&self) -> Vec<Transform> {
        let state = self.state.lock();
        let mut items: Vec<_> = state.items.iter().collect();
        items.sort_by_key(|(id, _)| **id);
        items
            .into_iter()
            .filter_map(|(_, item)| item.transform)
            .collect()
    }

    pub fn scene_item_count(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn ducking(&self) -> Option<bool> {
        self.state.lock().ducking
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.lock().journal.clone()
    }

    pub fn journal_len(&self) -> usize {
        self.state.lock().journal.len()
    }

    /// Journal entries starting with `op`.
    pub fn count_calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|entry| entry.split(' ').next() == Some(op))
            .count()
    }

    fn post_all(sink: Option<(OutputRole, Arc<dyn SignalSink>)>, kinds: Vec<SignalKind>) {
        if let Some((role, sink)) = sink {
            for kind in kinds {
                sink.post(OutputSignal::new(role, kind));
            }
        }
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for SimEngine {
    fn version(&self) -> String {
        format!("sim-{}", env!("CARGO_PKG_VERSION"))
    }

    fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    fn startup(&self, locale: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.record(format!("startup {locale}"));
        if state.failures.contains(&SimFailure::Startup) {
            return Err(EngineError::Startup("simulated failure".into()));
        }
        state.initialized = true;
        Ok(())
    }

    fn reset_audio(&self, info: &AudioInfo) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.record(format!("reset_audio {}", info.samples_per_sec));
        if state.failures.contains(&SimFailure::ResetAudio) {
            return Err(EngineError::AudioReset("simulated failure".into()));
        }
        Ok(())
    }

    fn reset_video(&self, info: &VideoInfo) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.record(format!("reset_video {}x{}", info.base_width, info.base_height));
        if state.failures.contains(&SimFailure::ResetVideo) {
            return Err(EngineError::VideoReset("invalid parameters".into()));
        }
        Ok(())
    }

    fn encoder_types(&self) -> Vec<String> {
        self.state.lock().encoder_types.clone()
    }

    fn set_audio_ducking(&self, enabled: bool) -> bool {
        let mut state = self.state.lock();
        state.record(format!("set_audio_ducking {enabled}"));
        state.ducking = Some(enabled);
        true
    }

    fn create(
        &self,
        kind: ObjectKind,
        type_id: &str,
        name: &str,
        settings: Option<&Settings>,
    ) -> EngineResult<ObjectId> {
        let mut state = self.state.lock();
        state.record(format!("create {type_id} {name}"));
        if state.failures.contains(&SimFailure::Create(type_id.to_string())) {
            return Err(EngineError::CreateFailed {
                kind,
                type_id: type_id.to_string(),
            });
        }

        let id = ObjectId(state.next_id);
        state.next_id += 1;
        state.objects.insert(
            id,
            SimObject {
                kind,
                type_id: type_id.to_string(),
                name: name.to_string(),
                settings: settings.cloned().unwrap_or_default(),
                refs: 1,
                filters: Vec::new(),
                force_mono: false,
                muted: false,
                active: false,
                reconnect: None,
                counters: OutputCounters::default(),
                start_error: None,
                last_error: None,
                signals: None,
            },
        );
        debug!(?id, kind = %kind, type_id, name, "Simulated object created");
        Ok(id)
    }

    fn release(&self, id: ObjectId) {
        self.state.lock().release(id);
    }

    fn settings(&self, id: ObjectId) -> Settings {
        self.state
            .lock()
            .objects
            .get(&id)
            .map(|o| o.settings.clone())
            .unwrap_or_default()
    }

    fn update(&self, id: ObjectId, settings: &Settings) {
        let mut state = self.state.lock();
        let name = state.name_of(id);
        state.record(format!("update {name}"));
        if let Some(object) = state.objects.get_mut(&id) {
            for (key, value) in settings {
                object.settings.insert(key.clone(), value.clone());
            }
        }
    }

    fn list_property(&self, id: ObjectId, property: &str) -> Vec<ListItem> {
        let state = self.state.lock();
        let Some(object) = state.objects.get(&id) else {
            return Vec::new();
        };

        match (object.type_id.as_str(), property) {
            ("window_capture", "window") => state.windows.clone(),
            ("obs_qsv11", "rate_control") => {
                let mut modes = vec!["CBR", "VBR", "CQP"];
                if state.qsv_icq {
                    modes.push("ICQ");
                }
                modes.into_iter().map(|m| ListItem::new(m, m)).collect()
            }
            _ => Vec::new(),
        }
    }

    fn type_list_property(&self, type_id: &str, property: &str) -> Vec<ListItem> {
        if property != "device_id" {
            return Vec::new();
        }
        self.state
            .lock()
            .devices
            .get(type_id)
            .cloned()
            .unwrap_or_default()
    }

    fn find_filter(&self, source: ObjectId, name: &str) -> Option<ObjectId> {
        let state = self.state.lock();
        state
            .objects
            .get(&source)?
            .filters
            .iter()
            .copied()
            .find(|f| state.objects.get(f).is_some_and(|o| o.name == name))
    }

    fn add_filter(&self, source: ObjectId, filter: ObjectId) {
        let mut state = self.state.lock();
        let (source_name, filter_name) = (state.name_of(source), state.name_of(filter));
        state.record(format!("add_filter {source_name} {filter_name}"));
        if state.objects.contains_key(&source) {
            state.retain(filter);
            if let Some(object) = state.objects.get_mut(&source) {
                object.filters.push(filter);
            }
        }
    }

    fn force_mono(&self, source: ObjectId) -> bool {
        self.state
            .lock()
            .objects
            .get(&source)
            .is_some_and(|o| o.force_mono)
    }

    fn set_force_mono(&self, source: ObjectId, enabled: bool) {
        let mut state = self.state.lock();
        state.record(format!("set_force_mono {enabled}"));
        if let Some(object) = state.objects.get_mut(&source) {
            object.force_mono = enabled;
        }
    }

    fn muted(&self, source: ObjectId) -> bool {
        self.state
            .lock()
            .objects
            .get(&source)
            .is_some_and(|o| o.muted)
    }

    fn set_muted(&self, source: ObjectId, muted: bool) {
        let mut state = self.state.lock();
        state.record(format!("set_muted {muted}"));
        if let Some(object) = state.objects.get_mut(&source) {
            object.muted = muted;
        }
    }

    fn set_audio_routing(&self, source: ObjectId, mixers: u32, monitoring: bool) {
        let mut state = self.state.lock();
        state.record(format!("set_audio_routing {mixers} {monitoring}"));
        if let Some(object) = state.objects.get_mut(&source) {
            object.settings.insert("mixers".into(), Value::from(mixers));
        }
    }

    fn channel_source(&self, channel: u32) -> Option<ObjectId> {
        self.state.lock().channels.get(&channel).copied()
    }

    fn set_channel_source(&self, channel: u32, source: Option<ObjectId>) {
        let mut state = self.state.lock();
        state.record(format!("set_channel_source {channel}"));
        if let Some(source) = source {
            state.retain(source);
        }
        let previous = match source {
            Some(source) => state.channels.insert(channel, source),
            None => state.channels.remove(&channel),
        };
        if let Some(previous) = previous {
            state.release(previous);
        }
    }

    fn transition_types(&self) -> Vec<String> {
        self.state.lock().transition_types.clone()
    }

    fn set_transition_target(&self, transition: ObjectId, scene: ObjectId) {
        let mut state = self.state.lock();
        state.record("set_transition_target".into());
        if let Some(object) = state.objects.get_mut(&transition) {
            object.settings.insert("target".into(), Value::from(scene.0));
        }
    }

    fn scene_items(&self, scene: ObjectId) -> Vec<ObjectId> {
        let state = self.state.lock();
        let mut items: Vec<ObjectId> = state
            .items
            .iter()
            .filter(|(_, item)| item.scene == scene)
            .map(|(id, _)| *id)
            .collect();
        items.sort();
        items
    }

    fn add_scene_item(&self, scene: ObjectId, source: ObjectId) -> EngineResult<ObjectId> {
        let mut state = self.state.lock();
        state.record("add_scene_item".into());
        if !state.objects.contains_key(&scene) {
            return Err(EngineError::UnknownObject(scene));
        }
        if !state.objects.contains_key(&source) {
            return Err(EngineError::UnknownObject(source));
        }

        let id = ObjectId(state.next_id);
        state.next_id += 1;
        state.items.insert(
            id,
            SimItem {
                scene,
                transform: None,
            },
        );
        Ok(id)
    }

    fn remove_scene_item(&self, item: ObjectId) {
        let mut state = self.state.lock();
        state.record("remove_scene_item".into());
        state.items.remove(&item);
    }

    fn set_item_transform(&self, item: ObjectId, transform: &Transform) {
        let mut state = self.state.lock();
        state.record("set_item_transform".into());
        if let Some(item) = state.items.get_mut(&item) {
            item.transform = Some(*transform);
        }
    }

    fn bind_encoder(&self, encoder: ObjectId) {
        let mut state = self.state.lock();
        let name = state.name_of(encoder);
        state.record(format!("bind_encoder {name}"));
    }

    fn set_output_encoders(&self, output: ObjectId, video: ObjectId, audio: ObjectId) {
        let mut state = self.state.lock();
        let name = state.name_of(output);
        state.record(format!("set_output_encoders {name}"));
        if let Some(object) = state.objects.get_mut(&output) {
            object.settings.insert("video_encoder_ref".into(), Value::from(video.0));
            object.settings.insert("audio_encoder_ref".into(), Value::from(audio.0));
        }
    }

    fn set_output_service(&self, output: ObjectId, service: ObjectId) {
        let mut state = self.state.lock();
        let name = state.name_of(output);
        state.record(format!("set_output_service {name}"));
        if let Some(object) = state.objects.get_mut(&output) {
            object.settings.insert("service_ref".into(), Value::from(service.0));
        }
    }

    fn set_reconnect(&self, output: ObjectId, max_retries: u32, retry_delay_secs: u32) {
        let mut state = self.state.lock();
        if let Some(object) = state.objects.get_mut(&output) {
            object.reconnect = Some((max_retries, retry_delay_secs));
        }
    }

    fn bind_output_media(&self, output: ObjectId) {
        let mut state = self.state.lock();
        let name = state.name_of(output);
        state.record(format!("bind_output_media {name}"));
    }

    fn apply_service_settings(&self, service: ObjectId, video: &mut Settings, _audio: &mut Settings) {
        let state = self.state.lock();
        if let Some(bitrate) = state
            .objects
            .get(&service)
            .and_then(|o| o.settings.get("max_video_bitrate"))
        {
            video.insert("bitrate".into(), bitrate.clone());
        }
    }

    fn start_output(&self, output: ObjectId) -> bool {
        let sink = {
            let mut state = self.state.lock();
            let name = state.name_of(output);
            state.record(format!("start_output {name}"));
            let Some(object) = state.objects.get_mut(&output) else {
                return false;
            };
            if let Some(error) = object.start_error.clone() {
                object.last_error = Some(error);
                return false;
            }
            object.active = true;
            state.sink_of(output)
        };

        Self::post_all(sink, vec![SignalKind::Starting, SignalKind::Start]);
        true
    }

    fn stop_output(&self, output: ObjectId) {
        let sink = {
            let mut state = self.state.lock();
            let name = state.name_of(output);
            state.record(format!("stop_output {name}"));
            if let Some(object) = state.objects.get_mut(&output) {
                object.active = false;
            }
            state.sink_of(output)
        };

        Self::post_all(
            sink,
            vec![
                SignalKind::Stopping,
                SignalKind::Stop {
                    code: 0,
                    last_error: None,
                },
            ],
        );
    }

    fn force_stop_output(&self, output: ObjectId) {
        let sink = {
            let mut state = self.state.lock();
            let name = state.name_of(output);
            state.record(format!("force_stop_output {name}"));
            if let Some(object) = state.objects.get_mut(&output) {
                object.active = false;
            }
            state.sink_of(output)
        };

        Self::post_all(
            sink,
            vec![SignalKind::Stop {
                code: 0,
                last_error: None,
            }],
        );
    }

    fn output_active(&self, output: ObjectId) -> bool {
        self.state
            .lock()
            .objects
            .get(&output)
            .is_some_and(|o| o.active)
    }

    fn output_last_error(&self, output: ObjectId) -> Option<String> {
        self.state
            .lock()
            .objects
            .get(&output)
            .and_then(|o| o.last_error.clone())
    }

    fn output_counters(&self, output: ObjectId) -> OutputCounters {
        self.state
            .lock()
            .objects
            .get(&output)
            .map(|o| o.counters)
            .unwrap_or_default()
    }

    fn output_delay_secs(&self, _output: ObjectId) -> u32 {
        0
    }

    fn connect_output_signals(&self, output: ObjectId, role: OutputRole, sink: Arc<dyn SignalSink>) {
        let mut state = self.state.lock();
        if let Some(object) = state.objects.get_mut(&output) {
            object.signals = Some((role, sink));
        }
    }

    fn disconnect_output_signals(&self, output: ObjectId) {
        let mut state = self.state.lock();
        if let Some(object) = state.objects.get_mut(&output) {
            object.signals = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_keeps_source_alive() {
        let sim = SimEngine::new();
        let id = sim
            .create(ObjectKind::Source, "wasapi_input_capture", "mic", None)
            .unwrap();

        sim.set_channel_source(3, Some(id));
        sim.release(id);
        assert!(sim.is_live(id));

        sim.set_channel_source(3, None);
        assert!(!sim.is_live(id));
    }

    #[test]
    fn test_create_failure() {
        let sim = SimEngine::new();
        sim.fail(SimFailure::Create("rtmp_output".into()));

        let err = sim
            .create(ObjectKind::Output, "rtmp_output", "out", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::CreateFailed { .. }));
        assert_eq!(sim.count_calls("create"), 1);
    }

    #[test]
    fn test_start_posts_signals() {
        let sim = SimEngine::new();
        let (tx, rx) = crossbeam_channel::unbounded::<OutputSignal>();
        let out = sim
            .create(ObjectKind::Output, "rtmp_output", "out", None)
            .unwrap();
        sim.connect_output_signals(out, OutputRole::Streaming, Arc::new(tx));

        assert!(sim.start_output(out));
        assert!(sim.output_active(out));
        let kinds: Vec<SignalKind> = rx.try_iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SignalKind::Starting, SignalKind::Start]);
    }
}
