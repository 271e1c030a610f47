use super::*;

use crossbeam_channel::Receiver;
use recorder_ipc::Rect;

use super::capture::{CROP_FILTER_NAME, WINDOW_CAPTURE_TYPE};

use crate::media::ListItem;
use crate::output::EncoderPreference;
use crate::sim::{SimEngine, SimFailure};

struct Fixture {
    sim: Arc<SimEngine>,
    context: MediaContext,
    events: Receiver<Event>,
    signals: Receiver<OutputSignal>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_sim(SimEngine::new())
    }

    fn with_sim(sim: SimEngine) -> Self {
        let sim = Arc::new(sim);
        let engine: Arc<dyn MediaEngine> = sim.clone();
        let (event_tx, events) = crossbeam_channel::unbounded::<Event>();
        let (signal_tx, signals) = crossbeam_channel::unbounded::<OutputSignal>();
        let context = MediaContext::new(
            engine,
            RecorderConfig::default(),
            Box::new(event_tx),
            Arc::new(signal_tx),
        );
        Self {
            sim,
            context,
            events,
            signals,
        }
    }

    fn run(&mut self, command: Command) -> Vec<Event> {
        self.context.execute(command);
        self.pump()
    }

    /// Deliver queued engine signals and collect every pending event.
    fn pump(&mut self) -> Vec<Event> {
        while let Ok(signal) = self.signals.try_recv() {
            self.context.handle_signal(signal);
        }
        self.events.try_iter().collect()
    }

    fn inited(mut self) -> Self {
        assert_eq!(self.run(Command::Init), vec![Event::Inited]);
        self
    }

    fn device_on(&self, channel: AudioChannel) -> Option<String> {
        let source = self.sim.channel_source(channel.index())?;
        Some(setting_str(&self.sim.settings(source), "device_id").to_string())
    }

    fn service_creates(&self) -> usize {
        self.sim
            .journal()
            .iter()
            .filter(|entry| entry.starts_with("create rtmp_custom"))
            .count()
    }
}

#[test]
fn test_init_binds_default_audio() {
    let f = Fixture::new().inited();

    assert!(f.sim.channel_source(TRANSITION_CHANNEL).is_some());
    assert_eq!(f.device_on(AudioChannel::Output).as_deref(), Some("default"));
    assert_eq!(f.device_on(AudioChannel::Input).as_deref(), Some("default"));
    for channel in UNUSED_AUDIO_CHANNELS {
        assert!(f.sim.channel_source(channel).is_none());
    }

    let mic = f.sim.channel_source(AudioChannel::Input.index()).unwrap();
    assert_eq!(f.sim.filter_names(mic), vec!["NoiseSuppress".to_string()]);
    assert!(f.context.outputs().is_some());
}

#[test]
fn test_init_failure_aborts_remaining_steps() {
    let sim = SimEngine::new();
    sim.fail(SimFailure::ResetVideo);
    let mut f = Fixture::with_sim(sim);

    assert_eq!(
        f.run(Command::Init),
        vec![Event::error(ErrorCode::ClientInit, "video reset failed")]
    );
    assert_eq!(f.sim.count_calls("create"), 0);
    assert!(f.context.outputs().is_none());

    f.sim.clear_failures();
    assert_eq!(f.run(Command::Init), vec![Event::Inited]);
    assert_eq!(f.sim.count_calls("startup"), 1);
}

#[test]
fn test_init_requires_fade_transition() {
    let sim = SimEngine::new();
    sim.set_transition_types(vec!["cut_transition".into()]);
    let mut f = Fixture::with_sim(sim);

    assert_eq!(
        f.run(Command::Init),
        vec![Event::error(ErrorCode::ClientInit, "failed to initialize scene")]
    );
}

#[test]
fn test_init_falls_back_to_x264() {
    let mut f = Fixture::new();
    f.context.config.output.stream_encoder = EncoderPreference::Nvenc;

    assert_eq!(f.run(Command::Init), vec![Event::Inited]);
    assert_eq!(
        f.context.config().output.stream_encoder,
        EncoderPreference::X264
    );
    assert!(f
        .sim
        .journal()
        .contains(&"create obs_x264 streaming_h264".to_string()));
}

#[test]
fn test_init_twice_rebuilds_idle_outputs() {
    let mut f = Fixture::new().inited();
    assert_eq!(f.run(Command::Init), vec![Event::Inited]);

    assert_eq!(f.sim.count_named("Scene"), 1);
    assert_eq!(f.sim.count_named("streaming_output"), 1);
    assert_eq!(f.sim.count_calls("startup"), 1);
}

#[test]
fn test_init_keeps_busy_outputs() {
    let mut f = Fixture::new().inited();
    f.run(Command::StartRecording {
        path: "a.mp4".into(),
    });
    let output = f.sim.object_named("ffmpeg_output");

    assert_eq!(f.run(Command::Init), vec![Event::Inited]);
    assert_eq!(f.sim.object_named("ffmpeg_output"), output);
    assert!(f.context.outputs().unwrap().recording_active());
}

#[test]
fn test_start_recording_twice_starts_once() {
    let mut f = Fixture::new().inited();

    f.context.execute(Command::StartRecording {
        path: "C:\\rec.mp4".into(),
    });
    f.context.execute(Command::StartRecording {
        path: "C:\\rec.mp4".into(),
    });

    assert_eq!(f.pump(), vec![Event::RecordingStarted]);
    assert_eq!(f.sim.count_calls("start_output"), 1);
}

#[test]
fn test_start_recording_while_stopping_ignored() {
    let mut f = Fixture::new().inited();
    f.run(Command::StartRecording {
        path: "a.mp4".into(),
    });

    f.context.execute(Command::StopRecording { force: false });
    f.context.execute(Command::StartRecording {
        path: "b.mp4".into(),
    });

    assert_eq!(
        f.pump(),
        vec![
            Event::RecordingStopping,
            Event::RecordingStopped {
                path: "a.mp4".into()
            }
        ]
    );
    assert_eq!(f.sim.count_calls("start_output"), 1);
    assert_eq!(
        f.context.outputs().unwrap().recording_state(),
        crate::output::OutputState::Idle
    );
}

#[test]
fn test_start_recording_downmixes_input() {
    let mut f = Fixture::new().inited();
    f.run(Command::StartRecording {
        path: "rec.mp4".into(),
    });

    let mic = f.sim.channel_source(AudioChannel::Input.index()).unwrap();
    assert!(f.sim.force_mono(mic));
}

#[test]
fn test_start_recording_empty_path() {
    let mut f = Fixture::new().inited();
    let before = f.sim.journal_len();

    assert_eq!(
        f.run(Command::StartRecording { path: String::new() }),
        vec![Event::error(ErrorCode::ClientRecording, "invalid parameter")]
    );
    assert_eq!(f.sim.journal_len(), before);
}

#[test]
fn test_start_recording_before_init() {
    let mut f = Fixture::new();
    assert_eq!(
        f.run(Command::StartRecording {
            path: "rec.mp4".into()
        }),
        vec![Event::error(ErrorCode::ClientRecording, "start failed")]
    );
}

#[test]
fn test_start_streaming_empty_key() {
    let mut f = Fixture::new().inited();
    let before = f.sim.journal_len();

    assert_eq!(
        f.run(Command::StartStreaming {
            server: "rtmp://live.example.com/app".into(),
            key: String::new(),
        }),
        vec![Event::error(ErrorCode::ClientStreaming, "invalid parameter")]
    );
    assert_eq!(f.sim.journal_len(), before);
}

#[test]
fn test_start_streaming_empty_server() {
    let mut f = Fixture::new().inited();
    let before = f.sim.journal_len();

    assert_eq!(
        f.run(Command::StartStreaming {
            server: String::new(),
            key: "abc".into(),
        }),
        vec![Event::error(ErrorCode::ClientStreaming, "invalid parameter")]
    );
    assert_eq!(f.sim.journal_len(), before);
}

#[test]
fn test_streaming_lifecycle() {
    let mut f = Fixture::new().inited();

    let events = f.run(Command::StartStreaming {
        server: "rtmp://live.example.com/app".into(),
        key: "abc".into(),
    });
    assert_eq!(
        events,
        vec![
            Event::StreamingStarting { delay_secs: 0 },
            Event::StreamingStarted
        ]
    );

    let service = f.sim.settings_named("RtmpService").unwrap();
    assert_eq!(service["server"], "rtmp://live.example.com/app");
    assert_eq!(service["key"], "abc");
    assert_eq!(service["use_auth"], false);

    assert_eq!(
        f.run(Command::StopStreaming { force: false }),
        vec![
            Event::StreamingStopping { delay_secs: 0 },
            Event::StreamingStopped
        ]
    );
}

#[test]
fn test_streaming_start_failure() {
    let mut f = Fixture::new().inited();
    f.sim.fail_start("streaming_output", "connection refused");

    assert_eq!(
        f.run(Command::StartStreaming {
            server: "rtmp://a".into(),
            key: "k".into(),
        }),
        vec![Event::error(ErrorCode::ClientStreaming, "start failed")]
    );
}

#[test]
fn test_service_recreated_only_on_credential_change() {
    let mut f = Fixture::new().inited();
    assert_eq!(f.service_creates(), 1);

    let start = |key: &str| Command::StartStreaming {
        server: "rtmp://a".into(),
        key: key.into(),
    };

    f.run(start("one"));
    assert_eq!(f.service_creates(), 2);
    f.run(Command::StopStreaming { force: true });

    f.run(start("one"));
    assert_eq!(f.service_creates(), 2);
    f.run(Command::StopStreaming { force: true });

    f.run(start("two"));
    assert_eq!(f.service_creates(), 3);
    assert_eq!(f.sim.count_named("RtmpService"), 1);
}

#[test]
fn test_stop_codes_map_to_events() {
    let mut f = Fixture::new().inited();
    f.run(Command::StartStreaming {
        server: "rtmp://a".into(),
        key: "k".into(),
    });
    f.sim.emit_stop("streaming_output", -2);
    assert_eq!(
        f.pump(),
        vec![Event::error(
            ErrorCode::ClientStreaming,
            "cannot connect to server"
        )]
    );

    f.run(Command::StartRecording {
        path: "rec.mp4".into(),
    });
    f.sim.emit_stop("ffmpeg_output", -7);
    assert_eq!(
        f.pump(),
        vec![Event::error(
            ErrorCode::ClientRecording,
            "insufficient disk space"
        )]
    );
    assert!(f.context.outputs().unwrap().is_idle());
}

#[test]
fn test_window_match_ignores_case() {
    let mut f = Fixture::new().inited();

    assert!(f
        .run(Command::UpdateWindow {
            title: "NOTEPAD".into()
        })
        .is_empty());
    assert!(f.context.has_capture());

    let capture = f.sim.settings_named("WindowCapture").unwrap();
    assert_eq!(capture["window"], "Untitled - Notepad:Notepad:notepad.exe");
    assert_eq!(capture["cursor"], true);
    assert_eq!(capture["compatibility"], true);
    assert_eq!(f.sim.scene_item_count(), 1);
}

#[test]
fn test_window_needs_whole_title() {
    let mut f = Fixture::new().inited();

    assert_eq!(
        f.run(Command::UpdateWindow {
            title: "Note".into()
        }),
        vec![Event::error(
            ErrorCode::ClientWindowCapture,
            "application window not found"
        )]
    );
    assert!(!f.context.has_capture());
    assert_eq!(f.sim.count_named("WindowCapture"), 0);
}

#[test]
fn test_window_capture_created_once() {
    let mut f = Fixture::new().inited();
    f.run(Command::UpdateWindow {
        title: "Notepad".into(),
    });
    f.run(Command::UpdateWindow {
        title: "Calculator".into(),
    });

    assert_eq!(f.sim.count_named("WindowCapture"), 1);
    assert_eq!(
        f.sim.settings_named("WindowCapture").unwrap()["window"],
        "Untitled - Notepad:Notepad:notepad.exe"
    );
}

#[test]
fn test_window_create_failure() {
    let sim = SimEngine::new();
    sim.fail(SimFailure::Create(WINDOW_CAPTURE_TYPE.into()));
    let mut f = Fixture::with_sim(sim).inited();

    assert_eq!(
        f.run(Command::UpdateWindow {
            title: "Notepad".into()
        }),
        vec![Event::error(
            ErrorCode::ClientWindowCapture,
            "failed to create window capture"
        )]
    );
}

#[test]
fn test_crop_scales_to_rect() {
    let mut f = Fixture::new().inited();
    f.run(Command::UpdateWindow {
        title: "Notepad".into(),
    });

    f.run(Command::CropVideo(Rect::new(10, 20, 800, 600)));

    let crop = f.sim.settings_named(CROP_FILTER_NAME).unwrap();
    assert_eq!(crop["relative"], false);
    assert_eq!(crop["left"], 10);
    assert_eq!(crop["top"], 20);
    assert_eq!(crop["cx"], 800);
    assert_eq!(crop["cy"], 600);

    assert_eq!(f.context.content_size(), Size::new(800, 600));
    let transforms = f.sim.item_transforms();
    assert_eq!(transforms.len(), 1);
    assert!((transforms[0].scale - 1.8).abs() < 1e-5);
    assert!((transforms[0].x - 240.0).abs() < 1e-3);
    assert_eq!(transforms[0].y, 0.0);
}

#[test]
fn test_crop_empty_rect_ignored() {
    let mut f = Fixture::new().inited();
    f.run(Command::UpdateWindow {
        title: "Notepad".into(),
    });

    f.run(Command::CropVideo(Rect::new(0, 0, 0, 600)));

    assert_eq!(f.context.content_size(), Size::default());
    assert!(f.sim.item_transforms().is_empty());
}

#[test]
fn test_crop_without_capture_ignored() {
    let mut f = Fixture::new().inited();
    let before = f.sim.journal_len();

    f.run(Command::CropVideo(Rect::new(0, 0, 640, 480)));
    assert_eq!(f.sim.journal_len(), before);
}

#[test]
fn test_audio_device_substring_match() {
    let mut f = Fixture::new().inited();

    f.run(Command::ResetAudioInput {
        device_id: "ignored".into(),
        device_desc: "USB".into(),
    });
    assert_eq!(f.device_on(AudioChannel::Input).as_deref(), Some("{mic-usb}"));

    f.run(Command::ResetAudioOutput {
        device_id: String::new(),
        device_desc: "Realtek".into(),
    });
    assert_eq!(
        f.device_on(AudioChannel::Output).as_deref(),
        Some("{spk-realtek}")
    );
}

#[test]
fn test_audio_device_match_is_case_sensitive() {
    let mut f = Fixture::new().inited();
    f.run(Command::ResetAudioInput {
        device_id: String::new(),
        device_desc: "USB".into(),
    });

    f.run(Command::ResetAudioInput {
        device_id: String::new(),
        device_desc: "usb".into(),
    });
    assert_eq!(f.device_on(AudioChannel::Input).as_deref(), Some("default"));
}

#[test]
fn test_audio_device_falls_back_to_default() {
    let mut f = Fixture::new().inited();
    let before = f.sim.count_calls("update");

    f.run(Command::ResetAudioInput {
        device_id: String::new(),
        device_desc: "Headset".into(),
    });
    assert_eq!(f.device_on(AudioChannel::Input).as_deref(), Some("default"));
    assert_eq!(f.sim.count_calls("update"), before);

    let mic = f.sim.channel_source(AudioChannel::Input.index()).unwrap();
    assert_eq!(f.sim.filter_names(mic), vec!["NoiseSuppress".to_string()]);
}

#[test]
fn test_disabled_device_detaches_channel() {
    let sim = SimEngine::new();
    sim.set_devices(
        "wasapi_output_capture",
        vec![
            ListItem::new("Default", DEFAULT_DEVICE_ID),
            ListItem::new("Disabled", DISABLED_DEVICE_ID),
        ],
    );
    let mut f = Fixture::with_sim(sim).inited();
    let source = f.sim.channel_source(AudioChannel::Output.index()).unwrap();

    f.run(Command::ResetAudioOutput {
        device_id: String::new(),
        device_desc: "Disabled".into(),
    });
    assert!(f.sim.channel_source(AudioChannel::Output.index()).is_none());
    assert!(!f.sim.is_live(source));
}

#[test]
fn test_mute_always_applied() {
    let mut f = Fixture::new().inited();

    f.run(Command::MuteAudioInput(true));
    f.run(Command::MuteAudioInput(true));
    assert_eq!(f.sim.count_calls("set_muted"), 2);

    let mic = f.sim.channel_source(AudioChannel::Input.index()).unwrap();
    assert!(f.sim.muted(mic));

    f.run(Command::MuteAudioOutput(true));
    let desktop = f.sim.channel_source(AudioChannel::Output.index()).unwrap();
    assert!(f.sim.muted(desktop));
}

#[test]
fn test_downmix_applied_on_change_only() {
    let mut f = Fixture::new().inited();

    f.run(Command::DownmixMonoOutput(true));
    f.run(Command::DownmixMonoOutput(true));
    assert_eq!(f.sim.count_calls("set_force_mono"), 1);

    f.run(Command::DownmixMonoOutput(false));
    assert_eq!(f.sim.count_calls("set_force_mono"), 2);
}

#[test]
fn test_exit_is_ignored() {
    let mut f = Fixture::new().inited();
    let before = f.sim.journal_len();

    assert!(f.run(Command::Exit).is_empty());
    assert_eq!(f.sim.journal_len(), before);
}

#[test]
fn test_drop_releases_everything() {
    let f = Fixture::new().inited();
    let sim = Arc::clone(&f.sim);
    let scene = sim.object_named("Scene").unwrap();

    drop(f);

    for channel in 0..OUTPUT_CHANNELS {
        assert!(sim.channel_source(channel).is_none());
    }
    assert!(!sim.is_live(scene));
    assert!(sim.object_named("streaming_output").is_none());
    assert!(sim.object_named("Default Mic/Aux").is_none());
}
