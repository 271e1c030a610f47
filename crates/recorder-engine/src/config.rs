//! Recorder configuration model.
//!
//! Loaded once at startup from a JSON file; every section falls back to its
//! defaults when missing.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::media::{AudioInfo, VideoInfo};
use crate::messages::Language;
use crate::output::EncoderPreference;

/// Top-level recorder configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub general: GeneralConfig,
    pub video: VideoConfig,
    pub audio: AudioConfig,
    pub output: OutputConfig,
}

impl RecorderConfig {
    /// Load from `path`, or return defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Write the config to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(io_err)
    }

    pub fn audio_info(&self) -> AudioInfo {
        AudioInfo {
            samples_per_sec: self.audio.sample_rate,
            speakers: self.audio.channel_setup,
        }
    }

    pub fn video_info(&self) -> VideoInfo {
        VideoInfo {
            adapter: self.video.adapter,
            fps_num: self.video.fps,
            fps_den: 1,
            base_width: self.video.base_width,
            base_height: self.video.base_height,
            output_width: self.video.output_width,
            output_height: self.video.output_height,
            output_format: self.video.color_format,
            colorspace: self.video.color_space,
            range: self.video.color_range,
            scale_type: self.video.scale_type,
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// UI language for error messages.
    pub language: Language,
    /// Run engine operations on a dedicated worker thread.
    pub threaded_worker: bool,
    /// Interval of streaming statistics logging; 0 disables.
    pub stats_interval_secs: u64,
    /// Keep other applications at full volume while capturing.
    pub disable_audio_ducking: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            language: Language::EnUs,
            threaded_worker: true,
            stats_interval_secs: 10,
            disable_audio_ducking: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleType {
    Bilinear,
    Bicubic,
    Lanczos,
    Area,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    I420,
    NV12,
    I444,
    RGBA,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    #[serde(rename = "601")]
    Rec601,
    #[serde(rename = "709")]
    Rec709,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRange {
    Partial,
    Full,
}

/// Canvas and output video settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub adapter: u32,
    pub base_width: u32,
    pub base_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub fps: u32,
    pub scale_type: ScaleType,
    pub color_format: ColorFormat,
    pub color_space: ColorSpace,
    pub color_range: ColorRange,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            base_width: 1920,
            base_height: 1080,
            output_width: 1280,
            output_height: 720,
            fps: 15,
            scale_type: ScaleType::Bicubic,
            color_format: ColorFormat::I420,
            color_space: ColorSpace::Rec601,
            color_range: ColorRange::Partial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelSetup {
    Mono,
    Stereo,
}

/// Audio pipeline and device source types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channel_setup: ChannelSetup,
    pub input_source_type: String,
    pub output_source_type: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channel_setup: ChannelSetup::Stereo,
            input_source_type: "wasapi_input_capture".to_string(),
            output_source_type: "wasapi_output_capture".to_string(),
        }
    }
}

/// How recordings are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    /// One output that muxes and encodes by itself.
    Ffmpeg,
    /// Dedicated recording encoder feeding a muxer.
    Muxer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingFormat {
    Mp4,
    Flv,
}

impl RecordingFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Flv => "flv",
        }
    }
}

/// Encoders, bitrates and output policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub recording_mode: RecordingMode,
    pub recording_format: RecordingFormat,
    pub stream_encoder: EncoderPreference,
    pub recording_encoder: EncoderPreference,
    /// Video bitrate in kbps.
    pub video_bitrate: u32,
    /// Audio bitrate in kbps.
    pub audio_bitrate: u32,
    pub preset: String,
    /// Base CRF before resolution adjustment.
    pub recording_crf: i32,
    pub reconnect: bool,
    pub retry_count: u32,
    pub retry_delay_secs: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            recording_mode: RecordingMode::Ffmpeg,
            recording_format: RecordingFormat::Mp4,
            stream_encoder: EncoderPreference::X264,
            recording_encoder: EncoderPreference::X264,
            video_bitrate: 150,
            audio_bitrate: 128,
            preset: "veryfast".to_string(),
            recording_crf: 22,
            reconnect: false,
            retry_count: 3,
            retry_delay_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.video.base_width, 1920);
        assert_eq!(config.video.output_height, 720);
        assert_eq!(config.video.fps, 15);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.output.recording_mode, RecordingMode::Ffmpeg);
        assert!(config.general.threaded_worker);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RecorderConfig = serde_json::from_str(
            r#"{ "general": { "language": "zh-CN" }, "output": { "stream_encoder": "nvenc" } }"#,
        )
        .unwrap();

        assert_eq!(config.general.language, Language::ZhCn);
        assert_eq!(config.general.stats_interval_secs, 10);
        assert_eq!(config.output.stream_encoder, EncoderPreference::Nvenc);
        assert_eq!(config.output.recording_encoder, EncoderPreference::X264);
        assert_eq!(config.video, VideoConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("recorder-config-{}", std::process::id()));
        let path = dir.join("config.json");

        let mut config = RecorderConfig::default();
        config.video.fps = 30;
        config.output.recording_mode = RecordingMode::Muxer;
        config.save(&path).unwrap();

        let loaded = RecorderConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("recorder-config-does-not-exist.json");
        assert_eq!(RecorderConfig::load(&path).unwrap(), RecorderConfig::default());
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let path = std::env::temp_dir().join(format!("recorder-bad-{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            RecorderConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));

        let _ = fs::remove_file(&path);
    }
}
