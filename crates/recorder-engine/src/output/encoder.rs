//! Encoder selection and per-encoder settings.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{OutputConfig, RecordingFormat, VideoConfig};
use crate::media::{settings, Settings};

/// Resolution diagonal at and above which the base CRF is used unchanged.
pub const CRF_CROSS_DIST_CUTOFF: f64 = 2000.0;

/// Largest CRF reduction applied at tiny resolutions.
const CRF_MAX_REDUCTION: f64 = 10.0;

/// AAC encoder type used for every audio track.
pub const AAC_ENCODER_ID: &str = "ffmpeg_aac";

/// Bitrates the AAC encoder accepts, in kbps.
const AAC_BITRATES: &[u32] = &[32, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 288, 320];

const CODEC_ID_H264: i64 = 27;
const CODEC_ID_FLV1: i64 = 22;
const CODEC_ID_AAC: i64 = 86018;

/// Configured H.264 encoder preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreference {
    /// Software x264.
    #[default]
    X264,
    /// Intel Quick Sync.
    Qsv,
    /// NVIDIA NVENC.
    Nvenc,
    /// AMD AMF.
    Amd,
}

impl EncoderPreference {
    /// Engine type id of the encoder.
    pub fn engine_id(self) -> &'static str {
        match self {
            Self::X264 => "obs_x264",
            Self::Qsv => "obs_qsv11",
            Self::Nvenc => "ffmpeg_nvenc",
            Self::Amd => "amd_amf_h264",
        }
    }

    pub fn is_hardware(self) -> bool {
        !matches!(self, Self::X264)
    }

    /// Downgrade to x264 if the engine does not offer this encoder.
    pub fn resolve(self, available: &[String]) -> Self {
        if !self.is_hardware() || available.iter().any(|id| id == self.engine_id()) {
            return self;
        }

        warn!(
            preferred = self.engine_id(),
            "Hardware encoder not available, falling back to x264"
        );
        Self::X264
    }
}

/// Downgrade unavailable encoder preferences before any output is built.
pub fn detect_encoders(config: &mut OutputConfig, available: &[String]) {
    config.stream_encoder = config.stream_encoder.resolve(available);
    config.recording_encoder = config.recording_encoder.resolve(available);

    info!(
        stream = config.stream_encoder.engine_id(),
        recording = config.recording_encoder.engine_id(),
        "Encoders selected"
    );
}

/// Lower the CRF for small output resolutions.
///
/// The reduction grows linearly from 0 at a diagonal of
/// [`CRF_CROSS_DIST_CUTOFF`] pixels to 10 at a diagonal of 0.
pub fn calc_crf(base: i32, width: u32, height: u32) -> i32 {
    let cross_dist = f64::from(width).hypot(f64::from(height));
    let ratio = cross_dist.min(CRF_CROSS_DIST_CUTOFF) / CRF_CROSS_DIST_CUTOFF;
    let reduction = (1.0 - ratio) * CRF_MAX_REDUCTION;
    base - reduction as i32
}

/// Closest supported AAC bitrate not above `requested`.
pub fn closest_aac_bitrate(requested: u32) -> u32 {
    AAC_BITRATES
        .iter()
        .copied()
        .filter(|&rate| rate <= requested)
        .max()
        .unwrap_or(AAC_BITRATES[0])
}

/// Video encoder settings for streaming.
pub fn stream_video_settings() -> Settings {
    settings(json!({
        "preset": "medium",
        "tune": "stillimage",
        "x264opts": "",
        "rate_control": "CRF",
        "crf": 22,
        "vfr": false,
        "profile": "main",
        "keyint_sec": 10,
    }))
}

pub fn audio_settings(bitrate: u32) -> Settings {
    settings(json!({ "bitrate": closest_aac_bitrate(bitrate) }))
}

/// Video encoder settings for the muxer recording path.
///
/// `icq_supported` only matters for Quick Sync.
pub fn recording_video_settings(
    encoder: EncoderPreference,
    crf: i32,
    preset: &str,
    icq_supported: bool,
) -> Settings {
    match encoder {
        EncoderPreference::X264 => settings(json!({
            "crf": crf,
            "use_bufsize": true,
            "rate_control": "CRF",
            "profile": "main",
            "preset": preset,
        })),
        EncoderPreference::Qsv if icq_supported => settings(json!({
            "profile": "main",
            "rate_control": "ICQ",
            "icq_quality": crf,
        })),
        EncoderPreference::Qsv => settings(json!({
            "profile": "main",
            "rate_control": "CQP",
            "qpi": crf,
            "qpp": crf,
            "qpb": crf,
        })),
        EncoderPreference::Nvenc => settings(json!({
            "rate_control": "CQP",
            "profile": "main",
            "preset": "hq",
            "cqp": crf,
        })),
        EncoderPreference::Amd => settings(json!({
            "Usage": 0,
            "Profile": 100,
            "RateControlMethod": 0,
            "QP.IFrame": crf,
            "QP.PFrame": crf,
            "QP.BFrame": crf,
            "VBVBuffer": 1,
            "VBVBuffer.Size": 100000,
            "KeyframeInterval": 2.0,
            "BFrame.Pattern": 0,
        })),
    }
}

/// Muxer target for the muxer recording path.
pub fn muxer_settings(path: &str) -> Settings {
    settings(json!({
        "path": path,
        "muxer_settings": "movflags=faststart",
    }))
}

/// Settings for the combined encode+mux recording output.
pub fn ffmpeg_output_settings(
    path: &str,
    video: &VideoConfig,
    output: &OutputConfig,
    crf: i32,
) -> Settings {
    let mut map = settings(json!({
        "url": path,
        "gop_size": video.fps * 10,
        "audio_bitrate": output.audio_bitrate,
        "audio_encoder": "aac",
        "audio_encoder_id": CODEC_ID_AAC,
        "scale_width": video.output_width,
        "scale_height": video.output_height,
    }));

    let format = match output.recording_format {
        RecordingFormat::Mp4 => json!({
            "muxer_settings": "movflags=faststart",
            "format_name": "mp4",
            "format_mime_type": "video/mp4",
            "video_encoder": "libx264",
            "video_encoder_id": CODEC_ID_H264,
            "video_settings": format!("profile=main x264-params=crf={crf}"),
        }),
        RecordingFormat::Flv => json!({
            "format_name": "flv",
            "format_mime_type": "video/x-flv",
            "video_encoder": "flv",
            "video_encoder_id": CODEC_ID_FLV1,
            "video_bitrate": output.video_bitrate,
        }),
    };
    map.extend(settings(format));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_crf_unchanged_above_cutoff() {
        assert_eq!(calc_crf(22, 1920, 1080), 22);
        assert_eq!(calc_crf(22, 2000, 0), 22);
        assert_eq!(calc_crf(22, 3840, 2160), 22);
    }

    #[test]
    fn test_calc_crf_lowers_for_small_outputs() {
        // 1280x720 has a diagonal of ~1468.6, a reduction of ~2.66.
        assert_eq!(calc_crf(22, 1280, 720), 20);
        assert_eq!(calc_crf(22, 0, 0), 12);
    }

    #[test]
    fn test_calc_crf_monotonic() {
        let mut previous = calc_crf(22, 2000, 0);
        for width in (0..2000).rev().step_by(25) {
            let crf = calc_crf(22, width, 0);
            assert!(crf <= previous, "crf rose at width {width}");
            previous = crf;
        }
    }

    #[test]
    fn test_resolve_falls_back_to_x264() {
        let available = vec!["obs_x264".to_string(), "ffmpeg_nvenc".to_string()];

        assert_eq!(EncoderPreference::Nvenc.resolve(&available), EncoderPreference::Nvenc);
        assert_eq!(EncoderPreference::Qsv.resolve(&available), EncoderPreference::X264);
        assert_eq!(EncoderPreference::X264.resolve(&[]), EncoderPreference::X264);
    }

    #[test]
    fn test_detect_encoders_updates_config() {
        let mut config = OutputConfig {
            stream_encoder: EncoderPreference::Amd,
            recording_encoder: EncoderPreference::Qsv,
            ..Default::default()
        };
        detect_encoders(&mut config, &["obs_qsv11".to_string()]);

        assert_eq!(config.stream_encoder, EncoderPreference::X264);
        assert_eq!(config.recording_encoder, EncoderPreference::Qsv);
    }

    #[test]
    fn test_closest_aac_bitrate() {
        assert_eq!(closest_aac_bitrate(128), 128);
        assert_eq!(closest_aac_bitrate(150), 128);
        assert_eq!(closest_aac_bitrate(10), 32);
        assert_eq!(closest_aac_bitrate(1000), 320);
    }

    #[test]
    fn test_qsv_rate_control_depends_on_icq() {
        let icq = recording_video_settings(EncoderPreference::Qsv, 20, "veryfast", true);
        assert_eq!(icq["rate_control"], "ICQ");
        assert_eq!(icq["icq_quality"], 20);

        let cqp = recording_video_settings(EncoderPreference::Qsv, 20, "veryfast", false);
        assert_eq!(cqp["rate_control"], "CQP");
        assert_eq!(cqp["qpb"], 20);
    }

    #[test]
    fn test_ffmpeg_output_settings_per_format() {
        let video = VideoConfig::default();
        let mut output = OutputConfig::default();

        let mp4 = ffmpeg_output_settings("a.mp4", &video, &output, 20);
        assert_eq!(mp4["url"], "a.mp4");
        assert_eq!(mp4["format_name"], "mp4");
        assert_eq!(mp4["video_settings"], "profile=main x264-params=crf=20");
        assert_eq!(mp4["gop_size"], 150);

        output.recording_format = RecordingFormat::Flv;
        let flv = ffmpeg_output_settings("a.flv", &video, &output, 20);
        assert_eq!(flv["video_encoder"], "flv");
        assert_eq!(flv["video_bitrate"], 150);
        assert!(flv.get("video_settings").is_none());
    }
}
