//! Streaming bitrate and frame-drop statistics.

use std::time::Instant;

use crate::media::OutputCounters;

/// Samples closer together than this report a bitrate of zero.
const MIN_SAMPLE_SECS: f64 = 0.01;

/// One statistics sample of the streaming output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSample {
    /// Bitrate since the previous sample.
    pub kbps: f64,
    /// Frames since streaming started.
    pub total_frames: i32,
    /// Dropped frames since streaming started.
    pub dropped_frames: i32,
    /// `dropped_frames / total_frames * 100`.
    pub drop_percent: f64,
}

/// Turns cumulative output counters into relative statistics.
#[derive(Debug, Clone)]
pub struct StreamStats {
    last_bytes: u64,
    last_time: Instant,
    first_total: i32,
    first_dropped: i32,
}

impl StreamStats {
    pub fn new(now: Instant) -> Self {
        Self {
            last_bytes: 0,
            last_time: now,
            first_total: 0,
            first_dropped: 0,
        }
    }

    /// Record the frame baselines at stream start.
    pub fn start(&mut self, counters: OutputCounters, now: Instant) {
        self.first_total = counters.total_frames;
        self.first_dropped = counters.frames_dropped;
        self.last_bytes = 0;
        self.last_time = now;
    }

    pub fn baseline(&self) -> (i32, i32) {
        (self.first_total, self.first_dropped)
    }

    /// Take a sample from the current cumulative counters.
    pub fn sample(&mut self, counters: OutputCounters, now: Instant) -> StreamSample {
        let bytes = counters.total_bytes;
        if bytes < self.last_bytes {
            // Output restarted; measure from zero.
            self.last_bytes = 0;
        }

        let bits = (bytes - self.last_bytes) * 8;
        let elapsed = now.saturating_duration_since(self.last_time).as_secs_f64();
        let kbps = if elapsed < MIN_SAMPLE_SECS {
            0.0
        } else {
            bits as f64 / elapsed / 1000.0
        };

        self.last_bytes = bytes;
        self.last_time = now;

        if counters.total_frames < self.first_total || counters.frames_dropped < self.first_dropped
        {
            self.first_total = 0;
            self.first_dropped = 0;
        }

        let total_frames = counters.total_frames - self.first_total;
        let dropped_frames = counters.frames_dropped - self.first_dropped;
        let drop_percent = if total_frames > 0 {
            f64::from(dropped_frames) / f64::from(total_frames) * 100.0
        } else {
            0.0
        };

        StreamSample {
            kbps,
            total_frames,
            dropped_frames,
            drop_percent,
        }
    }
}
