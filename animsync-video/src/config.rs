/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Configuration for frame synchronizers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use animsync_types::TimeRange;
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FRAME_RATE, FRAME_POLL_INITIAL_INTERVAL_MS, FRAME_POLL_MAX_ATTEMPTS,
    FRAME_POLL_MAX_INTERVAL_MS, VIDEO_DECODE_WAIT_FRAME,
};
use crate::error::{Result, VideoReaderError};

/// Parameters a frame synchronizer is constructed with.
///
/// This is also the payload of the remote reader creation message, so it stays
/// plain serializable data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Content frame rate in frames per second.
    pub frame_rate: f64,
    /// Content width in pixels.
    pub width: u32,
    /// Content height in pixels.
    pub height: u32,
    /// Frame ranges with no visual change.
    pub static_time_ranges: Vec<TimeRange>,
    /// Clear the playback-rate history when a static-range seek happens.
    pub reset_rate_on_static_seek: bool,
    /// Drift tolerance and seek timeout, in frame periods.
    pub decode_wait_frames: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            width: 0,
            height: 0,
            static_time_ranges: Vec::new(),
            reset_rate_on_static_seek: false,
            decode_wait_frames: VIDEO_DECODE_WAIT_FRAME,
        }
    }
}

impl SyncConfig {
    pub fn new(frame_rate: f64, width: u32, height: u32) -> Self {
        Self {
            frame_rate,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_static_time_ranges(mut self, ranges: Vec<TimeRange>) -> Self {
        self.static_time_ranges = ranges;
        self
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading sync config {}", path.display()))?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing sync config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(VideoReaderError::InvalidConfig(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.decode_wait_frames == 0 {
            return Err(VideoReaderError::InvalidConfig(
                "decode wait frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Duration of one frame.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    /// Drift, in seconds, below which playback continues instead of seeking.
    pub fn tolerance_secs(&self) -> f64 {
        self.decode_wait_frames as f64 / self.frame_rate
    }

    /// How long a seek may wait for its completion signal.
    pub fn seek_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.tolerance_secs())
    }
}

/// Settings for the platform-native decode bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NativeBridgeConfig {
    /// Private directory container files are staged in. Created on first use.
    pub scratch_dir: PathBuf,
    /// Give up polling for a frame buffer after this many empty polls.
    pub max_poll_attempts: u32,
    /// First wait between polls; doubles after each empty poll.
    pub initial_poll_interval: Duration,
    /// Upper bound for the wait between polls.
    pub max_poll_interval: Duration,
}

impl Default for NativeBridgeConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("animsync"),
            max_poll_attempts: FRAME_POLL_MAX_ATTEMPTS,
            initial_poll_interval: Duration::from_millis(FRAME_POLL_INITIAL_INTERVAL_MS),
            max_poll_interval: Duration::from_millis(FRAME_POLL_MAX_INTERVAL_MS),
        }
    }
}

impl NativeBridgeConfig {
    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Self::default()
        }
    }
}
