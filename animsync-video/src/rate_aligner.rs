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

//! Estimates the playback rate that keeps a continuously running video clock in
//! step with the frames being requested from it.
//!
//! Seeking a video element is expensive, so instead of stopping and seeking on
//! every request the aligner measures how fast target frames are actually being
//! asked for and speeds playback up or slows it down to match.

use std::collections::VecDeque;

use crate::constants::{
    RATE_SAMPLE_WINDOW, UHD_RESOLUTION, VIDEO_PLAYBACK_RATE_MAX, VIDEO_PLAYBACK_RATE_MIN,
};

/// One observed `prepare` request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub frame: i64,
    pub time_ms: f64,
}

#[derive(Debug)]
pub struct PlaybackRateAligner {
    // Content frame rate in frames per second.
    frame_rate: f64,
    // Recent requests, oldest first. Only ever holds a forward-moving sequence.
    samples: VecDeque<RateSample>,
    // Set for ultra-high-definition content, where rate changes are too costly.
    disabled: bool,
}

impl PlaybackRateAligner {
    pub fn new(frame_rate: f64, width: u32, height: u32) -> Self {
        Self {
            frame_rate,
            samples: VecDeque::with_capacity(RATE_SAMPLE_WINDOW),
            disabled: width > UHD_RESOLUTION || height > UHD_RESOLUTION,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Records a request for `target_frame` at `now_ms` and returns the playback
    /// rate to apply, or `None` when there is not enough forward history yet.
    pub fn update(&mut self, target_frame: i64, now_ms: f64) -> Option<f64> {
        if self.disabled {
            return None;
        }

        let Some(last) = self.samples.back().copied() else {
            self.record(target_frame, now_ms);
            return None;
        };

        if last.frame == target_frame {
            return None;
        }

        if target_frame < last.frame {
            // Rewinds break the wall-clock-to-frame mapping; start over.
            self.samples.clear();
            self.record(target_frame, now_ms);
            return None;
        }

        if self.samples.len() == RATE_SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.record(target_frame, now_ms);

        let oldest = self.samples.front()?;
        // Wall time spent per target frame, averaged over the window.
        let distance = (now_ms - oldest.time_ms) / (target_frame - oldest.frame) as f64;
        Some(Self::clamp_rate(1000.0 / self.frame_rate / distance))
    }

    /// Drops all samples, as if no request had been seen yet.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    pub fn samples(&self) -> impl Iterator<Item = &RateSample> {
        self.samples.iter()
    }

    fn record(&mut self, frame: i64, time_ms: f64) {
        self.samples.push_back(RateSample { frame, time_ms });
    }

    fn clamp_rate(rate: f64) -> f64 {
        if rate.is_nan() {
            return VIDEO_PLAYBACK_RATE_MAX;
        }
        rate.clamp(VIDEO_PLAYBACK_RATE_MIN, VIDEO_PLAYBACK_RATE_MAX)
    }
}
