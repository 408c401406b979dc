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

//! An in-memory decode resource with a scriptable clock.
//!
//! Time only moves when [`SimulatedVideo::advance`] is called, which makes frame
//! synchronization decisions reproducible in tests and in the replay binary.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use animsync_types::ImageBuffer;
use anyhow::anyhow;
use tokio::sync::broadcast;

use super::{DecodeResource, DecodeResourceProvider, MediaEvent};
use crate::config::SyncConfig;

const EVENT_CAPACITY: usize = 64;
const DEFAULT_DURATION_SECS: f64 = 60.0;

/// How the simulated resource reacts to a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekBehavior {
    /// Jump to the new position and signal completion right away.
    Immediate,
    /// Jump to the new position but never signal completion.
    Never,
}

#[derive(Debug)]
struct State {
    current_time: f64,
    duration: f64,
    frame_rate: f64,
    width: u32,
    height: u32,
    paused: bool,
    playback_rate: f64,
    has_data: bool,
    seek_behavior: SeekBehavior,
    frame_callback: bool,
    reject_play: Option<String>,
    play_calls: usize,
    pause_calls: usize,
    seeks: Vec<f64>,
    rates: Vec<f64>,
}

/// Cloneable handle to one simulated video. Clones observe and drive the same
/// underlying state, so a test can keep one while a reader owns another.
#[derive(Debug, Clone)]
pub struct SimulatedVideo {
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<MediaEvent>,
}

impl SimulatedVideo {
    pub fn new(frame_rate: f64, width: u32, height: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(State {
                current_time: 0.0,
                duration: DEFAULT_DURATION_SECS,
                frame_rate,
                width: width.max(1),
                height: height.max(1),
                paused: true,
                playback_rate: 1.0,
                has_data: false,
                seek_behavior: SeekBehavior::Immediate,
                frame_callback: false,
                reject_play: None,
                play_calls: 0,
                pause_calls: 0,
                seeks: Vec::new(),
                rates: Vec::new(),
            })),
            events,
        }
    }

    pub fn with_seek_behavior(self, behavior: SeekBehavior) -> Self {
        self.state().seek_behavior = behavior;
        self
    }

    pub fn with_frame_callback(self, enabled: bool) -> Self {
        self.state().frame_callback = enabled;
        self
    }

    pub fn with_duration(self, seconds: f64) -> Self {
        self.state().duration = seconds;
        self
    }

    /// Makes every later `play` fail with `reason`.
    pub fn reject_play(&self, reason: impl Into<String>) {
        self.state().reject_play = Some(reason.into());
    }

    /// Advances the clock by `delta_ms` of wall time. Only moves the position
    /// while playing, scaled by the playback rate.
    pub fn advance(&self, delta_ms: f64) {
        let advanced_frame = {
            let mut state = self.state();
            if state.paused {
                return;
            }
            let before = state.frame_index();
            state.current_time =
                (state.current_time + delta_ms / 1000.0 * state.playback_rate).min(state.duration);
            state.has_data = true;
            state.frame_index() != before
        };
        let _ = self.events.send(MediaEvent::TimeUpdate);
        if advanced_frame {
            let _ = self.events.send(MediaEvent::FrameAdvanced);
        }
    }

    /// Signals a pending seek as completed.
    pub fn complete_seek(&self) {
        self.state().has_data = true;
        let _ = self.events.send(MediaEvent::Seeked);
    }

    pub fn play_calls(&self) -> usize {
        self.state().play_calls
    }

    pub fn pause_calls(&self) -> usize {
        self.state().pause_calls
    }

    /// Every position a seek was issued to, in order.
    pub fn seeks(&self) -> Vec<f64> {
        self.state().seeks.clone()
    }

    /// Every playback rate that was applied, in order.
    pub fn rates(&self) -> Vec<f64> {
        self.state().rates.clone()
    }

    /// Color the simulated picture for `frame` is filled with.
    pub fn frame_color(frame: i64) -> [u8; 4] {
        [(frame & 0xff) as u8, ((frame >> 8) & 0xff) as u8, 0x80, 0xff]
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn frame_index(&self) -> i64 {
        (self.current_time * self.frame_rate).round() as i64
    }
}

impl DecodeResource for SimulatedVideo {
    fn current_time(&self) -> f64 {
        self.state().current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        let behavior = {
            let mut state = self.state();
            state.current_time = seconds.clamp(0.0, state.duration);
            state.seeks.push(seconds);
            state.seek_behavior
        };
        if behavior == SeekBehavior::Immediate {
            self.complete_seek();
        }
    }

    fn paused(&self) -> bool {
        self.state().paused
    }

    fn play(&mut self) -> anyhow::Result<()> {
        let mut state = self.state();
        if let Some(reason) = &state.reject_play {
            return Err(anyhow!("{reason}"));
        }
        state.play_calls += 1;
        state.paused = false;
        state.has_data = true;
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.state();
        state.pause_calls += 1;
        state.paused = true;
    }

    fn playback_rate(&self) -> f64 {
        self.state().playback_rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        let mut state = self.state();
        state.playback_rate = rate;
        state.rates.push(rate);
    }

    fn has_frame_data(&self) -> bool {
        self.state().has_data
    }

    fn supports_frame_callback(&self) -> bool {
        self.state().frame_callback
    }

    fn current_frame(&self) -> Option<ImageBuffer> {
        let state = self.state();
        if !state.has_data {
            return None;
        }
        Some(ImageBuffer::solid(
            state.width,
            state.height,
            Self::frame_color(state.frame_index()),
        ))
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }
}

/// Builds a [`SimulatedVideo`] per container and remembers each one.
#[derive(Debug)]
pub struct SimulatedVideoProvider {
    seek_behavior: SeekBehavior,
    created: Mutex<Vec<SimulatedVideo>>,
}

impl SimulatedVideoProvider {
    pub fn new(seek_behavior: SeekBehavior) -> Self {
        Self {
            seek_behavior,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Handles to every video created so far, oldest first.
    pub fn created(&self) -> Vec<SimulatedVideo> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for SimulatedVideoProvider {
    fn default() -> Self {
        Self::new(SeekBehavior::Immediate)
    }
}

impl DecodeResourceProvider for SimulatedVideoProvider {
    fn create(
        &self,
        container: Vec<u8>,
        config: &SyncConfig,
    ) -> anyhow::Result<Box<dyn DecodeResource>> {
        if container.is_empty() {
            return Err(anyhow!("cannot open an empty video container"));
        }
        let video = SimulatedVideo::new(config.frame_rate, config.width, config.height)
            .with_seek_behavior(self.seek_behavior);
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(video.clone());
        Ok(Box::new(video))
    }
}
