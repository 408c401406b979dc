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

//! The host video decode resource a [`LocalVideoReader`](crate::LocalVideoReader)
//! drives: something with a continuously running clock, seek, play/pause and a
//! current picture, like a browser video element.

mod simulated;

pub use simulated::{SeekBehavior, SimulatedVideo, SimulatedVideoProvider};

use animsync_types::ImageBuffer;
use tokio::sync::broadcast;

use crate::config::SyncConfig;

/// Notifications a decode resource emits while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// A seek issued through `set_current_time` finished.
    Seeked,
    /// A new frame was presented.
    FrameAdvanced,
    /// The playback position moved while playing.
    TimeUpdate,
}

/// A host video decoder with a continuous clock.
///
/// Methods never block. Completion of a seek or a frame presentation is
/// reported through [`subscribe`](DecodeResource::subscribe); callers subscribe
/// before issuing the command they want to observe.
pub trait DecodeResource: Send {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// Starts a seek to `seconds`. Completion is signaled with [`MediaEvent::Seeked`].
    fn set_current_time(&mut self, seconds: f64);

    fn paused(&self) -> bool;

    /// Starts playback. An error means the host refused to start playing.
    fn play(&mut self) -> anyhow::Result<()>;

    fn pause(&mut self);

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&mut self, rate: f64);

    /// True once the resource has a decoded picture for its current position.
    fn has_frame_data(&self) -> bool;

    /// True if the resource emits [`MediaEvent::FrameAdvanced`].
    fn supports_frame_callback(&self) -> bool;

    /// The picture at the current position, in RGBA.
    fn current_frame(&self) -> Option<ImageBuffer>;

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;
}

/// Creates decode resources from container bytes.
pub trait DecodeResourceProvider: Send + Sync {
    fn create(
        &self,
        container: Vec<u8>,
        config: &SyncConfig,
    ) -> anyhow::Result<Box<dyn DecodeResource>>;
}
