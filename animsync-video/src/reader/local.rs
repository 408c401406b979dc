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

//! Frame synchronizer for a video-element style decode resource in the
//! current context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use animsync_types::{ImageBuffer, TextureSurface};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::{scale_to, VideoReader};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{Result, VideoReaderError};
use crate::rate_aligner::PlaybackRateAligner;
use crate::resource::{DecodeResource, DecodeResourceProvider, MediaEvent};
use crate::static_ranges::StaticTimeRanges;

struct Binding {
    video: Box<dyn DecodeResource>,
    // Seconds. The watchdog pulls playback back here when it runs ahead.
    last_target_time: Option<f64>,
}

/// Drives one [`DecodeResource`] so that its picture matches the requested frame.
///
/// Rather than seeking for every frame, the reader lets the resource play and
/// corrects its speed with a [`PlaybackRateAligner`]. It only seeks when the
/// clock has drifted more than the configured tolerance, or when the target
/// lies in a static range and playback would be wasted work.
pub struct LocalVideoReader {
    binding: Option<Arc<Mutex<Binding>>>,
    aligner: PlaybackRateAligner,
    static_ranges: StaticTimeRanges,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    had_played: bool,
    watchdog: Option<JoinHandle<()>>,
}

impl LocalVideoReader {
    /// Binds `video`. When called inside a tokio runtime this also starts the
    /// drift watchdog.
    pub fn new(
        video: Box<dyn DecodeResource>,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let binding = Arc::new(Mutex::new(Binding {
            video,
            last_target_time: None,
        }));
        let watchdog = spawn_watchdog(&binding, config.tolerance_secs());
        let aligner = PlaybackRateAligner::new(config.frame_rate, config.width, config.height);
        if aligner.is_disabled() {
            info!(
                "{}x{} exceeds UHD, playback rate alignment disabled",
                config.width, config.height
            );
        }
        Ok(Self {
            binding: Some(binding),
            aligner,
            static_ranges: StaticTimeRanges::new(config.static_time_ranges.clone()),
            config,
            clock,
            had_played: false,
            watchdog,
        })
    }

    /// Opens `container` through `provider` and binds the result.
    pub fn from_container(
        provider: &dyn DecodeResourceProvider,
        container: Vec<u8>,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let video = provider
            .create(container, &config)
            .map_err(|err| VideoReaderError::Open(format!("{err:#}")))?;
        Self::new(video, config, clock)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn aligner(&self) -> &PlaybackRateAligner {
        &self.aligner
    }

    pub fn is_destroyed(&self) -> bool {
        self.binding.is_none()
    }
}

#[async_trait]
impl VideoReader for LocalVideoReader {
    async fn prepare(&mut self, target_frame: i64) -> Result<bool> {
        let Some(binding) = self.binding.clone() else {
            warn!("prepare({target_frame}) on a reader without a decode resource");
            return Ok(false);
        };
        let frame_rate = self.config.frame_rate;

        if let Some(rate) = self.aligner.update(target_frame, self.clock.now_ms()) {
            debug!("playback rate {rate:.3} for frame {target_frame}");
            lock(&binding).video.set_playback_rate(rate);
        }

        let target_time = target_frame as f64 / frame_rate;
        let current_time = {
            let mut guard = lock(&binding);
            guard.last_target_time = Some(target_time);
            guard.video.current_time()
        };

        if current_time == 0.0 && target_time == 0.0 {
            if !self.had_played {
                bootstrap(&binding, self.config.frame_period(), self.config.seek_timeout())
                    .await?;
                self.had_played = true;
            }
            return Ok(true);
        }

        if target_frame == (current_time * frame_rate).round() as i64 {
            return Ok(true);
        }

        if self.static_ranges.contains(target_frame) {
            if self.config.reset_rate_on_static_seek {
                self.aligner.reset();
            }
            debug!("frame {target_frame} is static, seeking without playback");
            return seek(&binding, target_time, false, self.config.seek_timeout()).await;
        }

        if (current_time - target_time).abs() < self.config.tolerance_secs() {
            let paused = lock(&binding).video.paused();
            if paused {
                start_playback(&binding)?;
            }
            return Ok(true);
        }

        debug!("frame {target_frame} is {current_time:.3}s -> {target_time:.3}s away, seeking");
        seek(&binding, target_time, true, self.config.seek_timeout()).await
    }

    fn render_to_texture(&self, surface: &mut TextureSurface, slot: u32) {
        let Some(binding) = &self.binding else {
            warn!("render_to_texture on a reader without a decode resource");
            return;
        };
        let frame = {
            let guard = lock(binding);
            if !guard.video.has_frame_data() {
                return;
            }
            guard.video.current_frame()
        };
        if let Some(frame) = frame {
            surface.upload(slot, frame);
        }
    }

    fn snapshot(&self) -> Option<ImageBuffer> {
        let frame = lock(self.binding.as_ref()?).video.current_frame()?;
        scale_to(frame, self.config.width, self.config.height)
    }

    fn on_destroy(&mut self) -> Result<()> {
        let Some(binding) = self.binding.take() else {
            return Err(VideoReaderError::Destroyed);
        };
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
        drop(binding);
        info!("video reader released its decode resource");
        Ok(())
    }
}

impl Drop for LocalVideoReader {
    fn drop(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }
}

fn lock(binding: &Mutex<Binding>) -> MutexGuard<'_, Binding> {
    binding.lock().unwrap_or_else(PoisonError::into_inner)
}

fn start_playback(binding: &Mutex<Binding>) -> Result<()> {
    lock(binding).video.play().map_err(|err| {
        error!("host refused to start playback: {err:#}");
        VideoReaderError::PlaybackRejected(format!("{err:#}"))
    })
}

fn apply_play_state(binding: &Mutex<Binding>, play: bool) -> Result<()> {
    let paused = lock(binding).video.paused();
    if play && paused {
        start_playback(binding)?;
    } else if !play && !paused {
        lock(binding).video.pause();
    }
    Ok(())
}

async fn wait_for(events: &mut broadcast::Receiver<MediaEvent>, wanted: MediaEvent) -> bool {
    loop {
        match events.recv().await {
            Ok(event) if event == wanted => return true,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return false,
        }
    }
}

// Plays until the first frame is presented, then pauses again. Hosts only
// produce a picture after playback has started once.
async fn bootstrap(
    binding: &Arc<Mutex<Binding>>,
    frame_period: Duration,
    timeout: Duration,
) -> Result<()> {
    let (mut events, frame_callback) = {
        let guard = lock(binding);
        (guard.video.subscribe(), guard.video.supports_frame_callback())
    };
    start_playback(binding)?;
    if frame_callback {
        let presented = tokio::time::timeout(
            timeout,
            wait_for(&mut events, MediaEvent::FrameAdvanced),
        )
        .await;
        if !matches!(presented, Ok(true)) {
            warn!("no frame presented within {timeout:?} of the first play");
        }
    } else {
        tokio::time::sleep(frame_period).await;
    }
    lock(binding).video.pause();
    Ok(())
}

async fn seek(
    binding: &Arc<Mutex<Binding>>,
    target_time: f64,
    play: bool,
    timeout: Duration,
) -> Result<bool> {
    let mut events = {
        let mut guard = lock(binding);
        let events = guard.video.subscribe();
        guard.video.set_current_time(target_time);
        events
    };
    let completed = matches!(
        tokio::time::timeout(timeout, wait_for(&mut events, MediaEvent::Seeked)).await,
        Ok(true)
    );

    if completed {
        apply_play_state(binding, play)?;
        return Ok(true);
    }

    warn!("seek to {target_time:.3}s not confirmed within {timeout:?}");
    if let Err(err) = apply_play_state(binding, play) {
        warn!("{err}");
    }
    Ok(false)
}

fn spawn_watchdog(binding: &Arc<Mutex<Binding>>, tolerance: f64) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        debug!("no tokio runtime, drift watchdog disabled");
        return None;
    };
    let mut events = lock(binding).video.subscribe();
    let weak = Arc::downgrade(binding);
    Some(runtime.spawn(async move {
        loop {
            match events.recv().await {
                Ok(MediaEvent::TimeUpdate) => {}
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
            let Some(binding) = weak.upgrade() else {
                break;
            };
            rein_in(&binding, tolerance);
        }
    }))
}

fn rein_in(binding: &Mutex<Binding>, tolerance: f64) {
    let mut guard = lock(binding);
    let Some(last_target_time) = guard.last_target_time else {
        return;
    };
    if guard.video.paused() {
        return;
    }
    let current_time = guard.video.current_time();
    if current_time - last_target_time >= tolerance {
        debug!("playback ran ahead to {current_time:.3}s, returning to {last_target_time:.3}s");
        guard.video.pause();
        guard.video.set_current_time(last_target_time);
    }
}
