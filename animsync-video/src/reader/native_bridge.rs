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

//! Frame synchronizer for hosts whose hardware decoder reads a container file
//! and hands back raw frame buffers.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use animsync_types::{ImageBuffer, TextureSurface};
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use web_time::{SystemTime, UNIX_EPOCH};

use super::{scale_to, VideoReader};
use crate::config::{NativeBridgeConfig, SyncConfig};
use crate::error::{Result, VideoReaderError};
use crate::platform::{ContainerMuxer, DecoderEvent, ElementaryStream, PlatformDecoderService};

static STAGED_FILES: AtomicU64 = AtomicU64::new(0);

pub struct NativeBridgeReader {
    decoder: Box<dyn PlatformDecoderService>,
    config: SyncConfig,
    bridge: NativeBridgeConfig,
    container_path: PathBuf,
    // Subscribed before `start` so the signal cannot be missed. Dropped once
    // the decoder has started.
    started: Option<broadcast::Receiver<DecoderEvent>>,
    // Frame the decoder was last positioned at, `None` while unknown.
    decoder_frame: Option<i64>,
    // Frame whose buffer is in `frame_buffer`.
    current_frame: Option<i64>,
    frame_buffer: Option<ImageBuffer>,
}

impl NativeBridgeReader {
    /// Muxes `stream`, stages it in the scratch directory and starts `decoder` on it.
    pub fn new(
        stream: &ElementaryStream,
        muxer: &dyn ContainerMuxer,
        mut decoder: Box<dyn PlatformDecoderService>,
        config: SyncConfig,
        bridge: NativeBridgeConfig,
    ) -> Result<Self> {
        config.validate()?;
        let container = muxer
            .mux(stream, config.frame_rate)
            .map_err(|err| VideoReaderError::Mux(format!("{err:#}")))?;

        ensure_scratch_dir(&bridge.scratch_dir)?;
        let container_path = bridge.scratch_dir.join(staged_file_name(muxer.extension()));
        std::fs::write(&container_path, &container)?;
        info!(
            "staged {} byte container at {}",
            container.len(),
            container_path.display()
        );

        let started = decoder.subscribe();
        decoder
            .start(&container_path)
            .map_err(|err| VideoReaderError::Decoder(format!("{err:#}")))?;

        Ok(Self {
            decoder,
            config,
            bridge,
            container_path,
            started: Some(started),
            decoder_frame: None,
            current_frame: None,
            frame_buffer: None,
        })
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    pub fn current_frame(&self) -> Option<i64> {
        self.current_frame
    }

    async fn poll_frame(&mut self) -> Result<ImageBuffer> {
        let attempts = self.bridge.max_poll_attempts;
        let mut interval = self.bridge.initial_poll_interval;
        for attempt in 1..=attempts {
            if let Some(frame) = self.decoder.get_frame_data() {
                if attempt > 1 {
                    debug!("frame buffer ready after {attempt} polls");
                }
                return Ok(frame);
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
                interval = (interval * 2).min(self.bridge.max_poll_interval);
            }
        }
        warn!("platform decoder produced no frame after {attempts} polls");
        Err(VideoReaderError::FrameUnavailable { attempts })
    }
}

#[async_trait]
impl VideoReader for NativeBridgeReader {
    async fn prepare(&mut self, target_frame: i64) -> Result<bool> {
        if self.current_frame == Some(target_frame) {
            return Ok(true);
        }

        self.current_frame = None;
        if let Some(started) = self.started.as_mut() {
            wait_for(started, DecoderEvent::Started, "start").await?;
            self.started = None;
            self.decoder_frame = Some(0);
        }

        if self.decoder_frame != Some(target_frame) {
            let position_ms =
                (target_frame as f64 / self.config.frame_rate * 1000.0).floor() as u64;
            self.decoder_frame = None;
            let mut events = self.decoder.subscribe();
            self.decoder
                .seek(position_ms)
                .map_err(|err| VideoReaderError::Decoder(format!("{err:#}")))?;
            wait_for(&mut events, DecoderEvent::Seeked, "seek").await?;
            self.decoder_frame = Some(target_frame);
        }

        let frame = self.poll_frame().await?;
        self.current_frame = Some(target_frame);
        self.frame_buffer = Some(frame);
        Ok(true)
    }

    fn render_to_texture(&self, surface: &mut TextureSurface, slot: u32) {
        if let Some(frame) = &self.frame_buffer {
            surface.upload(slot, frame.clone());
        }
    }

    fn snapshot(&self) -> Option<ImageBuffer> {
        let frame = self.frame_buffer.clone()?;
        scale_to(frame, self.config.width, self.config.height)
    }

    fn on_destroy(&mut self) -> Result<()> {
        self.current_frame = None;
        self.decoder_frame = None;
        Ok(())
    }
}

fn ensure_scratch_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn staged_file_name(extension: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let sequence = STAGED_FILES.fetch_add(1, Ordering::Relaxed);
    format!("{millis}-{sequence}.{extension}")
}

async fn wait_for(
    events: &mut broadcast::Receiver<DecoderEvent>,
    wanted: DecoderEvent,
    signal: &'static str,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(event) if event == wanted => return Ok(()),
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return Err(VideoReaderError::DecoderClosed(signal)),
        }
    }
}
