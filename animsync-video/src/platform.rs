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

//! Platform decoder services that take a container file path instead of a
//! byte stream, and the muxing step that produces that file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use animsync_types::ImageBuffer;
use anyhow::{anyhow, bail};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 16;
const ANNEXB_START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Notifications from a platform decoder service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderEvent {
    /// The decoder opened its source and can serve frames.
    Started,
    /// A seek finished.
    Seeked,
}

/// A hardware decoder service addressed by file path.
pub trait PlatformDecoderService: Send {
    /// Opens the container at `path`. Readiness is signaled with [`DecoderEvent::Started`].
    fn start(&mut self, path: &Path) -> anyhow::Result<()>;

    /// Seeks to `position_ms`. Completion is signaled with [`DecoderEvent::Seeked`].
    fn seek(&mut self, position_ms: u64) -> anyhow::Result<()>;

    /// The newest decoded frame, or `None` if none is ready yet. Frames are
    /// already in the RGBA layout surfaces expect.
    fn get_frame_data(&mut self) -> Option<ImageBuffer>;

    fn subscribe(&self) -> broadcast::Receiver<DecoderEvent>;
}

/// Creates one platform decoder service per reader.
pub trait PlatformDecoderFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Box<dyn PlatformDecoderService>>;
}

impl<F> PlatformDecoderFactory for F
where
    F: Fn() -> anyhow::Result<Box<dyn PlatformDecoderService>> + Send + Sync,
{
    fn create(&self) -> anyhow::Result<Box<dyn PlatformDecoderService>> {
        self()
    }
}

/// A raw video elementary stream with per-frame timestamps.
#[derive(Debug, Clone, Default)]
pub struct ElementaryStream {
    pub width: u32,
    pub height: u32,
    /// Parameter sets (e.g. SPS/PPS) that precede the first frame.
    pub headers: Vec<Vec<u8>>,
    pub frames: Vec<Vec<u8>>,
    /// Presentation timestamps, one per frame.
    pub pts: Vec<i64>,
}

/// Wraps an elementary stream into a file a platform decoder can open.
pub trait ContainerMuxer: Send + Sync {
    fn mux(&self, stream: &ElementaryStream, frame_rate: f64) -> anyhow::Result<Vec<u8>>;

    /// File extension for staged containers.
    fn extension(&self) -> &'static str;
}

/// Writes the stream as an Annex B byte stream: every header and frame
/// prefixed by a four byte start code.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnexBMuxer;

impl ContainerMuxer for AnnexBMuxer {
    fn mux(&self, stream: &ElementaryStream, frame_rate: f64) -> anyhow::Result<Vec<u8>> {
        if frame_rate <= 0.0 {
            bail!("frame rate must be positive, got {frame_rate}");
        }
        if stream.pts.len() != stream.frames.len() {
            bail!(
                "{} frames but {} timestamps",
                stream.frames.len(),
                stream.pts.len()
            );
        }
        let payload: usize = stream
            .headers
            .iter()
            .chain(stream.frames.iter())
            .map(|unit| unit.len() + ANNEXB_START_CODE.len())
            .sum();
        let mut out = Vec::with_capacity(payload);
        for unit in stream.headers.iter().chain(stream.frames.iter()) {
            out.extend_from_slice(&ANNEXB_START_CODE);
            out.extend_from_slice(unit);
        }
        Ok(out)
    }

    fn extension(&self) -> &'static str {
        "h264"
    }
}

#[derive(Debug)]
struct ServiceState {
    frame_rate: f64,
    width: u32,
    height: u32,
    source: Option<PathBuf>,
    position_ms: u64,
    // Polls that come back empty after every start/seek.
    empty_polls: u32,
    remaining_empty: u32,
    never_yields: bool,
    polls: u32,
    seeks: Vec<u64>,
}

/// A platform decoder service that renders solid frames for its position.
///
/// Clones share state so a test can inspect what the bridge asked for.
#[derive(Debug, Clone)]
pub struct SimulatedDecoderService {
    state: Arc<Mutex<ServiceState>>,
    events: broadcast::Sender<DecoderEvent>,
}

impl SimulatedDecoderService {
    pub fn new(frame_rate: f64, width: u32, height: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(ServiceState {
                frame_rate,
                width: width.max(1),
                height: height.max(1),
                source: None,
                position_ms: 0,
                empty_polls: 0,
                remaining_empty: 0,
                never_yields: false,
                polls: 0,
                seeks: Vec::new(),
            })),
            events,
        }
    }

    /// Every start or seek is followed by `polls` empty frame polls.
    pub fn with_empty_polls(self, polls: u32) -> Self {
        self.state().empty_polls = polls;
        self
    }

    /// Never return a frame.
    pub fn never_yielding(self) -> Self {
        self.state().never_yields = true;
        self
    }

    pub fn source(&self) -> Option<PathBuf> {
        self.state().source.clone()
    }

    pub fn seeks(&self) -> Vec<u64> {
        self.state().seeks.clone()
    }

    pub fn polls(&self) -> u32 {
        self.state().polls
    }

    pub fn frame_color(frame: i64) -> [u8; 4] {
        [0x40, (frame & 0xff) as u8, ((frame >> 8) & 0xff) as u8, 0xff]
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlatformDecoderService for SimulatedDecoderService {
    fn start(&mut self, path: &Path) -> anyhow::Result<()> {
        if !path.is_file() {
            return Err(anyhow!("no container at {}", path.display()));
        }
        {
            let mut state = self.state();
            state.source = Some(path.to_path_buf());
            state.remaining_empty = state.empty_polls;
        }
        let _ = self.events.send(DecoderEvent::Started);
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> anyhow::Result<()> {
        {
            let mut state = self.state();
            if state.source.is_none() {
                bail!("seek before start");
            }
            state.position_ms = position_ms;
            state.seeks.push(position_ms);
            state.remaining_empty = state.empty_polls;
        }
        let _ = self.events.send(DecoderEvent::Seeked);
        Ok(())
    }

    fn get_frame_data(&mut self) -> Option<ImageBuffer> {
        let mut state = self.state();
        state.polls += 1;
        if state.never_yields || state.source.is_none() {
            return None;
        }
        if state.remaining_empty > 0 {
            state.remaining_empty -= 1;
            return None;
        }
        let frame = (state.position_ms as f64 / 1000.0 * state.frame_rate).round() as i64;
        Some(ImageBuffer::solid(
            state.width,
            state.height,
            Self::frame_color(frame),
        ))
    }

    fn subscribe(&self) -> broadcast::Receiver<DecoderEvent> {
        self.events.subscribe()
    }
}
