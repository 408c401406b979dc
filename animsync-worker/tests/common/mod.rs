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

//! A toy engine for driving the worker end to end.
//!
//! A file is JSON describing its size and frame count, optionally carrying
//! an embedded video container. Views map progress to a frame and, for
//! files with video, pull that frame through whatever decode backend the
//! engine was loaded with.

#![allow(dead_code)]

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

use animsync_types::{TextureSurface, TimeRange, ViewOptions};
use animsync_video::{SyncConfig, VideoReader};
use animsync_worker::{
    DecodeBackend, Engine, EngineFile, EngineLoader, EngineView, ModuleOptions, VideoSource,
    ENGINE_MODULE_FILE,
};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FakeFileSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub frames: i64,
    #[serde(default)]
    pub video: Option<Vec<u8>>,
    #[serde(default)]
    pub static_ranges: Vec<TimeRange>,
}

impl FakeFileSpec {
    pub fn still(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_rate: 30.0,
            frames: 1,
            video: None,
            static_ranges: Vec::new(),
        }
    }

    pub fn with_video(width: u32, height: u32, frames: i64) -> Self {
        Self {
            width,
            height,
            frame_rate: 30.0,
            frames,
            video: Some(b"\x00\x00\x00\x18ftypmp42".to_vec()),
            static_ranges: Vec::new(),
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap()
    }

    pub fn duration_us(&self) -> i64 {
        (self.frames as f64 / self.frame_rate * 1_000_000.0).round() as i64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    pub frame: i64,
    pub ready: bool,
    pub pixel: Option<[u8; 4]>,
}

#[derive(Debug, Default)]
struct Seen {
    engine_location: Option<Option<String>>,
    backend: Option<&'static str>,
    flushes: Vec<Flush>,
    released_readers: usize,
    loads: usize,
}

/// What the fake engine saw, readable from the test side even when the
/// engine itself lives in a worker thread.
#[derive(Debug, Clone, Default)]
pub struct Observations(Arc<Mutex<Seen>>);

impl Observations {
    fn seen(&self) -> std::sync::MutexGuard<'_, Seen> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn engine_location(&self) -> Option<Option<String>> {
        self.seen().engine_location.clone()
    }

    pub fn backend(&self) -> Option<&'static str> {
        self.seen().backend
    }

    pub fn flushes(&self) -> Vec<Flush> {
        self.seen().flushes.clone()
    }

    pub fn released_readers(&self) -> usize {
        self.seen().released_readers
    }

    pub fn loads(&self) -> usize {
        self.seen().loads
    }
}

pub struct FakeLoader {
    observed: Observations,
    failure: Option<String>,
}

impl FakeLoader {
    pub fn new() -> (Arc<Self>, Observations) {
        let observed = Observations::default();
        let loader = Arc::new(Self {
            observed: observed.clone(),
            failure: None,
        });
        (loader, observed)
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            observed: Observations::default(),
            failure: Some(reason.to_string()),
        })
    }
}

#[async_trait]
impl EngineLoader for FakeLoader {
    async fn load(
        &self,
        options: &ModuleOptions,
        backend: DecodeBackend,
    ) -> anyhow::Result<Box<dyn Engine>> {
        if let Some(reason) = &self.failure {
            bail!("{reason}");
        }
        // Loading a real engine suspends; let other calls interleave.
        tokio::task::yield_now().await;
        {
            let mut seen = self.observed.seen();
            seen.loads += 1;
            seen.engine_location = Some(options.locate_file(ENGINE_MODULE_FILE));
            seen.backend = Some(backend.name());
        }
        Ok(Box::new(FakeEngine {
            backend,
            observed: self.observed.clone(),
        }))
    }
}

struct FakeEngine {
    backend: DecodeBackend,
    observed: Observations,
}

struct FakeFile {
    spec: FakeFileSpec,
}

impl EngineFile for FakeFile {
    fn width(&self) -> u32 {
        self.spec.width
    }

    fn height(&self) -> u32 {
        self.spec.height
    }

    fn duration(&self) -> i64 {
        self.spec.duration_us()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Engine for FakeEngine {
    fn load_file(&mut self, bytes: Vec<u8>) -> anyhow::Result<Arc<dyn EngineFile>> {
        let spec: FakeFileSpec =
            serde_json::from_slice(&bytes).context("not an animation file")?;
        Ok(Arc::new(FakeFile { spec }))
    }

    fn init_view(
        &mut self,
        file: Arc<dyn EngineFile>,
        surface: TextureSurface,
        _options: &ViewOptions,
    ) -> anyhow::Result<Box<dyn EngineView>> {
        let file = file
            .as_any()
            .downcast_ref::<FakeFile>()
            .ok_or_else(|| anyhow!("file was loaded by another engine"))?;
        Ok(Box::new(FakeView {
            spec: file.spec.clone(),
            surface,
            progress: 0.0,
            playing: false,
            repeat_count: 0,
            last_frame: None,
            reader: None,
            backend: self.backend.clone(),
            observed: self.observed.clone(),
        }))
    }
}

struct FakeView {
    spec: FakeFileSpec,
    surface: TextureSurface,
    progress: f64,
    playing: bool,
    repeat_count: i32,
    last_frame: Option<i64>,
    reader: Option<Box<dyn VideoReader>>,
    backend: DecodeBackend,
    observed: Observations,
}

#[async_trait]
impl EngineView for FakeView {
    fn play(&mut self) -> anyhow::Result<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        self.playing = false;
        Ok(())
    }

    fn set_repeat_count(&mut self, count: i32) -> anyhow::Result<()> {
        self.repeat_count = count;
        Ok(())
    }

    fn set_progress(&mut self, progress: f64) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&progress) {
            bail!("progress {progress} is outside [0, 1]");
        }
        self.progress = progress;
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<bool> {
        let frame = (self.progress * (self.spec.frames - 1) as f64).round() as i64;
        let changed = self.last_frame != Some(frame);
        self.last_frame = Some(frame);

        let Some(video) = &self.spec.video else {
            return Ok(changed);
        };
        if self.reader.is_none() {
            let config = SyncConfig::new(self.spec.frame_rate, self.spec.width, self.spec.height)
                .with_static_time_ranges(self.spec.static_ranges.clone());
            let reader = self
                .backend
                .create(VideoSource::Container(video.clone()), config)
                .await?;
            self.reader = Some(reader);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(changed);
        };
        let ready = reader.prepare(frame).await?;
        reader.render_to_texture(&mut self.surface, 0);
        let pixel = self.surface.texture(0).and_then(|texture| texture.pixel(0, 0));
        self.observed.seen().flushes.push(Flush {
            frame,
            ready,
            pixel,
        });
        Ok(changed)
    }
}

impl Drop for FakeView {
    fn drop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            if reader.on_destroy().is_ok() {
                self.observed.seen().released_readers += 1;
            }
        }
    }
}
