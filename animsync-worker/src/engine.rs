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

//! The animation engine as seen from the dispatcher.
//!
//! The engine decodes and composes animation files. It is loaded once per
//! context through an [`EngineLoader`] and handed a [`DecodeBackend`] for any
//! video sequences embedded in its files.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use animsync_types::{TextureSurface, ViewOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::DecodeBackend;

/// File name the engine binary is resolved under.
pub const ENGINE_MODULE_FILE: &str = "animsync-engine.wasm";

type LocateFile = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How the engine module finds its assets.
#[derive(Clone, Default)]
pub struct ModuleOptions {
    locate_file: Option<LocateFile>,
}

impl ModuleOptions {
    pub fn with_locate_file(locate_file: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            locate_file: Some(Arc::new(locate_file)),
        }
    }

    /// Resolves `name` to a location, or `None` to let the loader use its default.
    pub fn locate_file(&self, name: &str) -> Option<String> {
        self.locate_file.as_ref().map(|locate| locate(name))
    }

    /// The copyable form sent with `Module.init`.
    pub fn to_init_options(&self) -> InitOptions {
        InitOptions {
            file_url: self.locate_file(ENGINE_MODULE_FILE),
        }
    }
}

impl fmt::Debug for ModuleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleOptions")
            .field("locate_file", &self.locate_file.is_some())
            .finish()
    }
}

/// `Module.init` argument. Closures do not cross contexts, so the client
/// resolves the engine location up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitOptions {
    pub file_url: Option<String>,
}

impl From<InitOptions> for ModuleOptions {
    fn from(options: InitOptions) -> Self {
        match options.file_url {
            Some(url) => ModuleOptions::with_locate_file(move |_| url.clone()),
            None => ModuleOptions::default(),
        }
    }
}

#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(
        &self,
        options: &ModuleOptions,
        backend: DecodeBackend,
    ) -> anyhow::Result<Box<dyn Engine>>;
}

pub trait Engine: Send {
    fn load_file(&mut self, bytes: Vec<u8>) -> anyhow::Result<Arc<dyn EngineFile>>;

    fn init_view(
        &mut self,
        file: Arc<dyn EngineFile>,
        surface: TextureSurface,
        options: &ViewOptions,
    ) -> anyhow::Result<Box<dyn EngineView>>;
}

pub trait EngineFile: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Duration in microseconds.
    fn duration(&self) -> i64;

    /// Lets an engine recover its own file type in `init_view`.
    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
pub trait EngineView: Send {
    fn play(&mut self) -> anyhow::Result<()>;

    fn pause(&mut self) -> anyhow::Result<()>;

    fn set_repeat_count(&mut self, count: i32) -> anyhow::Result<()>;

    /// `progress` is in `[0, 1]`.
    fn set_progress(&mut self, progress: f64) -> anyhow::Result<()>;

    /// Renders the current frame into the view's surface. Returns whether
    /// anything changed.
    async fn flush(&mut self) -> anyhow::Result<bool>;
}
