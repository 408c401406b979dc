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

//! Routes calls arriving in the worker context to the engine resources it owns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use animsync_types::{Transferable, ViewOptions};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

use crate::backend::DecodeBackend;
use crate::channel::{MessageChannel, MessageHandler};
use crate::engine::{Engine, EngineFile, EngineLoader, EngineView, InitOptions, ModuleOptions};
use crate::error::{DispatchError, Result};
use crate::handle::{ContextId, Handle, Kind, Registry};
use crate::messages::{FileMethod, Message, Method, ModuleMethod, Payload, ViewMethod};

type SharedView = Arc<AsyncMutex<Box<dyn EngineView>>>;

/// The engine side of a message channel.
///
/// Holds the engine plus registries of live files and views. A failing call
/// only fails its own reply; the registries and other resources stay intact.
pub struct Dispatcher {
    context: ContextId,
    // Inside an isolated context video is decoded by the peer.
    isolated: bool,
    loader: Arc<dyn EngineLoader>,
    backend: Option<DecodeBackend>,
    // Held across the engine load so concurrent `Module.init` calls load once.
    init_lock: AsyncMutex<()>,
    engine: Mutex<Option<Box<dyn Engine>>>,
    files: Mutex<Registry<Arc<dyn EngineFile>>>,
    views: Mutex<Registry<SharedView>>,
}

impl Dispatcher {
    /// A dispatcher for an isolated worker. Embedded video is decoded by the
    /// peer through the channel `Module.init` arrives on.
    pub fn isolated(loader: Arc<dyn EngineLoader>) -> Self {
        Self::build(loader, None)
    }

    /// A dispatcher that shares its context with the decoder.
    pub fn in_process(loader: Arc<dyn EngineLoader>, backend: DecodeBackend) -> Self {
        Self::build(loader, Some(backend))
    }

    fn build(loader: Arc<dyn EngineLoader>, backend: Option<DecodeBackend>) -> Self {
        let context = ContextId::next();
        Self {
            context,
            isolated: backend.is_none(),
            loader,
            backend,
            init_lock: AsyncMutex::new(()),
            engine: Mutex::new(None),
            files: Mutex::new(Registry::new(context, Kind::File)),
            views: Mutex::new(Registry::new(context, Kind::View)),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    pub fn is_initialized(&self) -> bool {
        self.engine().is_some()
    }

    pub fn file_count(&self) -> usize {
        self.files().len()
    }

    pub fn view_count(&self) -> usize {
        self.views().len()
    }

    fn engine(&self) -> MutexGuard<'_, Option<Box<dyn Engine>>> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn files(&self) -> MutexGuard<'_, Registry<Arc<dyn EngineFile>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn views(&self) -> MutexGuard<'_, Registry<SharedView>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn init(&self, channel: &MessageChannel, message: Message) -> Result<Payload> {
        let _init = self.init_lock.lock().await;
        if self.is_initialized() {
            warn!("engine already initialized in context {}", self.context);
            return Ok(Payload::default());
        }
        let method = Method::Module(ModuleMethod::Init);
        let options: InitOptions = match message.args.first() {
            None | Some(Value::Null) => InitOptions::default(),
            Some(_) => message.arg(method, 0)?,
        };
        let backend = match &self.backend {
            Some(backend) => backend.clone(),
            None => DecodeBackend::RemoteProxy(channel.clone()),
        };
        let backend_name = backend.name();
        let options = ModuleOptions::from(options);
        let engine = self
            .loader
            .load(&options, backend)
            .await
            .map_err(|err| DispatchError::EngineInit(format!("{err:#}")))?;
        *self.engine() = Some(engine);
        info!(
            "engine loaded in context {} with {backend_name} video decoding",
            self.context
        );
        Ok(Payload::default())
    }

    fn file(&self, op: FileMethod, mut message: Message) -> Result<Payload> {
        let method = Method::File(op);
        if op == FileMethod::Load {
            let bytes = message
                .transfer
                .drain(..)
                .find_map(Transferable::into_buffer)
                .ok_or(DispatchError::MissingTransfer {
                    method: method.as_str(),
                    expected: "buffer",
                })?;
            let file = self
                .engine()
                .as_mut()
                .ok_or(DispatchError::NotInitialized)?
                .load_file(bytes)
                .map_err(engine_error)?;
            let handle = self.files().insert(file);
            debug!("file {} loaded", handle.key);
            return Ok(Payload::new(vec![json!(handle)]));
        }

        let handle: Handle = message.arg(method, 0)?;
        if op == FileMethod::Destroy {
            self.files().remove(handle)?;
            return Ok(Payload::default());
        }

        let file = Arc::clone(self.files().get(handle)?);
        let value = match op {
            FileMethod::Width => Value::from(file.width()),
            FileMethod::Height => Value::from(file.height()),
            FileMethod::Duration => Value::from(file.duration()),
            FileMethod::Load | FileMethod::Destroy => {
                return Err(DispatchError::Unsupported {
                    method: method.as_str(),
                })
            }
        };
        Ok(Payload::new(vec![value]))
    }

    fn init_view(&self, mut message: Message) -> Result<Payload> {
        let method = Method::View(ViewMethod::Init);
        let file_handle: Handle = message.arg(method, 0)?;
        let options: ViewOptions = match message.args.get(1) {
            None | Some(Value::Null) => ViewOptions::default(),
            Some(_) => message.arg(method, 1)?,
        };
        let surface = message
            .transfer
            .drain(..)
            .find_map(Transferable::into_surface)
            .ok_or(DispatchError::MissingTransfer {
                method: method.as_str(),
                expected: "surface",
            })?;
        let file = Arc::clone(self.files().get(file_handle)?);
        let view = self
            .engine()
            .as_mut()
            .ok_or(DispatchError::NotInitialized)?
            .init_view(file, surface, &options)
            .map_err(engine_error)?;
        let handle = self.views().insert(Arc::new(AsyncMutex::new(view)));
        debug!("view {} created for file {}", handle.key, file_handle.key);
        Ok(Payload::new(vec![json!(handle)]))
    }

    async fn view(&self, op: ViewMethod, message: Message) -> Result<Payload> {
        let method = Method::View(op);
        let handle: Handle = message.arg(method, 0)?;
        if op == ViewMethod::Destroy {
            self.views().remove(handle)?;
            return Ok(Payload::default());
        }

        let view = Arc::clone(self.views().get(handle)?);
        let mut view = view.lock().await;
        match op {
            ViewMethod::Play => view.play(),
            ViewMethod::Pause => view.pause(),
            ViewMethod::SetRepeatCount => view.set_repeat_count(message.arg(method, 1)?),
            ViewMethod::SetProgress => view.set_progress(message.arg(method, 1)?),
            ViewMethod::Flush => {
                let changed = view.flush().await.map_err(engine_error)?;
                return Ok(Payload::new(vec![json!(changed)]));
            }
            ViewMethod::Init | ViewMethod::Destroy => {
                return Err(DispatchError::Unsupported {
                    method: method.as_str(),
                })
            }
        }
        .map_err(engine_error)?;
        Ok(Payload::default())
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, channel: &MessageChannel, message: Message) -> Result<Payload> {
        match message.method()? {
            Method::Module(ModuleMethod::Init) => self.init(channel, message).await,
            Method::File(op) => self.file(op, message),
            Method::View(ViewMethod::Init) => self.init_view(message),
            Method::View(op) => self.view(op, message).await,
            Method::VideoReader(op) => Err(DispatchError::Unsupported {
                method: Method::VideoReader(op).as_str(),
            }),
        }
    }
}

fn engine_error(err: anyhow::Error) -> DispatchError {
    DispatchError::Engine(format!("{err:#}"))
}
