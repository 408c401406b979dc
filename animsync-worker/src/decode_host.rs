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

//! Serves video decoding to a worker context that has no decoder of its own.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use animsync_types::Transferable;
use animsync_video::{SyncConfig, VideoReader};
use async_trait::async_trait;
use log::info;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use crate::backend::{DecodeBackend, VideoSource};
use crate::channel::{MessageChannel, MessageHandler};
use crate::error::{DispatchError, Result};
use crate::handle::{ContextId, Handle, Kind, Registry};
use crate::messages::{Message, Method, Payload, ReaderMethod};

type SharedReader = Arc<AsyncMutex<Box<dyn VideoReader>>>;

/// Owns the frame synchronizers created on behalf of a worker.
///
/// Answers `VideoReader.prepare` and `VideoReader.renderToTexture` with the
/// result plus a snapshot image moved back by transfer.
pub struct DecodeHost {
    context: ContextId,
    backend: DecodeBackend,
    readers: Mutex<Registry<SharedReader>>,
}

impl DecodeHost {
    /// `backend` must decode in this context; a remote proxy is rejected.
    pub fn new(backend: DecodeBackend) -> Result<Self> {
        if matches!(backend, DecodeBackend::RemoteProxy(_)) {
            return Err(DispatchError::InvalidBackend);
        }
        let context = ContextId::next();
        Ok(Self {
            context,
            backend,
            readers: Mutex::new(Registry::new(context, Kind::VideoReader)),
        })
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn reader_count(&self) -> usize {
        self.readers().len()
    }

    fn readers(&self) -> MutexGuard<'_, Registry<SharedReader>> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reader(&self, handle: Handle) -> Result<SharedReader> {
        self.readers().get(handle).map(Arc::clone)
    }

    async fn construct(&self, method: Method, mut message: Message) -> Result<Payload> {
        let config: SyncConfig = message.arg(method, 0)?;
        let container = message
            .transfer
            .drain(..)
            .find_map(Transferable::into_buffer)
            .ok_or(DispatchError::MissingTransfer {
                method: method.as_str(),
                expected: "buffer",
            })?;
        let reader = self
            .backend
            .create(VideoSource::Container(container), config)
            .await?;
        let handle = self.readers().insert(Arc::new(AsyncMutex::new(reader)));
        info!(
            "decode host {} serving reader {} ({} live)",
            self.context,
            handle.key,
            self.reader_count()
        );
        Ok(Payload::new(vec![json!(handle)]))
    }

    async fn prepare(&self, method: Method, message: Message) -> Result<Payload> {
        let handle: Handle = message.arg(method, 0)?;
        let target_frame: i64 = message.arg(method, 1)?;
        let reader = self.reader(handle)?;
        let mut reader = reader.lock().await;
        let ready = reader.prepare(target_frame).await?;
        let payload = Payload::new(vec![json!(ready)]);
        Ok(match reader.snapshot() {
            Some(snapshot) => payload.with_transfer(Transferable::Image(snapshot)),
            None => payload,
        })
    }

    async fn render(&self, method: Method, message: Message) -> Result<Payload> {
        let handle: Handle = message.arg(method, 0)?;
        let reader = self.reader(handle)?;
        let snapshot = reader.lock().await.snapshot();
        Ok(match snapshot {
            Some(snapshot) => Payload::default().with_transfer(Transferable::Image(snapshot)),
            None => Payload::default(),
        })
    }

    async fn destroy(&self, method: Method, message: Message) -> Result<Payload> {
        let handle: Handle = message.arg(method, 0)?;
        let reader = self.readers().remove(handle)?;
        reader.lock().await.on_destroy()?;
        info!("decode host {} released reader {}", self.context, handle.key);
        Ok(Payload::default())
    }
}

#[async_trait]
impl MessageHandler for DecodeHost {
    async fn handle(&self, _channel: &MessageChannel, message: Message) -> Result<Payload> {
        let method = message.method()?;
        match method {
            Method::VideoReader(ReaderMethod::Constructor) => self.construct(method, message).await,
            Method::VideoReader(ReaderMethod::Prepare) => self.prepare(method, message).await,
            Method::VideoReader(ReaderMethod::RenderToTexture) => self.render(method, message).await,
            Method::VideoReader(ReaderMethod::Destroy) => self.destroy(method, message).await,
            other => Err(DispatchError::Unsupported {
                method: other.as_str(),
            }),
        }
    }
}
