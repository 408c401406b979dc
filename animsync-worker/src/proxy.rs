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

//! Client-side stand-ins for engine resources living in a worker.

use animsync_types::{TextureSurface, Transferable, ViewOptions};
use serde_json::{json, Value};

use crate::channel::MessageChannel;
use crate::error::ChannelError;
use crate::handle::Handle;
use crate::messages::{FileMethod, Method, Payload, ViewMethod};

/// A loaded animation file in the worker.
#[derive(Debug, Clone)]
pub struct FileHandle {
    channel: MessageChannel,
    handle: Handle,
}

impl FileHandle {
    /// Moves `bytes` to the worker and loads them as a file.
    pub async fn load(channel: &MessageChannel, bytes: Vec<u8>) -> Result<Self, ChannelError> {
        let method = Method::File(FileMethod::Load);
        let reply = channel
            .call(method, Vec::new(), vec![Transferable::Buffer(bytes)])
            .await?;
        Ok(Self {
            channel: channel.clone(),
            handle: reply.arg(method.as_str(), 0)?,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub async fn width(&self) -> Result<u32, ChannelError> {
        self.query(FileMethod::Width).await
    }

    pub async fn height(&self) -> Result<u32, ChannelError> {
        self.query(FileMethod::Height).await
    }

    /// Duration in microseconds.
    pub async fn duration(&self) -> Result<i64, ChannelError> {
        self.query(FileMethod::Duration).await
    }

    /// Releases the file in the worker. Views created from it keep working.
    pub async fn destroy(self) -> Result<(), ChannelError> {
        self.channel
            .call(Method::File(FileMethod::Destroy), vec![json!(self.handle)], Vec::new())
            .await?;
        Ok(())
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        op: FileMethod,
    ) -> Result<T, ChannelError> {
        let method = Method::File(op);
        let reply = self
            .channel
            .call(method, vec![json!(self.handle)], Vec::new())
            .await?;
        reply.arg(method.as_str(), 0)
    }
}

/// A view rendering a file into a surface owned by the worker.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    channel: MessageChannel,
    handle: Handle,
}

impl ViewHandle {
    /// Creates a view of `file`. `surface` moves to the worker for good.
    /// Omitted options take the worker's defaults.
    pub async fn init(
        file: &FileHandle,
        surface: TextureSurface,
        options: Option<ViewOptions>,
    ) -> Result<Self, ChannelError> {
        let method = Method::View(ViewMethod::Init);
        let options = match options {
            Some(options) => serde_json::to_value(options)?,
            None => Value::Null,
        };
        let reply = file
            .channel
            .call(
                method,
                vec![json!(file.handle), options],
                vec![Transferable::Surface(surface)],
            )
            .await?;
        Ok(Self {
            channel: file.channel.clone(),
            handle: reply.arg(method.as_str(), 0)?,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub async fn play(&self) -> Result<(), ChannelError> {
        self.invoke(ViewMethod::Play, Vec::new()).await.map(drop)
    }

    pub async fn pause(&self) -> Result<(), ChannelError> {
        self.invoke(ViewMethod::Pause, Vec::new()).await.map(drop)
    }

    pub async fn set_repeat_count(&self, count: i32) -> Result<(), ChannelError> {
        self.invoke(ViewMethod::SetRepeatCount, vec![json!(count)])
            .await
            .map(drop)
    }

    pub async fn set_progress(&self, progress: f64) -> Result<(), ChannelError> {
        self.invoke(ViewMethod::SetProgress, vec![json!(progress)])
            .await
            .map(drop)
    }

    /// Renders the current frame. Returns whether the picture changed.
    pub async fn flush(&self) -> Result<bool, ChannelError> {
        let method = Method::View(ViewMethod::Flush);
        self.invoke(ViewMethod::Flush, Vec::new())
            .await?
            .arg(method.as_str(), 0)
    }

    pub async fn destroy(self) -> Result<(), ChannelError> {
        self.invoke(ViewMethod::Destroy, Vec::new()).await.map(drop)
    }

    async fn invoke(&self, op: ViewMethod, extra: Vec<Value>) -> Result<Payload, ChannelError> {
        let mut args = Vec::with_capacity(extra.len() + 1);
        args.push(json!(self.handle));
        args.extend(extra);
        self.channel.call(Method::View(op), args, Vec::new()).await
    }
}
