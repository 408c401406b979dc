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

//! Frame synchronizer for a worker context whose video decoding happens in
//! the peer context.

use animsync_types::{ImageBuffer, TextureSurface, Transferable};
use animsync_video::{SyncConfig, VideoReader, VideoReaderError};
use async_trait::async_trait;
use log::{info, warn};
use serde_json::json;

use crate::channel::MessageChannel;
use crate::error::ChannelError;
use crate::handle::Handle;
use crate::messages::{Method, ReaderMethod};

const CONSTRUCTOR: Method = Method::VideoReader(ReaderMethod::Constructor);
const PREPARE: Method = Method::VideoReader(ReaderMethod::Prepare);
const RENDER: Method = Method::VideoReader(ReaderMethod::RenderToTexture);
const DESTROY: Method = Method::VideoReader(ReaderMethod::Destroy);

/// Proxy for a reader living in a [`DecodeHost`](crate::DecodeHost).
///
/// Every `prepare` is a round trip that brings back a snapshot of the decoded
/// picture. Rendering only blits the newest snapshot, without a round trip.
pub struct RemoteVideoReader {
    channel: MessageChannel,
    id: Option<Handle>,
    bitmap: Option<ImageBuffer>,
}

impl RemoteVideoReader {
    /// Moves `container` to the peer and asks it to build a reader.
    pub async fn create(
        channel: &MessageChannel,
        container: Vec<u8>,
        config: SyncConfig,
    ) -> Result<Self, VideoReaderError> {
        let config = serde_json::to_value(&config)
            .map_err(|err| VideoReaderError::Remote(err.to_string()))?;
        let reply = channel
            .call(
                CONSTRUCTOR,
                vec![config],
                vec![Transferable::Buffer(container)],
            )
            .await
            .map_err(remote)?;
        let id: Handle = reply.arg(CONSTRUCTOR.as_str(), 0).map_err(remote)?;
        info!("remote video reader {} created", id.key);
        Ok(Self {
            channel: channel.clone(),
            id: Some(id),
            bitmap: None,
        })
    }

    pub fn id(&self) -> Option<Handle> {
        self.id
    }

    /// Fetches a fresh snapshot without moving the decoder. Returns whether
    /// the peer had a picture.
    pub async fn refresh(&mut self) -> Result<bool, VideoReaderError> {
        let Some(id) = self.id else {
            return Err(VideoReaderError::Destroyed);
        };
        let mut reply = self
            .channel
            .call(RENDER, vec![json!(id)], Vec::new())
            .await
            .map_err(remote)?;
        match reply.take_image() {
            Some(bitmap) => {
                self.bitmap = Some(bitmap);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl VideoReader for RemoteVideoReader {
    async fn prepare(&mut self, target_frame: i64) -> Result<bool, VideoReaderError> {
        let Some(id) = self.id else {
            warn!("prepare({target_frame}) on a destroyed remote reader");
            return Ok(false);
        };
        let mut reply = self
            .channel
            .call(PREPARE, vec![json!(id), json!(target_frame)], Vec::new())
            .await
            .map_err(remote)?;
        let ready: bool = reply.arg(PREPARE.as_str(), 0).map_err(remote)?;
        self.bitmap = reply.take_image();
        Ok(ready)
    }

    fn render_to_texture(&self, surface: &mut TextureSurface, slot: u32) {
        if let Some(bitmap) = &self.bitmap {
            surface.upload(slot, bitmap.clone());
        }
    }

    fn snapshot(&self) -> Option<ImageBuffer> {
        self.bitmap.clone()
    }

    fn on_destroy(&mut self) -> Result<(), VideoReaderError> {
        let id = self.id.take().ok_or(VideoReaderError::Destroyed)?;
        self.bitmap = None;
        self.channel
            .notify(DESTROY, vec![json!(id)])
            .map_err(remote)
    }
}

fn remote(err: ChannelError) -> VideoReaderError {
    VideoReaderError::Remote(err.to_string())
}
