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

//! Selects which frame synchronizer variant backs embedded video.

use std::fmt;
use std::sync::Arc;

use animsync_video::platform::{ContainerMuxer, ElementaryStream, PlatformDecoderFactory};
use animsync_video::resource::DecodeResourceProvider;
use animsync_video::{
    Clock, LocalVideoReader, NativeBridgeConfig, NativeBridgeReader, SyncConfig, VideoReader,
    VideoReaderError,
};
use log::debug;

use crate::channel::MessageChannel;
use crate::remote_reader::RemoteVideoReader;

/// Encoded video as the engine finds it in a file.
#[derive(Debug, Clone)]
pub enum VideoSource {
    /// A complete container, playable by a video element.
    Container(Vec<u8>),
    /// Raw frames plus timestamps, for platform decoders that need a file.
    Elementary(ElementaryStream),
}

impl VideoSource {
    fn describe(&self) -> &'static str {
        match self {
            VideoSource::Container(_) => "container bytes",
            VideoSource::Elementary(_) => "elementary stream",
        }
    }
}

/// The decode variant for a context. Chosen once, when the engine is loaded.
#[derive(Clone)]
pub enum DecodeBackend {
    /// Decode in this context with a host decode resource.
    Local {
        provider: Arc<dyn DecodeResourceProvider>,
        clock: Arc<dyn Clock>,
    },
    /// Decode in the peer context; frames come back as snapshots.
    RemoteProxy(MessageChannel),
    /// Hand a staged container to a platform decoder service.
    NativeBridge {
        muxer: Arc<dyn ContainerMuxer>,
        decoders: Arc<dyn PlatformDecoderFactory>,
        config: NativeBridgeConfig,
    },
}

impl DecodeBackend {
    pub fn local(provider: Arc<dyn DecodeResourceProvider>, clock: Arc<dyn Clock>) -> Self {
        DecodeBackend::Local { provider, clock }
    }

    pub fn native_bridge(
        muxer: Arc<dyn ContainerMuxer>,
        decoders: Arc<dyn PlatformDecoderFactory>,
        config: NativeBridgeConfig,
    ) -> Self {
        DecodeBackend::NativeBridge {
            muxer,
            decoders,
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DecodeBackend::Local { .. } => "local",
            DecodeBackend::RemoteProxy(_) => "remote-proxy",
            DecodeBackend::NativeBridge { .. } => "native-bridge",
        }
    }

    /// Builds a frame synchronizer for `source`.
    pub async fn create(
        &self,
        source: VideoSource,
        config: SyncConfig,
    ) -> Result<Box<dyn VideoReader>, VideoReaderError> {
        debug!(
            "creating {} video reader from {}",
            self.name(),
            source.describe()
        );
        match (self, source) {
            (DecodeBackend::Local { provider, clock }, VideoSource::Container(container)) => {
                let reader = LocalVideoReader::from_container(
                    provider.as_ref(),
                    container,
                    config,
                    clock.clone(),
                )?;
                Ok(Box::new(reader))
            }
            (DecodeBackend::RemoteProxy(channel), VideoSource::Container(container)) => {
                let reader = RemoteVideoReader::create(channel, container, config).await?;
                Ok(Box::new(reader))
            }
            (
                DecodeBackend::NativeBridge {
                    muxer,
                    decoders,
                    config: bridge,
                },
                VideoSource::Elementary(stream),
            ) => {
                let decoder = decoders
                    .create()
                    .map_err(|err| VideoReaderError::Decoder(format!("{err:#}")))?;
                let reader =
                    NativeBridgeReader::new(&stream, muxer.as_ref(), decoder, config, bridge.clone())?;
                Ok(Box::new(reader))
            }
            (_, source) => Err(VideoReaderError::UnsupportedSource(source.describe())),
        }
    }
}

impl fmt::Debug for DecodeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DecodeBackend").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use animsync_video::platform::{
        AnnexBMuxer, PlatformDecoderService, SimulatedDecoderService,
    };
    use animsync_video::resource::SimulatedVideoProvider;
    use animsync_video::ManualClock;

    fn local() -> (DecodeBackend, Arc<SimulatedVideoProvider>) {
        let provider = Arc::new(SimulatedVideoProvider::default());
        let backend = DecodeBackend::local(provider.clone(), Arc::new(ManualClock::new(0.0)));
        (backend, provider)
    }

    #[tokio::test]
    async fn local_backend_opens_containers() {
        let (backend, provider) = local();
        let mut reader = backend
            .create(VideoSource::Container(vec![1, 2, 3]), SyncConfig::new(30.0, 2, 2))
            .await
            .unwrap();
        assert_eq!(provider.created().len(), 1);
        assert!(reader.prepare(30).await.unwrap());
    }

    #[tokio::test]
    async fn local_backend_rejects_elementary_streams() {
        let (backend, _) = local();
        let result = backend
            .create(
                VideoSource::Elementary(ElementaryStream::default()),
                SyncConfig::default(),
            )
            .await;
        assert!(matches!(
            result,
            Err(VideoReaderError::UnsupportedSource("elementary stream"))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn native_bridge_backend_stages_elementary_streams() {
        let dir = tempfile::tempdir().unwrap();
        let service = SimulatedDecoderService::new(30.0, 2, 2);
        let factory_service = service.clone();
        let backend = DecodeBackend::native_bridge(
            Arc::new(AnnexBMuxer),
            Arc::new(move || -> anyhow::Result<Box<dyn PlatformDecoderService>> {
                Ok(Box::new(factory_service.clone()))
            }),
            NativeBridgeConfig::with_scratch_dir(dir.path()),
        );
        let stream = ElementaryStream {
            width: 2,
            height: 2,
            headers: vec![vec![0x67]],
            frames: vec![vec![0x65]],
            pts: vec![0],
        };

        let mut reader = backend
            .create(VideoSource::Elementary(stream), SyncConfig::new(30.0, 2, 2))
            .await
            .unwrap();
        assert!(service.source().is_some());
        assert!(reader.prepare(0).await.unwrap());

        let containers = backend
            .create(VideoSource::Container(vec![0]), SyncConfig::default())
            .await;
        assert!(matches!(
            containers,
            Err(VideoReaderError::UnsupportedSource("container bytes"))
        ));
    }
}
