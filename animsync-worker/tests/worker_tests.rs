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

mod common;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use animsync_types::TextureSurface;
use animsync_video::resource::{SimulatedVideo, SimulatedVideoProvider};
use animsync_video::{ManualClock, SyncConfig, VideoReader, VideoReaderError};
use animsync_worker::messages::{FileMethod, ModuleMethod};
use animsync_worker::{
    port_pair, spawn_worker, ChannelError, ContextId, DecodeBackend, DecodeHost, DispatchError,
    Dispatcher, FileHandle, Handle, Kind, Message, MessageChannel, MessageHandler, Method,
    ModuleOptions, Payload, RemoteVideoReader, Unhandled, ViewHandle, WorkerError,
};
use async_trait::async_trait;
use common::{FakeFileSpec, FakeLoader};
use serde_json::json;

fn local_backend() -> (DecodeBackend, Arc<SimulatedVideoProvider>) {
    let provider = Arc::new(SimulatedVideoProvider::default());
    let backend = DecodeBackend::local(provider.clone(), Arc::new(ManualClock::new(0.0)));
    (backend, provider)
}

fn decode_host() -> (Arc<DecodeHost>, Arc<SimulatedVideoProvider>) {
    let (backend, provider) = local_backend();
    (Arc::new(DecodeHost::new(backend).unwrap()), provider)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn remote_message(result: Result<impl std::fmt::Debug, ChannelError>) -> String {
    match result {
        Err(ChannelError::Remote { message, .. }) => message,
        other => panic!("expected a remote failure, got {other:?}"),
    }
}

#[tokio::test]
async fn flush_in_worker_decodes_video_in_client_context() {
    let (loader, observed) = FakeLoader::new();
    let (host, provider) = decode_host();
    let options = ModuleOptions::with_locate_file(|name| format!("https://cdn.test/{name}"));
    let worker = spawn_worker(loader, host.clone(), &options).await.unwrap();

    assert_eq!(
        observed.engine_location(),
        Some(Some("https://cdn.test/animsync-engine.wasm".to_string()))
    );
    assert_eq!(observed.backend(), Some("remote-proxy"));

    let spec = FakeFileSpec::with_video(4, 4, 61);
    let file = FileHandle::load(worker.channel(), spec.bytes()).await.unwrap();
    assert_eq!(file.width().await.unwrap(), 4);
    assert_eq!(file.height().await.unwrap(), 4);
    assert_eq!(file.duration().await.unwrap(), spec.duration_us());

    let view = ViewHandle::init(&file, TextureSurface::new(4, 4), None)
        .await
        .unwrap();
    view.set_progress(0.5).await.unwrap();
    assert!(view.flush().await.unwrap());

    // Frame 30 at 30 fps, decoded by the client's simulated video.
    assert_eq!(host.reader_count(), 1);
    assert_eq!(provider.created()[0].seeks(), vec![1.0]);
    let flushes = observed.flushes();
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].frame, 30);
    assert!(flushes[0].ready);
    assert_eq!(flushes[0].pixel, Some(SimulatedVideo::frame_color(30)));

    // Same progress: nothing changes, the reader answers from its cache.
    assert!(!view.flush().await.unwrap());
    assert_eq!(provider.created()[0].seeks(), vec![1.0]);

    view.destroy().await.unwrap();
    wait_until(|| host.reader_count() == 0).await;
    assert_eq!(observed.released_readers(), 1);

    worker.shutdown().await.unwrap();
}

#[tokio::test]
async fn destroyed_handle_fails_only_its_own_calls() {
    let (loader, _) = FakeLoader::new();
    let (host, _) = decode_host();
    let worker = spawn_worker(loader, host, &ModuleOptions::default())
        .await
        .unwrap();

    let first = FileHandle::load(worker.channel(), FakeFileSpec::still(8, 6).bytes())
        .await
        .unwrap();
    let second = FileHandle::load(worker.channel(), FakeFileSpec::still(3, 2).bytes())
        .await
        .unwrap();
    assert_ne!(first.handle(), second.handle());

    let stale = first.clone();
    first.destroy().await.unwrap();

    let message = remote_message(stale.width().await);
    assert!(message.contains("does not exist"), "{message}");
    assert_eq!(second.width().await.unwrap(), 3);
    assert_eq!(second.height().await.unwrap(), 2);

    // Destroying twice is reported, not ignored.
    assert!(remote_message(stale.destroy().await).contains("does not exist"));

    worker.shutdown().await.unwrap();
}

#[tokio::test]
async fn handles_are_checked_for_context_and_kind() {
    let (loader, _) = FakeLoader::new();
    let (host, _) = decode_host();
    let worker = spawn_worker(loader, host.clone(), &ModuleOptions::default())
        .await
        .unwrap();

    let file = FileHandle::load(worker.channel(), FakeFileSpec::still(2, 2).bytes())
        .await
        .unwrap();
    let view = ViewHandle::init(&file, TextureSurface::new(2, 2), None)
        .await
        .unwrap();
    let width = Method::File(FileMethod::Width);

    let forged = Handle {
        context: host.context(),
        ..file.handle()
    };
    let message = remote_message(
        worker
            .channel()
            .call(width, vec![json!(forged)], Vec::new())
            .await,
    );
    assert!(message.contains("issued by context"), "{message}");

    let message = remote_message(
        worker
            .channel()
            .call(width, vec![json!(view.handle())], Vec::new())
            .await,
    );
    assert!(
        message.contains("Expected a File handle, got a View handle"),
        "{message}"
    );

    let message = remote_message(
        worker
            .channel()
            .call(Method::File(FileMethod::Load), Vec::new(), Vec::new())
            .await,
    );
    assert!(message.contains("expects a transferred buffer"), "{message}");

    // The file itself is untouched by the rejected calls.
    assert_eq!(file.width().await.unwrap(), 2);
    worker.shutdown().await.unwrap();
}

#[tokio::test]
async fn view_survives_rejected_engine_calls() {
    let (loader, _) = FakeLoader::new();
    let (host, _) = decode_host();
    let worker = spawn_worker(loader, host, &ModuleOptions::default())
        .await
        .unwrap();

    let spec = FakeFileSpec {
        frames: 11,
        ..FakeFileSpec::still(2, 2)
    };
    let file = FileHandle::load(worker.channel(), spec.bytes()).await.unwrap();
    let view = ViewHandle::init(&file, TextureSurface::new(2, 2), None)
        .await
        .unwrap();

    view.play().await.unwrap();
    view.set_repeat_count(-1).await.unwrap();
    let message = remote_message(view.set_progress(1.5).await);
    assert!(message.contains("outside [0, 1]"), "{message}");

    view.set_progress(0.3).await.unwrap();
    assert!(view.flush().await.unwrap());
    assert!(!view.flush().await.unwrap());
    view.pause().await.unwrap();

    // Views outlive the file they were made from.
    file.destroy().await.unwrap();
    view.set_progress(1.0).await.unwrap();
    assert!(view.flush().await.unwrap());

    worker.shutdown().await.unwrap();
}

#[tokio::test]
async fn engine_load_failure_fails_worker_start() {
    let (host, _) = decode_host();
    let result = spawn_worker(
        FakeLoader::failing("engine binary missing"),
        host,
        &ModuleOptions::default(),
    )
    .await;

    let Err(WorkerError::Init(ChannelError::Remote { name, message })) = result else {
        panic!("worker start should have failed");
    };
    assert!(name.starts_with("Module.init_"), "{name}");
    assert!(message.contains("engine binary missing"), "{message}");
}

#[derive(Default)]
struct RecordNames {
    names: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageHandler for RecordNames {
    async fn handle(
        &self,
        _channel: &MessageChannel,
        message: Message,
    ) -> Result<Payload, DispatchError> {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        names.push(message.name.clone());
        let handle = Handle {
            context: ContextId(99),
            kind: Kind::File,
            key: names.len() as u64,
        };
        Ok(Payload::new(vec![json!(handle)]))
    }
}

#[tokio::test]
async fn back_to_back_calls_get_distinct_names() {
    let recorder = Arc::new(RecordNames::default());
    let (left, right) = port_pair();
    let (_server, _server_reader) = MessageChannel::open(left, recorder.clone());
    let (client, _client_reader) = MessageChannel::open(right, Arc::new(Unhandled));

    let (a, b) = tokio::join!(
        FileHandle::load(&client, vec![1]),
        FileHandle::load(&client, vec![2])
    );
    assert_ne!(a.unwrap().handle(), b.unwrap().handle());

    let names = recorder.names.lock().unwrap().clone();
    assert_eq!(names.len(), 2);
    assert_ne!(names[0], names[1]);
    assert!(names.iter().all(|name| name.starts_with("File.load_")));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn remote_reader_round_trips_through_decode_host() {
    let (host, provider) = decode_host();
    let (host_port, worker_port) = port_pair();
    let (_host_channel, _host_reader) = MessageChannel::open(host_port, host.clone());
    let (worker, _worker_reader) = MessageChannel::open(worker_port, Arc::new(Unhandled));

    let mut reader = RemoteVideoReader::create(
        &worker,
        b"container".to_vec(),
        SyncConfig::new(30.0, 4, 4),
    )
    .await
    .unwrap();
    assert_eq!(host.reader_count(), 1);
    let id = reader.id().unwrap();
    assert_eq!(id.kind, Kind::VideoReader);
    assert_eq!(id.context, host.context());
    assert!(reader.snapshot().is_none());

    assert!(reader.prepare(15).await.unwrap());
    assert_eq!(provider.created()[0].seeks(), vec![0.5]);
    assert_eq!(
        reader.snapshot().and_then(|bitmap| bitmap.pixel(0, 0)),
        Some(SimulatedVideo::frame_color(15))
    );

    let mut surface = TextureSurface::new(4, 4);
    reader.render_to_texture(&mut surface, 2);
    assert_eq!(
        surface.texture(2).and_then(|texture| texture.pixel(3, 3)),
        Some(SimulatedVideo::frame_color(15))
    );
    assert!(reader.refresh().await.unwrap());

    reader.on_destroy().unwrap();
    assert!(matches!(reader.on_destroy(), Err(VideoReaderError::Destroyed)));
    assert!(!reader.prepare(20).await.unwrap());
    assert!(reader.snapshot().is_none());
    wait_until(|| host.reader_count() == 0).await;
}

#[tokio::test]
async fn remote_reader_creation_reports_decoder_failure() {
    let (host, _) = decode_host();
    let (host_port, worker_port) = port_pair();
    let (_host_channel, _host_reader) = MessageChannel::open(host_port, host.clone());
    let (worker, _worker_reader) = MessageChannel::open(worker_port, Arc::new(Unhandled));

    let result = RemoteVideoReader::create(&worker, Vec::new(), SyncConfig::new(30.0, 4, 4)).await;
    let Err(VideoReaderError::Remote(message)) = result else {
        panic!("an empty container should be refused");
    };
    assert!(message.contains("empty video container"), "{message}");
    assert_eq!(host.reader_count(), 0);
}

#[tokio::test]
async fn closing_the_host_fails_remote_prepare() {
    let (host, _) = decode_host();
    let (host_port, worker_port) = port_pair();
    let (host_channel, host_reader) = MessageChannel::open(host_port, host.clone());
    let (worker, worker_reader) = MessageChannel::open(worker_port, Arc::new(Unhandled));

    let mut reader =
        RemoteVideoReader::create(&worker, b"container".to_vec(), SyncConfig::new(30.0, 4, 4))
            .await
            .unwrap();
    host_channel.close();
    host_reader.await.unwrap();
    worker_reader.await.unwrap();

    assert!(worker.is_closed());
    assert!(matches!(
        reader.prepare(3).await,
        Err(VideoReaderError::Remote(_))
    ));
}

#[tokio::test]
async fn in_process_dispatcher_decodes_locally() {
    let (loader, observed) = FakeLoader::new();
    let (backend, provider) = local_backend();
    let dispatcher = Arc::new(Dispatcher::in_process(loader, backend));
    assert!(!dispatcher.is_isolated());

    let (left, right) = port_pair();
    let (_server, _server_reader) = MessageChannel::open(left, dispatcher.clone());
    let (client, _client_reader) = MessageChannel::open(right, Arc::new(Unhandled));

    let spec = FakeFileSpec::with_video(4, 4, 61);
    let message = remote_message(FileHandle::load(&client, spec.bytes()).await);
    assert!(message.contains("not initialized"), "{message}");

    let init = Method::Module(ModuleMethod::Init);
    client.call(init, Vec::new(), Vec::new()).await.unwrap();
    client.call(init, Vec::new(), Vec::new()).await.unwrap();
    assert!(dispatcher.is_initialized());
    assert_eq!(observed.backend(), Some("local"));
    assert_eq!(observed.engine_location(), Some(None));

    let file = FileHandle::load(&client, spec.bytes()).await.unwrap();
    let view = ViewHandle::init(&file, TextureSurface::new(4, 4), None)
        .await
        .unwrap();
    assert_eq!((dispatcher.file_count(), dispatcher.view_count()), (1, 1));

    view.set_progress(1.0).await.unwrap();
    assert!(view.flush().await.unwrap());
    assert_eq!(provider.created()[0].seeks(), vec![2.0]);
    assert_eq!(
        observed.flushes()[0].pixel,
        Some(SimulatedVideo::frame_color(60))
    );

    view.destroy().await.unwrap();
    assert_eq!(dispatcher.view_count(), 0);
    assert_eq!(observed.released_readers(), 1);
}

#[tokio::test]
async fn concurrent_inits_load_the_engine_once() {
    let (loader, observed) = FakeLoader::new();
    let (backend, _) = local_backend();
    let dispatcher = Arc::new(Dispatcher::in_process(loader, backend));

    let (left, right) = port_pair();
    let (_server, _server_reader) = MessageChannel::open(left, dispatcher.clone());
    let (client, _client_reader) = MessageChannel::open(right, Arc::new(Unhandled));

    let init = Method::Module(ModuleMethod::Init);
    let (first, second) = tokio::join!(
        client.call(init, Vec::new(), Vec::new()),
        client.call(init, Vec::new(), Vec::new())
    );
    first.unwrap();
    second.unwrap();
    assert!(dispatcher.is_initialized());
    assert_eq!(observed.loads(), 1);
}
