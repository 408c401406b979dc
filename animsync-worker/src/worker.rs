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

//! Starting and stopping an isolated worker context.

use std::sync::Arc;
use std::thread;

use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::channel::{port_pair, MessageChannel, Port};
use crate::decode_host::DecodeHost;
use crate::dispatcher::Dispatcher;
use crate::engine::{EngineLoader, ModuleOptions};
use crate::error::{ChannelError, WorkerError};
use crate::messages::{Method, ModuleMethod};

const WORKER_THREAD_NAME: &str = "animsync-worker";

/// A running worker: its own thread, its own runtime, reachable only
/// through [`channel`](WorkerContext::channel).
pub struct WorkerContext {
    channel: MessageChannel,
    reader: JoinHandle<()>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Starts a worker context and loads the engine in it.
///
/// `host` serves the worker's video decoding from the calling context. The
/// engine location is resolved here through `options` and sent along, since
/// closures cannot cross into the worker. Returns once `Module.init` has
/// completed.
pub async fn spawn_worker(
    loader: Arc<dyn EngineLoader>,
    host: Arc<DecodeHost>,
    options: &ModuleOptions,
) -> Result<WorkerContext, WorkerError> {
    let (client_port, worker_port) = port_pair();
    let thread = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run_worker(worker_port, loader))?;
    let (channel, reader) = MessageChannel::open(client_port, host);
    let mut context = WorkerContext {
        channel,
        reader,
        thread: Some(thread),
    };

    let init = serde_json::to_value(options.to_init_options()).map_err(ChannelError::from)?;
    if let Err(err) = context
        .channel
        .call(Method::Module(ModuleMethod::Init), vec![init], Vec::new())
        .await
    {
        error!("worker failed to initialize: {err}");
        if let Err(shutdown_err) = context.stop().await {
            warn!("{shutdown_err}");
        }
        return Err(err.into());
    }
    info!("worker context ready");
    Ok(context)
}

impl WorkerContext {
    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    /// Closes the channel and waits for the worker thread to exit.
    pub async fn shutdown(mut self) -> Result<(), WorkerError> {
        self.stop().await
    }

    async fn stop(&mut self) -> Result<(), WorkerError> {
        self.channel.close();
        if let Err(err) = (&mut self.reader).await {
            warn!("client read loop ended abnormally: {err}");
        }
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {
                info!("worker context shut down");
                Ok(())
            }
            _ => Err(WorkerError::Panicked),
        }
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        // The worker thread exits on its own once the channel is gone.
        self.channel.close();
    }
}

fn run_worker(port: Port, loader: Arc<dyn EngineLoader>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to build worker runtime: {err}");
            return;
        }
    };
    runtime.block_on(async move {
        let dispatcher = Arc::new(Dispatcher::isolated(loader));
        let (_channel, reader) = MessageChannel::open(port, dispatcher);
        if let Err(err) = reader.await {
            error!("worker read loop ended abnormally: {err}");
        }
    });
    info!("worker context stopped");
}
