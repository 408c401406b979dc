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

//! Runs the animation engine in an isolated worker context.
//!
//! The client and the worker share nothing but a pair of message ports. The
//! client drives the engine through [`FileHandle`] and [`ViewHandle`] proxies;
//! the worker's [`Dispatcher`] routes those calls to the resources it owns.
//! Video decoding needs the client's host decoders, so the worker reaches back
//! through the same channel to a [`DecodeHost`], using a [`RemoteVideoReader`]
//! as its frame synchronizer.

pub mod backend;
pub mod channel;
pub mod decode_host;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handle;
pub mod messages;
pub mod proxy;
pub mod remote_reader;
pub mod worker;

pub use backend::{DecodeBackend, VideoSource};
pub use channel::{port_pair, MessageChannel, MessageHandler, Port, Unhandled};
pub use decode_host::DecodeHost;
pub use dispatcher::Dispatcher;
pub use engine::{
    Engine, EngineFile, EngineLoader, EngineView, InitOptions, ModuleOptions, ENGINE_MODULE_FILE,
};
pub use error::{ChannelError, DispatchError, WorkerError};
pub use handle::{ContextId, Handle, Kind, Registry};
pub use messages::{Direction, Message, Method, Payload};
pub use proxy::{FileHandle, ViewHandle};
pub use remote_reader::RemoteVideoReader;
pub use worker::{spawn_worker, WorkerContext};
