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

use animsync_video::VideoReaderError;
use thiserror::Error;

use crate::handle::Kind;

/// Errors seen by the side that issues a call.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Message channel is closed")]
    Closed,

    #[error("Remote call {name} failed: {message}")]
    Remote { name: String, message: String },

    #[error("Unexpected reply to {name}: {detail}")]
    UnexpectedReply { name: String, detail: String },

    #[error("Failed to encode message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Errors raised while serving an inbound call. They are sent back to the
/// caller as the reply's error text.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown method {0}")]
    UnknownMethod(String),

    #[error("{method} is not served by this context")]
    Unsupported { method: &'static str },

    #[error("{kind} handle does not exist or was destroyed")]
    UnknownHandle { kind: Kind },

    #[error("{kind} handle was issued by context {issuer}, not {context}")]
    ForeignHandle { kind: Kind, issuer: u32, context: u32 },

    #[error("Expected a {expected} handle, got a {found} handle")]
    WrongKind { expected: Kind, found: Kind },

    #[error("{method} expects argument {index}")]
    MissingArgument { method: &'static str, index: usize },

    #[error("{method} argument {index} is invalid: {detail}")]
    InvalidArgument {
        method: &'static str,
        index: usize,
        detail: String,
    },

    #[error("{method} expects a transferred {expected}")]
    MissingTransfer {
        method: &'static str,
        expected: &'static str,
    },

    #[error("Engine module is not initialized")]
    NotInitialized,

    #[error("Failed to initialize engine module: {0}")]
    EngineInit(String),

    #[error("Engine call failed: {0}")]
    Engine(String),

    #[error("A decode host cannot proxy to another context")]
    InvalidBackend,

    #[error(transparent)]
    Video(#[from] VideoReaderError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors starting or stopping a worker context.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Worker initialization failed: {0}")]
    Init(#[from] ChannelError),

    #[error("Worker thread panicked")]
    Panicked,
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
