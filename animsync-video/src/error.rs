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

use thiserror::Error;

/// Result type for frame synchronizer operations
pub type Result<T> = std::result::Result<T, VideoReaderError>;

/// Errors that can occur while synchronizing a decode resource
#[derive(Error, Debug)]
pub enum VideoReaderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "Failed to decode video: {0}. Start playback after a user gesture, or load a software decoder to decode the video"
    )]
    PlaybackRejected(String),

    #[error("Failed to open decode resource: {0}")]
    Open(String),

    #[error("Video reader has already been destroyed")]
    Destroyed,

    #[error("Failed to stage container file: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Failed to mux elementary stream: {0}")]
    Mux(String),

    #[error("Platform decoder error: {0}")]
    Decoder(String),

    #[error("Platform decoder closed before signaling {0}")]
    DecoderClosed(&'static str),

    #[error("No frame data after {attempts} polls")]
    FrameUnavailable { attempts: u32 },

    #[error("Remote video reader failed: {0}")]
    Remote(String),

    #[error("Unsupported video source for this backend: {0}")]
    UnsupportedSource(&'static str),
}
