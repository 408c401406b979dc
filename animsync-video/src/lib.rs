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

//! Frame-accurate synchronization between a host video decoder and a discrete
//! target-frame sequence.
//!
//! A [`VideoReader`](reader::VideoReader) owns one host decode resource and
//! answers `prepare(frame)` by choosing between doing nothing, nudging the
//! playback rate, seeking, or resuming playback. Three variants exist:
//!
//! - [`LocalVideoReader`](reader::LocalVideoReader) drives a video-element style
//!   [`DecodeResource`](resource::DecodeResource) in the current context.
//! - [`NativeBridgeReader`](reader::NativeBridgeReader) stages a container file
//!   and pulls frame buffers from a [`PlatformDecoderService`](platform::PlatformDecoderService).
//! - The remote proxy variant lives in `animsync-worker`, because it talks over
//!   the worker message channel.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod platform;
pub mod rate_aligner;
pub mod reader;
pub mod resource;
pub mod static_ranges;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{NativeBridgeConfig, SyncConfig};
pub use error::{Result, VideoReaderError};
pub use rate_aligner::PlaybackRateAligner;
pub use reader::{LocalVideoReader, NativeBridgeReader, VideoReader};
pub use static_ranges::StaticTimeRanges;
