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

/// Frames of drift tolerated before a seek is preferred over continuous playback.
/// Also sizes the seek timeout: `VIDEO_DECODE_WAIT_FRAME` frame periods.
pub const VIDEO_DECODE_WAIT_FRAME: u32 = 3;

/// Slowest playback rate the aligner will request.
pub const VIDEO_PLAYBACK_RATE_MIN: f64 = 0.125;

/// Fastest playback rate the aligner will request.
pub const VIDEO_PLAYBACK_RATE_MAX: f64 = 4.0;

/// Content wider or taller than this plays at native rate only.
pub const UHD_RESOLUTION: u32 = 3840;

/// Number of `{frame, time}` samples the rate aligner averages over.
pub const RATE_SAMPLE_WINDOW: usize = 5;

/// Default frame rate when a configuration does not specify one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Bounds for polling a platform decoder for a frame buffer.
pub const FRAME_POLL_MAX_ATTEMPTS: u32 = 256;
pub const FRAME_POLL_INITIAL_INTERVAL_MS: u64 = 1;
pub const FRAME_POLL_MAX_INTERVAL_MS: u64 = 16;
