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

//! Value types shared by the frame synchronizer and the worker channel.
//!
//! Nothing in here owns a decoder or a thread; every type is plain data that can
//! be copied into a message payload or moved across a context boundary.

pub mod image;
pub mod surface;
pub mod time_range;
pub mod transfer;

pub use image::{ImageBuffer, ImageError};
pub use surface::{TextureSurface, ViewOptions};
pub use time_range::TimeRange;
pub use transfer::Transferable;
