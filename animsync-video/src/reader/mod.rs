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

mod local;
mod native_bridge;

pub use local::LocalVideoReader;
pub use native_bridge::NativeBridgeReader;

use animsync_types::{ImageBuffer, TextureSurface};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::Result;

/// Keeps a decoded video picture in step with a discrete sequence of target frames.
///
/// Calls on one reader are sequential; `prepare` takes `&mut self` so a second
/// call cannot start before the first resolves.
#[async_trait]
pub trait VideoReader: Send {
    /// Positions the decoder at `target_frame`.
    ///
    /// `Ok(true)` means the picture for the frame is ready. `Ok(false)` means
    /// the reader did its best but could not confirm the position in time, or
    /// has no decode resource any more.
    async fn prepare(&mut self, target_frame: i64) -> Result<bool>;

    /// Uploads the current picture into `slot`. Does nothing while no picture is ready.
    fn render_to_texture(&self, surface: &mut TextureSurface, slot: u32);

    /// Draws the current picture into a fresh image of the content size.
    fn snapshot(&self) -> Option<ImageBuffer>;

    /// Tears the reader down. What is released depends on the variant.
    fn on_destroy(&mut self) -> Result<()>;
}

/// Scales `frame` to `width` x `height`. Returns the frame untouched when it
/// already has that size or when no target size is known.
pub(crate) fn scale_to(frame: ImageBuffer, width: u32, height: u32) -> Option<ImageBuffer> {
    if width == 0 || height == 0 || (frame.width == width && frame.height == height) {
        return Some(frame);
    }
    let source = RgbaImage::from_raw(frame.width, frame.height, frame.data)?;
    let scaled = imageops::resize(&source, width, height, FilterType::Triangle);
    ImageBuffer::from_rgba(width, height, scaled.into_raw()).ok()
}
