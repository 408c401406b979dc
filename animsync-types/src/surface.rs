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

//! Texture surfaces and view initialization options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::image::ImageBuffer;

/// A display surface with numbered texture slots.
///
/// Stands in for a GPU context: uploading into a slot replaces whatever the slot
/// held before. The surface can be handed to another context as a
/// [`Transferable`](crate::Transferable), after which the sender no longer has it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureSurface {
    pub width: u32,
    pub height: u32,
    textures: BTreeMap<u32, ImageBuffer>,
    upload_count: u64,
}

impl TextureSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            textures: BTreeMap::new(),
            upload_count: 0,
        }
    }

    /// Uploads `image` into texture `slot`.
    pub fn upload(&mut self, slot: u32, image: ImageBuffer) {
        self.textures.insert(slot, image);
        self.upload_count += 1;
    }

    pub fn texture(&self, slot: u32) -> Option<&ImageBuffer> {
        self.textures.get(&slot)
    }

    /// Total uploads performed on this surface.
    pub fn upload_count(&self) -> u64 {
        self.upload_count
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

/// Options passed to the engine when a view is created on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewOptions {
    /// Scale the surface to the display size before rendering.
    pub use_scale: bool,
    /// Render through a 2D canvas instead of a GL context.
    pub use_canvas_2d: bool,
    /// Render the first frame right after initialization.
    pub first_frame: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            use_scale: true,
            use_canvas_2d: false,
            first_frame: true,
        }
    }
}
