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

//! Payloads whose ownership moves with a message.

use crate::image::ImageBuffer;
use crate::surface::TextureSurface;

/// A resource handed to the receiving context by move rather than by copy.
///
/// Transferables travel beside the serialized part of a message. Once a message
/// is posted its transfer list belongs to the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transferable {
    /// Raw bytes, e.g. an encoded file or a video container.
    Buffer(Vec<u8>),
    /// A decoded snapshot image.
    Image(ImageBuffer),
    /// A display surface the receiver will render into.
    Surface(TextureSurface),
}

impl Transferable {
    /// Short tag used in log lines and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Transferable::Buffer(_) => "buffer",
            Transferable::Image(_) => "image",
            Transferable::Surface(_) => "surface",
        }
    }

    pub fn into_buffer(self) -> Option<Vec<u8>> {
        match self {
            Transferable::Buffer(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_image(self) -> Option<ImageBuffer> {
        match self {
            Transferable::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn into_surface(self) -> Option<TextureSurface> {
        match self {
            Transferable::Surface(surface) => Some(surface),
            _ => None,
        }
    }
}
