//! Owned image handle attached to a tracked frame.
//!
//! The collection core only ever asks the handle for its dimensions and
//! pixel width; pixel encoding, conversion and capture belong to the
//! device and codec layers.

use image::{DynamicImage, GenericImageView};

#[derive(Clone, Default)]
pub struct VideoFrame {
    image: Option<DynamicImage>,
}

impl VideoFrame {
    pub fn from_image(image: DynamicImage) -> Self {
        Self { image: Some(image) }
    }

    pub fn is_valid(&self) -> bool {
        self.image.is_some()
    }

    pub fn image(&self) -> Option<&DynamicImage> {
        self.image.as_ref()
    }

    /// `(width, height)`, or `(0, 0)` when no image is attached.
    pub fn frame_size(&self) -> (u32, u32) {
        match &self.image {
            Some(image) => (image.width(), image.height()),
            None => (0, 0),
        }
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match &self.image {
            Some(image) => u32::from(image.color().bytes_per_pixel()),
            None => 0,
        }
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (width, height) = self.frame_size();
        f.debug_struct("VideoFrame")
            .field("width", &width)
            .field("height", &height)
            .field("bytes_per_pixel", &self.bytes_per_pixel())
            .finish()
    }
}
