//! Synthetic media builders for testing.

use std::sync::Arc;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use kindml_core::domain::{FirstFrameNotifier, MediaHandle, PixelBuffer, PixelMask, VideoSource};

use crate::MockFrameProvider;

/// Builder for creating synthetic media handles.
pub struct MediaBuilder;

impl MediaBuilder {
    // === Still images ===

    /// A still image filled with one color.
    #[must_use]
    pub fn still(width: u32, height: u32) -> MediaHandle {
        MediaHandle::still(Self::solid(width, height, [64, 128, 192]))
    }

    /// A solid RGB image.
    #[must_use]
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    /// A high-contrast grayscale checkerboard with 8 pixel cells.
    #[must_use]
    pub fn checkerboard(width: u32, height: u32) -> DynamicImage {
        Self::checkerboard_with_cell_size(width, height, 8)
    }

    /// A checkerboard with custom cell size.
    #[must_use]
    pub fn checkerboard_with_cell_size(width: u32, height: u32, cell_size: u32) -> DynamicImage {
        let cell_size = cell_size.max(1);
        let img = GrayImage::from_fn(width, height, |x, y| {
            if (x / cell_size + y / cell_size) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        DynamicImage::ImageLuma8(img)
    }

    // === Pixel buffers ===

    /// An interleaved buffer where every byte is its index modulo 256.
    ///
    /// # Errors
    ///
    /// Returns an error for zero dimensions or channels other than 1, 3, 4.
    #[allow(clippy::cast_possible_truncation)]
    pub fn pixel_buffer(width: u32, height: u32, channels: u8) -> kindml_core::Result<PixelBuffer> {
        let len = width as usize * height as usize * usize::from(channels);
        let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        PixelBuffer::new(width, height, channels, data)
    }

    // === Videos ===

    /// A video whose first frame has not arrived yet.
    ///
    /// Call [`FirstFrameNotifier::notify`] to make it ready, or drop the
    /// notifier to close the source.
    #[must_use]
    pub fn pending_video(width: u32, height: u32) -> (VideoSource, FirstFrameNotifier) {
        VideoSource::new(Arc::new(MockFrameProvider::new(width, height)))
    }

    /// A video that is already producing frames.
    #[must_use]
    pub fn ready_video(width: u32, height: u32) -> VideoSource {
        VideoSource::ready(Arc::new(MockFrameProvider::new(width, height)))
    }
}

/// Builder for segmentation-style masks.
pub struct MaskBuilder;

impl MaskBuilder {
    /// A mask with every value set to `value`.
    #[must_use]
    pub fn solid(width: u32, height: u32, channels: u8, value: f32) -> PixelMask {
        let len = width as usize * height as usize * usize::from(channels);
        PixelMask {
            width,
            height,
            channels,
            data: vec![value; len],
        }
    }

    /// A single-channel horizontal ramp from 0 to 255.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn horizontal_gradient(width: u32, height: u32) -> PixelMask {
        let span = width.saturating_sub(1).max(1) as f32;
        let data = (0..height)
            .flat_map(|_| (0..width).map(move |x| 255.0 * x as f32 / span))
            .collect();
        PixelMask {
            width,
            height,
            channels: 1,
            data,
        }
    }
}
