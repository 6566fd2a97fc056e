//! Frame data structures for camera and gallery images

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, RgbaImage};
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use crate::error::FrameError;

/// A decoded image handed to the pipeline
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when frame was received
    pub timestamp: Instant,
}

impl Frame {
    /// Create a new frame from an RGBA buffer
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        })
    }

    /// Create a frame filled with a single RGBA color
    #[cfg(test)]
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, FrameError> {
        let pixels = width as usize * height as usize;
        let data = rgba.iter().copied().cycle().take(pixels * 4).collect();
        Self::new(data, width, height)
    }

    /// Convert any decoded image into an RGBA frame
    pub fn from_image(image: DynamicImage) -> Result<Self, FrameError> {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(rgba.into_raw(), width, height)
    }

    /// Decode an image file into a frame
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let image = image::open(path)?;
        Self::from_image(image)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copy the pixels into an owned image buffer
    pub fn to_rgba_image(&self) -> RgbaImage {
        // Dimensions were checked in `new`, so the buffer always fits.
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Encode the frame as a JPEG (alpha is discarded)
    pub fn write_jpeg<W: Write>(&self, writer: W, quality: u8) -> Result<(), image::ImageError> {
        let rgb = DynamicImage::ImageRgba8(self.to_rgba_image()).into_rgb8();
        let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
        encoder.encode(rgb.as_raw(), self.width, self.height, ExtendedColorType::Rgb8)
    }
}
