//! Export side: conversion to and from the `image` crate
//!
//! The container is chosen by `image` from the file extension.

use std::path::Path;

use image::{DynamicImage, Rgb};

use crate::error::{PipelineError, Result};
use crate::state::data::ImageBuffer;

/// 16-bit RGB image in the `image` crate's layout
pub type Rgb16Image = image::ImageBuffer<Rgb<u16>, Vec<u16>>;

impl ImageBuffer {
    /// Copy into an `image` RGB16 container
    pub fn to_rgb16(&self) -> Result<Rgb16Image> {
        Rgb16Image::from_raw(self.width(), self.height(), self.data().to_vec()).ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "{}x{} buffer does not fit an RGB16 image",
                self.width(),
                self.height()
            ))
        })
    }

    /// Build from any decoded `image`, widening to 16 bits per channel
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let rgb = img.to_rgb16();
        let (width, height) = rgb.dimensions();
        Self::new(width, height, rgb.into_raw())
    }
}

/// Write `buffer` to `path`
pub fn save<P: AsRef<Path>>(buffer: &ImageBuffer, path: P) -> Result<()> {
    let path = path.as_ref();
    if buffer.is_empty() {
        return Err(PipelineError::InvalidInput("cannot export an empty image".into()));
    }

    buffer.to_rgb16()?.save(path)?;
    log::info!(
        "exported {}x{} image to {}",
        buffer.width(),
        buffer.height(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::loader::{RawDecoder, StandardImageDecoder};

    fn sample() -> ImageBuffer {
        ImageBuffer::from_fn(5, 4, |x, y| [x as u16 * 13000, y as u16 * 21000, 777]).unwrap()
    }

    #[test]
    fn test_to_rgb16_keeps_layout() {
        let buffer = sample();
        let img = buffer.to_rgb16().unwrap();
        assert_eq!(img.dimensions(), (5, 4));
        assert_eq!(img.get_pixel(3, 2).0, buffer.pixel(3, 2));
    }

    #[test]
    fn test_from_dynamic_widens_8bit() {
        let img = image::RgbImage::from_pixel(2, 1, Rgb([255, 128, 0]));
        let buffer = ImageBuffer::from_dynamic(&DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(buffer.pixel(1, 0), [65535, 128 * 257, 0]);
    }

    #[test]
    fn test_png_export_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graded.png");
        let buffer = sample();
        save(&buffer, &path).unwrap();

        let decoded = StandardImageDecoder.decode(&path).unwrap();
        assert_eq!(decoded.buffer, buffer);
    }

    #[test]
    fn test_empty_export_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let empty = ImageBuffer::new(0, 0, Vec::new()).unwrap();
        assert!(save(&empty, dir.path().join("empty.png")).is_err());
    }
}
