//! Shared data structures that flow between the decoder, the pipeline and
//! the export side.

use crate::error::{PipelineError, Result};

/// Linear-light RGB image with 16 bits per channel
///
/// Samples are stored interleaved (`RGBRGB...`), row-major, top row first.
/// The buffer is immutable once built: reallocation means building a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    data: Vec<u16>,
}

impl ImageBuffer {
    /// Channel count, fixed at RGB
    pub const CHANNELS: usize = 3;

    /// Wrap decoded samples, checking that the length matches the dimensions
    pub fn new(width: u32, height: u32, data: Vec<u16>) -> Result<Self> {
        let expected = Self::sample_count(width, height)?;
        if data.len() != expected {
            return Err(PipelineError::InvalidInput(format!(
                "{}x{} RGB image needs {} samples, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Build an image where every pixel has the same value
    pub fn filled(width: u32, height: u32, rgb: [u16; 3]) -> Result<Self> {
        Self::from_fn(width, height, |_, _| rgb)
    }

    /// Build an image by evaluating `f(x, y)` for every pixel
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Result<Self>
    where
        F: FnMut(u32, u32) -> [u16; 3],
    {
        let mut data = Vec::with_capacity(Self::sample_count(width, height)?);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Ok(Self { width, height, data })
    }

    fn sample_count(width: u32, height: u32) -> Result<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(Self::CHANNELS))
            .ok_or_else(|| {
                PipelineError::InvalidInput(format!("{}x{} image is too large", width, height))
            })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        Self::CHANNELS
    }

    /// True when either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw interleaved samples
    pub fn data(&self) -> &[u16] {
        &self.data
    }

    /// Give up the samples without copying
    pub fn into_data(self) -> Vec<u16> {
        self.data
    }

    /// Samples of one pixel
    ///
    /// # Panics
    /// Panics if `(x, y)` lies outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> [u16; 3] {
        assert!(x < self.width && y < self.height, "pixel ({}, {}) out of bounds", x, y);
        let i = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Truncate to 8 bits per channel for quick previews
    pub fn to_8bit(&self) -> Vec<u8> {
        self.data.iter().map(|&v| (v >> 8) as u8).collect()
    }
}

/// Read-only camera information handed over by the RAW decoder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CameraMetadata {
    /// Normalised manufacturer name (e.g. "Nikon")
    pub make: String,
    /// Normalised model name (e.g. "D750")
    pub model: String,
    /// As-shot white balance multipliers [R, G, B, G2], normalised to green
    pub wb_multipliers: [f32; 4],
    /// Per-CFA-position black levels
    pub black_levels: [u16; 4],
    /// Per-CFA-position white (saturation) levels
    pub white_levels: [u16; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_must_match_dimensions() {
        assert!(ImageBuffer::new(2, 2, vec![0; 12]).is_ok());
        let err = ImageBuffer::new(2, 2, vec![0; 11]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_zero_sized_buffer_is_representable() {
        let empty = ImageBuffer::new(0, 5, Vec::new()).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.data().len(), 0);
    }

    #[test]
    fn test_from_fn_layout_is_row_major() {
        let img = ImageBuffer::from_fn(3, 2, |x, y| [x as u16, y as u16, 7]).unwrap();
        assert_eq!(img.data().len(), 3 * 2 * 3);
        assert_eq!(img.pixel(2, 1), [2, 1, 7]);
        assert_eq!(&img.data()[3..6], &[1, 0, 7]);
    }

    #[test]
    fn test_to_8bit_keeps_high_byte() {
        let img = ImageBuffer::filled(1, 1, [0xFFFF, 0x8000, 0x00FF]).unwrap();
        assert_eq!(img.to_8bit(), vec![0xFF, 0x80, 0x00]);
    }
}
