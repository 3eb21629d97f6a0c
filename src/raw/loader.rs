/// RAW sensor data loader
///
/// Turns a RAW file into the linear RGB16 [`ImageBuffer`] the pipeline
/// consumes. rawloader does the container parsing; this module normalises
/// the sensor values and collapses each 2x2 CFA cell into one RGB pixel.
/// There is no interpolating demosaic, so Bayer files come out at half
/// resolution.

use std::path::{Path, PathBuf};
use tokio::task;

use crate::error::{PipelineError, Result};
use crate::state::data::{CameraMetadata, ImageBuffer};

/// Decoded pixels plus the camera information that came with them
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub buffer: ImageBuffer,
    pub metadata: CameraMetadata,
}

/// Anything that can produce a linear RGB16 buffer from a file
pub trait RawDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// [`RawDecoder`] backed by rawloader
#[derive(Debug, Default, Clone, Copy)]
pub struct RawLoaderDecoder;

impl RawDecoder for RawLoaderDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        if !path.exists() {
            return Err(PipelineError::Decode(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let decoder = rawloader::RawLoader::new();
        let raw = decoder
            .decode_file(path)
            .map_err(|e| PipelineError::Decode(format!("{}: {:?}", path.display(), e)))?;

        let metadata = CameraMetadata {
            make: raw.clean_make.clone(),
            model: raw.clean_model.clone(),
            wb_multipliers: normalize_white_balance(raw.wb_coeffs),
            black_levels: raw.blacklevels,
            white_levels: raw.whitelevels,
        };

        let frame = SensorFrame {
            width: raw.width,
            height: raw.height,
            cpp: raw.cpp,
            black: raw.blacklevels.map(f32::from),
            white: raw.whitelevels.map(f32::from),
            wb: metadata.wb_multipliers,
        };

        let buffer = match &raw.data {
            rawloader::RawImageData::Integer(values) => {
                frame.develop(|i| values[i] as f32, |row, col| raw.cfa.color_at(row, col))?
            }
            rawloader::RawImageData::Float(values) => {
                frame.develop(|i| values[i], |row, col| raw.cfa.color_at(row, col))?
            }
        };

        log::info!(
            "decoded {} {} {}: {}x{} sensor -> {}x{} RGB",
            metadata.make,
            metadata.model,
            path.display(),
            raw.width,
            raw.height,
            buffer.width(),
            buffer.height()
        );
        Ok(DecodedImage { buffer, metadata })
    }
}

/// [`RawDecoder`] for already developed files (PNG, TIFF, ...) read with `image`
///
/// The file is taken as-is; no transfer function is removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardImageDecoder;

impl RawDecoder for StandardImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        let img = image::open(path)
            .map_err(|e| PipelineError::Decode(format!("{}: {}", path.display(), e)))?;
        Ok(DecodedImage {
            buffer: ImageBuffer::from_dynamic(&img)?,
            metadata: CameraMetadata {
                wb_multipliers: [1.0; 4],
                white_levels: [u16::MAX; 4],
                ..Default::default()
            },
        })
    }
}

/// Decode `path` with rawloader on tokio's blocking pool
pub async fn load_raw(path: PathBuf) -> Result<DecodedImage> {
    load_with(RawLoaderDecoder, path).await
}

/// Decode `path` with any decoder on tokio's blocking pool
pub async fn load_with<D>(decoder: D, path: PathBuf) -> Result<DecodedImage>
where
    D: RawDecoder + 'static,
{
    // Spawn blocking because decoding is CPU-intensive
    task::spawn_blocking(move || decoder.decode(&path))
        .await
        .map_err(|e| PipelineError::Decode(format!("decode task failed: {}", e)))?
}

/// As-shot multipliers scaled so green is 1.0
///
/// Missing or broken coefficients (rawloader reports NaN) fall back to
/// neutral; a missing second green copies the first.
fn normalize_white_balance(coeffs: [f32; 4]) -> [f32; 4] {
    let usable = |c: f32| c.is_finite() && c > 0.0;
    if !(usable(coeffs[0]) && usable(coeffs[1]) && usable(coeffs[2])) {
        log::warn!("no as-shot white balance, using neutral multipliers");
        return [1.0; 4];
    }

    let green = coeffs[1];
    let g2 = if usable(coeffs[3]) { coeffs[3] } else { coeffs[1] };
    [coeffs[0] / green, 1.0, coeffs[2] / green, g2 / green]
}

/// Geometry and levels of one sensor readout
#[derive(Debug, Clone, Copy)]
struct SensorFrame {
    width: usize,
    height: usize,
    /// Components per pixel: 1 for CFA sensors, 3 for linear DNGs and the like
    cpp: usize,
    black: [f32; 4],
    white: [f32; 4],
    wb: [f32; 4],
}

impl SensorFrame {
    /// Black-subtracted, white-scaled and white-balanced value in [0, 1]
    ///
    /// Values past the white level clip before the multiplier is applied.
    #[inline]
    fn normalize(&self, value: f32, color: usize) -> f32 {
        let c = color.min(3);
        let range = (self.white[c] - self.black[c]).max(1.0);
        (((value - self.black[c]) / range).clamp(0.0, 1.0) * self.wb[c]).min(1.0)
    }

    fn develop<S, C>(&self, sample: S, color_at: C) -> Result<ImageBuffer>
    where
        S: Fn(usize) -> f32,
        C: Fn(usize, usize) -> usize,
    {
        match self.cpp {
            1 => self.superpixel(sample, color_at),
            3 => self.passthrough(sample),
            n => Err(PipelineError::Decode(format!(
                "unsupported sensor layout: {} components per pixel",
                n
            ))),
        }
    }

    fn passthrough<S>(&self, sample: S) -> Result<ImageBuffer>
    where
        S: Fn(usize) -> f32,
    {
        let width = dimension(self.width)?;
        let height = dimension(self.height)?;
        ImageBuffer::from_fn(width, height, |x, y| {
            let base = (y as usize * self.width + x as usize) * 3;
            [
                to_u16(self.normalize(sample(base), 0)),
                to_u16(self.normalize(sample(base + 1), 1)),
                to_u16(self.normalize(sample(base + 2), 2)),
            ]
        })
    }

    /// One RGB pixel per 2x2 CFA cell; both greens are averaged
    fn superpixel<S, C>(&self, sample: S, color_at: C) -> Result<ImageBuffer>
    where
        S: Fn(usize) -> f32,
        C: Fn(usize, usize) -> usize,
    {
        let width = dimension(self.width / 2)?;
        let height = dimension(self.height / 2)?;
        ImageBuffer::from_fn(width, height, |x, y| {
            let mut sum = [0.0f32; 3];
            let mut count = [0u32; 3];
            for dy in 0..2 {
                for dx in 0..2 {
                    let (row, col) = (y as usize * 2 + dy, x as usize * 2 + dx);
                    let color = color_at(row, col);
                    // Fourth CFA color (second green / emerald) counts as green
                    let channel = if color >= 3 { 1 } else { color };
                    sum[channel] += self.normalize(sample(row * self.width + col), color);
                    count[channel] += 1;
                }
            }
            let mut rgb = [0u16; 3];
            for c in 0..3 {
                if count[c] > 0 {
                    rgb[c] = to_u16(sum[c] / count[c] as f32);
                }
            }
            rgb
        })
    }
}

fn dimension(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| PipelineError::Decode(format!("image dimension {} too large", n)))
}

#[inline]
fn to_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16
}
