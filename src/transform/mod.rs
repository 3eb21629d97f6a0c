//! Per-pixel color transform
//!
//! This is the reference implementation of the kernel in `gpu/shaders.rs`.
//! Stages run in a fixed order:
//!
//! 1. White balance (Bradford, linear light)
//! 2. Exposure with per-channel soft shoulder
//! 3. Whites / blacks curves
//! 4. Highlights / shadows curves
//! 5. Global contrast (log space)
//! 6. Zone contrast (log space)
//! 7. Saturation / vibrance (LCh)
//! 8. Output transform, then gamut map
//! 9. Sharpening (luminance, 3x3 neighbourhood graded through 1-8)
//! 10. Clamp to [0, 1]
//!
//! Every stage whose bit is clear in [`TransformUniforms::stages`] is skipped.

pub mod chroma;
pub mod output;
pub mod sharpen;
pub mod tone;

use crate::color::{self, Rgb};
use crate::gpu::uniforms::{Stages, TransformUniforms};

const U16_MAX: f32 = u16::MAX as f32;

/// Read-only view of an interleaved RGB16 surface
#[derive(Debug, Clone, Copy)]
pub struct SurfaceView<'a> {
    width: u32,
    height: u32,
    data: &'a [u16],
}

impl<'a> SurfaceView<'a> {
    /// `data` must hold `width * height * 3` samples
    pub fn new(width: u32, height: u32, data: &'a [u16]) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 3);
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Normalised pixel at `(x, y)`
    #[inline]
    pub fn fetch(&self, x: u32, y: u32) -> Rgb {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Rgb::new(
            self.data[i] as f32 / U16_MAX,
            self.data[i + 1] as f32 / U16_MAX,
            self.data[i + 2] as f32 / U16_MAX,
        )
    }

    /// Nearest pixel coordinates inside the surface
    #[inline]
    pub fn clamp_coords(&self, x: i64, y: i64) -> (u32, u32) {
        (
            x.clamp(0, self.width as i64 - 1) as u32,
            y.clamp(0, self.height as i64 - 1) as u32,
        )
    }
}

/// Stages 1-8 for the pixel at `(x, y)`: everything up to and including the
/// gamut map, unclamped
pub fn grade(input: &SurfaceView<'_>, x: u32, y: u32, u: &TransformUniforms) -> Rgb {
    let stages = u.stages();
    let mut rgb = input.fetch(x, y);

    if stages.contains(Stages::WHITE_BALANCE) {
        rgb = color::apply(&u.white_balance(), rgb);
    }

    if stages.contains(Stages::EXPOSURE) {
        rgb = tone::exposure(rgb, u.exposure_gain);
    }

    if stages.contains(Stages::WHITES) {
        rgb = tone::WHITES.apply(rgb, u.whites);
    }
    if stages.contains(Stages::BLACKS) {
        rgb = tone::BLACKS.apply(rgb, u.blacks);
    }
    if stages.contains(Stages::HIGHLIGHTS) {
        rgb = tone::HIGHLIGHTS.apply(rgb, u.highlights);
    }
    if stages.contains(Stages::SHADOWS) {
        rgb = tone::SHADOWS.apply(rgb, u.shadows);
    }

    if stages.contains(Stages::CONTRAST) {
        rgb = tone::log_contrast(rgb, u.contrast);
    }
    if stages.contains(Stages::ZONE_CONTRAST) {
        rgb = tone::zone_contrast(
            rgb,
            u.highlight_contrast,
            u.midtone_contrast,
            u.shadow_contrast,
        );
    }

    if stages.intersects(Stages::SATURATION | Stages::VIBRANCE) {
        let saturation = if stages.contains(Stages::SATURATION) { u.saturation } else { 0.0 };
        let vibrance = if stages.contains(Stages::VIBRANCE) { u.vibrance } else { 0.0 };
        rgb = chroma::adjust(rgb, saturation, vibrance);
    }

    output::gamut_map(output::apply(rgb, u.output_mode))
}

/// Run every enabled stage for the pixel at `(x, y)` of `input`
///
/// Returns the clamped display value in [0, 1] per channel. Sharpening
/// measures detail on the graded neighbours, so it only ever sharpens edges
/// that survive stages 1-8.
pub fn shade(input: &SurfaceView<'_>, x: u32, y: u32, u: &TransformUniforms) -> Rgb {
    let mut rgb = grade(input, x, y, u);

    if u.has(Stages::SHARPEN) {
        let hood = sharpen::Neighbourhood::gather(|dx, dy| {
            let (nx, ny) = input.clamp_coords(x as i64 + dx, y as i64 + dy);
            if (nx, ny) == (x, y) {
                rgb
            } else {
                grade(input, nx, ny, u)
            }
        });
        rgb = sharpen::sharpen(rgb, &hood, u.sharpness);
    }

    Rgb::new(
        rgb.x.clamp(0.0, 1.0),
        rgb.y.clamp(0.0, 1.0),
        rgb.z.clamp(0.0, 1.0),
    )
}

/// Quantise a display value to 16 bits
#[inline]
pub fn to_u16(c: f32) -> u16 {
    (c.clamp(0.0, 1.0) * U16_MAX).round() as u16
}

/// Transform one output row into `out` (interleaved RGB, `width * 3` samples)
pub fn shade_row(input: &SurfaceView<'_>, y: u32, u: &TransformUniforms, out: &mut [u16]) {
    for (x, px) in (0..input.width()).zip(out.chunks_exact_mut(3)) {
        let rgb = shade(input, x, y, u);
        px[0] = to_u16(rgb.x);
        px[1] = to_u16(rgb.y);
        px[2] = to_u16(rgb.z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::edit::{AdjustmentParameters, OutputMode};
    use approx::assert_abs_diff_eq;

    fn run(data: &[u16], width: u32, height: u32, params: &AdjustmentParameters, mode: OutputMode) -> Vec<u16> {
        let view = SurfaceView::new(width, height, data);
        let u = TransformUniforms::new(params, mode);
        let mut out = vec![0u16; data.len()];
        for (y, row) in out.chunks_exact_mut(width as usize * 3).enumerate() {
            shade_row(&view, y as u32, &u, row);
        }
        out
    }

    #[test]
    fn test_neutral_sdr_is_identity() {
        let data: Vec<u16> = (0..4 * 3 * 3).map(|i| (i * 1811 % 65536) as u16).collect();
        let out = run(&data, 4, 3, &AdjustmentParameters::default(), OutputMode::Sdr);
        assert_eq!(out, data);
    }

    #[test]
    fn test_exposure_doubles_below_shoulder() {
        let v = to_u16(0.4);
        let data = vec![v; 3];
        let view = SurfaceView::new(1, 1, &data);

        let mut params = AdjustmentParameters::new();
        params.set_exposure(1.0);
        let rgb = shade(&view, 0, 0, &TransformUniforms::new(&params, OutputMode::Sdr));
        assert_abs_diff_eq!(rgb.x, 0.8, epsilon = 1e-4);
        assert_abs_diff_eq!(rgb.z, 0.8, epsilon = 1e-4);
    }

    #[test]
    fn test_contrast_keeps_middle_grey() {
        let data = vec![to_u16(0.18); 3];
        let view = SurfaceView::new(1, 1, &data);
        for contrast in [-1.0, -0.4, 0.6, 1.0] {
            let mut params = AdjustmentParameters::new();
            params.set_contrast(contrast);
            let rgb = shade(&view, 0, 0, &TransformUniforms::new(&params, OutputMode::Sdr));
            assert_abs_diff_eq!(rgb.y, data[0] as f32 / U16_MAX, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_full_desaturation() {
        let data = [to_u16(0.6), to_u16(0.3), to_u16(0.1)];
        let view = SurfaceView::new(1, 1, &data);
        let expected = color::luminance(view.fetch(0, 0));

        let mut params = AdjustmentParameters::new();
        params.set_saturation(-100.0);
        let rgb = shade(&view, 0, 0, &TransformUniforms::new(&params, OutputMode::Sdr));
        assert_abs_diff_eq!(rgb.x, expected, epsilon = 1e-4);
        assert_abs_diff_eq!(rgb.y, expected, epsilon = 1e-4);
        assert_abs_diff_eq!(rgb.z, expected, epsilon = 1e-4);
    }

    #[test]
    fn test_every_mode_stays_in_range() {
        let data: Vec<u16> = (0..8 * 8 * 3).map(|i| (i * 977 % 65536) as u16).collect();
        let mut params = AdjustmentParameters::new();
        params.set_exposure(2.0);
        params.set_vibrance(80.0);
        params.set_sharpness(2.0);
        params.set_temperature(-70.0);
        params.set_shadow_contrast(50.0);

        for mode in OutputMode::ALL {
            let view = SurfaceView::new(8, 8, &data);
            let u = TransformUniforms::new(&params, mode);
            for y in 0..8 {
                for x in 0..8 {
                    let rgb = shade(&view, x, y, &u);
                    for c in [rgb.x, rgb.y, rgb.z] {
                        assert!((0.0..=1.0).contains(&c), "{:?} produced {}", mode, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_warm_white_balance_on_grey() {
        let data = vec![to_u16(0.5); 3];
        let view = SurfaceView::new(1, 1, &data);
        let mut params = AdjustmentParameters::new();
        params.set_temperature(50.0);
        let rgb = shade(&view, 0, 0, &TransformUniforms::new(&params, OutputMode::Sdr));
        assert!(rgb.x > rgb.z);
    }

    #[test]
    fn test_sharpening_sees_graded_edges() {
        // Exposure doubles the step and contrast -1 flattens it back to grey,
        // so there is no edge left to sharpen
        let (dark, light) = (to_u16(0.05), to_u16(0.10));
        let data: Vec<u16> = [dark, dark, light, light].iter().flat_map(|&v| [v; 3]).collect();

        let mut params = AdjustmentParameters::new();
        params.set_exposure(1.0);
        params.set_contrast(-1.0);
        params.set_sharpness(2.0);
        let out = run(&data, 4, 1, &params, OutputMode::Sdr);

        assert!(out.iter().all(|&v| v == out[0]), "{:?}", out);
        assert_abs_diff_eq!(out[0] as f32 / U16_MAX, 0.18, epsilon = 1e-4);
    }

    #[test]
    fn test_hlg_grey_is_filmic_then_hlg() {
        let data = vec![to_u16(0.18); 3];
        let view = SurfaceView::new(1, 1, &data);
        let v = data[0] as f32 / U16_MAX;

        let rgb = shade(&view, 0, 0, &TransformUniforms::new(&AdjustmentParameters::new(), OutputMode::HdrHlg));
        let expected = output::hlg_encode(output::filmic(v));
        assert_abs_diff_eq!(rgb.x, expected, epsilon = 1e-5);
        assert_abs_diff_eq!(rgb.y, expected, epsilon = 1e-5);
        assert_abs_diff_eq!(rgb.z, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_pq_grey_is_filmic_at_peak_nits() {
        let data = vec![to_u16(0.18); 3];
        let view = SurfaceView::new(1, 1, &data);
        let v = data[0] as f32 / U16_MAX;

        let rgb = shade(&view, 0, 0, &TransformUniforms::new(&AdjustmentParameters::new(), OutputMode::HdrPq));
        let expected = output::pq_encode_nits(output::filmic(v) * output::PQ_PEAK_NITS);
        assert_abs_diff_eq!(rgb.x, expected, epsilon = 1e-5);
        assert_abs_diff_eq!(rgb.y, expected, epsilon = 1e-5);
        assert_abs_diff_eq!(rgb.z, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_aces_grey_stays_neutral() {
        let data = vec![to_u16(0.18); 3];
        let view = SurfaceView::new(1, 1, &data);
        let rgb = shade(&view, 0, 0, &TransformUniforms::new(&AdjustmentParameters::new(), OutputMode::AcesFull));
        assert_abs_diff_eq!(rgb.x, rgb.y, epsilon = 1e-3);
        assert_abs_diff_eq!(rgb.y, rgb.z, epsilon = 1e-3);
        assert!(rgb.y > 0.0 && rgb.y < 0.5);
    }

    #[test]
    fn test_gamut_map_follows_every_mode() {
        let data = [to_u16(0.9), to_u16(0.05), to_u16(0.02)];
        let view = SurfaceView::new(1, 1, &data);
        let mut params = AdjustmentParameters::new();
        params.set_saturation(100.0);

        let saturation = TransformUniforms::new(&params, OutputMode::Sdr).saturation;
        let boosted = chroma::adjust(view.fetch(0, 0), saturation, 0.0);
        assert!(!output::in_gamut(output::apply(boosted, crate::gpu::uniforms::MODE_SDR)));

        for mode in OutputMode::ALL {
            let u = TransformUniforms::new(&params, mode);
            let mapped = output::gamut_map(output::apply(boosted, u.output_mode));
            let rgb = shade(&view, 0, 0, &u);
            assert_abs_diff_eq!(rgb.x, mapped.x.clamp(0.0, 1.0), epsilon = 1e-6);
            assert_abs_diff_eq!(rgb.y, mapped.y.clamp(0.0, 1.0), epsilon = 1e-6);
            assert_abs_diff_eq!(rgb.z, mapped.z.clamp(0.0, 1.0), epsilon = 1e-6);
            for c in [mapped.x, mapped.y, mapped.z] {
                assert!(c >= -1e-3, "{:?} left {} below the gamut", mode, c);
            }
        }
    }
}
