//! Luminance-only, detail-aware sharpening (step 9)

use crate::color::{self, Rgb};

/// 1-2-1 Gaussian kernel, row-major over the 3x3 neighbourhood
const GAUSSIAN: [f32; 9] = [1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0];
const GAUSSIAN_SUM: f32 = 16.0;

/// Local standard deviation range over which the amount drops to half
const DETAIL_LOW: f32 = 0.02;
const DETAIL_HIGH: f32 = 0.2;

/// Statistics of the 3x3 luminance neighbourhood around one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbourhood {
    pub center: f32,
    pub blur: f32,
    pub std_dev: f32,
}

impl Neighbourhood {
    /// Collect luminance from `pixel(dx, dy)` over the 3x3 window
    ///
    /// `pixel` gets offsets in -1..=1 and returns the graded neighbour.
    pub fn gather<F>(mut pixel: F) -> Self
    where
        F: FnMut(i64, i64) -> Rgb,
    {
        let mut lum = [0.0_f32; 9];
        let mut i = 0;
        for dy in -1..=1_i64 {
            for dx in -1..=1_i64 {
                lum[i] = color::luminance(pixel(dx, dy));
                i += 1;
            }
        }
        Self::from_luminance(lum)
    }

    /// Statistics of nine luminances, row-major, centre at index 4
    pub fn from_luminance(lum: [f32; 9]) -> Self {
        let blur = lum.iter().zip(GAUSSIAN).map(|(l, w)| l * w).sum::<f32>() / GAUSSIAN_SUM;
        let mean = lum.iter().sum::<f32>() / 9.0;
        let variance = lum.iter().map(|l| (l - mean) * (l - mean)).sum::<f32>() / 9.0;

        Self {
            center: lum[4],
            blur,
            std_dev: variance.sqrt(),
        }
    }

    /// High-frequency detail
    pub fn detail(&self) -> f32 {
        self.center - self.blur
    }

    /// Sharpening amount after easing off in already-busy areas
    pub fn adaptive_amount(&self, sharpness: f32) -> f32 {
        let busy = color::smoothstep(DETAIL_LOW, DETAIL_HIGH, self.std_dev);
        sharpness * (1.0 + (0.5 - 1.0) * busy)
    }
}

/// Fade-out near clipped highlights and near black
#[inline]
pub fn protection(l: f32) -> f32 {
    let highlight = 1.0 - color::smoothstep(0.8, 1.0, l);
    let shadow = color::smoothstep(0.0, 0.05, l);
    highlight * shadow
}

/// Inject neighbourhood detail into the luminance of `rgb`
pub fn sharpen(rgb: Rgb, hood: &Neighbourhood, sharpness: f32) -> Rgb {
    let l = color::luminance(rgb);
    if l <= 1e-6 {
        return rgb;
    }

    let new_l = (l + hood.detail() * hood.adaptive_amount(sharpness) * protection(l)).max(0.0);
    rgb * (new_l / l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_flat_area_has_no_detail() {
        let hood = Neighbourhood::gather(|_, _| Rgb::new(0.45, 0.45, 0.45));
        assert_abs_diff_eq!(hood.detail(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(hood.std_dev, 0.0, epsilon = 1e-6);

        let rgb = Rgb::new(0.5, 0.4, 0.3);
        let out = sharpen(rgb, &hood, 2.0);
        assert_abs_diff_eq!(out.x, rgb.x, epsilon = 1e-6);
    }

    #[test]
    fn test_bright_center_gets_brighter() {
        let hood = Neighbourhood::gather(|dx, dy| {
            let v = if (dx, dy) == (0, 0) { 0.37 } else { 0.25 };
            Rgb::new(v, v, v)
        });
        assert!(hood.detail() > 0.0);

        let rgb = Rgb::new(0.45, 0.36, 0.3);
        let out = sharpen(rgb, &hood, 1.0);
        assert!(color::luminance(out) > color::luminance(rgb));
        // chroma ratios survive
        assert_abs_diff_eq!(out.x / out.y, rgb.x / rgb.y, epsilon = 1e-5);
    }

    #[test]
    fn test_gather_visits_window_row_major() {
        let hood = Neighbourhood::gather(|dx, dy| {
            let v = 0.1 * (dx + 2) as f32 + 0.01 * (dy + 2) as f32;
            Rgb::new(v, v, v)
        });
        assert_abs_diff_eq!(hood.center, 0.22, epsilon = 1e-5);
        let manual = Neighbourhood::from_luminance([
            0.11, 0.21, 0.31, //
            0.12, 0.22, 0.32, //
            0.13, 0.23, 0.33,
        ]);
        assert_abs_diff_eq!(hood.blur, manual.blur, epsilon = 1e-5);
    }

    #[test]
    fn test_protection_masks() {
        assert_eq!(protection(0.0), 0.0);
        assert_eq!(protection(1.0), 0.0);
        assert_eq!(protection(0.5), 1.0);
    }

    #[test]
    fn test_busy_areas_get_half_amount() {
        let hood = Neighbourhood { center: 0.5, blur: 0.4, std_dev: 0.5 };
        assert_abs_diff_eq!(hood.adaptive_amount(2.0), 1.0, epsilon = 1e-6);
        let calm = Neighbourhood { center: 0.5, blur: 0.4, std_dev: 0.0 };
        assert_abs_diff_eq!(calm.adaptive_amount(2.0), 2.0, epsilon = 1e-6);
    }
}
