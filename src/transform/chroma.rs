//! Saturation and vibrance in LCh

use crate::color::{self, Rgb};

/// Chroma treated as "fully saturated" when normalising for vibrance
pub const VIBRANCE_CHROMA_REFERENCE: f32 = 100.0;

/// Scale chroma linearly (`saturation`) and non-linearly (`vibrance`)
///
/// Both controls are slider / 100. Pass 0.0 for a control whose stage is off.
/// Hue and lightness are left alone; chroma never goes negative.
pub fn adjust(rgb: Rgb, saturation: f32, vibrance: f32) -> Rgb {
    let mut lch = color::rgb_to_lch(rgb);
    let mut chroma = lch.y;

    if saturation != 0.0 {
        chroma = (chroma * (1.0 + saturation)).max(0.0);
    }

    if vibrance != 0.0 {
        let normalized = (chroma / VIBRANCE_CHROMA_REFERENCE).clamp(0.0, 1.0);
        chroma = (chroma + vibrance * (1.0 - normalized) * chroma).max(0.0);
    }

    lch.y = chroma;
    color::lch_to_rgb(lch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_full_desaturation_gives_luminance() {
        let rgb = Rgb::new(0.7, 0.25, 0.1);
        let y = color::luminance(rgb);
        let out = adjust(rgb, -1.0, 0.0);
        assert_abs_diff_eq!(out.x, y, epsilon = 1e-4);
        assert_abs_diff_eq!(out.y, y, epsilon = 1e-4);
        assert_abs_diff_eq!(out.z, y, epsilon = 1e-4);
    }

    #[test]
    fn test_hue_is_kept() {
        let rgb = Rgb::new(0.2, 0.4, 0.3);
        let before = color::rgb_to_lch(rgb);
        let after = color::rgb_to_lch(adjust(rgb, 0.3, 0.0));
        assert_abs_diff_eq!(after.z, before.z, epsilon = 1e-3);
        assert_abs_diff_eq!(after.y, before.y * 1.3, epsilon = 1e-2);
    }

    #[test]
    fn test_vibrance_favours_muted_colors() {
        let muted = Rgb::new(0.35, 0.3, 0.28);
        let vivid = Rgb::new(0.8, 0.1, 0.05);

        let gain = |rgb: Rgb| {
            let before = color::rgb_to_lch(rgb).y;
            let after = color::rgb_to_lch(adjust(rgb, 0.0, 0.5)).y;
            after / before
        };
        assert!(gain(muted) > gain(vivid));
    }

    #[test]
    fn test_vibrance_leaves_greys_grey() {
        let grey = Rgb::new(0.4, 0.4, 0.4);
        let out = adjust(grey, 0.0, 1.0);
        assert_abs_diff_eq!(out.x, out.z, epsilon = 1e-4);
    }
}
