//! Exposure and tone shaping: steps 2-6 of the transform

use crate::color::{self, Rgb};

/// Shoulder compression starts here
pub const SHOULDER_THRESHOLD: f32 = 1.0;
/// Width of the compressed region above the threshold
pub const SHOULDER_WIDTH: f32 = 0.2;

/// Linear value that sits at the centre of the log encoding
pub const LOG_MIDDLE_GREY: f32 = 0.18;
const LOG_EPSILON: f32 = 1e-6;

/// Which side of the window a tone curve acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Falloff {
    /// Weight rises through the window (whites, highlights)
    Rising,
    /// Weight falls through the window (blacks, shadows)
    Falling,
}

/// Sigmoid-weighted gamma curve on luminance
#[derive(Debug, Clone, Copy)]
pub struct ToneCurve {
    pub center: f32,
    pub width: f32,
    pub falloff: Falloff,
}

pub const WHITES: ToneCurve = ToneCurve { center: 0.75, width: 0.3, falloff: Falloff::Rising };
pub const BLACKS: ToneCurve = ToneCurve { center: 0.25, width: 0.3, falloff: Falloff::Falling };
pub const HIGHLIGHTS: ToneCurve = ToneCurve { center: 0.9, width: 0.15, falloff: Falloff::Rising };
pub const SHADOWS: ToneCurve = ToneCurve { center: 0.08, width: 0.1, falloff: Falloff::Falling };

impl ToneCurve {
    #[inline]
    pub fn weight(&self, l: f32) -> f32 {
        let rising = 1.0 / (1.0 + (-((l - self.center) / self.width) * 6.0).exp());
        match self.falloff {
            Falloff::Rising => rising,
            Falloff::Falling => 1.0 - rising,
        }
    }

    /// Reshape the luminance of `rgb`, keeping channel ratios
    ///
    /// `control` is the pre-scaled slider value (slider / 100 * 0.5).
    pub fn apply(&self, rgb: Rgb, control: f32) -> Rgb {
        let l = color::luminance(rgb);
        if l <= LOG_EPSILON {
            return rgb;
        }

        let gamma = 1.0 / (1.0 + control * self.weight(l));
        let new_l = l.powf(gamma);
        rgb * (new_l / l)
    }
}

/// Reinhard-style rational shoulder on one channel
#[inline]
pub fn soft_shoulder(value: f32) -> f32 {
    if value <= SHOULDER_THRESHOLD {
        return value;
    }
    let excess = value - SHOULDER_THRESHOLD;
    SHOULDER_THRESHOLD + SHOULDER_WIDTH * (excess / (excess + SHOULDER_WIDTH))
}

/// Multiply by the exposure gain, then compress every channel on its own
pub fn exposure(rgb: Rgb, gain: f32) -> Rgb {
    let scaled = rgb * gain;
    Rgb::new(
        soft_shoulder(scaled.x),
        soft_shoulder(scaled.y),
        soft_shoulder(scaled.z),
    )
}

#[inline]
pub fn log_encode(c: f32) -> f32 {
    (c.max(LOG_EPSILON) / LOG_MIDDLE_GREY).log2() / 10.0 + 0.5
}

#[inline]
pub fn log_decode(v: f32) -> f32 {
    LOG_MIDDLE_GREY * ((v - 0.5) * 10.0).exp2()
}

/// Contrast around the log-space pivot, per channel
#[inline]
fn contrast_channel(c: f32, amount: f32) -> f32 {
    let encoded = (log_encode(c) - 0.5) * (1.0 + amount) + 0.5;
    log_decode(encoded)
}

/// Global contrast in log space (`amount` in -1..1)
pub fn log_contrast(rgb: Rgb, amount: f32) -> Rgb {
    Rgb::new(
        contrast_channel(rgb.x, amount),
        contrast_channel(rgb.y, amount),
        contrast_channel(rgb.z, amount),
    )
}

/// Highlight, midtone and shadow weights for luminance `l`
pub fn zone_masks(l: f32) -> (f32, f32, f32) {
    let highlight = color::smoothstep(0.5, 0.9, l);
    let shadow = 1.0 - color::smoothstep(0.1, 0.5, l);
    let midtone = (1.0 - highlight - shadow).max(0.0);
    (highlight, midtone, shadow)
}

/// Zone contrast: the three controls (each -1..1) blend into one log-space contrast
pub fn zone_contrast(rgb: Rgb, highlight: f32, midtone: f32, shadow: f32) -> Rgb {
    let (h, m, s) = zone_masks(color::luminance(rgb));
    let amount = h * highlight + m * midtone + s * shadow;
    log_contrast(rgb, amount)
}
