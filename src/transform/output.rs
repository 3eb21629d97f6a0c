//! Output transforms (step 8): SDR rolloff, HDR encodings, ACES rendering
//! and the adaptive gamut map that follows all of them.

use crate::color::{self, Rgb};
use crate::gpu::uniforms::{MODE_ACES, MODE_HDR_HLG, MODE_HDR_PQ};

// ========== SDR ==========

/// Width of the luminance rolloff above 1.0
pub const SDR_SHOULDER: f32 = 0.2;

/// Compress luminance above 1.0, keeping chromaticity; everything below is untouched
pub fn sdr_rolloff(rgb: Rgb) -> Rgb {
    let l = color::luminance(rgb);
    if l <= 1.0 {
        return rgb;
    }
    let excess = l - 1.0;
    let new_l = 1.0 + SDR_SHOULDER * (excess / (excess + SDR_SHOULDER));
    rgb * (new_l / l)
}

// ========== Filmic (Hable) ==========

mod hable {
    pub const A: f32 = 0.15; // shoulder strength
    pub const B: f32 = 0.50; // linear strength
    pub const C: f32 = 0.10; // linear angle
    pub const D: f32 = 0.20; // toe strength
    pub const E: f32 = 0.02; // toe numerator
    pub const F: f32 = 0.30; // toe denominator
    pub const WHITE: f32 = 11.2;
}

#[inline]
fn hable_partial(x: f32) -> f32 {
    use hable::*;
    ((x * (A * x + C * B) + D * E) / (x * (A * x + B) + D * F)) - E / F
}

/// Filmic curve normalised so `WHITE` maps to 1.0
#[inline]
pub fn filmic(x: f32) -> f32 {
    hable_partial(x.max(0.0)) / hable_partial(hable::WHITE)
}

// ========== Transfer functions ==========

/// Peak luminance the filmic output is mapped to before PQ encoding
pub const PQ_PEAK_NITS: f32 = 1000.0;

mod pq {
    pub const L_MAX: f32 = 10000.0;
    pub const M1: f32 = 2610.0 / 16384.0;
    pub const M2: f32 = 2523.0 / 4096.0 * 128.0;
    pub const C1: f32 = 3424.0 / 4096.0;
    pub const C2: f32 = 2413.0 / 4096.0 * 32.0;
    pub const C3: f32 = 2392.0 / 4096.0 * 32.0;
}

/// SMPTE ST 2084 inverse EOTF for luminance normalised to 10000 nits
#[inline]
pub fn pq_encode(y: f32) -> f32 {
    use pq::*;
    let ym = y.max(0.0).powf(M1);
    ((C1 + C2 * ym) / (1.0 + C3 * ym)).powf(M2)
}

/// Absolute luminance in nits to a PQ signal
#[inline]
pub fn pq_encode_nits(nits: f32) -> f32 {
    pq_encode(nits / pq::L_MAX)
}

mod hlg {
    pub const A: f32 = 0.17883277;
    pub const B: f32 = 0.28466892; // 1 - 4*A
    pub const C: f32 = 0.55991073; // 0.5 - A*ln(4*A)
}

/// ITU-R BT.2100 HLG OETF (scene light 0..1 to signal 0..1)
#[inline]
pub fn hlg_encode(e: f32) -> f32 {
    use hlg::*;
    let e = e.max(0.0);
    if e <= 1.0 / 12.0 {
        (3.0 * e).sqrt()
    } else {
        A * (12.0 * e - B).ln() + C
    }
}

fn hdr_pq(rgb: Rgb) -> Rgb {
    let scale = PQ_PEAK_NITS / pq::L_MAX;
    Rgb::new(
        pq_encode(filmic(rgb.x) * scale),
        pq_encode(filmic(rgb.y) * scale),
        pq_encode(filmic(rgb.z) * scale),
    )
}

fn hdr_hlg(rgb: Rgb) -> Rgb {
    Rgb::new(
        hlg_encode(filmic(rgb.x)),
        hlg_encode(filmic(rgb.y)),
        hlg_encode(filmic(rgb.z)),
    )
}

// ========== ACES ==========

mod aces {
    pub const GLOW_GAIN: f32 = 0.05;
    pub const GLOW_MID: f32 = 0.08;
    pub const RED_SCALE: f32 = 0.82;
    pub const RED_PIVOT: f32 = 0.03;
    /// 4 / (135 degrees in radians)
    pub const RED_INV_WIDTH: f32 = 1.6976527;
    pub const NOISE_LIMIT: f32 = 1e-2;
    pub const RRT_SAT: f32 = 0.96;
    pub const ODT_SAT: f32 = 0.93;

    pub const HUE_BSPLINE: [[f32; 4]; 4] = [
        [ 0.25,  0.00,  0.00,  0.00],
        [-0.75,  0.75,  0.75,  0.25],
        [ 0.75, -1.50,  0.00,  1.00],
        [-0.25,  0.75, -0.75,  0.25],
    ];
}

#[inline]
fn sat_weight(rgb: Rgb) -> f32 {
    let lo = rgb.x.min(rgb.y).min(rgb.z);
    let hi = rgb.x.max(rgb.y).max(rgb.z);
    (hi.max(1e-10) - lo.max(1e-10)) / hi.max(aces::NOISE_LIMIT)
}

/// Luma plus a chroma term, the ACES "YC" used by the glow module
#[inline]
fn rgb_to_yc(rgb: Rgb) -> f32 {
    const RADIUS_WEIGHT: f32 = 1.75;
    let chroma = (rgb.z * (rgb.z - rgb.y) + rgb.y * (rgb.y - rgb.x) + rgb.x * (rgb.x - rgb.z))
        .max(0.0)
        .sqrt();
    (rgb.x + rgb.y + rgb.z + RADIUS_WEIGHT * chroma) / 3.0
}

#[inline]
fn sigmoid_shaper(x: f32) -> f32 {
    let x = (x - 0.4) * 5.0;
    let sign = x.signum();
    let t = (1.0 - 0.5 * sign * x).max(0.0);
    (1.0 + sign * (1.0 - t * t)) * 0.5
}

fn glow(rgb: Rgb) -> Rgb {
    use aces::*;
    let yc = rgb_to_yc(rgb);
    let gain = GLOW_GAIN * sigmoid_shaper(sat_weight(rgb));

    let glow_out = if yc >= GLOW_MID * 2.0 {
        0.0
    } else if yc <= GLOW_MID * 2.0 / 3.0 {
        gain
    } else {
        gain * (GLOW_MID / yc - 0.5)
    };
    rgb * (1.0 + glow_out)
}

#[inline]
fn red_hue_weight(rgb: Rgb) -> f32 {
    let a = 2.0 * rgb.x - (rgb.y + rgb.z);
    let b = 3.0_f32.sqrt() * (rgb.y - rgb.z);
    let knot = b.atan2(a) * aces::RED_INV_WIDTH + 2.0;
    let j = knot.floor();
    if !(0.0..4.0).contains(&j) {
        return 0.0;
    }
    let t = knot - j;
    let m = aces::HUE_BSPLINE[j as usize];
    m[3] + t * (m[2] + t * (m[1] + t * m[0]))
}

fn red_modifier(rgb: Rgb) -> Rgb {
    use aces::*;
    let hue = red_hue_weight(rgb);
    if hue <= 0.0 {
        return rgb;
    }
    let red = rgb.x + hue * sat_weight(rgb) * (RED_PIVOT - rgb.x) * (1.0 - RED_SCALE);
    Rgb::new(red, rgb.y, rgb.z)
}

#[inline]
fn desaturate_ap1(rgb: Rgb, sat: f32) -> Rgb {
    let w = color::AP1_LUMA_WEIGHTS;
    let y = w[0] * rgb.x + w[1] * rgb.y + w[2] * rgb.z;
    Rgb::new(y, y, y) + (rgb - Rgb::new(y, y, y)) * sat
}

/// Stephen Hill's fit of the ACES RRT + sRGB ODT curve
#[inline]
pub fn rrt_odt_fit(v: f32) -> f32 {
    let a = v * (v + 0.0245786) - 0.000090537;
    let b = v * (0.983729 * v + 0.4329510) + 0.238081;
    a / b
}

fn aces_full(rgb: Rgb) -> Rgb {
    let clamp0 = |c: Rgb| Rgb::new(c.x.max(0.0), c.y.max(0.0), c.z.max(0.0));

    let ap0 = color::apply(&color::REC709_TO_AP0, clamp0(rgb));
    let ap0 = red_modifier(glow(ap0));

    let ap1 = clamp0(color::apply(&color::AP0_TO_AP1, ap0));
    let ap1 = desaturate_ap1(ap1, aces::RRT_SAT);
    let ap1 = Rgb::new(rrt_odt_fit(ap1.x), rrt_odt_fit(ap1.y), rrt_odt_fit(ap1.z));
    let ap1 = desaturate_ap1(ap1, aces::ODT_SAT);

    color::apply(&color::AP1_TO_REC709, ap1)
}

// ========== Dispatch ==========

/// Apply the output transform selected by `mode` (a `MODE_*` constant)
pub fn apply(rgb: Rgb, mode: u32) -> Rgb {
    match mode {
        MODE_HDR_PQ => hdr_pq(rgb),
        MODE_HDR_HLG => hdr_hlg(rgb),
        MODE_ACES => aces_full(rgb),
        _ => sdr_rolloff(rgb),
    }
}

// ========== Gamut mapping ==========

const GAMUT_STEPS: u32 = 10;
const GAMUT_TOLERANCE: f32 = 1e-3;
/// Ceiling of the chroma search relative to luminance
///
/// The display cube narrows to a point at white, so highlights near or above
/// luminance 1 would lose all chroma against a ceiling of 1.0. The search
/// ceiling is `max(1, HIGHLIGHT_HEADROOM * Y)` and the final clamp trims
/// what is left above 1.
pub const HIGHLIGHT_HEADROOM: f32 = 1.25;

#[inline]
pub fn in_gamut(rgb: Rgb) -> bool {
    [rgb.x, rgb.y, rgb.z].iter().all(|c| (0.0..=1.0).contains(c))
}

/// Channel ceiling the chroma search aims for at luminance `y`
#[inline]
pub fn gamut_ceiling(y: f32) -> f32 {
    (y * HIGHLIGHT_HEADROOM).max(1.0)
}

#[inline]
fn fits(rgb: Rgb, ceiling: f32) -> bool {
    [rgb.x, rgb.y, rgb.z]
        .iter()
        .all(|&c| c >= -GAMUT_TOLERANCE && c <= ceiling + GAMUT_TOLERANCE)
}

/// Pull out-of-gamut colors back by shrinking LCh chroma at constant hue
///
/// In-gamut pixels are returned untouched. Otherwise the largest chroma
/// scale that lands inside `[0, gamut_ceiling(Y)]` is found by bisection;
/// the further out the pixel is, the more its chroma shrinks. Lightness,
/// and with it Y, does not change.
pub fn gamut_map(rgb: Rgb) -> Rgb {
    if in_gamut(rgb) {
        return rgb;
    }

    let ceiling = gamut_ceiling(color::luminance(rgb));
    if fits(rgb, ceiling) {
        return rgb;
    }

    let lch = color::rgb_to_lch(rgb);
    let with_scale = |s: f32| color::lch_to_rgb(color::Rgb::new(lch.x, lch.y * s, lch.z));

    let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
    for _ in 0..GAMUT_STEPS {
        let mid = 0.5 * (lo + hi);
        if fits(with_scale(mid), ceiling) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    with_scale(lo)
}
