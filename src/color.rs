//! Color space conversion utilities
//!
//! This module handles conversion between the color spaces the transform
//! passes through:
//! - Linear sRGB / Rec.709 (working space of the pipeline, D65)
//! - CIE XYZ and CIELAB / LCh (perceptual chroma adjustments, gamut mapping)
//! - ACES AP0 / AP1 (wide-gamut rendering in the ACES output mode)
//!
//! Matrices are stored row-major as `[[f32; 3]; 3]` so they can be copied
//! straight into GPU uniform rows; cgmath is used where matrices have to be
//! multiplied or inverted.

use cgmath::{Matrix3, SquareMatrix, Vector3};

/// Linear RGB triple
pub type Rgb = Vector3<f32>;

/// Row-major 3x3 matrix
pub type Mat3Rows = [[f32; 3]; 3];

/// Linear sRGB to CIE XYZ (D65)
/// Source: Bruce Lindbloom, derived from the IEC 61966-2-1 primaries
pub const SRGB_TO_XYZ: Mat3Rows = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

/// CIE XYZ (D65) to linear sRGB, the inverse of [`SRGB_TO_XYZ`]
pub const XYZ_TO_SRGB: Mat3Rows = [
    [ 3.2404542, -1.5371385, -0.4985314],
    [-0.9692660,  1.8760108,  0.0415560],
    [ 0.0556434, -0.2040259,  1.0572252],
];

/// Relative luminance weights (the Y row of [`SRGB_TO_XYZ`])
pub const LUMA_WEIGHTS: [f32; 3] = [0.2126729, 0.7151522, 0.0721750];

/// D65 reference white in XYZ, Y normalised to 1
pub const D65_WHITE: [f32; 3] = [0.95047, 1.0, 1.08883];

/// D65 chromaticity
pub const D65_XY: (f32, f32) = (0.31271, 0.32902);

/// Correlated color temperature of D65
pub const D65_CCT: f32 = 6504.0;

/// Bradford cone response matrix
pub const BRADFORD: Mat3Rows = [
    [ 0.8951,  0.2664, -0.1614],
    [-0.7502,  1.7135,  0.0367],
    [ 0.0389, -0.0685,  1.0296],
];

/// Linear Rec.709 to ACES AP0, Bradford-adapted from D65 to the ACES white
pub const REC709_TO_AP0: Mat3Rows = [
    [0.4397010, 0.3829780, 0.1773350],
    [0.0897923, 0.8134230, 0.0967616],
    [0.0175440, 0.1115440, 0.8707040],
];

/// ACES AP0 to AP1 (ACEScg primaries)
pub const AP0_TO_AP1: Mat3Rows = [
    [ 1.4514393161, -0.2365107469, -0.2149285693],
    [-0.0765537734,  1.1762296998, -0.0996759264],
    [ 0.0083161484, -0.0060324498,  0.9977163014],
];

/// ACES AP1 to linear Rec.709, adapted back to D65
pub const AP1_TO_REC709: Mat3Rows = [
    [ 1.7050509, -0.6217921, -0.0832588],
    [-0.1302564,  1.1408047, -0.0105483],
    [-0.0240033, -0.1289690,  1.1529723],
];

/// Luminance weights of the AP1 primaries
pub const AP1_LUMA_WEIGHTS: [f32; 3] = [0.2722287168, 0.6740817658, 0.0536895174];

/// CIE constants for the Lab companding function
const LAB_EPSILON: f32 = 216.0 / 24389.0;
const LAB_KAPPA: f32 = 24389.0 / 27.0;

pub const IDENTITY: Mat3Rows = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

// ========== Matrix helpers ==========

/// Multiply a row-major matrix with a column vector
#[inline]
pub fn apply(m: &Mat3Rows, v: Rgb) -> Rgb {
    Vector3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

/// Row-major array to cgmath matrix (cgmath is column-major)
pub fn to_matrix(m: &Mat3Rows) -> Matrix3<f32> {
    Matrix3::new(
        m[0][0], m[1][0], m[2][0], // Column 0
        m[0][1], m[1][1], m[2][1], // Column 1
        m[0][2], m[1][2], m[2][2], // Column 2
    )
}

/// cgmath matrix back to row-major array
pub fn to_rows(m: &Matrix3<f32>) -> Mat3Rows {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

/// Check if a color matrix is the identity matrix (no conversion)
pub fn is_identity_matrix(matrix: &Mat3Rows) -> bool {
    const EPSILON: f32 = 0.001;

    matrix.iter().enumerate().all(|(r, row)| {
        row.iter().enumerate().all(|(c, &v)| {
            let expected = if r == c { 1.0 } else { 0.0 };
            (v - expected).abs() < EPSILON
        })
    })
}

#[inline]
pub fn luminance(rgb: Rgb) -> f32 {
    LUMA_WEIGHTS[0] * rgb.x + LUMA_WEIGHTS[1] * rgb.y + LUMA_WEIGHTS[2] * rgb.z
}

/// Hermite interpolation between `edge0 < edge1`
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ========== CIELAB / LCh ==========

#[inline]
fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        (LAB_KAPPA * t + 16.0) / 116.0
    }
}

#[inline]
fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (116.0 * f - 16.0) / LAB_KAPPA
    }
}

/// Linear sRGB to CIELAB (D65 reference white), returned as (L, a, b)
pub fn rgb_to_lab(rgb: Rgb) -> Vector3<f32> {
    let xyz = apply(&SRGB_TO_XYZ, rgb);
    let fx = lab_f(xyz.x / D65_WHITE[0]);
    let fy = lab_f(xyz.y / D65_WHITE[1]);
    let fz = lab_f(xyz.z / D65_WHITE[2]);

    Vector3::new(116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

/// CIELAB back to linear sRGB
pub fn lab_to_rgb(lab: Vector3<f32>) -> Rgb {
    let fy = (lab.x + 16.0) / 116.0;
    let fx = fy + lab.y / 500.0;
    let fz = fy - lab.z / 200.0;

    let y = if lab.x > LAB_KAPPA * LAB_EPSILON {
        fy * fy * fy
    } else {
        lab.x / LAB_KAPPA
    };
    let xyz = Vector3::new(
        lab_f_inv(fx) * D65_WHITE[0],
        y * D65_WHITE[1],
        lab_f_inv(fz) * D65_WHITE[2],
    );

    apply(&XYZ_TO_SRGB, xyz)
}

/// Lab to LCh: (L, chroma, hue in radians)
#[inline]
pub fn lab_to_lch(lab: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(lab.x, lab.y.hypot(lab.z), lab.z.atan2(lab.y))
}

#[inline]
pub fn lch_to_lab(lch: Vector3<f32>) -> Vector3<f32> {
    let (sin_h, cos_h) = lch.z.sin_cos();
    Vector3::new(lch.x, lch.y * cos_h, lch.y * sin_h)
}

pub fn rgb_to_lch(rgb: Rgb) -> Vector3<f32> {
    lab_to_lch(rgb_to_lab(rgb))
}

pub fn lch_to_rgb(lch: Vector3<f32>) -> Rgb {
    lab_to_rgb(lch_to_lab(lch))
}

// ========== White balance ==========

/// Chromaticity of the CIE daylight illuminant at `cct` kelvin
///
/// Valid from 4000 K to 25000 K; inputs outside are clamped.
pub fn daylight_chromaticity(cct: f32) -> (f32, f32) {
    let t = cct.clamp(4000.0, 25000.0) as f64;
    let (t2, t3) = (t * t, t * t * t);

    let x = if t <= 7000.0 {
        -4.6070e9 / t3 + 2.9678e6 / t2 + 0.09911e3 / t + 0.244063
    } else {
        -2.0064e9 / t3 + 1.9018e6 / t2 + 0.24748e3 / t + 0.237040
    };
    let y = -3.000 * x * x + 2.870 * x - 0.275;

    (x as f32, y as f32)
}

/// XYZ of a chromaticity with Y = 1
pub fn xy_to_xyz(x: f32, y: f32) -> Vector3<f32> {
    Vector3::new(x / y, 1.0, (1.0 - x - y) / y)
}

/// Bradford chromatic adaptation from `src_white` to `dst_white` (both XYZ)
///
/// # Returns
/// * `None` when the cone matrix cannot be inverted (never for Bradford)
pub fn bradford_adaptation(src_white: Vector3<f32>, dst_white: Vector3<f32>) -> Option<Matrix3<f32>> {
    let cone = to_matrix(&BRADFORD);
    let cone_inv = cone.invert()?;

    let src = cone * src_white;
    let dst = cone * dst_white;
    let scale = Matrix3::from_diagonal(Vector3::new(dst.x / src.x, dst.y / src.y, dst.z / src.z));

    Some(cone_inv * scale * cone)
}

/// White-balance matrix in linear sRGB for the temperature/tint sliders
///
/// The sliders describe the scene illuminant as an offset from D65: temperature
/// walks the daylight locus in mired (+100 is about 9600 K, -100 about 4900 K)
/// and tint moves the white along y. The returned matrix adapts that
/// illuminant back to D65, so positive temperature warms the image and
/// positive tint pushes it towards magenta.
///
/// # Arguments
/// * `temperature` - slider value, -100 to +100
/// * `tint` - slider value, -100 to +100
///
/// # Returns
/// * Row-major matrix for `rgb' = M * rgb`
pub fn white_balance_matrix(temperature: f32, tint: f32) -> Mat3Rows {
    let mired = 1.0e6 / D65_CCT - temperature * 0.5;
    let cct = 1.0e6 / mired;

    let (dx, dy) = {
        let shifted = daylight_chromaticity(cct);
        let reference = daylight_chromaticity(D65_CCT);
        (shifted.0 - reference.0, shifted.1 - reference.1)
    };
    let src_x = D65_XY.0 + dx;
    let src_y = D65_XY.1 + dy + tint / 100.0 * 0.02;

    let dst = xy_to_xyz(D65_XY.0, D65_XY.1);
    let Some(cat) = bradford_adaptation(xy_to_xyz(src_x, src_y), dst) else {
        return IDENTITY;
    };

    let m = to_matrix(&XYZ_TO_SRGB) * cat * to_matrix(&SRGB_TO_XYZ);
    to_rows(&m)
}
