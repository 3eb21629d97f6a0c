/// WGSL compute kernel for the color transform
///
/// One invocation per output pixel. The kernel reads the input texture
/// (RGBA16Uint, alpha ignored) and writes the output storage texture; it never
/// writes what it reads. Stage order and math follow `crate::transform`, which
/// is the CPU reference for everything here.

/// Name of the compute entry point
pub const ENTRY_POINT: &str = "cs_main";

/// Placeholder replaced by the workgroup edge length
const WORKGROUP_TOKEN: &str = "{{WORKGROUP_SIZE}}";

pub const TRANSFORM_SHADER: &str = r#"
// ========== Bindings ==========

struct Uniforms {
    stages: u32,
    output_mode: u32,
    _padding0: u32,
    _padding1: u32,
    exposure_gain: f32,
    contrast: f32,
    sharpness: f32,
    saturation: f32,
    whites: f32,
    blacks: f32,
    highlights: f32,
    shadows: f32,
    vibrance: f32,
    highlight_contrast: f32,
    midtone_contrast: f32,
    shadow_contrast: f32,
    wb_row0: vec4<f32>,
    wb_row1: vec4<f32>,
    wb_row2: vec4<f32>,
}

@group(0) @binding(0) var input_tex: texture_2d<u32>;
@group(0) @binding(1) var output_tex: texture_storage_2d<rgba16uint, write>;
@group(0) @binding(2) var<uniform> u: Uniforms;

// ========== Constants ==========

const STAGE_WHITE_BALANCE: u32 = 1u;
const STAGE_EXPOSURE: u32 = 2u;
const STAGE_WHITES: u32 = 4u;
const STAGE_BLACKS: u32 = 8u;
const STAGE_HIGHLIGHTS: u32 = 16u;
const STAGE_SHADOWS: u32 = 32u;
const STAGE_CONTRAST: u32 = 64u;
const STAGE_ZONE_CONTRAST: u32 = 128u;
const STAGE_SATURATION: u32 = 256u;
const STAGE_VIBRANCE: u32 = 512u;
const STAGE_SHARPEN: u32 = 1024u;

const MODE_HDR_PQ: u32 = 1u;
const MODE_HDR_HLG: u32 = 2u;
const MODE_ACES: u32 = 3u;
const PQ_PEAK_SCALE: f32 = 0.1; // 1000 of 10000 nits
const GAMUT_TOLERANCE: f32 = 1e-3;
const HIGHLIGHT_HEADROOM: f32 = 1.25; // chroma ceiling near white, relative to luminance

const LUMA: vec3<f32> = vec3<f32>(0.2126729, 0.7151522, 0.0721750);
const D65_WHITE: vec3<f32> = vec3<f32>(0.95047, 1.0, 1.08883);

const SRGB_TO_XYZ_0: vec3<f32> = vec3<f32>(0.4124564, 0.3575761, 0.1804375);
const SRGB_TO_XYZ_1: vec3<f32> = vec3<f32>(0.2126729, 0.7151522, 0.0721750);
const SRGB_TO_XYZ_2: vec3<f32> = vec3<f32>(0.0193339, 0.1191920, 0.9503041);

const XYZ_TO_SRGB_0: vec3<f32> = vec3<f32>(3.2404542, -1.5371385, -0.4985314);
const XYZ_TO_SRGB_1: vec3<f32> = vec3<f32>(-0.9692660, 1.8760108, 0.0415560);
const XYZ_TO_SRGB_2: vec3<f32> = vec3<f32>(0.0556434, -0.2040259, 1.0572252);

const REC709_TO_AP0_0: vec3<f32> = vec3<f32>(0.4397010, 0.3829780, 0.1773350);
const REC709_TO_AP0_1: vec3<f32> = vec3<f32>(0.0897923, 0.8134230, 0.0967616);
const REC709_TO_AP0_2: vec3<f32> = vec3<f32>(0.0175440, 0.1115440, 0.8707040);

const AP0_TO_AP1_0: vec3<f32> = vec3<f32>(1.4514393161, -0.2365107469, -0.2149285693);
const AP0_TO_AP1_1: vec3<f32> = vec3<f32>(-0.0765537734, 1.1762296998, -0.0996759264);
const AP0_TO_AP1_2: vec3<f32> = vec3<f32>(0.0083161484, -0.0060324498, 0.9977163014);

const AP1_TO_REC709_0: vec3<f32> = vec3<f32>(1.7050509, -0.6217921, -0.0832588);
const AP1_TO_REC709_1: vec3<f32> = vec3<f32>(-0.1302564, 1.1408047, -0.0105483);
const AP1_TO_REC709_2: vec3<f32> = vec3<f32>(-0.0240033, -0.1289690, 1.1529723);

const AP1_LUMA: vec3<f32> = vec3<f32>(0.2722287168, 0.6740817658, 0.0536895174);

const LAB_EPSILON: f32 = 0.008856452;
const LAB_KAPPA: f32 = 903.2963;

// ========== Helpers ==========

fn has_stage(flag: u32) -> bool {
    return (u.stages & flag) != 0u;
}

fn luminance(c: vec3<f32>) -> f32 {
    return dot(c, LUMA);
}

fn mul_rows(r0: vec3<f32>, r1: vec3<f32>, r2: vec3<f32>, v: vec3<f32>) -> vec3<f32> {
    return vec3<f32>(dot(r0, v), dot(r1, v), dot(r2, v));
}

// Hermite step for edge0 < edge1
fn smooth_step(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = clamp((x - edge0) / (edge1 - edge0), 0.0, 1.0);
    return t * t * (3.0 - 2.0 * t);
}

fn fetch(p: vec2<i32>) -> vec3<f32> {
    let dims = vec2<i32>(textureDimensions(input_tex));
    let c = clamp(p, vec2<i32>(0, 0), dims - vec2<i32>(1, 1));
    let texel = textureLoad(input_tex, c, 0);
    return vec3<f32>(texel.rgb) / 65535.0;
}

// ========== Lab / LCh ==========

fn lab_f(t: f32) -> f32 {
    if (t > LAB_EPSILON) {
        return pow(t, 1.0 / 3.0);
    }
    return (LAB_KAPPA * t + 16.0) / 116.0;
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if (cube > LAB_EPSILON) {
        return cube;
    }
    return (116.0 * f - 16.0) / LAB_KAPPA;
}

fn rgb_to_lch(rgb: vec3<f32>) -> vec3<f32> {
    let xyz = mul_rows(SRGB_TO_XYZ_0, SRGB_TO_XYZ_1, SRGB_TO_XYZ_2, rgb) / D65_WHITE;
    let fx = lab_f(xyz.x);
    let fy = lab_f(xyz.y);
    let fz = lab_f(xyz.z);
    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);
    return vec3<f32>(l, sqrt(a * a + b * b), atan2(b, a));
}

fn lch_to_rgb(lch: vec3<f32>) -> vec3<f32> {
    let a = lch.y * cos(lch.z);
    let b = lch.y * sin(lch.z);
    let fy = (lch.x + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    var y = lch.x / LAB_KAPPA;
    if (lch.x > LAB_KAPPA * LAB_EPSILON) {
        y = fy * fy * fy;
    }
    let xyz = vec3<f32>(lab_f_inv(fx), y, lab_f_inv(fz)) * D65_WHITE;
    return mul_rows(XYZ_TO_SRGB_0, XYZ_TO_SRGB_1, XYZ_TO_SRGB_2, xyz);
}

// ========== Tone ==========

fn soft_shoulder(v: f32) -> f32 {
    if (v <= 1.0) {
        return v;
    }
    let excess = v - 1.0;
    return 1.0 + 0.2 * (excess / (excess + 0.2));
}

fn tone_curve(rgb: vec3<f32>, control: f32, center: f32, width: f32, falling: bool) -> vec3<f32> {
    let l = luminance(rgb);
    if (l <= 1e-6) {
        return rgb;
    }
    var w = 1.0 / (1.0 + exp(-((l - center) / width) * 6.0));
    if (falling) {
        w = 1.0 - w;
    }
    let gamma = 1.0 / (1.0 + control * w);
    return rgb * (pow(l, gamma) / l);
}

fn log_contrast(rgb: vec3<f32>, amount: f32) -> vec3<f32> {
    let encoded = log2(max(rgb, vec3<f32>(1e-6)) / 0.18) / 10.0 + 0.5;
    let shaped = (encoded - 0.5) * (1.0 + amount) + 0.5;
    return 0.18 * exp2((shaped - 0.5) * 10.0);
}

fn zone_contrast(rgb: vec3<f32>) -> vec3<f32> {
    let l = luminance(rgb);
    let h = smooth_step(0.5, 0.9, l);
    let s = 1.0 - smooth_step(0.1, 0.5, l);
    let m = max(1.0 - h - s, 0.0);
    let amount = h * u.highlight_contrast + m * u.midtone_contrast + s * u.shadow_contrast;
    return log_contrast(rgb, amount);
}

// ========== Chroma ==========

fn adjust_chroma(rgb: vec3<f32>, saturation: f32, vibrance: f32) -> vec3<f32> {
    var lch = rgb_to_lch(rgb);
    var chroma = lch.y;
    if (saturation != 0.0) {
        chroma = max(chroma * (1.0 + saturation), 0.0);
    }
    if (vibrance != 0.0) {
        let normalized = clamp(chroma / 100.0, 0.0, 1.0);
        chroma = max(chroma + vibrance * (1.0 - normalized) * chroma, 0.0);
    }
    lch.y = chroma;
    return lch_to_rgb(lch);
}

// ========== Output transforms ==========

fn sdr_rolloff(rgb: vec3<f32>) -> vec3<f32> {
    let l = luminance(rgb);
    if (l <= 1.0) {
        return rgb;
    }
    let excess = l - 1.0;
    let new_l = 1.0 + 0.2 * (excess / (excess + 0.2));
    return rgb * (new_l / l);
}

fn hable_partial(x: vec3<f32>) -> vec3<f32> {
    let a = 0.15;
    let b = 0.50;
    let c = 0.10;
    let d = 0.20;
    let e = 0.02;
    let f = 0.30;
    return ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f;
}

fn filmic(x: vec3<f32>) -> vec3<f32> {
    let white = hable_partial(vec3<f32>(11.2));
    return hable_partial(max(x, vec3<f32>(0.0))) / white;
}

fn pq_encode(y: vec3<f32>) -> vec3<f32> {
    let m1 = 2610.0 / 16384.0;
    let m2 = 2523.0 / 4096.0 * 128.0;
    let c1 = 3424.0 / 4096.0;
    let c2 = 2413.0 / 4096.0 * 32.0;
    let c3 = 2392.0 / 4096.0 * 32.0;
    let ym = pow(max(y, vec3<f32>(0.0)), vec3<f32>(m1));
    return pow((c1 + c2 * ym) / (1.0 + c3 * ym), vec3<f32>(m2));
}

fn hlg_channel(e_in: f32) -> f32 {
    let a = 0.17883277;
    let b = 0.28466892;
    let c = 0.55991073;
    let e = max(e_in, 0.0);
    if (e <= 1.0 / 12.0) {
        return sqrt(3.0 * e);
    }
    return a * log(12.0 * e - b) + c;
}

fn sat_weight(rgb: vec3<f32>) -> f32 {
    let lo = min(rgb.x, min(rgb.y, rgb.z));
    let hi = max(rgb.x, max(rgb.y, rgb.z));
    return (max(hi, 1e-10) - max(lo, 1e-10)) / max(hi, 1e-2);
}

fn rgb_to_yc(rgb: vec3<f32>) -> f32 {
    let chroma = sqrt(max(rgb.z * (rgb.z - rgb.y) + rgb.y * (rgb.y - rgb.x) + rgb.x * (rgb.x - rgb.z), 0.0));
    return (rgb.x + rgb.y + rgb.z + 1.75 * chroma) / 3.0;
}

fn sigmoid_shaper(v: f32) -> f32 {
    let x = (v - 0.4) * 5.0;
    let s = sign(x);
    let t = max(1.0 - 0.5 * s * x, 0.0);
    return (1.0 + s * (1.0 - t * t)) * 0.5;
}

fn aces_glow(rgb: vec3<f32>) -> vec3<f32> {
    let yc = rgb_to_yc(rgb);
    let gain = 0.05 * sigmoid_shaper(sat_weight(rgb));
    var glow = 0.0;
    if (yc >= 0.16) {
        glow = 0.0;
    } else if (yc <= 0.16 / 3.0) {
        glow = gain;
    } else {
        glow = gain * (0.08 / yc - 0.5);
    }
    return rgb * (1.0 + glow);
}

fn hue_spline_row(j: i32) -> vec4<f32> {
    if (j == 0) {
        return vec4<f32>(0.25, 0.0, 0.0, 0.0);
    } else if (j == 1) {
        return vec4<f32>(-0.75, 0.75, 0.75, 0.25);
    } else if (j == 2) {
        return vec4<f32>(0.75, -1.5, 0.0, 1.0);
    }
    return vec4<f32>(-0.25, 0.75, -0.75, 0.25);
}

fn aces_red_modifier(rgb: vec3<f32>) -> vec3<f32> {
    let a = 2.0 * rgb.x - (rgb.y + rgb.z);
    let b = sqrt(3.0) * (rgb.y - rgb.z);
    let knot = atan2(b, a) * 1.6976527 + 2.0;
    let j = floor(knot);
    if (j < 0.0 || j >= 4.0) {
        return rgb;
    }
    let t = knot - j;
    let m = hue_spline_row(i32(j));
    let hue = m.w + t * (m.z + t * (m.y + t * m.x));
    if (hue <= 0.0) {
        return rgb;
    }
    let red = rgb.x + hue * sat_weight(rgb) * (0.03 - rgb.x) * (1.0 - 0.82);
    return vec3<f32>(red, rgb.y, rgb.z);
}

fn desaturate_ap1(rgb: vec3<f32>, sat: f32) -> vec3<f32> {
    let y = vec3<f32>(dot(rgb, AP1_LUMA));
    return y + (rgb - y) * sat;
}

fn rrt_odt_fit(v: vec3<f32>) -> vec3<f32> {
    let a = v * (v + 0.0245786) - 0.000090537;
    let b = v * (0.983729 * v + 0.4329510) + 0.238081;
    return a / b;
}

fn aces_full(rgb: vec3<f32>) -> vec3<f32> {
    var ap0 = mul_rows(REC709_TO_AP0_0, REC709_TO_AP0_1, REC709_TO_AP0_2, max(rgb, vec3<f32>(0.0)));
    ap0 = aces_red_modifier(aces_glow(ap0));
    var ap1 = max(mul_rows(AP0_TO_AP1_0, AP0_TO_AP1_1, AP0_TO_AP1_2, ap0), vec3<f32>(0.0));
    ap1 = desaturate_ap1(ap1, 0.96);
    ap1 = rrt_odt_fit(ap1);
    ap1 = desaturate_ap1(ap1, 0.93);
    return mul_rows(AP1_TO_REC709_0, AP1_TO_REC709_1, AP1_TO_REC709_2, ap1);
}

fn output_transform(rgb: vec3<f32>) -> vec3<f32> {
    if (u.output_mode == MODE_HDR_PQ) {
        return pq_encode(filmic(rgb) * PQ_PEAK_SCALE);
    } else if (u.output_mode == MODE_HDR_HLG) {
        let tm = filmic(rgb);
        return vec3<f32>(hlg_channel(tm.x), hlg_channel(tm.y), hlg_channel(tm.z));
    } else if (u.output_mode == MODE_ACES) {
        return aces_full(rgb);
    }
    return sdr_rolloff(rgb);
}

fn in_gamut(rgb: vec3<f32>, tolerance: f32) -> bool {
    return all(rgb >= vec3<f32>(-tolerance)) && all(rgb <= vec3<f32>(1.0 + tolerance));
}

fn fits(rgb: vec3<f32>, ceiling: f32) -> bool {
    return all(rgb >= vec3<f32>(-GAMUT_TOLERANCE)) && all(rgb <= vec3<f32>(ceiling + GAMUT_TOLERANCE));
}

fn gamut_map(rgb: vec3<f32>) -> vec3<f32> {
    if (in_gamut(rgb, 0.0)) {
        return rgb;
    }
    let ceiling = max(luminance(rgb) * HIGHLIGHT_HEADROOM, 1.0);
    if (fits(rgb, ceiling)) {
        return rgb;
    }
    let lch = rgb_to_lch(rgb);
    var lo = 0.0;
    var hi = 1.0;
    for (var i = 0; i < 10; i++) {
        let mid = 0.5 * (lo + hi);
        if (fits(lch_to_rgb(vec3<f32>(lch.x, lch.y * mid, lch.z)), ceiling)) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    return lch_to_rgb(vec3<f32>(lch.x, lch.y * lo, lch.z));
}

// ========== Stages 1-8 ==========

fn grade(p: vec2<i32>) -> vec3<f32> {
    var rgb = fetch(p);

    // 1. White balance
    if (has_stage(STAGE_WHITE_BALANCE)) {
        rgb = mul_rows(u.wb_row0.xyz, u.wb_row1.xyz, u.wb_row2.xyz, rgb);
    }

    // 2. Exposure with per-channel shoulder
    if (has_stage(STAGE_EXPOSURE)) {
        let e = rgb * u.exposure_gain;
        rgb = vec3<f32>(soft_shoulder(e.x), soft_shoulder(e.y), soft_shoulder(e.z));
    }

    // 3-4. Tone curves
    if (has_stage(STAGE_WHITES)) {
        rgb = tone_curve(rgb, u.whites, 0.75, 0.3, false);
    }
    if (has_stage(STAGE_BLACKS)) {
        rgb = tone_curve(rgb, u.blacks, 0.25, 0.3, true);
    }
    if (has_stage(STAGE_HIGHLIGHTS)) {
        rgb = tone_curve(rgb, u.highlights, 0.9, 0.15, false);
    }
    if (has_stage(STAGE_SHADOWS)) {
        rgb = tone_curve(rgb, u.shadows, 0.08, 0.1, true);
    }

    // 5-6. Contrast in log space
    if (has_stage(STAGE_CONTRAST)) {
        rgb = log_contrast(rgb, u.contrast);
    }
    if (has_stage(STAGE_ZONE_CONTRAST)) {
        rgb = zone_contrast(rgb);
    }

    // 7. Saturation / vibrance
    if (has_stage(STAGE_SATURATION) || has_stage(STAGE_VIBRANCE)) {
        let s = select(0.0, u.saturation, has_stage(STAGE_SATURATION));
        let v = select(0.0, u.vibrance, has_stage(STAGE_VIBRANCE));
        rgb = adjust_chroma(rgb, s, v);
    }

    // 8. Output transform + gamut map
    return gamut_map(output_transform(rgb));
}

// ========== Sharpening ==========

// Detail is measured on graded neighbours so it matches what is displayed
fn sharpen(rgb: vec3<f32>, p: vec2<i32>) -> vec3<f32> {
    var lum: array<f32, 9>;
    var i = 0;
    for (var dy = -1; dy <= 1; dy++) {
        for (var dx = -1; dx <= 1; dx++) {
            lum[i] = luminance(grade(p + vec2<i32>(dx, dy)));
            i++;
        }
    }

    let blur = (lum[0] + 2.0 * lum[1] + lum[2]
        + 2.0 * lum[3] + 4.0 * lum[4] + 2.0 * lum[5]
        + lum[6] + 2.0 * lum[7] + lum[8]) / 16.0;

    var mean = 0.0;
    for (var k = 0; k < 9; k++) {
        mean += lum[k];
    }
    mean /= 9.0;
    var variance = 0.0;
    for (var k = 0; k < 9; k++) {
        variance += (lum[k] - mean) * (lum[k] - mean);
    }
    let std_dev = sqrt(variance / 9.0);

    let l = luminance(rgb);
    if (l <= 1e-6) {
        return rgb;
    }
    let amount = u.sharpness * mix(1.0, 0.5, smooth_step(0.02, 0.2, std_dev));
    let protection = (1.0 - smooth_step(0.8, 1.0, l)) * smooth_step(0.0, 0.05, l);
    let new_l = max(l + (lum[4] - blur) * amount * protection, 0.0);
    return rgb * (new_l / l);
}

// ========== Entry point ==========

@compute @workgroup_size({{WORKGROUP_SIZE}}, {{WORKGROUP_SIZE}}, 1)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(output_tex);
    if (gid.x >= dims.x || gid.y >= dims.y) {
        return;
    }
    let p = vec2<i32>(gid.xy);
    var rgb = grade(p);

    // 9. Sharpening
    if (has_stage(STAGE_SHARPEN)) {
        rgb = sharpen(rgb, p);
    }

    // 10. Clamp and quantise
    let display = clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0));
    let q = vec3<u32>(round(display * 65535.0));
    textureStore(output_tex, p, vec4<u32>(q, 65535u));
}
"#;

/// Transform shader with the workgroup size filled in
pub fn transform_shader(workgroup_size: u32) -> String {
    TRANSFORM_SHADER.replace(WORKGROUP_TOKEN, &workgroup_size.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::uniforms::Stages;

    #[test]
    fn test_workgroup_size_is_substituted() {
        let src = transform_shader(8);
        assert!(src.contains("@workgroup_size(8, 8, 1)"));
        assert!(!src.contains(WORKGROUP_TOKEN));
        assert!(src.contains(&format!("fn {}(", ENTRY_POINT)));
    }

    #[test]
    fn test_stage_bits_match_rust_flags() {
        let expected = [
            ("STAGE_WHITE_BALANCE", Stages::WHITE_BALANCE),
            ("STAGE_EXPOSURE", Stages::EXPOSURE),
            ("STAGE_WHITES", Stages::WHITES),
            ("STAGE_BLACKS", Stages::BLACKS),
            ("STAGE_HIGHLIGHTS", Stages::HIGHLIGHTS),
            ("STAGE_SHADOWS", Stages::SHADOWS),
            ("STAGE_CONTRAST", Stages::CONTRAST),
            ("STAGE_ZONE_CONTRAST", Stages::ZONE_CONTRAST),
            ("STAGE_SATURATION", Stages::SATURATION),
            ("STAGE_VIBRANCE", Stages::VIBRANCE),
            ("STAGE_SHARPEN", Stages::SHARPEN),
        ];
        for (name, flag) in expected {
            let decl = format!("const {}: u32 = {}u;", name, flag.bits());
            assert!(TRANSFORM_SHADER.contains(&decl), "missing `{}`", decl);
        }
    }

    #[test]
    fn test_gamut_headroom_matches_cpu() {
        let decl = format!("const HIGHLIGHT_HEADROOM: f32 = {:?};", crate::transform::output::HIGHLIGHT_HEADROOM);
        assert!(TRANSFORM_SHADER.contains(&decl), "missing `{}`", decl);
    }

    #[test]
    fn test_kernel_parses_and_validates() {
        let source = transform_shader(16);
        let module = naga::front::wgsl::parse_str(&source).unwrap_or_else(|e| panic!("{}", e.emit_to_string(&source)));
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::empty())
            .validate(&module)
            .unwrap();

        let entry = module.entry_points.iter().find(|ep| ep.name == ENTRY_POINT).unwrap();
        assert_eq!(entry.stage, naga::ShaderStage::Compute);
        assert_eq!(entry.workgroup_size, [16, 16, 1]);
    }
}
