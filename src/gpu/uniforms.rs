//! Uniform block shared by every backend
//!
//! [`TransformUniforms`] is the GPU-friendly form of an
//! [`AdjustmentParameters`] + [`OutputMode`] pair. The ±0.1 dead zone is
//! decided here, once, and recorded in [`Stages`]; kernels only test bits.

use bitflags::bitflags;

use crate::color;
use crate::state::edit::{AdjustmentParameters, OutputMode};

/// Parameters within this distance of neutral leave their stage disabled
pub const DEAD_ZONE: f32 = 0.1;

bitflags! {
    /// Enabled transform stages
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Stages: u32 {
        const WHITE_BALANCE = 1 << 0;
        const EXPOSURE      = 1 << 1;
        const WHITES        = 1 << 2;
        const BLACKS        = 1 << 3;
        const HIGHLIGHTS    = 1 << 4;
        const SHADOWS       = 1 << 5;
        const CONTRAST      = 1 << 6;
        const ZONE_CONTRAST = 1 << 7;
        const SATURATION    = 1 << 8;
        const VIBRANCE      = 1 << 9;
        const SHARPEN       = 1 << 10;
    }
}

/// Output transform selector as seen by the kernel
pub const MODE_SDR: u32 = 0;
pub const MODE_HDR_PQ: u32 = 1;
pub const MODE_HDR_HLG: u32 = 2;
pub const MODE_ACES: u32 = 3;

/// Represents the transform parameters in a GPU-friendly format
/// Must match the WGSL `Uniforms` struct layout (4-float rows, vec4 matrix rows)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformUniforms {
    pub stages: u32,
    pub output_mode: u32,
    _padding0: u32,
    _padding1: u32,

    /// 2^EV, 1.0 when exposure is disabled
    pub exposure_gain: f32,
    /// Global contrast (-1 to 1)
    pub contrast: f32,
    /// Sharpening amount (0 to 2)
    pub sharpness: f32,
    /// Saturation scale offset (-1 to 1)
    pub saturation: f32,

    // Curve controls, slider/100 * 0.5
    pub whites: f32,
    pub blacks: f32,
    pub highlights: f32,
    pub shadows: f32,

    // slider/100
    pub vibrance: f32,
    pub highlight_contrast: f32,
    pub midtone_contrast: f32,
    pub shadow_contrast: f32,

    // White balance matrix split into 3 rows with padding (vec4 in WGSL)
    pub wb_row0: [f32; 4],
    pub wb_row1: [f32; 4],
    pub wb_row2: [f32; 4],
}

#[inline]
fn active(value: f32) -> bool {
    value.abs() > DEAD_ZONE
}

impl TransformUniforms {
    /// Uniforms for the neutral parameter set under `mode`
    pub fn neutral(mode: OutputMode) -> Self {
        Self::new(&AdjustmentParameters::default(), mode)
    }

    pub fn new(params: &AdjustmentParameters, mode: OutputMode) -> Self {
        let mut stages = Stages::empty();

        let wb = if active(params.temperature()) || active(params.tint()) {
            stages |= Stages::WHITE_BALANCE;
            color::white_balance_matrix(params.temperature(), params.tint())
        } else {
            color::IDENTITY
        };

        let exposure_gain = if active(params.exposure()) {
            stages |= Stages::EXPOSURE;
            params.exposure().exp2()
        } else {
            1.0
        };

        let curve = |value: f32, flag: Stages, stages: &mut Stages| {
            if active(value) {
                *stages |= flag;
                value / 100.0 * 0.5
            } else {
                0.0
            }
        };
        let whites = curve(params.whites(), Stages::WHITES, &mut stages);
        let blacks = curve(params.blacks(), Stages::BLACKS, &mut stages);
        let highlights = curve(params.highlights(), Stages::HIGHLIGHTS, &mut stages);
        let shadows = curve(params.shadows(), Stages::SHADOWS, &mut stages);

        if active(params.contrast()) {
            stages |= Stages::CONTRAST;
        }
        if active(params.highlight_contrast())
            || active(params.midtone_contrast())
            || active(params.shadow_contrast())
        {
            stages |= Stages::ZONE_CONTRAST;
        }
        if active(params.saturation()) {
            stages |= Stages::SATURATION;
        }
        if active(params.vibrance()) {
            stages |= Stages::VIBRANCE;
        }
        if active(params.sharpness()) {
            stages |= Stages::SHARPEN;
        }

        Self {
            stages: stages.bits(),
            output_mode: match mode {
                OutputMode::Sdr => MODE_SDR,
                OutputMode::HdrPq => MODE_HDR_PQ,
                OutputMode::HdrHlg => MODE_HDR_HLG,
                OutputMode::AcesFull => MODE_ACES,
            },
            _padding0: 0,
            _padding1: 0,
            exposure_gain,
            contrast: params.contrast(),
            sharpness: params.sharpness(),
            saturation: params.saturation() / 100.0,
            whites,
            blacks,
            highlights,
            shadows,
            vibrance: params.vibrance() / 100.0,
            highlight_contrast: params.highlight_contrast() / 100.0,
            midtone_contrast: params.midtone_contrast() / 100.0,
            shadow_contrast: params.shadow_contrast() / 100.0,
            wb_row0: [wb[0][0], wb[0][1], wb[0][2], 0.0],
            wb_row1: [wb[1][0], wb[1][1], wb[1][2], 0.0],
            wb_row2: [wb[2][0], wb[2][1], wb[2][2], 0.0],
        }
    }

    /// Enabled stages; unknown bits are dropped
    pub fn stages(&self) -> Stages {
        Stages::from_bits_truncate(self.stages)
    }

    pub fn has(&self, stage: Stages) -> bool {
        self.stages().contains(stage)
    }

    /// White-balance matrix, row-major
    pub fn white_balance(&self) -> color::Mat3Rows {
        [
            [self.wb_row0[0], self.wb_row0[1], self.wb_row0[2]],
            [self.wb_row1[0], self.wb_row1[1], self.wb_row1[2]],
            [self.wb_row2[0], self.wb_row2[1], self.wb_row2[2]],
        ]
    }

    /// Raw bytes for `queue.write_buffer`
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_wgsl() {
        // 4 scalar rows + 3 vec4 rows
        assert_eq!(std::mem::size_of::<TransformUniforms>(), 112);
        assert_eq!(std::mem::size_of::<TransformUniforms>() % 16, 0);
    }

    #[test]
    fn test_neutral_enables_nothing() {
        let u = TransformUniforms::neutral(OutputMode::Sdr);
        assert_eq!(u.stages(), Stages::empty());
        assert_eq!(u.exposure_gain, 1.0);
        assert!(color::is_identity_matrix(&u.white_balance()));
    }

    #[test]
    fn test_dead_zone() {
        let mut params = AdjustmentParameters::new();
        params.set_exposure(0.1);
        params.set_saturation(-0.05);
        params.set_tint(0.1);
        let u = TransformUniforms::new(&params, OutputMode::Sdr);
        assert_eq!(u.stages(), Stages::empty());
        assert_eq!(u.exposure_gain, 1.0);

        params.set_exposure(0.11);
        params.set_whites(-20.0);
        let u = TransformUniforms::new(&params, OutputMode::Sdr);
        assert_eq!(u.stages(), Stages::EXPOSURE | Stages::WHITES);
        assert!((u.whites + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_exposure_gain_and_mode() {
        let mut params = AdjustmentParameters::new();
        params.set_exposure(1.0);
        let u = TransformUniforms::new(&params, OutputMode::HdrHlg);
        assert!((u.exposure_gain - 2.0).abs() < 1e-6);
        assert_eq!(u.output_mode, MODE_HDR_HLG);
    }

    #[test]
    fn test_either_white_balance_slider_enables_stage() {
        let mut params = AdjustmentParameters::new();
        params.set_tint(25.0);
        let u = TransformUniforms::new(&params, OutputMode::Sdr);
        assert!(u.has(Stages::WHITE_BALANCE));
        assert!(!color::is_identity_matrix(&u.white_balance()));
    }
}
