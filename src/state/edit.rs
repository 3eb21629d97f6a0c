//! Non-destructive adjustment parameters
//!
//! This struct stores all adjustments made to an image. Every value is
//! clamped to its declared range when written, so anything stored here is
//! always safe to hand to the transform. It is serialized to JSON as a flat
//! set of named floats for the edit store.

use serde::{Deserialize, Serialize};

/// Every adjustable field of [`AdjustmentParameters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Adjustment {
    Exposure,
    Contrast,
    Sharpness,
    Temperature,
    Tint,
    Highlights,
    Shadows,
    Whites,
    Blacks,
    Vibrance,
    Saturation,
    HighlightContrast,
    MidtoneContrast,
    ShadowContrast,
}

impl Adjustment {
    pub const ALL: [Adjustment; 14] = [
        Adjustment::Exposure,
        Adjustment::Contrast,
        Adjustment::Sharpness,
        Adjustment::Temperature,
        Adjustment::Tint,
        Adjustment::Highlights,
        Adjustment::Shadows,
        Adjustment::Whites,
        Adjustment::Blacks,
        Adjustment::Vibrance,
        Adjustment::Saturation,
        Adjustment::HighlightContrast,
        Adjustment::MidtoneContrast,
        Adjustment::ShadowContrast,
    ];

    /// Inclusive `(min, max)` range of the field
    pub fn range(self) -> (f32, f32) {
        match self {
            Adjustment::Exposure => (-3.0, 3.0),
            Adjustment::Contrast => (-1.0, 1.0),
            Adjustment::Sharpness => (0.0, 2.0),
            _ => (-100.0, 100.0),
        }
    }

    /// Value that leaves the image untouched
    pub fn default_value(self) -> f32 {
        0.0
    }

    /// Name used when the parameters are persisted
    pub fn key(self) -> &'static str {
        match self {
            Adjustment::Exposure => "exposure",
            Adjustment::Contrast => "contrast",
            Adjustment::Sharpness => "sharpness",
            Adjustment::Temperature => "temperature",
            Adjustment::Tint => "tint",
            Adjustment::Highlights => "highlights",
            Adjustment::Shadows => "shadows",
            Adjustment::Whites => "whites",
            Adjustment::Blacks => "blacks",
            Adjustment::Vibrance => "vibrance",
            Adjustment::Saturation => "saturation",
            Adjustment::HighlightContrast => "highlight_contrast",
            Adjustment::MidtoneContrast => "midtone_contrast",
            Adjustment::ShadowContrast => "shadow_contrast",
        }
    }

    fn clamp(self, value: f32) -> f32 {
        if value.is_nan() {
            log::warn!("NaN written to {}, storing default", self.key());
            return self.default_value();
        }
        let (min, max) = self.range();
        value.clamp(min, max)
    }
}

/// Final tone-mapping / encoding stage
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Linear display output with a gentle rolloff above 1.0
    #[default]
    Sdr,
    /// Filmic tone map, SMPTE ST 2084 encoding
    HdrPq,
    /// Filmic tone map, ITU-R BT.2100 HLG encoding
    HdrHlg,
    /// Wide-gamut ACES-style rendering with a fitted S-curve
    AcesFull,
}

impl OutputMode {
    pub const ALL: [OutputMode; 4] = [
        OutputMode::Sdr,
        OutputMode::HdrPq,
        OutputMode::HdrHlg,
        OutputMode::AcesFull,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::Sdr => "sdr",
            OutputMode::HdrPq => "hdr_pq",
            OutputMode::HdrHlg => "hdr_hlg",
            OutputMode::AcesFull => "aces_full",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        OutputMode::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

/// All adjustment values for one image
///
/// Fields are private: [`AdjustmentParameters::set`] is the only way to
/// change them, and it clamps. Reads never clamp.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(from = "StoredAdjustments")]
pub struct AdjustmentParameters {
    // ========== Exposure & Tone ==========
    /// Exposure in stops (-3.0 to +3.0)
    exposure: f32,
    /// Global contrast (-1.0 to +1.0), applied in log space
    contrast: f32,
    /// Luminance sharpening amount (0.0 = off, 2.0 = maximum)
    sharpness: f32,

    // ========== White Balance ==========
    /// Warm/cool shift (-100 to +100)
    temperature: f32,
    /// Green/magenta shift (-100 to +100)
    tint: f32,

    // ========== Tone Curve ==========
    highlights: f32,
    shadows: f32,
    whites: f32,
    blacks: f32,

    // ========== Color ==========
    vibrance: f32,
    saturation: f32,

    // ========== Zone Contrast ==========
    highlight_contrast: f32,
    midtone_contrast: f32,
    shadow_contrast: f32,
}

impl Default for AdjustmentParameters {
    /// All values at "no adjustment"
    fn default() -> Self {
        Self {
            exposure: 0.0,
            contrast: 0.0,
            sharpness: 0.0,
            temperature: 0.0,
            tint: 0.0,
            highlights: 0.0,
            shadows: 0.0,
            whites: 0.0,
            blacks: 0.0,
            vibrance: 0.0,
            saturation: 0.0,
            highlight_contrast: 0.0,
            midtone_contrast: 0.0,
            shadow_contrast: 0.0,
        }
    }
}

macro_rules! named_accessors {
    ($($field:ident, $setter:ident => $variant:ident;)*) => {
        impl AdjustmentParameters {
            $(
                pub fn $field(&self) -> f32 {
                    self.$field
                }

                pub fn $setter(&mut self, value: f32) {
                    self.set(Adjustment::$variant, value);
                }
            )*
        }
    };
}

named_accessors! {
    exposure, set_exposure => Exposure;
    contrast, set_contrast => Contrast;
    sharpness, set_sharpness => Sharpness;
    temperature, set_temperature => Temperature;
    tint, set_tint => Tint;
    highlights, set_highlights => Highlights;
    shadows, set_shadows => Shadows;
    whites, set_whites => Whites;
    blacks, set_blacks => Blacks;
    vibrance, set_vibrance => Vibrance;
    saturation, set_saturation => Saturation;
    highlight_contrast, set_highlight_contrast => HighlightContrast;
    midtone_contrast, set_midtone_contrast => MidtoneContrast;
    shadow_contrast, set_shadow_contrast => ShadowContrast;
}

impl AdjustmentParameters {
    /// Create new default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` clamped to the field's range
    pub fn set(&mut self, field: Adjustment, value: f32) {
        *self.slot(field) = field.clamp(value);
    }

    /// Read a field by name
    pub fn get(&self, field: Adjustment) -> f32 {
        match field {
            Adjustment::Exposure => self.exposure,
            Adjustment::Contrast => self.contrast,
            Adjustment::Sharpness => self.sharpness,
            Adjustment::Temperature => self.temperature,
            Adjustment::Tint => self.tint,
            Adjustment::Highlights => self.highlights,
            Adjustment::Shadows => self.shadows,
            Adjustment::Whites => self.whites,
            Adjustment::Blacks => self.blacks,
            Adjustment::Vibrance => self.vibrance,
            Adjustment::Saturation => self.saturation,
            Adjustment::HighlightContrast => self.highlight_contrast,
            Adjustment::MidtoneContrast => self.midtone_contrast,
            Adjustment::ShadowContrast => self.shadow_contrast,
        }
    }

    fn slot(&mut self, field: Adjustment) -> &mut f32 {
        match field {
            Adjustment::Exposure => &mut self.exposure,
            Adjustment::Contrast => &mut self.contrast,
            Adjustment::Sharpness => &mut self.sharpness,
            Adjustment::Temperature => &mut self.temperature,
            Adjustment::Tint => &mut self.tint,
            Adjustment::Highlights => &mut self.highlights,
            Adjustment::Shadows => &mut self.shadows,
            Adjustment::Whites => &mut self.whites,
            Adjustment::Blacks => &mut self.blacks,
            Adjustment::Vibrance => &mut self.vibrance,
            Adjustment::Saturation => &mut self.saturation,
            Adjustment::HighlightContrast => &mut self.highlight_contrast,
            Adjustment::MidtoneContrast => &mut self.midtone_contrast,
            Adjustment::ShadowContrast => &mut self.shadow_contrast,
        }
    }

    /// Check if every value is at its default
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Reset all adjustments to default (used when an image has no saved edits)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Convert to JSON string for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON; missing fields take defaults, out-of-range values are clamped
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Persisted shape: any subset of named floats
#[derive(Deserialize, Default)]
#[serde(default)]
struct StoredAdjustments {
    exposure: f32,
    contrast: f32,
    sharpness: f32,
    temperature: f32,
    tint: f32,
    highlights: f32,
    shadows: f32,
    whites: f32,
    blacks: f32,
    vibrance: f32,
    saturation: f32,
    highlight_contrast: f32,
    midtone_contrast: f32,
    shadow_contrast: f32,
}

impl From<StoredAdjustments> for AdjustmentParameters {
    fn from(s: StoredAdjustments) -> Self {
        let mut params = AdjustmentParameters::default();
        let values = [
            s.exposure,
            s.contrast,
            s.sharpness,
            s.temperature,
            s.tint,
            s.highlights,
            s.shadows,
            s.whites,
            s.blacks,
            s.vibrance,
            s.saturation,
            s.highlight_contrast,
            s.midtone_contrast,
            s.shadow_contrast,
        ];
        for (field, value) in Adjustment::ALL.into_iter().zip(values) {
            params.set(field, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_neutral() {
        let params = AdjustmentParameters::default();
        assert!(params.is_neutral());
        for field in Adjustment::ALL {
            assert_eq!(params.get(field), field.default_value());
        }
    }

    #[test]
    fn test_writes_are_clamped() {
        let mut params = AdjustmentParameters::new();
        params.set_exposure(10.0);
        assert_eq!(params.exposure(), 3.0);

        params.set_sharpness(-5.0);
        assert_eq!(params.sharpness(), 0.0);

        params.set_contrast(-4.0);
        assert_eq!(params.contrast(), -1.0);

        params.set_shadow_contrast(250.0);
        assert_eq!(params.shadow_contrast(), 100.0);
    }

    #[test]
    fn test_in_range_values_stored_verbatim() {
        let mut params = AdjustmentParameters::new();
        params.set(Adjustment::Vibrance, 42.5);
        assert_eq!(params.vibrance(), 42.5);
        assert_eq!(params.get(Adjustment::Vibrance), 42.5);
    }

    #[test]
    fn test_nan_stores_default() {
        let mut params = AdjustmentParameters::new();
        params.set_temperature(30.0);
        params.set_temperature(f32::NAN);
        assert_eq!(params.temperature(), 0.0);
    }

    #[test]
    fn test_every_field_respects_its_range() {
        let mut params = AdjustmentParameters::new();
        for field in Adjustment::ALL {
            let (min, max) = field.range();
            params.set(field, f32::INFINITY);
            assert_eq!(params.get(field), max, "{}", field.key());
            params.set(field, f32::NEG_INFINITY);
            assert_eq!(params.get(field), min, "{}", field.key());
        }
    }

    #[test]
    fn test_serialization() {
        let mut params = AdjustmentParameters::default();
        params.set_exposure(1.5);
        params.set_contrast(0.2);
        params.set_saturation(-10.0);
        params.set_midtone_contrast(35.0);

        let json = params.to_json().unwrap();
        assert!(json.contains("\"midtone_contrast\":35.0"));

        let restored = AdjustmentParameters::from_json(&json).unwrap();
        assert_eq!(params, restored);
        assert!(!restored.is_neutral());
    }

    #[test]
    fn test_missing_fields_default_and_values_clamp() {
        let restored =
            AdjustmentParameters::from_json(r#"{"exposure": 7.0, "tint": -12.0}"#).unwrap();
        assert_eq!(restored.exposure(), 3.0);
        assert_eq!(restored.tint(), -12.0);
        assert_eq!(restored.whites(), 0.0);
        assert_eq!(restored.sharpness(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut params = AdjustmentParameters::default();
        params.set_exposure(2.0);
        params.set_highlights(50.0);
        assert!(!params.is_neutral());

        params.reset();
        assert!(params.is_neutral());
    }

    #[test]
    fn test_output_mode_names() {
        for mode in OutputMode::ALL {
            assert_eq!(OutputMode::from_str_opt(mode.as_str()), Some(mode));
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode.as_str()));
        }
        assert_eq!(OutputMode::from_str_opt("hdr10"), None);
        assert_eq!(OutputMode::default(), OutputMode::Sdr);
    }
}
