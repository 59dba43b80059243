//! Slider values and their mapping to physical adjustment units.
//!
//! Sliders are integers in `-100..=100` with `0` meaning "no change". The
//! normalizer turns a complete [`SliderSet`] into [`AdjustmentParameters`],
//! which is what both the CPU pipeline and the GPU shader consume.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{AdjustError, Result};

pub const SLIDER_MIN: i32 = -100;
pub const SLIDER_MAX: i32 = 100;

/// Map a slider in `-100..=100` onto `[min, max]` with `0 -> mid`.
///
/// Negative and positive halves scale independently, so the excursion below
/// the midpoint can differ from the one above it.
pub fn range(slider: i32, min: f32, mid: f32, max: f32) -> f32 {
    let t = slider as f32 / SLIDER_MAX as f32;
    if slider <= 0 {
        mid + (mid - min) * t
    } else {
        mid + (max - mid) * t
    }
}

/// One adjustment axis, in the order sliders are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Temp,
    Tint,
    Exposure,
    Contrast,
    Highlights,
    Shadows,
    Vibrance,
    Saturation,
}

impl Axis {
    pub const ALL: [Axis; 8] = [
        Axis::Temp,
        Axis::Tint,
        Axis::Exposure,
        Axis::Contrast,
        Axis::Highlights,
        Axis::Shadows,
        Axis::Vibrance,
        Axis::Saturation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Axis::Temp => "Temp",
            Axis::Tint => "Tint",
            Axis::Exposure => "Exposure",
            Axis::Contrast => "Contrast",
            Axis::Highlights => "Highlights",
            Axis::Shadows => "Shadows",
            Axis::Vibrance => "Vibrance",
            Axis::Saturation => "Saturation",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Axis {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self> {
        Axis::ALL
            .iter()
            .copied()
            .find(|axis| axis.name() == s)
            .ok_or_else(|| AdjustError::UnknownAxis { name: s.to_string() })
    }
}

/// Raw slider position for every axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderSet {
    pub temp: i32,
    pub tint: i32,
    pub exposure: i32,
    pub contrast: i32,
    pub highlights: i32,
    pub shadows: i32,
    pub vibrance: i32,
    pub saturation: i32,
}

impl SliderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from axis names exactly as the UI stores them (`"Exposure"`).
    /// Missing axes stay at 0.
    pub fn from_map(values: &HashMap<String, i32>) -> Result<Self> {
        let mut set = Self::default();
        for (name, &value) in values {
            set.set(name.parse()?, value);
        }
        Ok(set)
    }

    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Temp => self.temp,
            Axis::Tint => self.tint,
            Axis::Exposure => self.exposure,
            Axis::Contrast => self.contrast,
            Axis::Highlights => self.highlights,
            Axis::Shadows => self.shadows,
            Axis::Vibrance => self.vibrance,
            Axis::Saturation => self.saturation,
        }
    }

    /// Set an axis, clamping into the slider range.
    pub fn set(&mut self, axis: Axis, value: i32) {
        let value = value.clamp(SLIDER_MIN, SLIDER_MAX);
        let slot = match axis {
            Axis::Temp => &mut self.temp,
            Axis::Tint => &mut self.tint,
            Axis::Exposure => &mut self.exposure,
            Axis::Contrast => &mut self.contrast,
            Axis::Highlights => &mut self.highlights,
            Axis::Shadows => &mut self.shadows,
            Axis::Vibrance => &mut self.vibrance,
            Axis::Saturation => &mut self.saturation,
        };
        *slot = value;
    }

    pub fn with(mut self, axis: Axis, value: i32) -> Self {
        self.set(axis, value);
        self
    }

    /// Step an axis by `delta` (the +/- buttons next to each slider).
    pub fn nudge(&mut self, axis: Axis, delta: i32) -> i32 {
        self.set(axis, self.get(axis).saturating_add(delta));
        self.get(axis)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, i32)> + '_ {
        Axis::ALL.iter().map(move |&axis| (axis, self.get(axis)))
    }

    /// True when every slider sits at 0; callers skip the pipeline entirely.
    pub fn has_no_adjustments(&self) -> bool {
        self.iter().all(|(_, value)| value == 0)
    }

    /// Out-of-range values (e.g. from a hand-edited file) are clamped first.
    pub fn normalize(&self) -> AdjustmentParameters {
        let get = |axis| self.get(axis).clamp(SLIDER_MIN, SLIDER_MAX);
        let linear = |axis| get(axis) as f32 / SLIDER_MAX as f32;
        AdjustmentParameters {
            exposure: range(get(Axis::Exposure), -2.0, 0.0, 2.0),
            contrast: range(get(Axis::Contrast), 0.5, 1.0, 2.0),
            highlights: linear(Axis::Highlights),
            shadows: linear(Axis::Shadows),
            temp: linear(Axis::Temp),
            tint: linear(Axis::Tint),
            vibrance: range(get(Axis::Vibrance), 0.0, 1.0, 2.0),
            saturation: range(get(Axis::Saturation), 0.0, 1.0, 2.0),
        }
    }
}

impl FromIterator<(Axis, i32)> for SliderSet {
    fn from_iter<I: IntoIterator<Item = (Axis, i32)>>(iter: I) -> Self {
        let mut set = Self::default();
        for (axis, value) in iter {
            set.set(axis, value);
        }
        set
    }
}

/// Physical-unit adjustment values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentParameters {
    /// Exposure in EV; the pipeline multiplies by `2^exposure`
    pub exposure: f32,
    /// Contrast multiplier around mid-gray, 1 = unchanged
    pub contrast: f32,
    /// -1..1
    pub highlights: f32,
    /// -1..1
    pub shadows: f32,
    /// -1..1, positive is warmer
    pub temp: f32,
    /// -1..1, positive is more magenta
    pub tint: f32,
    /// 0..2 multiplier weighted towards low-saturation pixels
    pub vibrance: f32,
    /// 0..2, 1 = unchanged
    pub saturation: f32,
}

impl AdjustmentParameters {
    pub const NEUTRAL: AdjustmentParameters = AdjustmentParameters {
        exposure: 0.0,
        contrast: 1.0,
        highlights: 0.0,
        shadows: 0.0,
        temp: 0.0,
        tint: 0.0,
        vibrance: 1.0,
        saturation: 1.0,
    };

    /// Exactly the values an all-zero [`SliderSet`] normalizes to.
    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl Default for AdjustmentParameters {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl From<&SliderSet> for AdjustmentParameters {
    fn from(sliders: &SliderSet) -> Self {
        sliders.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIPLES: [(f32, f32, f32); 3] = [(-2.0, 0.0, 2.0), (0.5, 1.0, 2.0), (0.0, 1.0, 2.0)];

    #[test]
    fn test_range_endpoints() {
        for (min, mid, max) in TRIPLES {
            assert_eq!(range(-100, min, mid, max), min);
            assert_eq!(range(0, min, mid, max), mid);
            assert_eq!(range(100, min, mid, max), max);
        }
    }

    #[test]
    fn test_range_is_asymmetric() {
        // Contrast: half the negative excursion of the positive one
        assert!((range(-50, 0.5, 1.0, 2.0) - 0.75).abs() < 1e-6);
        assert!((range(50, 0.5, 1.0, 2.0) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_all_zero_is_neutral() {
        let sliders = SliderSet::default();
        assert!(sliders.has_no_adjustments());
        assert!(sliders.normalize().is_neutral());
    }

    #[test]
    fn test_any_nonzero_is_not_neutral() {
        for axis in Axis::ALL {
            let sliders = SliderSet::default().with(axis, 1);
            assert!(!sliders.has_no_adjustments(), "{} = 1", axis);
            assert!(!sliders.normalize().is_neutral(), "{} = 1", axis);
        }
    }

    #[test]
    fn test_normalize_mappings() {
        let params = SliderSet::default()
            .with(Axis::Exposure, 100)
            .with(Axis::Contrast, -100)
            .with(Axis::Highlights, 40)
            .with(Axis::Shadows, -60)
            .with(Axis::Temp, 25)
            .with(Axis::Tint, -100)
            .with(Axis::Vibrance, 100)
            .with(Axis::Saturation, -100)
            .normalize();

        assert_eq!(params.exposure, 2.0);
        assert_eq!(params.contrast, 0.5);
        assert!((params.highlights - 0.4).abs() < 1e-6);
        assert!((params.shadows + 0.6).abs() < 1e-6);
        assert!((params.temp - 0.25).abs() < 1e-6);
        assert_eq!(params.tint, -1.0);
        assert_eq!(params.vibrance, 2.0);
        assert_eq!(params.saturation, 0.0);
    }

    #[test]
    fn test_from_map_defaults_missing_axes() {
        let mut values = HashMap::new();
        values.insert("Exposure".to_string(), 50);
        values.insert("Saturation".to_string(), -20);

        let sliders = SliderSet::from_map(&values).unwrap();
        assert_eq!(sliders.exposure, 50);
        assert_eq!(sliders.saturation, -20);
        assert_eq!(sliders.temp, 0);
        assert_eq!(sliders.contrast, 0);
    }

    #[test]
    fn test_from_map_rejects_unknown_axis() {
        let mut values = HashMap::new();
        values.insert("Clarity".to_string(), 10);
        let err = SliderSet::from_map(&values).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_AXIS");
    }

    #[test]
    fn test_axis_names_are_case_sensitive() {
        assert_eq!("Exposure".parse::<Axis>().unwrap(), Axis::Exposure);
        assert_eq!("exposure".parse::<Axis>().unwrap_err().error_code(), "UNKNOWN_AXIS");

        // Same axis spelled twice must not depend on map iteration order
        let mut values = HashMap::new();
        values.insert("Exposure".to_string(), 50);
        values.insert("exposure".to_string(), -50);
        for _ in 0..20 {
            let err = SliderSet::from_map(&values).unwrap_err();
            assert_eq!(err.error_code(), "UNKNOWN_AXIS");
        }
    }

    #[test]
    fn test_values_are_clamped() {
        let mut sliders = SliderSet::default().with(Axis::Tint, 250);
        assert_eq!(sliders.tint, 100);

        assert_eq!(sliders.nudge(Axis::Tint, 1), 100);
        assert_eq!(sliders.nudge(Axis::Tint, -1), 99);
        assert_eq!(sliders.nudge(Axis::Shadows, -1000), -100);

        // Fields are public, so normalize clamps as well
        sliders.exposure = 400;
        assert_eq!(sliders.normalize().exposure, 2.0);
    }

    #[test]
    fn test_iter_follows_axis_order() {
        let sliders: SliderSet = [(Axis::Saturation, 3), (Axis::Temp, 1)].into_iter().collect();
        let axes: Vec<Axis> = sliders.iter().map(|(axis, _)| axis).collect();
        assert_eq!(axes, Axis::ALL.to_vec());
        assert_eq!(sliders.get(Axis::Temp), 1);
        assert_eq!(sliders.get(Axis::Saturation), 3);
    }

    #[test]
    fn test_slider_set_json() {
        let sliders = SliderSet::default().with(Axis::Vibrance, 35);
        let json = serde_json::to_string(&sliders).unwrap();
        let partial: SliderSet = serde_json::from_str(r#"{"vibrance":35}"#).unwrap();
        assert_eq!(serde_json::from_str::<SliderSet>(&json).unwrap(), sliders);
        assert_eq!(partial, sliders);
    }
}
