//! Min-max feature scaling with the classifier's training bounds

use crate::sensors::{Channel, Sample};

pub const FEATURE_COUNT: usize = 4;

/// Channels fed to the classifier, in feature order
pub const FEATURE_CHANNELS: [Channel; FEATURE_COUNT] = [
    Channel::Temperature,
    Channel::Humidity,
    Channel::Pressure,
    Channel::Lux,
];

/// Normalised classifier input, every element in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector(pub [f32; FEATURE_COUNT]);

impl FeatureVector {
    pub const fn as_array(&self) -> &[f32; FEATURE_COUNT] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingBounds {
    pub min: f32,
    pub max: f32,
}

impl ScalingBounds {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn scale(&self, raw: f32) -> f32 {
        scale(raw, self.min, self.max)
    }
}

/// Clamp `raw` into `[min, max]` and map it onto `[0, 1]`.
///
/// NaN input maps to `0.0`, as does a degenerate range (`max <= min` or
/// either bound NaN).
pub fn scale(raw: f32, min: f32, max: f32) -> f32 {
    if min.is_nan() || max.is_nan() || max <= min {
        return 0.0;
    }
    let raw = if raw.is_nan() { min } else { raw };
    let clamped = raw.clamp(min, max);
    ((clamped - min) / (max - min)).clamp(0.0, 1.0)
}

/// Stateless scaler holding one set of bounds per feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureScaler {
    bounds: [ScalingBounds; FEATURE_COUNT],
}

impl Default for FeatureScaler {
    fn default() -> Self {
        Self::TRAINING
    }
}

impl FeatureScaler {
    /// Bounds of the data set the shipped classifier was trained on
    pub const TRAINING: Self = Self::new([
        ScalingBounds::new(19.0, 30.0),
        ScalingBounds::new(29.3, 56.9),
        ScalingBounds::new(96_352.68, 100_301.06),
        ScalingBounds::new(0.0, 632.08),
    ]);

    pub const fn new(bounds: [ScalingBounds; FEATURE_COUNT]) -> Self {
        Self { bounds }
    }

    pub const fn bounds(&self) -> &[ScalingBounds; FEATURE_COUNT] {
        &self.bounds
    }

    /// Scale the four classifier channels of an averaged sample.
    pub fn scale_sample(&self, sample: &Sample) -> FeatureVector {
        let mut features = [0.0; FEATURE_COUNT];
        for (i, channel) in FEATURE_CHANNELS.iter().enumerate() {
            features[i] = self.bounds[i].scale(sample.get(*channel));
        }
        FeatureVector(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn clamps_out_of_range_input() {
        assert_eq!(scale(-5.0, 0.0, 10.0), 0.0);
        assert_eq!(scale(50.0, 0.0, 10.0), 1.0);
    }

    #[test]
    fn bounds_map_to_unit_interval_ends() {
        assert_eq!(scale(19.0, 19.0, 30.0), 0.0);
        assert_eq!(scale(30.0, 19.0, 30.0), 1.0);
    }

    #[test]
    fn nan_and_degenerate_ranges() {
        assert_eq!(scale(f32::NAN, 19.0, 30.0), 0.0);
        assert_eq!(scale(5.0, 3.0, 3.0), 0.0);
        assert_eq!(scale(5.0, 4.0, 3.0), 0.0);
        assert_eq!(scale(5.0, f32::NAN, 3.0), 0.0);
    }

    #[test]
    fn training_bounds_on_a_warm_dry_sample() {
        let features =
            FeatureScaler::TRAINING.scale_sample(&Sample::new(30.0, 30.0, 96_400.0, 600.0, 0.0));
        let [t, h, p, l] = *features.as_array();

        assert!(close(t, 1.0));
        assert!(close(h, 0.0254));
        assert!(close(p, 0.012));
        assert!(close(l, 0.949));
    }

    proptest! {
        #[test]
        fn output_always_in_unit_interval(raw in proptest::num::f32::ANY, min in -1.0e6f32..1.0e6, span in 0.0f32..1.0e6) {
            let out = scale(raw, min, min + span);
            prop_assert!((0.0..=1.0).contains(&out));
        }

        #[test]
        fn in_range_matches_formula(min in -1.0e3f32..1.0e3, span in 1.0f32..1.0e3, t in 0.0f32..=1.0) {
            let max = min + span;
            let raw = (min + t * span).clamp(min, max);
            let expected = (raw - min) / (max - min);
            prop_assert!((scale(raw, min, max) - expected).abs() < 1e-6);
        }

        #[test]
        fn scaling_a_clamped_value_is_stable(raw in -1.0e4f32..1.0e4) {
            let once = scale(raw, 0.0, 100.0);
            let clamped = raw.clamp(0.0, 100.0);
            prop_assert_eq!(scale(clamped, 0.0, 100.0), once);
        }
    }
}
