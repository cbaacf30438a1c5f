//! Classifier port and the prediction histogram
//!
//! The trained model is an external collaborator. Anything implementing
//! [`Classifier`] can be plugged into the pipeline; [`CentroidClassifier`] is
//! a small stand-in over the scaled feature space.

use embassy_time::Duration;

use crate::scaling::{FEATURE_COUNT, FeatureVector};

/// Weather classes in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherClass {
    Cloudy,
    Foggy,
    Rainy,
    Stormy,
    Sunny,
}

impl WeatherClass {
    pub const ALL: [WeatherClass; 5] = [
        Self::Cloudy,
        Self::Foggy,
        Self::Rainy,
        Self::Stormy,
        Self::Sunny,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Cloudy),
            1 => Some(Self::Foggy),
            2 => Some(Self::Rainy),
            3 => Some(Self::Stormy),
            4 => Some(Self::Sunny),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Cloudy => "Cloudy",
            Self::Foggy => "Foggy",
            Self::Rainy => "Rainy",
            Self::Stormy => "Stormy",
            Self::Sunny => "Sunny",
        }
    }
}

impl core::fmt::Display for WeatherClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Pure mapping from a scaled feature vector to a class.
pub trait Classifier {
    fn classify(&self, features: &FeatureVector) -> WeatherClass;
}

impl<F> Classifier for F
where
    F: Fn(&FeatureVector) -> WeatherClass,
{
    fn classify(&self, features: &FeatureVector) -> WeatherClass {
        self(features)
    }
}

/// Nearest-centroid classifier (squared euclidean distance)
#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    centroids: [(WeatherClass, [f32; FEATURE_COUNT]); 5],
}

impl Default for CentroidClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CentroidClassifier {
    /// Centroids at the centre of each synthetic weather pattern, scaled
    /// with the training bounds.
    pub const fn new() -> Self {
        Self {
            centroids: [
                (WeatherClass::Cloudy, [0.364, 0.931, 0.797, 0.396]),
                (WeatherClass::Foggy, [0.182, 1.0, 0.607, 0.083]),
                (WeatherClass::Rainy, [0.0, 1.0, 0.227, 0.127]),
                (WeatherClass::Stormy, [0.045, 1.0, 0.0, 0.063]),
                (WeatherClass::Sunny, [1.0, 0.116, 1.0, 1.0]),
            ],
        }
    }

    pub const fn with_centroids(centroids: [(WeatherClass, [f32; FEATURE_COUNT]); 5]) -> Self {
        Self { centroids }
    }
}

impl Classifier for CentroidClassifier {
    fn classify(&self, features: &FeatureVector) -> WeatherClass {
        let mut best = self.centroids[0].0;
        let mut best_distance = f32::INFINITY;

        for (class, centroid) in &self.centroids {
            let distance: f32 = features
                .as_array()
                .iter()
                .zip(centroid)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if distance < best_distance {
                best_distance = distance;
                best = *class;
            }
        }
        best
    }
}

/// One classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    pub class: WeatherClass,
    pub inference_time: Duration,
}

/// Per-class prediction counters, reset only when the pipeline restarts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionHistogram {
    counts: [u32; WeatherClass::ALL.len()],
}

impl PredictionHistogram {
    pub const fn new() -> Self {
        Self {
            counts: [0; WeatherClass::ALL.len()],
        }
    }

    pub fn record(&mut self, class: WeatherClass) {
        let slot = &mut self.counts[class.index()];
        *slot = slot.saturating_add(1);
    }

    pub fn count(&self, class: WeatherClass) -> u32 {
        self.counts[class.index()]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Share of all predictions in percent, `0.0` before the first one
    pub fn share(&self, class: WeatherClass) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.count(class) as f32 * 100.0 / total as f32
    }

    pub fn counts(&self) -> &[u32; WeatherClass::ALL.len()] {
        &self.counts
    }

    pub fn reset(&mut self) {
        self.counts = [0; WeatherClass::ALL.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_from_index() {
        for class in WeatherClass::ALL {
            assert_eq!(WeatherClass::from_index(class.index()), Some(class));
        }
        assert_eq!(WeatherClass::from_index(5), None);
    }

    #[test]
    fn centroid_classifier_picks_the_closest_pattern() {
        let classifier = CentroidClassifier::new();

        let sunny = FeatureVector([0.95, 0.1, 0.98, 0.9]);
        let stormy = FeatureVector([0.05, 1.0, 0.02, 0.05]);

        assert_eq!(classifier.classify(&sunny), WeatherClass::Sunny);
        assert_eq!(classifier.classify(&stormy), WeatherClass::Stormy);
    }

    #[test]
    fn closures_are_classifiers() {
        let always_foggy = |_: &FeatureVector| WeatherClass::Foggy;
        assert_eq!(
            always_foggy.classify(&FeatureVector::default()),
            WeatherClass::Foggy
        );
    }

    #[test]
    fn histogram_shares() {
        let mut histogram = PredictionHistogram::new();
        assert_eq!(histogram.share(WeatherClass::Rainy), 0.0);

        histogram.record(WeatherClass::Rainy);
        histogram.record(WeatherClass::Rainy);
        histogram.record(WeatherClass::Cloudy);
        histogram.record(WeatherClass::Sunny);

        assert_eq!(histogram.total(), 4);
        assert_eq!(histogram.count(WeatherClass::Rainy), 2);
        assert_eq!(histogram.share(WeatherClass::Rainy), 50.0);

        histogram.reset();
        assert_eq!(histogram.total(), 0);
    }
}
