use core::ops::Range;

use log::trace;
use rand::{Rng, RngCore};

use super::{Sample, SensorError, SensorSource};
use crate::classifier::WeatherClass;

/// Value ranges for one synthetic weather pattern
struct Pattern {
    temperature_c: Range<f32>,
    humidity_pct: Range<f32>,
    pressure_pa: Range<f32>,
    lux: Range<f32>,
    gas_ppm: Range<f32>,
}

const fn pattern_for(class: WeatherClass) -> Pattern {
    match class {
        WeatherClass::Cloudy => Pattern {
            temperature_c: 20.0..26.0,
            humidity_pct: 40.0..70.0,
            pressure_pa: 98_000.0..101_000.0,
            lux: 100.0..400.0,
            gas_ppm: 200.0..800.0,
        },
        WeatherClass::Sunny => Pattern {
            temperature_c: 28.0..35.0,
            humidity_pct: 20.0..45.0,
            pressure_pa: 100_500.0..103_000.0,
            lux: 500.0..1_000.0,
            gas_ppm: 100.0..400.0,
        },
        WeatherClass::Rainy => Pattern {
            temperature_c: 15.0..22.0,
            humidity_pct: 70.0..90.0,
            pressure_pa: 96_000.0..98_500.0,
            lux: 10.0..150.0,
            gas_ppm: 300.0..900.0,
        },
        WeatherClass::Stormy => Pattern {
            temperature_c: 16.0..23.0,
            humidity_pct: 75.0..95.0,
            pressure_pa: 95_000.0..97_000.0,
            lux: 0.0..80.0,
            gas_ppm: 400.0..1_200.0,
        },
        WeatherClass::Foggy => Pattern {
            temperature_c: 18.0..24.0,
            humidity_pct: 80.0..95.0,
            pressure_pa: 97_500.0..100_000.0,
            lux: 5.0..100.0,
            gas_ppm: 500.0..1_500.0,
        },
    }
}

/// Synthetic sensor source for running the node without transducers.
///
/// Each read first picks a weather pattern (40 % cloudy, 20 % sunny, 20 %
/// rainy, 10 % stormy, 10 % foggy) and then draws every channel uniformly
/// from that pattern's range.
pub struct WeatherSimulator<R> {
    rng: R,
    last_pattern: Option<WeatherClass>,
}

impl<R: RngCore> WeatherSimulator<R> {
    pub const fn new(rng: R) -> Self {
        Self {
            rng,
            last_pattern: None,
        }
    }

    /// Pattern used for the most recent sample
    pub fn last_pattern(&self) -> Option<WeatherClass> {
        self.last_pattern
    }

    fn pick_pattern(&mut self) -> WeatherClass {
        match self.rng.gen_range(0..100u8) {
            0..40 => WeatherClass::Cloudy,
            40..60 => WeatherClass::Sunny,
            60..80 => WeatherClass::Rainy,
            80..90 => WeatherClass::Stormy,
            _ => WeatherClass::Foggy,
        }
    }

    /// Draw one sample from the given pattern.
    pub fn sample_pattern(&mut self, class: WeatherClass) -> Sample {
        let pattern = pattern_for(class);
        Sample {
            temperature_c: self.rng.gen_range(pattern.temperature_c),
            humidity_pct: self.rng.gen_range(pattern.humidity_pct),
            pressure_pa: self.rng.gen_range(pattern.pressure_pa),
            lux: self.rng.gen_range(pattern.lux),
            gas_ppm: self.rng.gen_range(pattern.gas_ppm),
        }
    }
}

impl<R: RngCore> SensorSource for WeatherSimulator<R> {
    async fn read(&mut self) -> Result<Sample, SensorError> {
        let class = self.pick_pattern();
        self.last_pattern = Some(class);
        let sample = self.sample_pattern(class);
        trace!("simulated {} sample: {:?}", class.label(), sample);
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn samples_stay_inside_their_pattern() {
        let mut sim = WeatherSimulator::new(SmallRng::seed_from_u64(7));

        for _ in 0..200 {
            let sample = block_on(sim.read()).unwrap();
            let pattern = pattern_for(sim.last_pattern().unwrap());

            assert!(pattern.temperature_c.contains(&sample.temperature_c));
            assert!(pattern.humidity_pct.contains(&sample.humidity_pct));
            assert!(pattern.pressure_pa.contains(&sample.pressure_pa));
            assert!(pattern.lux.contains(&sample.lux));
            assert!(pattern.gas_ppm.contains(&sample.gas_ppm));
        }
    }

    #[test]
    fn every_pattern_eventually_appears() {
        let mut sim = WeatherSimulator::new(SmallRng::seed_from_u64(42));
        let mut seen = [false; WeatherClass::ALL.len()];

        for _ in 0..500 {
            block_on(sim.read()).unwrap();
            seen[sim.last_pattern().unwrap().index()] = true;
        }

        assert!(seen.iter().all(|s| *s));
    }
}
