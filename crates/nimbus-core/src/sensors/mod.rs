//! Sensor sample model and acquisition trait
//!
//! Transducer drivers are external. They only have to produce a [`Sample`]
//! with all five channels in the units below; the pipeline never sees raw
//! register values.

mod simulated;

pub use simulated::WeatherSimulator;

use serde::Serialize;
use thiserror_no_std::Error;

/// Number of channels carried by every [`Sample`]
pub const CHANNEL_COUNT: usize = 5;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: {operation} failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: timed out waiting for {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
}

/// One of the physical quantities the node measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Air temperature in °C
    Temperature,
    /// Relative humidity in %
    Humidity,
    /// Barometric pressure in Pa
    Pressure,
    /// Illuminance in lux
    Lux,
    /// Gas concentration in ppm
    Gas,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Self::Temperature,
        Self::Humidity,
        Self::Pressure,
        Self::Lux,
        Self::Gas,
    ];

    /// Position of this channel inside per-channel arrays
    pub const fn index(self) -> usize {
        match self {
            Self::Temperature => 0,
            Self::Humidity => 1,
            Self::Pressure => 2,
            Self::Lux => 3,
            Self::Gas => 4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Pressure => "Pressure",
            Self::Lux => "Light",
            Self::Gas => "Gas",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::Pressure => "Pa",
            Self::Lux => "lux",
            Self::Gas => "ppm",
        }
    }
}

/// A single reading of every channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Sample {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_pa: f32,
    pub lux: f32,
    pub gas_ppm: f32,
}

impl Sample {
    pub const fn new(
        temperature_c: f32,
        humidity_pct: f32,
        pressure_pa: f32,
        lux: f32,
        gas_ppm: f32,
    ) -> Self {
        Self {
            temperature_c,
            humidity_pct,
            pressure_pa,
            lux,
            gas_ppm,
        }
    }

    pub const fn get(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Temperature => self.temperature_c,
            Channel::Humidity => self.humidity_pct,
            Channel::Pressure => self.pressure_pa,
            Channel::Lux => self.lux,
            Channel::Gas => self.gas_ppm,
        }
    }

    pub fn set(&mut self, channel: Channel, value: f32) {
        match channel {
            Channel::Temperature => self.temperature_c = value,
            Channel::Humidity => self.humidity_pct = value,
            Channel::Pressure => self.pressure_pa = value,
            Channel::Lux => self.lux = value,
            Channel::Gas => self.gas_ppm = value,
        }
    }
}

/// Anything that can produce a full [`Sample`] on demand.
pub trait SensorSource {
    /// Acquire one sample of every channel.
    fn read(&mut self) -> impl Future<Output = Result<Sample, SensorError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_indices_are_dense() {
        for (position, channel) in Channel::ALL.iter().enumerate() {
            assert_eq!(channel.index(), position);
        }
    }

    #[test]
    fn get_and_set_address_the_same_field() {
        let mut sample = Sample::default();
        for (i, channel) in Channel::ALL.iter().enumerate() {
            sample.set(*channel, i as f32 + 0.5);
        }

        assert_eq!(sample, Sample::new(0.5, 1.5, 2.5, 3.5, 4.5));
        assert_eq!(sample.get(Channel::Lux), 3.5);
    }
}
