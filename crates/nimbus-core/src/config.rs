//! Node configuration
//!
//! Every field has a default matching the deployed firmware, so a partial
//! JSON document (or none at all) yields a usable configuration.

use alloc::string::String;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub internet: InternetConfig,
    pub link: LinkConfig,
    pub pipeline: PipelineConfig,
    pub primary: PrimarySinkConfig,
    pub secondary: SecondarySinkConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct InternetConfig {
    pub ssid: String,
    pub password: String,
}

/// Link acquisition and monitoring parameters
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// Bounded wait for a single association attempt
    pub connect_timeout_ms: u64,
    /// Constant delay between attempts
    pub retry_delay_ms: u64,
    /// Attempts per `connect()` before the link is declared failed
    pub max_retries: u8,
    /// Health check period while running
    pub check_interval_ms: u64,
    /// How often the transport is polled during an attempt
    pub poll_interval_ms: u64,
    pub auto_reconnect: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 20_000,
            retry_delay_ms: 5_000,
            max_retries: 5,
            check_interval_ms: 10_000,
            poll_interval_ms: 500,
            auto_reconnect: true,
        }
    }
}

impl LinkConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Sampling and prediction cadence
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_interval_ms: u64,
    pub predict_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1_000,
            predict_interval_ms: 15_000,
        }
    }
}

impl PipelineConfig {
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub const fn predict_interval(&self) -> Duration {
        Duration::from_millis(self.predict_interval_ms)
    }
}

/// Unit used for the pressure field of the metrics upload
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PressureUnit {
    #[default]
    Pascal,
    Hectopascal,
}

impl PressureUnit {
    /// Convert a reading in pascal into this unit
    pub fn from_pascal(self, pascal: f32) -> f32 {
        match self {
            Self::Pascal => pascal,
            Self::Hectopascal => pascal / 100.0,
        }
    }
}

/// Cloud metrics endpoint (ThingSpeak-style channel)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PrimarySinkConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub channel_id: String,
    pub pressure_unit: PressureUnit,
    pub request_timeout_ms: u64,
    /// Pause after a failed name resolution before giving up on the upload
    pub resolve_cooldown_ms: u64,
    /// Attempt `n` is followed by a wait of `n * retry_base_delay_ms`
    pub retry_base_delay_ms: u64,
    pub max_attempts: u8,
}

impl Default for PrimarySinkConfig {
    fn default() -> Self {
        Self {
            host: String::from("api.thingspeak.com"),
            port: 80,
            api_key: String::new(),
            channel_id: String::new(),
            pressure_unit: PressureUnit::Pascal,
            request_timeout_ms: 10_000,
            resolve_cooldown_ms: 2_000,
            retry_base_delay_ms: 2_000,
            max_attempts: 3,
        }
    }
}

impl PrimarySinkConfig {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Structured backup store (realtime-database style document tree)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SecondarySinkConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub auth_token: String,
    pub min_interval_ms: u64,
    pub max_consecutive_failures: u32,
    pub request_timeout_ms: u64,
    /// Attach the gas reading and its quality label to each document
    pub include_gas: bool,
    pub firmware_version: String,
    pub model_type: String,
}

impl Default for SecondarySinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: String::new(),
            port: 80,
            auth_token: String::new(),
            min_interval_ms: 15_000,
            max_consecutive_failures: 10,
            request_timeout_ms: 10_000,
            include_gas: true,
            firmware_version: String::from("v3.0"),
            model_type: String::from("nearest-centroid"),
        }
    }
}

impl SecondarySinkConfig {
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample interval must be non-zero")]
    ZeroSampleInterval,
    #[error("prediction interval must be a non-zero multiple of the sample interval")]
    MisalignedPredictInterval,
    #[error("primary sink needs at least one attempt")]
    NoUploadAttempts,
    #[error("link poll interval must be non-zero")]
    ZeroPollInterval,
}

impl NodeConfig {
    /// Check the timing invariants the pipeline relies on.
    ///
    /// Sampling precedes the prediction that consumes it only because the
    /// prediction interval is a whole multiple of the sample interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sample = self.pipeline.sample_interval_ms;
        let predict = self.pipeline.predict_interval_ms;

        if sample == 0 {
            return Err(ConfigError::ZeroSampleInterval);
        }
        if predict == 0 || predict % sample != 0 {
            return Err(ConfigError::MisalignedPredictInterval);
        }
        if self.primary.max_attempts == 0 {
            return Err(ConfigError::NoUploadAttempts);
        }
        if self.link.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_firmware() {
        let config = NodeConfig::default();

        assert_eq!(config.link.connect_timeout(), Duration::from_secs(20));
        assert_eq!(config.link.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.link.max_retries, 5);
        assert_eq!(config.link.check_interval(), Duration::from_secs(10));
        assert_eq!(config.pipeline.sample_interval(), Duration::from_secs(1));
        assert_eq!(config.pipeline.predict_interval(), Duration::from_secs(15));
        assert_eq!(config.primary.max_attempts, 3);
        assert_eq!(config.secondary.max_consecutive_failures, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "internet": { "ssid": "lab", "password": "hunter22" },
            "primary": { "api_key": "KEY", "pressure_unit": "hectopascal" }
        }"#;
        let config: NodeConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.internet.ssid, "lab");
        assert_eq!(config.primary.api_key, "KEY");
        assert_eq!(config.primary.host, "api.thingspeak.com");
        assert_eq!(config.primary.pressure_unit, PressureUnit::Hectopascal);
        assert_eq!(config.link, LinkConfig::default());
    }

    #[test]
    fn rejects_misaligned_prediction_interval() {
        let mut config = NodeConfig::default();
        config.pipeline.predict_interval_ms = 15_500;

        assert_eq!(
            config.validate(),
            Err(ConfigError::MisalignedPredictInterval)
        );
    }

    #[test]
    fn hectopascal_conversion() {
        assert_eq!(PressureUnit::Hectopascal.from_pascal(101_325.0), 1013.25);
        assert_eq!(PressureUnit::Pascal.from_pascal(101_325.0), 101_325.0);
    }
}
