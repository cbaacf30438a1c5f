use alloc::format;

use embassy_time::Instant;
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror_no_std::Error;

use super::{DeliveryOutcome, DeliveryStats, DeviceId, DeviceInfo, Reading, Sink};
use super::rtdb::{DocumentStore, StoreError};
use crate::clock::{Clock, is_due};
use crate::config::SecondarySinkConfig;
use crate::metrics::AirQuality;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupError {
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("document encoding failed")]
    Encode,
}

impl From<StoreError> for BackupError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Document written to `devices/{id}/readings/{timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingDocument<'a> {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub lux: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_ppm: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_quality: Option<&'static str>,
    pub prediction: &'static str,
    /// Microseconds
    pub inference_time: u64,
    pub timestamp: u64,
    pub device_id: &'a str,
}

impl<'a> ReadingDocument<'a> {
    pub fn new(reading: &Reading, device_id: &'a str, include_gas: bool) -> Self {
        let averages = &reading.averages;
        Self {
            temperature: averages.temperature_c,
            humidity: averages.humidity_pct,
            pressure: averages.pressure_pa,
            lux: averages.lux,
            gas_ppm: include_gas.then_some(averages.gas_ppm),
            gas_quality: include_gas.then(|| AirQuality::assess(averages.gas_ppm).label()),
            prediction: reading.prediction.class.label(),
            inference_time: reading.prediction.inference_time.as_micros(),
            timestamp: reading.timestamp_secs,
            device_id,
        }
    }
}

#[derive(Serialize)]
struct StatusDocument {
    online: bool,
    last_seen: u64,
}

/// Backup of every reading into a document store.
///
/// Attempts are spaced by at least `min_interval`. After
/// `max_consecutive_failures` failures in a row the sink stops attempting for
/// the rest of the process lifetime; it never half-opens to test the store again.
pub struct SecondarySink<S, C> {
    store: S,
    clock: C,
    device: DeviceId,
    config: SecondarySinkConfig,
    initialized: bool,
    last_attempt: Option<Instant>,
    stats: DeliveryStats,
    breaker_reported: bool,
}

impl<S, C> SecondarySink<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    pub fn new(store: S, clock: C, device: DeviceId, config: SecondarySinkConfig) -> Self {
        Self {
            store,
            clock,
            device,
            config,
            initialized: false,
            last_attempt: None,
            stats: DeliveryStats::default(),
            breaker_reported: false,
        }
    }

    /// Mark the sink ready and publish the device info and online status.
    ///
    /// The sink stays uninitialized when the store is not reachable; a
    /// failed info write is reported but does not undo initialization.
    pub async fn initialize(&mut self, info: &DeviceInfo) -> Result<(), BackupError> {
        if !self.config.enabled {
            info!("backup: disabled by configuration");
            return Ok(());
        }
        if !self.store.is_ready() {
            warn!("backup: store not ready, backups stay off");
            return Err(BackupError::Store(StoreError::NotReady));
        }

        self.initialized = true;
        info!(
            "backup: device {} ready, interval {} s, breaker after {} failures",
            self.device,
            self.config.min_interval().as_secs(),
            self.config.max_consecutive_failures
        );

        let json = serde_json::to_string(info).map_err(|_| BackupError::Encode)?;
        let path = format!("devices/{}/info", self.device);
        self.store.put(&path, &json).await.map_err(|e| {
            error!("backup: saving device info failed: {}", e);
            BackupError::Store(e)
        })?;

        self.update_status(true).await
    }

    /// Publish the online flag and last-seen time.
    pub async fn update_status(&mut self, online: bool) -> Result<(), BackupError> {
        if !self.initialized || !self.config.enabled {
            return Ok(());
        }

        let status = StatusDocument {
            online,
            last_seen: self.clock.now().as_secs(),
        };
        let json = serde_json::to_string(&status).map_err(|_| BackupError::Encode)?;
        let path = format!("devices/{}/status", self.device);
        self.store.put(&path, &json).await?;
        debug!("backup: status online={}", online);
        Ok(())
    }

    pub fn breaker_open(&self) -> bool {
        self.stats.consecutive_failures >= self.config.max_consecutive_failures
    }

    pub fn should_attempt(&self) -> bool {
        self.should_attempt_at(self.clock.now())
    }

    /// Gate check for a reading taken at `at`.
    ///
    /// The interval runs between reading instants, so time spent in other
    /// sinks before this one does not eat into it.
    pub fn should_attempt_at(&self, at: Instant) -> bool {
        self.config.enabled
            && self.initialized
            && !self.breaker_open()
            && is_due(at, self.last_attempt, self.config.min_interval())
    }

    /// Write one reading, or skip it when the gate or breaker says no.
    pub async fn backup(&mut self, reading: &Reading) -> Result<DeliveryOutcome, BackupError> {
        if !self.should_attempt_at(reading.taken_at) {
            debug!("backup: skipped");
            return Ok(DeliveryOutcome::Skipped);
        }
        self.last_attempt = Some(reading.taken_at);

        match self.write_reading(reading).await {
            Ok(()) => {
                self.stats.record_success();
                info!(
                    "backup: reading {} saved ({} total)",
                    reading.timestamp_secs, self.stats.successes
                );
                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) => {
                self.stats.record_failure();
                warn!(
                    "backup: failed ({}/{} in a row): {}",
                    self.stats.consecutive_failures, self.config.max_consecutive_failures, e
                );
                if self.breaker_open() && !self.breaker_reported {
                    self.breaker_reported = true;
                    error!(
                        "backup: {} consecutive failures, backups disabled for this session",
                        self.stats.consecutive_failures
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_reading(&mut self, reading: &Reading) -> Result<(), BackupError> {
        if !self.store.is_ready() {
            return Err(BackupError::Store(StoreError::NotReady));
        }
        let document = ReadingDocument::new(reading, self.device.as_str(), self.config.include_gas);
        let json = serde_json::to_string(&document).map_err(|_| BackupError::Encode)?;
        let path = format!(
            "devices/{}/readings/{}",
            self.device, reading.timestamp_secs
        );
        self.store.put(&path, &json).await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    pub fn log_statistics(&self) {
        let stats = self.stats;
        info!("backup statistics ({}):", self.device);
        info!("  attempts:             {}", stats.attempts);
        info!(
            "  successful:           {} ({:.1}%)",
            stats.successes,
            stats.success_rate()
        );
        let failure_rate = if stats.attempts == 0 {
            0.0
        } else {
            stats.failures as f32 * 100.0 / stats.attempts as f32
        };
        info!("  failed:               {} ({:.1}%)", stats.failures, failure_rate);
        info!("  consecutive failures: {}", stats.consecutive_failures);
        if self.breaker_open() {
            info!("  breaker:              open");
        }
    }
}

impl<S, C> Sink for SecondarySink<S, C>
where
    S: DocumentStore,
    C: Clock,
{
    type Error = BackupError;

    fn name(&self) -> &'static str {
        "backup"
    }

    async fn deliver(&mut self, reading: &Reading) -> Result<DeliveryOutcome, BackupError> {
        self.backup(reading).await
    }

    fn stats(&self) -> DeliveryStats {
        self.stats
    }
}
