use alloc::string::String;
use core::fmt::Write;

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use super::{DeliveryOutcome, DeliveryStats, Reading, Sink};
use crate::clock::delay_millis;
use crate::config::PrimarySinkConfig;
use crate::net::{HttpClient, HttpRequest, NetError, encode_query_value};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    #[error("link unavailable")]
    LinkUnavailable,
    #[error("name resolution failed")]
    Resolution,
    #[error("transport error: {0}")]
    Transport(NetError),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("all {attempts} upload attempts failed")]
    Exhausted { attempts: u8 },
}

/// Metrics upload to a ThingSpeak-style channel.
///
/// Holds no state between uploads besides its counters. Every upload checks
/// the link, re-resolves the endpoint and opens a fresh connection.
pub struct PrimarySink<H, D> {
    http: H,
    delay: D,
    config: PrimarySinkConfig,
    stats: DeliveryStats,
}

impl<H, D> PrimarySink<H, D>
where
    H: HttpClient,
    D: DelayNs,
{
    pub fn new(http: H, delay: D, config: PrimarySinkConfig) -> Self {
        Self {
            http,
            delay,
            config,
            stats: DeliveryStats::default(),
        }
    }

    /// One upload attempt.
    pub async fn upload(&mut self, reading: &Reading) -> Result<(), UploadError> {
        let result = self.try_upload(reading).await;
        match result {
            Ok(()) => self.stats.record_success(),
            Err(_) => self.stats.record_failure(),
        }
        result
    }

    async fn try_upload(&mut self, reading: &Reading) -> Result<(), UploadError> {
        if !self.http.link_up() {
            warn!("primary: link unavailable, skipping upload");
            return Err(UploadError::LinkUnavailable);
        }

        match self.http.resolve(&self.config.host).await {
            Ok(addr) => debug!("primary: {} resolved to {}", self.config.host, addr),
            Err(e) => {
                error!("primary: resolving {} failed: {}", self.config.host, e);
                let cooldown = Duration::from_millis(self.config.resolve_cooldown_ms);
                self.delay.delay_ms(delay_millis(cooldown)).await;
                return Err(UploadError::Resolution);
            }
        }

        let request = HttpRequest::get(
            &self.config.host,
            self.config.port,
            self.update_path(reading),
            self.config.request_timeout(),
        );
        let response = self.http.send(&request).await.map_err(|e| {
            error!("primary: request failed: {}", e);
            UploadError::Transport(e)
        })?;

        if !response.is_success() {
            warn!("primary: unexpected response HTTP {}", response.status);
            return Err(UploadError::Status(response.status));
        }

        info!(
            "primary: uploaded (HTTP {}, entry {})",
            response.status,
            response.body.trim()
        );
        Ok(())
    }

    /// Upload with up to `max_attempts` tries, waiting `n × base delay` after
    /// failed attempt `n`.
    pub async fn upload_with_retry(&mut self, reading: &Reading) -> Result<(), UploadError> {
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.upload(reading).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!("primary: upload succeeded on attempt {}", attempt);
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!("primary: attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        let backoff =
                            Duration::from_millis(self.config.retry_base_delay_ms) * attempt as u32;
                        debug!("primary: backing off {} ms", backoff.as_millis());
                        self.delay.delay_ms(delay_millis(backoff)).await;
                    }
                }
            }
        }

        error!("primary: all {} upload attempts failed", attempts);
        Err(UploadError::Exhausted { attempts })
    }

    /// Fetch the channel status document.
    ///
    /// Any HTTP answer counts as reachable; only a dead link, a failed lookup
    /// or a transport error does not.
    pub async fn check_reachable(&mut self) -> bool {
        if !self.http.link_up() {
            return false;
        }
        if self.http.resolve(&self.config.host).await.is_err() {
            warn!("primary: {} does not resolve", self.config.host);
            return false;
        }

        let mut path = String::from("/channels/");
        encode_query_value(&self.config.channel_id, &mut path);
        path.push_str("/status.json");

        let request = HttpRequest::get(
            &self.config.host,
            self.config.port,
            path,
            self.config.request_timeout(),
        );
        match self.http.send(&request).await {
            Ok(response) if response.status == 200 || response.status == 404 => {
                info!("primary: endpoint reachable (HTTP {})", response.status);
                true
            }
            Ok(response) => {
                warn!(
                    "primary: unexpected response HTTP {}, uploads will still be attempted",
                    response.status
                );
                true
            }
            Err(e) => {
                warn!("primary: endpoint unreachable: {}", e);
                false
            }
        }
    }

    fn update_path(&self, reading: &Reading) -> String {
        let averages = &reading.averages;
        let pressure = self.config.pressure_unit.from_pascal(averages.pressure_pa);

        let mut path = String::from("/update?api_key=");
        encode_query_value(&self.config.api_key, &mut path);
        let _ = write!(
            path,
            "&field1={:.2}&field2={:.2}&field3={:.2}&field4={:.2}&field5={:.0}&field6={}&field7={}",
            averages.temperature_c,
            averages.humidity_pct,
            pressure,
            averages.lux,
            averages.gas_ppm,
            reading.prediction.class.index(),
            reading.prediction.inference_time.as_micros(),
        );
        path
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    pub fn config(&self) -> &PrimarySinkConfig {
        &self.config
    }

    pub fn http(&self) -> &H {
        &self.http
    }
}

impl<H, D> Sink for PrimarySink<H, D>
where
    H: HttpClient,
    D: DelayNs,
{
    type Error = UploadError;

    fn name(&self) -> &'static str {
        "primary"
    }

    async fn deliver(&mut self, reading: &Reading) -> Result<DeliveryOutcome, UploadError> {
        self.upload_with_retry(reading)
            .await
            .map(|()| DeliveryOutcome::Delivered)
    }

    fn stats(&self) -> DeliveryStats {
        self.stats
    }
}
