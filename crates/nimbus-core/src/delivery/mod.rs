//! Cloud delivery of predictions
//!
//! Two independent sinks receive every [`Reading`]:
//!
//! - [`PrimarySink`]: stateless metrics upload with a DNS pre-check and a
//!   fixed number of retries with linear backoff.
//! - [`SecondarySink`]: document-store backup behind a minimum interval and a
//!   consecutive-failure circuit breaker that never re-closes.
//!
//! Neither sink is fatal to the caller. Failures are counted and logged.

mod device;
mod primary;
mod rtdb;
mod secondary;

pub use device::{DeviceId, DeviceInfo};
pub use primary::{PrimarySink, UploadError};
pub use rtdb::{DocumentStore, RtdbStore, StoreError};
pub use secondary::{BackupError, ReadingDocument, SecondarySink};

use core::fmt::Display;

use embassy_time::Instant;

use crate::classifier::Prediction;
use crate::sensors::Sample;

/// Everything a sink needs to know about one prediction cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Window averages the prediction was made from
    pub averages: Sample,
    pub prediction: Prediction,
    /// Whole seconds since boot
    pub timestamp_secs: u64,
    /// Prediction tick the reading belongs to
    pub taken_at: Instant,
}

/// Per-sink counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_failures: u32,
}

impl DeliveryStats {
    pub(crate) fn record_success(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.successes = self.successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.failures = self.failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Successful share of all attempts in percent
    pub fn success_rate(&self) -> f32 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f32 * 100.0 / self.attempts as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The sink chose not to attempt delivery (rate gate or open breaker)
    Skipped,
}

/// A destination for readings.
pub trait Sink {
    type Error: Display;

    fn name(&self) -> &'static str;

    fn deliver(
        &mut self,
        reading: &Reading,
    ) -> impl Future<Output = Result<DeliveryOutcome, Self::Error>>;

    fn stats(&self) -> DeliveryStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_consecutive_failures() {
        let mut stats = DeliveryStats::default();
        stats.record_failure();
        stats.record_failure();
        stats.record_success();

        assert_eq!(
            stats,
            DeliveryStats {
                attempts: 3,
                successes: 1,
                failures: 2,
                consecutive_failures: 0,
            }
        );
        assert!((stats.success_rate() - 33.33).abs() < 0.01);
    }
}
