//! Monotonic time source
//!
//! Every component reads time through [`Clock`] instead of calling
//! `embassy_time::Instant::now()` directly, so the same code runs against the
//! embassy time driver on the device, `std::time` in the simulator, and a
//! virtual clock in tests.

use embassy_time::{Duration, Instant};

/// A monotonic clock.
pub trait Clock {
    /// Current instant since boot.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Returns `true` when `interval` has elapsed since `last`, or when the action
/// has never run.
pub fn is_due(now: Instant, last: Option<Instant>, interval: Duration) -> bool {
    match last {
        Some(last) => now.saturating_duration_since(last) >= interval,
        None => true,
    }
}

/// Milliseconds of `duration` in the width `DelayNs::delay_ms` takes,
/// saturating at `u32::MAX`.
pub fn delay_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_millis_saturates() {
        assert_eq!(delay_millis(Duration::from_millis(2_000)), 2_000);
        assert_eq!(delay_millis(Duration::from_secs(u64::MAX / 1_000_000)), u32::MAX);
    }

    #[test]
    fn never_run_is_due() {
        assert!(is_due(Instant::from_millis(0), None, Duration::from_secs(10)));
    }

    #[test]
    fn due_only_after_interval() {
        let last = Some(Instant::from_millis(1_000));
        let interval = Duration::from_millis(500);

        assert!(!is_due(Instant::from_millis(1_499), last, interval));
        assert!(is_due(Instant::from_millis(1_500), last, interval));
    }

    #[test]
    fn clock_going_backwards_is_not_due() {
        let last = Some(Instant::from_millis(5_000));
        assert!(!is_due(
            Instant::from_millis(4_000),
            last,
            Duration::from_millis(1)
        ));
    }
}
