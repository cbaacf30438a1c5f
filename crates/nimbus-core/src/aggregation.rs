//! Fixed-size sliding windows over the sensor channels
//!
//! Each channel keeps the most recent `N` values in a circular buffer. The
//! average always divides by `N`, so slots that were never written count as
//! zero until the window has filled once after a reset.

use crate::sensors::{CHANNEL_COUNT, Channel, Sample};

/// Window length used by the deployed node
pub const DEFAULT_WINDOW_LEN: usize = 15;

/// Circular buffer of the last `N` values of one channel
#[derive(Debug, Clone)]
pub struct Window<const N: usize> {
    values: [f32; N],
    next: usize,
}

impl<const N: usize> Default for Window<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Window<N> {
    pub const fn new() -> Self {
        assert!(N > 0, "window length must be non-zero");
        Self {
            values: [0.0; N],
            next: 0,
        }
    }

    /// Overwrite the oldest slot with `value`.
    pub fn push(&mut self, value: f32) {
        self.values[self.next] = value;
        self.next = (self.next + 1) % N;
    }

    /// Mean over the full capacity.
    pub fn average(&self) -> f32 {
        // Accumulate in f64 so N identical values average back to exactly
        // the same f32.
        let sum: f64 = self.values.iter().map(|v| *v as f64).sum();
        (sum / N as f64) as f32
    }

    pub fn clear(&mut self) {
        self.values = [0.0; N];
        self.next = 0;
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

/// One [`Window`] per channel, fed a whole [`Sample`] at a time.
#[derive(Debug, Clone)]
pub struct WindowAggregator<const N: usize = DEFAULT_WINDOW_LEN> {
    windows: [Window<N>; CHANNEL_COUNT],
    samples_seen: u32,
}

impl<const N: usize> Default for WindowAggregator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> WindowAggregator<N> {
    pub const fn new() -> Self {
        Self {
            windows: [const { Window::new() }; CHANNEL_COUNT],
            samples_seen: 0,
        }
    }

    pub fn sample(&mut self, sample: &Sample) {
        for channel in Channel::ALL {
            self.windows[channel.index()].push(sample.get(channel));
        }
        self.samples_seen = self.samples_seen.saturating_add(1);
    }

    /// Per-channel means over the window capacity.
    pub fn average(&self) -> Sample {
        let mut averages = Sample::default();
        for channel in Channel::ALL {
            averages.set(channel, self.windows[channel.index()].average());
        }
        averages
    }

    /// Whether at least `N` samples arrived since the last reset
    pub fn is_filled(&self) -> bool {
        self.samples_seen as usize >= N
    }

    pub fn samples_seen(&self) -> u32 {
        self.samples_seen
    }

    pub fn reset(&mut self) {
        for window in &mut self.windows {
            window.clear();
        }
        self.samples_seen = 0;
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unfilled_slots_count_as_zero() {
        let mut window = Window::<4>::new();
        window.push(8.0);

        assert_eq!(window.average(), 2.0);
    }

    #[test]
    fn oldest_value_drops_out() {
        let mut window = Window::<3>::new();
        for v in [100.0, 1.0, 2.0, 3.0] {
            window.push(v);
        }

        assert_eq!(window.average(), 2.0);
    }

    #[test]
    fn aggregator_averages_every_channel() {
        let mut agg = WindowAggregator::<DEFAULT_WINDOW_LEN>::new();
        let sample = Sample::new(30.0, 30.0, 96_400.0, 600.0, 450.0);
        for _ in 0..DEFAULT_WINDOW_LEN {
            agg.sample(&sample);
        }

        assert!(agg.is_filled());
        assert_eq!(agg.average(), sample);
    }

    #[test]
    fn reset_clears_history() {
        let mut agg = WindowAggregator::<2>::new();
        agg.sample(&Sample::new(1.0, 1.0, 1.0, 1.0, 1.0));
        agg.reset();

        assert_eq!(agg.samples_seen(), 0);
        assert_eq!(agg.average(), Sample::default());
    }

    proptest! {
        #[test]
        fn identical_values_average_to_themselves(v in -1.0e5f32..1.0e5) {
            let mut window = Window::<DEFAULT_WINDOW_LEN>::new();
            for _ in 0..DEFAULT_WINDOW_LEN {
                window.push(v);
            }
            prop_assert_eq!(window.average(), v);
        }

        #[test]
        fn only_last_n_values_contribute(
            values in proptest::collection::vec(0.0f32..1_000.0, DEFAULT_WINDOW_LEN + 1..64)
        ) {
            let mut window = Window::<DEFAULT_WINDOW_LEN>::new();
            for v in &values {
                window.push(*v);
            }

            let tail = &values[values.len() - DEFAULT_WINDOW_LEN..];
            let expected = tail.iter().map(|v| *v as f64).sum::<f64>() / DEFAULT_WINDOW_LEN as f64;
            prop_assert!((window.average() as f64 - expected).abs() < 1e-3);
        }
    }
}
