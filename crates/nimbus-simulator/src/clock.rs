//! Wall-clock or accelerated time for the simulator.

use std::cell::Cell;
use std::rc::Rc;

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use nimbus_core::clock::Clock;

/// Time since simulator start, either real or virtual.
///
/// In accelerated mode the clock only moves when a [`SimDelay`] waits, so a
/// day of operation runs in a few seconds.
#[derive(Clone)]
pub enum SimClock {
    Realtime(std::time::Instant),
    Accelerated(Rc<Cell<u64>>),
}

impl SimClock {
    pub fn realtime() -> Self {
        Self::Realtime(std::time::Instant::now())
    }

    pub fn accelerated() -> Self {
        Self::Accelerated(Rc::default())
    }

    fn sleep(&self, duration: Duration) {
        match self {
            Self::Realtime(_) => std::thread::sleep(std::time::Duration::from_micros(
                duration.as_micros(),
            )),
            Self::Accelerated(micros) => micros.set(micros.get() + duration.as_micros()),
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        match self {
            Self::Realtime(origin) => {
                Instant::from_micros(origin.elapsed().as_micros().try_into().unwrap_or(u64::MAX))
            }
            Self::Accelerated(micros) => Instant::from_micros(micros.get()),
        }
    }
}

/// Blocking delay matching a [`SimClock`].
#[derive(Clone)]
pub struct SimDelay {
    clock: SimClock,
}

impl SimDelay {
    pub fn new(clock: SimClock) -> Self {
        Self { clock }
    }
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock
            .sleep(Duration::from_micros(u64::from(ns).div_ceil(1_000)));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.clock.sleep(Duration::from_millis(u64::from(ms)));
    }
}
