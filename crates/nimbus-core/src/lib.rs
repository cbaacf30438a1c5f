//! Hardware-independent core library for nimbus
//!
//! This crate contains all platform-agnostic logic for the nimbus weather
//! sensing node: the link state machine, window aggregation, feature scaling,
//! the classifier port, the two cloud sinks and the delivery pipeline that
//! ties them together.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).
//! Hardware lives behind traits: [`link::LinkDriver`], [`net::HttpClient`],
//! [`sensors::SensorSource`], [`clock::Clock`] and
//! [`embedded_hal_async::delay::DelayNs`].

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod aggregation;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod link;
pub mod metrics;
pub mod net;
pub mod pipeline;
pub mod scaling;
pub mod sensors;
pub mod status;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
