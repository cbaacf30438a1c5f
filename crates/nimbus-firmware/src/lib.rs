//! ESP32-S3 bindings for nimbus
//!
//! Implements the nimbus-core hardware traits on top of esp-radio (WiFi
//! station), embassy-net (DHCP, DNS, TCP) and embassy-time. Everything else
//! runs unchanged from nimbus-core.

#![no_std]

extern crate alloc;

pub mod clock;
pub mod http;
pub mod link;
pub mod rng;
pub mod wifi_secrets;
