//! Simulated radio and cloud endpoints.
//!
//! A single [`SimNetwork`] is shared between the link driver and the HTTP
//! transport so an injected outage takes both down together, the same way a
//! lost access point does on the device.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use anyhow::ensure;
use embassy_time::{Duration, Instant};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nimbus_core::clock::Clock;
use nimbus_core::config::InternetConfig;
use nimbus_core::link::{LinkDiagnostics, LinkDriver, LinkFailure};
use nimbus_core::net::{HttpClient, HttpRequest, HttpResponse, Method, NetError};

use crate::clock::SimClock;

/// Fault injection knobs
#[derive(Debug, Clone, Copy)]
pub struct FaultProfile {
    /// Chance per simulated second that the access point disappears
    pub outage_rate: f64,
    pub outage_length: Duration,
    /// Time from `begin` until the station has an address
    pub association_time: Duration,
    pub dns_failure_rate: f64,
    pub http_failure_rate: f64,
}

impl FaultProfile {
    /// Every rate must be a probability.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, rate) in [
            ("outage rate", self.outage_rate),
            ("DNS failure rate", self.dns_failure_rate),
            ("HTTP failure rate", self.http_failure_rate),
        ] {
            ensure!(
                (0.0..=1.0).contains(&rate),
                "{name} must be between 0 and 1, got {rate}"
            );
        }
        Ok(())
    }
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            outage_rate: 0.0,
            outage_length: Duration::from_secs(60),
            association_time: Duration::from_millis(1_500),
            dns_failure_rate: 0.0,
            http_failure_rate: 0.0,
        }
    }
}

struct NetworkState {
    clock: SimClock,
    rng: StdRng,
    faults: FaultProfile,
    associating_since: Option<Instant>,
    associated: bool,
    outage_until: Option<Instant>,
    last_step: Instant,
    rssi: i8,
    next_entry: u32,
}

impl NetworkState {
    fn in_outage(&self, now: Instant) -> bool {
        self.outage_until.is_some_and(|until| now < until)
    }

    fn roll(&mut self, probability: f64) -> bool {
        if probability.is_nan() {
            return false;
        }
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Promote a pending association once enough time has passed.
    fn settle(&mut self, now: Instant) {
        if self.in_outage(now) {
            return;
        }
        if let Some(since) = self.associating_since {
            if now.saturating_duration_since(since) >= self.faults.association_time {
                self.associating_since = None;
                self.associated = true;
                self.rssi = self.rng.gen_range(-75..=-45);
            }
        }
    }
}

/// Shared handle to the simulated network
#[derive(Clone)]
pub struct SimNetwork {
    inner: Rc<RefCell<NetworkState>>,
}

impl SimNetwork {
    pub fn new(clock: SimClock, seed: u64, faults: FaultProfile) -> Self {
        let now = clock.now();
        Self {
            inner: Rc::new(RefCell::new(NetworkState {
                clock,
                rng: StdRng::seed_from_u64(seed ^ 0x6e65_7477_6f72_6b),
                faults,
                associating_since: None,
                associated: false,
                outage_until: None,
                last_step: now,
                rssi: -60,
                next_entry: 1,
            })),
        }
    }

    /// Advance fault injection to the current time.
    pub fn step(&self) {
        let mut state = self.inner.borrow_mut();
        let now = state.clock.now();
        let elapsed = now.saturating_duration_since(state.last_step);
        state.last_step = now;

        if let Some(until) = state.outage_until {
            if now >= until {
                state.outage_until = None;
                info!("Simulated access point is back");
            }
            return;
        }

        let chance = state.faults.outage_rate * elapsed.as_micros() as f64 / 1_000_000.0;
        if state.roll(chance) {
            let until = now + state.faults.outage_length;
            warn!(
                "Simulated outage for {} s",
                state.faults.outage_length.as_secs()
            );
            state.outage_until = Some(until);
            state.associated = false;
            state.associating_since = None;
        }
    }

    /// Whether the station is associated right now.
    pub fn link_up(&self) -> bool {
        let mut state = self.inner.borrow_mut();
        let now = state.clock.now();
        state.settle(now);
        state.associated && !state.in_outage(now)
    }

    pub fn in_outage(&self) -> bool {
        let state = self.inner.borrow();
        state.in_outage(state.clock.now())
    }
}

/// Station driver backed by [`SimNetwork`]
pub struct SimLinkDriver {
    network: SimNetwork,
}

impl SimLinkDriver {
    pub fn new(network: SimNetwork) -> Self {
        Self { network }
    }
}

impl LinkDriver for SimLinkDriver {
    async fn disconnect(&mut self) {
        let mut state = self.network.inner.borrow_mut();
        state.associated = false;
        state.associating_since = None;
    }

    async fn begin(&mut self, credentials: &InternetConfig) -> Result<(), LinkFailure> {
        if credentials.ssid.is_empty() {
            return Err(LinkFailure::NetworkNotFound);
        }
        let mut state = self.network.inner.borrow_mut();
        let now = state.clock.now();
        debug!("Associating with {}", credentials.ssid);
        state.associating_since = Some(now);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.network.link_up()
    }

    fn last_failure(&self) -> LinkFailure {
        if self.network.in_outage() {
            LinkFailure::NetworkNotFound
        } else {
            LinkFailure::Timeout
        }
    }

    fn diagnostics(&self) -> LinkDiagnostics {
        let state = self.network.inner.borrow();
        LinkDiagnostics {
            local_addr: Some(Ipv4Addr::new(192, 168, 4, 23)),
            rssi: Some(state.rssi),
        }
    }
}

/// In-process stand-in for both cloud services
///
/// `/update` requests answer with an increasing entry id like a channel
/// feed. Document writes echo their body.
#[derive(Clone)]
pub struct SimHttp {
    network: SimNetwork,
}

impl SimHttp {
    pub fn new(network: SimNetwork) -> Self {
        Self { network }
    }
}

impl HttpClient for SimHttp {
    fn link_up(&self) -> bool {
        self.network.link_up()
    }

    async fn resolve(&mut self, host: &str) -> Result<Ipv4Addr, NetError> {
        if !self.network.link_up() {
            return Err(NetError::LinkDown);
        }
        let mut state = self.network.inner.borrow_mut();
        let rate = state.faults.dns_failure_rate;
        if host.is_empty() || state.roll(rate) {
            return Err(NetError::Resolve);
        }
        let hash = host
            .bytes()
            .fold(0u16, |acc, b| acc.wrapping_mul(31).wrapping_add(u16::from(b)));
        let [hi, lo] = hash.to_be_bytes();
        Ok(Ipv4Addr::new(10, 77, hi, lo))
    }

    async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetError> {
        if !self.network.link_up() {
            return Err(NetError::LinkDown);
        }
        let mut state = self.network.inner.borrow_mut();
        let rate = state.faults.http_failure_rate;
        if state.roll(rate) {
            return if state.rng.gen_bool(0.5) {
                Err(NetError::Timeout)
            } else {
                Ok(HttpResponse::new(503, "unavailable"))
            };
        }

        debug!("{} {}", request.method.as_str(), request.url());
        let response = match request.method {
            Method::Get if request.path.starts_with("/update") => {
                let entry = state.next_entry;
                state.next_entry += 1;
                HttpResponse::new(200, &entry.to_string())
            }
            Method::Get => HttpResponse::new(200, "{}"),
            Method::Put => HttpResponse::new(200, request.body.as_deref().unwrap_or("null")),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    fn network(faults: FaultProfile) -> (SimClock, SimNetwork) {
        let clock = SimClock::accelerated();
        let network = SimNetwork::new(clock.clone(), 7, faults);
        (clock, network)
    }

    fn advance(clock: &SimClock, duration: Duration) {
        if let SimClock::Accelerated(micros) = clock {
            micros.set(micros.get() + duration.as_micros());
        }
    }

    fn credentials() -> InternetConfig {
        InternetConfig {
            ssid: "sim".into(),
            password: "sim".into(),
        }
    }

    #[test]
    fn station_comes_up_after_association_time() {
        let (clock, network) = network(FaultProfile::default());
        let mut driver = SimLinkDriver::new(network.clone());

        block_on(driver.begin(&credentials())).unwrap();
        assert!(!driver.is_active());

        advance(&clock, Duration::from_millis(1_500));
        assert!(driver.is_active());
        assert!(network.link_up());

        block_on(driver.disconnect());
        assert!(!driver.is_active());
    }

    #[test]
    fn outage_takes_down_link_and_http() {
        let (clock, network) = network(FaultProfile {
            outage_rate: 1.0,
            outage_length: Duration::from_secs(30),
            ..FaultProfile::default()
        });
        let mut driver = SimLinkDriver::new(network.clone());
        let mut http = SimHttp::new(network.clone());

        block_on(driver.begin(&credentials())).unwrap();
        advance(&clock, Duration::from_secs(2));
        assert!(http.link_up());

        network.step();
        assert!(!driver.is_active());
        assert_eq!(driver.last_failure(), LinkFailure::NetworkNotFound);
        assert_eq!(
            block_on(http.resolve("api.thingspeak.com")),
            Err(NetError::LinkDown)
        );

        advance(&clock, Duration::from_secs(30));
        network.step();
        assert!(!network.in_outage());
    }

    #[test]
    fn rates_outside_zero_to_one_are_rejected() {
        assert!(FaultProfile::default().validate().is_ok());
        for bad in [f64::NAN, f64::INFINITY, -0.1, 1.5] {
            let faults = FaultProfile {
                dns_failure_rate: bad,
                ..FaultProfile::default()
            };
            assert!(faults.validate().is_err(), "accepted {bad}");
        }
        let faults = FaultProfile {
            outage_rate: f64::NAN,
            ..FaultProfile::default()
        };
        assert!(faults.validate().is_err());
    }

    #[test]
    fn nan_rate_never_fires() {
        let (clock, network) = network(FaultProfile {
            outage_rate: f64::NAN,
            ..FaultProfile::default()
        });
        advance(&clock, Duration::from_secs(5));
        network.step();
        assert!(!network.in_outage());
    }

    #[test]
    fn update_requests_return_increasing_entry_ids() {
        let (clock, network) = network(FaultProfile::default());
        let mut driver = SimLinkDriver::new(network.clone());
        let mut http = SimHttp::new(network);
        block_on(driver.begin(&credentials())).unwrap();
        advance(&clock, Duration::from_secs(2));

        let request = HttpRequest::get(
            "api.thingspeak.com",
            80,
            "/update?api_key=K".into(),
            Duration::from_secs(10),
        );
        let first = block_on(http.send(&request)).unwrap();
        let second = block_on(http.send(&request)).unwrap();
        assert_eq!(first.body, "1");
        assert_eq!(second.body, "2");
    }
}
