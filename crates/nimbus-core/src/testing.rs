//! Deterministic fakes for host tests
//!
//! Everything here runs on a [`VirtualClock`] that only moves when a test (or
//! a [`RecordingDelay`]) advances it. Fakes that tests need to inspect after
//! handing them to a component are cheap `Rc` handles: keep a clone, pass the
//! other one in.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;

use crate::classifier::{Classifier, WeatherClass};
use crate::clock::Clock;
use crate::config::InternetConfig;
use crate::delivery::{DeliveryOutcome, DeliveryStats, DocumentStore, Reading, Sink, StoreError};
use crate::link::{LinkDiagnostics, LinkDriver, LinkFailure, LinkState};
use crate::net::{HttpClient, HttpRequest, HttpResponse, NetError};
use crate::pipeline::LinkMonitor;
use crate::scaling::FeatureVector;
use crate::sensors::{Sample, SensorError, SensorSource};
use crate::status::StatusSink;

/// Manually advanced clock starting at boot (`Instant` zero)
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    micros: Rc<Cell<u64>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros.set(self.micros.get() + by.as_micros());
    }

    /// Time since the clock was created
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.micros.get())
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.micros.get())
    }
}

/// Delay that returns immediately, advancing a [`VirtualClock`] and
/// recording every requested wait.
#[derive(Debug, Clone)]
pub struct RecordingDelay {
    clock: VirtualClock,
    delays: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingDelay {
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            delays: Rc::default(),
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.delays
            .borrow()
            .iter()
            .fold(Duration::from_ticks(0), |acc, d| acc + *d)
    }

    fn record(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.delays.borrow_mut().push(duration);
    }
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.record(Duration::from_micros(u64::from(ns).div_ceil(1_000)));
    }

    async fn delay_us(&mut self, us: u32) {
        self.record(Duration::from_micros(u64::from(us)));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.record(Duration::from_millis(u64::from(ms)));
    }
}

/// Status sink remembering every transition
#[derive(Debug, Clone, Default)]
pub struct RecordingStatus {
    pub transitions: Vec<(LinkState, LinkState)>,
}

impl StatusSink for RecordingStatus {
    fn on_transition(&mut self, from: LinkState, to: LinkState) {
        self.transitions.push((from, to));
    }
}

/// Outcome of one scripted association attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptScript {
    /// `begin` succeeds and the link becomes active after the given time
    ActiveAfter(Duration),
    /// `begin` succeeds but the link never comes up
    NeverActive,
    /// `begin` itself fails
    Refused(LinkFailure),
}

/// Link driver following a script of attempt outcomes. Attempts beyond the
/// script never become active.
#[derive(Debug)]
pub struct ScriptedLink {
    clock: VirtualClock,
    script: VecDeque<AttemptScript>,
    ready_at: Option<Instant>,
    failure: LinkFailure,
    begin_calls: u32,
    rssi: Option<i8>,
}

impl ScriptedLink {
    pub fn new(clock: VirtualClock, script: &[AttemptScript]) -> Self {
        Self {
            clock,
            script: script.iter().copied().collect(),
            ready_at: None,
            failure: LinkFailure::Timeout,
            begin_calls: 0,
            rssi: Some(-48),
        }
    }

    pub fn push_script(&mut self, attempt: AttemptScript) {
        self.script.push_back(attempt);
    }

    /// Simulate the access point going away.
    pub fn drop_link(&mut self, reason: LinkFailure) {
        self.ready_at = None;
        self.failure = reason;
    }

    pub fn set_rssi(&mut self, rssi: i8) {
        self.rssi = Some(rssi);
    }

    pub fn begin_calls(&self) -> u32 {
        self.begin_calls
    }
}

impl LinkDriver for ScriptedLink {
    async fn disconnect(&mut self) {
        self.ready_at = None;
    }

    async fn begin(&mut self, _credentials: &InternetConfig) -> Result<(), LinkFailure> {
        self.begin_calls += 1;
        match self.script.pop_front().unwrap_or(AttemptScript::NeverActive) {
            AttemptScript::ActiveAfter(after) => {
                self.ready_at = Some(self.clock.now() + after);
                self.failure = LinkFailure::Timeout;
                Ok(())
            }
            AttemptScript::NeverActive => {
                self.ready_at = None;
                self.failure = LinkFailure::Timeout;
                Ok(())
            }
            AttemptScript::Refused(failure) => {
                self.ready_at = None;
                self.failure = failure;
                Err(failure)
            }
        }
    }

    fn is_active(&self) -> bool {
        self.ready_at.is_some_and(|at| self.clock.now() >= at)
    }

    fn last_failure(&self) -> LinkFailure {
        self.failure
    }

    fn diagnostics(&self) -> LinkDiagnostics {
        LinkDiagnostics {
            local_addr: self.is_active().then_some(Ipv4Addr::new(10, 0, 0, 42)),
            rssi: self.rssi,
        }
    }
}

/// Link monitor with a switchable availability flag
#[derive(Debug, Clone)]
pub struct FixedLink {
    available: Rc<Cell<bool>>,
    polls: Rc<Cell<u32>>,
}

impl FixedLink {
    pub fn new(available: bool) -> Self {
        Self {
            available: Rc::new(Cell::new(available)),
            polls: Rc::default(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    pub fn polls(&self) -> u32 {
        self.polls.get()
    }
}

impl LinkMonitor for FixedLink {
    fn is_available(&self) -> bool {
        self.available.get()
    }

    async fn poll(&mut self) {
        self.polls.set(self.polls.get() + 1);
    }
}

#[derive(Debug)]
struct HttpState {
    link_up: bool,
    resolve: VecDeque<Result<Ipv4Addr, NetError>>,
    responses: VecDeque<Result<HttpResponse, NetError>>,
    default_response: Result<HttpResponse, NetError>,
    requests: Vec<HttpRequest>,
    resolve_calls: u32,
}

/// HTTP client answering from queues. Resolution succeeds and requests get
/// `200 "1"` unless something else is queued.
#[derive(Debug, Clone)]
pub struct ScriptedHttp {
    state: Rc<RefCell<HttpState>>,
}

impl Default for ScriptedHttp {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HttpState {
                link_up: true,
                resolve: VecDeque::new(),
                responses: VecDeque::new(),
                default_response: Ok(HttpResponse::new(200, "1")),
                requests: Vec::new(),
                resolve_calls: 0,
            })),
        }
    }

    pub fn set_link_up(&self, up: bool) {
        self.state.borrow_mut().link_up = up;
    }

    pub fn push_resolve(&self, result: Result<Ipv4Addr, NetError>) {
        self.state.borrow_mut().resolve.push_back(result);
    }

    pub fn push_response(&self, response: Result<HttpResponse, NetError>) {
        self.state.borrow_mut().responses.push_back(response);
    }

    pub fn set_default_response(&self, response: Result<HttpResponse, NetError>) {
        self.state.borrow_mut().default_response = response;
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.borrow().requests.clone()
    }

    pub fn resolve_calls(&self) -> u32 {
        self.state.borrow().resolve_calls
    }
}

impl HttpClient for ScriptedHttp {
    fn link_up(&self) -> bool {
        self.state.borrow().link_up
    }

    async fn resolve(&mut self, _host: &str) -> Result<Ipv4Addr, NetError> {
        let mut state = self.state.borrow_mut();
        state.resolve_calls += 1;
        state
            .resolve
            .pop_front()
            .unwrap_or(Ok(Ipv4Addr::new(184, 106, 153, 149)))
    }

    async fn send(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetError> {
        let mut state = self.state.borrow_mut();
        state.requests.push(request.clone());
        match state.responses.pop_front() {
            Some(response) => response,
            None => state.default_response.clone(),
        }
    }
}

#[derive(Debug)]
struct StoreState {
    ready: bool,
    fail: Option<StoreError>,
    writes: Vec<(String, String)>,
}

/// In-memory document store recording successful writes
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Rc<RefCell<StoreState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(StoreState {
                ready: true,
                fail: None,
                writes: Vec::new(),
            })),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.borrow_mut().ready = ready;
    }

    /// Fail every write with `error` until called with `None`.
    pub fn fail_all(&self, error: Option<StoreError>) {
        self.state.borrow_mut().fail = error;
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.state.borrow().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().writes.clear();
    }
}

impl DocumentStore for MemoryStore {
    fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    async fn put(&mut self, path: &str, json: &str) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        if !state.ready {
            return Err(StoreError::NotReady);
        }
        if let Some(error) = state.fail {
            return Err(error);
        }
        state.writes.push((String::from(path), String::from(json)));
        Ok(())
    }
}

#[derive(Debug)]
struct SensorState {
    sample: Sample,
    failures_left: u32,
    reads: u32,
}

/// Sensor returning a fixed sample, optionally failing the next few reads
#[derive(Debug, Clone)]
pub struct ScriptedSensor {
    state: Rc<RefCell<SensorState>>,
}

impl ScriptedSensor {
    pub fn constant(sample: Sample) -> Self {
        Self {
            state: Rc::new(RefCell::new(SensorState {
                sample,
                failures_left: 0,
                reads: 0,
            })),
        }
    }

    pub fn set_sample(&self, sample: Sample) {
        self.state.borrow_mut().sample = sample;
    }

    pub fn fail_next(&self, count: u32) {
        self.state.borrow_mut().failures_left = count;
    }

    pub fn reads(&self) -> u32 {
        self.state.borrow().reads
    }
}

impl SensorSource for ScriptedSensor {
    async fn read(&mut self) -> Result<Sample, SensorError> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(SensorError::Timeout {
                sensor: "scripted",
                operation: "read",
            });
        }
        Ok(state.sample)
    }
}

/// Wraps a classifier and counts invocations
#[derive(Debug, Clone)]
pub struct CountingClassifier<K> {
    inner: K,
    calls: Rc<Cell<u32>>,
    last_features: Rc<Cell<Option<FeatureVector>>>,
}

impl<K: Classifier> CountingClassifier<K> {
    pub fn new(inner: K) -> Self {
        Self {
            inner,
            calls: Rc::default(),
            last_features: Rc::default(),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub fn last_features(&self) -> Option<FeatureVector> {
        self.last_features.get()
    }
}

impl<K: Classifier> Classifier for CountingClassifier<K> {
    fn classify(&self, features: &FeatureVector) -> WeatherClass {
        self.calls.set(self.calls.get() + 1);
        self.last_features.set(Some(*features));
        self.inner.classify(features)
    }
}

#[derive(Debug)]
struct SinkState {
    failing: bool,
    deliveries: Vec<Reading>,
    stats: DeliveryStats,
}

/// Sink recording every reading handed to it
#[derive(Debug, Clone)]
pub struct RecordingSink {
    name: &'static str,
    state: Rc<RefCell<SinkState>>,
}

impl RecordingSink {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Rc::new(RefCell::new(SinkState {
                failing: false,
                deliveries: Vec::new(),
                stats: DeliveryStats::default(),
            })),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.borrow_mut().failing = failing;
    }

    pub fn deliveries(&self) -> Vec<Reading> {
        self.state.borrow().deliveries.clone()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.state.borrow().stats
    }
}

impl Sink for RecordingSink {
    type Error = &'static str;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn deliver(&mut self, reading: &Reading) -> Result<DeliveryOutcome, &'static str> {
        let mut state = self.state.borrow_mut();
        state.deliveries.push(*reading);
        if state.failing {
            state.stats.record_failure();
            Err("scripted failure")
        } else {
            state.stats.record_success();
            Ok(DeliveryOutcome::Delivered)
        }
    }

    fn stats(&self) -> DeliveryStats {
        self.state.borrow().stats
    }
}
