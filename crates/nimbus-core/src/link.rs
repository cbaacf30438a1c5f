//! Wireless link lifecycle
//!
//! [`ConnectivityManager`] owns the link driver and walks it through
//! `Idle → Connecting → Connected`, retrying a bounded number of times and
//! monitoring the association once it is up:
//!
//! ```text
//!            connect()                 active within T_conn
//!   Idle ───────────────► Connecting ─────────────────────► Connected
//!                          ▲      │                              │
//!             retry delay  │      │ timeout, retries left        │ health check:
//!                          │      ▼                              │ link inactive
//!                        Reconnecting                            ▼
//!                                 │ timeout, no retries      Disconnected
//!                                 ▼                              │
//!                               Failed ◄──── retry() ───┐        │ auto-reconnect
//!                                 └─────────────────────┘        └──► Connecting
//! ```
//!
//! `Failed` only leaves through an explicit [`ConnectivityManager::retry`].

use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::clock::{Clock, delay_millis, is_due};
use crate::config::{InternetConfig, LinkConfig};
use crate::metrics::SignalQuality;
use crate::status::StatusSink;

/// Pause between tearing down the old association and starting a new one
const SETTLE_TIME: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Failed,
}

impl LinkState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Reconnecting => "Reconnecting",
            Self::Failed => "Failed",
        }
    }
}

/// Why a single association attempt did not succeed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFailure {
    #[error("network not found")]
    NetworkNotFound,
    #[error("authentication rejected")]
    AuthRejected,
    #[error("signal lost")]
    SignalLost,
    #[error("timed out")]
    Timeout,
    #[error("driver error")]
    Driver,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("connection attempt already in progress")]
    AlreadyConnecting,
    #[error("link not established after {attempts} attempts (last: {last})")]
    RetriesExhausted { attempts: u8, last: LinkFailure },
}

/// Details reported once the link is up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkDiagnostics {
    pub local_addr: Option<Ipv4Addr>,
    /// Received signal strength in dBm
    pub rssi: Option<i8>,
}

/// Transport underneath the connectivity manager (a WiFi station on the
/// device).
pub trait LinkDriver {
    /// Drop any current association. Must be safe to call when idle.
    fn disconnect(&mut self) -> impl Future<Output = ()>;

    /// Start associating with the configured network. Returns once the
    /// request is issued; completion is observed through [`Self::is_active`].
    fn begin(&mut self, credentials: &InternetConfig)
    -> impl Future<Output = Result<(), LinkFailure>>;

    /// Whether the link is associated and has an address.
    fn is_active(&self) -> bool;

    /// Best guess at why the link is not active.
    fn last_failure(&self) -> LinkFailure;

    fn diagnostics(&self) -> LinkDiagnostics;
}

/// Lifetime counters, never reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// `connect()` calls that started an acquisition
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    /// Connected time of completed sessions
    pub connected_time: Duration,
}

pub struct ConnectivityManager<D, C, W, S> {
    driver: D,
    clock: C,
    delay: W,
    status: S,
    credentials: InternetConfig,
    config: LinkConfig,
    state: LinkState,
    retry_count: u8,
    last_attempt: Option<Instant>,
    last_check: Instant,
    connected_since: Option<Instant>,
    stats: LinkStats,
}

impl<D, C, W, S> ConnectivityManager<D, C, W, S>
where
    D: LinkDriver,
    C: Clock,
    W: DelayNs,
    S: StatusSink,
{
    pub fn new(
        driver: D,
        clock: C,
        delay: W,
        status: S,
        credentials: InternetConfig,
        config: LinkConfig,
    ) -> Self {
        let last_check = clock.now();
        info!(
            "link manager ready: ssid '{}', auto-reconnect {}, max retries {}",
            credentials.ssid, config.auto_reconnect, config.max_retries
        );
        Self {
            driver,
            clock,
            delay,
            status,
            credentials,
            config,
            state: LinkState::Idle,
            retry_count: 0,
            last_attempt: None,
            last_check,
            connected_since: None,
            stats: LinkStats::default(),
        }
    }

    /// Acquire the link, retrying up to `max_retries` attempts.
    ///
    /// Returns [`LinkError::AlreadyConnecting`] without touching any state if
    /// an acquisition is already running.
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        if self.state == LinkState::Connecting {
            warn!("connect requested while already connecting");
            return Err(LinkError::AlreadyConnecting);
        }

        if self.state == LinkState::Connected {
            self.close_session();
        }

        self.stats.attempts = self.stats.attempts.saturating_add(1);
        self.retry_count = 0;
        let started = self.clock.now();

        loop {
            self.transition(LinkState::Connecting);
            self.retry_count = self.retry_count.saturating_add(1);
            self.last_attempt = Some(self.clock.now());
            info!(
                "connecting to '{}' (attempt {}/{})",
                self.credentials.ssid, self.retry_count, self.config.max_retries
            );

            match self.attempt().await {
                Ok(()) => {
                    self.on_connected(started);
                    return Ok(());
                }
                Err(failure) => {
                    warn!("link attempt {} failed: {}", self.retry_count, failure);

                    if self.retry_count >= self.config.max_retries {
                        self.transition(LinkState::Failed);
                        self.stats.failures = self.stats.failures.saturating_add(1);
                        warn!(
                            "all {} link attempts failed, waiting for an explicit retry",
                            self.retry_count
                        );
                        return Err(LinkError::RetriesExhausted {
                            attempts: self.retry_count,
                            last: failure,
                        });
                    }

                    self.transition(LinkState::Reconnecting);
                    info!(
                        "retrying in {} ms",
                        self.config.retry_delay().as_millis()
                    );
                    self.delay
                        .delay_ms(delay_millis(self.config.retry_delay()))
                        .await;
                }
            }
        }
    }

    /// One association attempt bounded by `connect_timeout`.
    async fn attempt(&mut self) -> Result<(), LinkFailure> {
        self.driver.disconnect().await;
        self.delay.delay_ms(delay_millis(SETTLE_TIME)).await;
        self.driver.begin(&self.credentials).await?;

        let started = self.clock.now();
        let timeout = self.config.connect_timeout();
        let poll = self.config.poll_interval();

        loop {
            if self.driver.is_active() {
                return Ok(());
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= timeout {
                return Err(self.driver.last_failure());
            }

            let wait = poll.min(timeout - elapsed);
            self.delay.delay_ms(delay_millis(wait)).await;
        }
    }

    fn on_connected(&mut self, started: Instant) {
        let now = self.clock.now();
        self.transition(LinkState::Connected);
        self.stats.successes = self.stats.successes.saturating_add(1);
        self.connected_since = Some(now);

        let diagnostics = self.driver.diagnostics();
        info!(
            "link up after {} ms (connection #{})",
            now.saturating_duration_since(started).as_millis(),
            self.stats.successes
        );
        if let Some(addr) = diagnostics.local_addr {
            info!("  address: {}", addr);
        }
        if let Some(rssi) = diagnostics.rssi {
            info!(
                "  signal:  {} dBm ({})",
                rssi,
                SignalQuality::from_rssi(rssi).label()
            );
        }
    }

    /// Periodic health check. Cheap when not due.
    ///
    /// Detects a lost link and, when auto-reconnect is enabled, starts a new
    /// acquisition right away.
    pub async fn update(&mut self) {
        let now = self.clock.now();
        if !is_due(now, Some(self.last_check), self.config.check_interval()) {
            return;
        }
        self.last_check = now;

        if self.state == LinkState::Connected && !self.driver.is_active() {
            warn!("link lost: {}", self.driver.last_failure());
            self.close_session();
            self.transition(LinkState::Disconnected);
        }

        if self.config.auto_reconnect && self.state == LinkState::Disconnected {
            info!("auto-reconnecting");
            if let Err(e) = self.connect().await {
                warn!("auto-reconnect failed: {}", e);
            }
        }
    }

    /// Explicitly drop the link.
    pub async fn disconnect(&mut self) {
        self.close_session();
        self.driver.disconnect().await;
        self.transition(LinkState::Disconnected);
        info!("link disconnected");
    }

    /// Leave `Failed` (or any other state) with a fresh acquisition.
    pub async fn retry(&mut self) -> Result<(), LinkError> {
        info!("manual link retry from {}", self.state.label());
        self.connect().await
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        self.config.auto_reconnect = enabled;
        info!("auto-reconnect {}", if enabled { "enabled" } else { "disabled" });
    }

    /// True only while connected and the transport agrees.
    pub fn is_available(&self) -> bool {
        self.state == LinkState::Connected && self.driver.is_active()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn status_label(&self) -> &'static str {
        self.state.label()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Attempt number within the current (or last) acquisition
    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// Total connected time including the current session
    pub fn connected_time(&self) -> Duration {
        let current = match self.connected_since {
            Some(since) if self.state == LinkState::Connected => {
                self.clock.now().saturating_duration_since(since)
            }
            _ => Duration::from_ticks(0),
        };
        self.stats.connected_time + current
    }

    pub fn signal_quality(&self) -> Option<SignalQuality> {
        if !self.is_available() {
            return None;
        }
        self.driver.diagnostics().rssi.map(SignalQuality::from_rssi)
    }

    pub fn diagnostics(&self) -> LinkDiagnostics {
        self.driver.diagnostics()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn log_statistics(&self) {
        let stats = self.stats;
        info!("link statistics:");
        info!("  state:            {}", self.state.label());
        info!("  acquisitions:     {}", stats.attempts);
        info!("  successful:       {}", stats.successes);
        info!("  failed:           {}", stats.failures);
        if stats.attempts > 0 {
            info!(
                "  success rate:     {:.1}%",
                stats.successes as f32 * 100.0 / stats.attempts as f32
            );
        }
        info!("  connected time:   {} s", self.connected_time().as_secs());
        if let Some(quality) = self.signal_quality() {
            info!("  signal:           {}", quality.label());
        }
    }

    /// Fold the current session into the accumulated connected time.
    fn close_session(&mut self) {
        if let Some(since) = self.connected_since.take() {
            let session = self.clock.now().saturating_duration_since(since);
            self.stats.connected_time += session;
            debug!("link session lasted {} s", session.as_secs());
        }
    }

    fn transition(&mut self, to: LinkState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!("link state {} -> {}", from.label(), to.label());
        self.status.on_transition(from, to);
    }

    #[cfg(test)]
    fn force_state(&mut self, state: LinkState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AttemptScript, RecordingDelay, RecordingStatus, ScriptedLink, VirtualClock};
    use alloc::vec;
    use embassy_futures::block_on;

    type Manager = ConnectivityManager<ScriptedLink, VirtualClock, RecordingDelay, RecordingStatus>;

    fn manager(script: &[AttemptScript]) -> Manager {
        let clock = VirtualClock::new();
        let link = ScriptedLink::new(clock.clone(), script);
        let delay = RecordingDelay::new(clock.clone());
        ConnectivityManager::new(
            link,
            clock,
            delay,
            RecordingStatus::default(),
            InternetConfig::default(),
            LinkConfig::default(),
        )
    }

    #[test]
    fn connects_on_first_attempt() {
        let mut m = manager(&[AttemptScript::ActiveAfter(Duration::from_millis(1_200))]);

        block_on(m.connect()).unwrap();

        assert_eq!(m.state(), LinkState::Connected);
        assert!(m.is_available());
        assert_eq!(m.stats().successes, 1);
        assert_eq!(
            m.status.transitions,
            vec![
                (LinkState::Idle, LinkState::Connecting),
                (LinkState::Connecting, LinkState::Connected),
            ]
        );
    }

    #[test]
    fn attempt_never_outlasts_connect_timeout() {
        let mut m = manager(&[AttemptScript::NeverActive; 5]);
        m.set_auto_reconnect(false);

        let err = block_on(m.connect()).unwrap_err();

        assert_eq!(
            err,
            LinkError::RetriesExhausted {
                attempts: 5,
                last: LinkFailure::Timeout
            }
        );
        assert_eq!(m.state(), LinkState::Failed);
        assert_eq!(m.stats().failures, 1);
        assert_eq!(m.driver().begin_calls(), 5);

        // Each attempt: 100 ms settle + 40 polls of 500 ms = 20 s, then 5 s
        // between attempts.
        let settle = Duration::from_millis(100);
        let timeout = LinkConfig::default().connect_timeout();
        let retry = LinkConfig::default().retry_delay();
        let expected = (settle + timeout) * 5 + retry * 4;
        assert_eq!(m.clock.elapsed(), expected);

        let polls = m.delay.delays().iter().filter(|d| **d == Duration::from_millis(500)).count();
        assert_eq!(polls, 40 * 5);
    }

    #[test]
    fn retries_then_succeeds() {
        let mut m = manager(&[
            AttemptScript::Refused(LinkFailure::AuthRejected),
            AttemptScript::NeverActive,
            AttemptScript::ActiveAfter(Duration::from_millis(0)),
        ]);

        block_on(m.connect()).unwrap();

        assert_eq!(m.retry_count(), 3);
        assert_eq!(m.stats().attempts, 1);
        assert_eq!(m.stats().successes, 1);
        assert!(m.status.transitions.contains(&(LinkState::Reconnecting, LinkState::Connecting)));
        let retries = m.delay.delays().iter().filter(|d| **d == Duration::from_secs(5)).count();
        assert_eq!(retries, 2);
    }

    #[test]
    fn connect_while_connecting_has_no_side_effects() {
        let mut m = manager(&[]);
        m.force_state(LinkState::Connecting);
        let before = m.stats();

        assert_eq!(block_on(m.connect()), Err(LinkError::AlreadyConnecting));
        assert_eq!(m.stats(), before);
        assert_eq!(m.driver().begin_calls(), 0);
        assert!(m.status.transitions.is_empty());
    }

    #[test]
    fn health_check_detects_loss_and_reconnects() {
        let mut m = manager(&[
            AttemptScript::ActiveAfter(Duration::from_millis(0)),
            AttemptScript::ActiveAfter(Duration::from_millis(500)),
        ]);
        block_on(m.connect()).unwrap();

        m.driver_mut().drop_link(LinkFailure::SignalLost);
        assert!(!m.is_available());

        // Not due yet: state is stale but availability already reflects the
        // transport.
        m.clock.advance(Duration::from_secs(5));
        block_on(m.update());
        assert_eq!(m.state(), LinkState::Connected);

        m.clock.advance(Duration::from_secs(5));
        block_on(m.update());

        assert_eq!(m.state(), LinkState::Connected);
        assert_eq!(m.stats().attempts, 2);
        assert!(m.status.transitions.contains(&(LinkState::Connected, LinkState::Disconnected)));
        assert!(m.status.transitions.contains(&(LinkState::Disconnected, LinkState::Connecting)));
    }

    #[test]
    fn no_auto_reconnect_stays_disconnected() {
        let mut m = manager(&[AttemptScript::ActiveAfter(Duration::from_millis(0))]);
        m.set_auto_reconnect(false);
        block_on(m.connect()).unwrap();

        m.driver_mut().drop_link(LinkFailure::SignalLost);
        m.clock.advance(Duration::from_secs(10));
        block_on(m.update());

        assert_eq!(m.state(), LinkState::Disconnected);
        assert_eq!(m.driver().begin_calls(), 1);
    }

    #[test]
    fn failed_is_terminal_until_retry() {
        let mut m = manager(&[AttemptScript::NeverActive; 5]);
        m.set_auto_reconnect(true);
        assert!(block_on(m.connect()).is_err());

        m.clock.advance(Duration::from_secs(60));
        block_on(m.update());
        assert_eq!(m.state(), LinkState::Failed);
        assert_eq!(m.driver().begin_calls(), 5);

        m.driver_mut().push_script(AttemptScript::ActiveAfter(Duration::from_millis(0)));
        block_on(m.retry()).unwrap();
        assert_eq!(m.state(), LinkState::Connected);
    }

    #[test]
    fn connected_time_accumulates_across_sessions() {
        let mut m = manager(&[
            AttemptScript::ActiveAfter(Duration::from_millis(0)),
            AttemptScript::ActiveAfter(Duration::from_millis(0)),
        ]);
        block_on(m.connect()).unwrap();
        m.clock.advance(Duration::from_secs(30));
        block_on(m.disconnect());
        assert_eq!(m.connected_time(), Duration::from_secs(30));

        m.clock.advance(Duration::from_secs(100));
        block_on(m.connect()).unwrap();
        m.clock.advance(Duration::from_secs(12));

        assert_eq!(m.connected_time(), Duration::from_secs(42));
        assert_eq!(m.stats().connected_time, Duration::from_secs(30));
    }

    #[test]
    fn signal_quality_only_when_available() {
        let mut m = manager(&[AttemptScript::ActiveAfter(Duration::from_millis(0))]);
        m.driver_mut().set_rssi(-55);
        assert_eq!(m.signal_quality(), None);

        block_on(m.connect()).unwrap();
        assert_eq!(m.signal_quality(), Some(SignalQuality::Good));
    }
}
