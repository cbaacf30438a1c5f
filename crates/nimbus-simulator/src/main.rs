//! Desktop simulator for the nimbus weather node.
//!
//! Runs the complete node (link manager, sampling, classification and both
//! sinks) against a simulated radio and synthetic weather. By default time is
//! accelerated and the cloud services are simulated in-process; `--realtime`
//! follows the wall clock and `--live` sends real HTTP requests.
//!
//! ```text
//! nimbus-simulator --duration 3600 --seed 7 --outage-rate 0.001
//! NIMBUS_PRIMARY_API_KEY=... nimbus-simulator --live --realtime
//! ```

mod clock;
mod live;
mod network;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use embassy_futures::block_on;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use nimbus_core::classifier::CentroidClassifier;
use nimbus_core::clock::{Clock, delay_millis};
use nimbus_core::config::NodeConfig;
use nimbus_core::delivery::{DeviceId, DeviceInfo, PrimarySink, RtdbStore, SecondarySink};
use nimbus_core::link::ConnectivityManager;
use nimbus_core::net::HttpClient;
use nimbus_core::aggregation::DEFAULT_WINDOW_LEN;
use nimbus_core::pipeline::DeliveryPipeline;
use nimbus_core::sensors::WeatherSimulator;
use nimbus_core::status::{NoIndicator, StatusIndicator};

use crate::clock::{SimClock, SimDelay};
use crate::live::LiveHttp;
use crate::network::{FaultProfile, SimHttp, SimLinkDriver, SimNetwork};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Store host used when simulating the backup service without a config.
const SIMULATED_STORE_HOST: &str = "nimbus-sim.firebaseio.local";

#[derive(Parser, Debug)]
#[command(name = "nimbus-simulator", about = "Weather node simulator")]
struct Args {
    /// JSON node configuration; missing fields take their defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Simulated run time in seconds
    #[arg(long, default_value = "600")]
    duration: u64,

    /// Seed for weather, faults and the device MAC
    #[arg(long)]
    seed: Option<u64>,

    /// Follow the wall clock instead of accelerated time
    #[arg(long)]
    realtime: bool,

    /// Send requests to the real services
    #[arg(long)]
    live: bool,

    #[arg(long, env = "NIMBUS_PRIMARY_API_KEY")]
    api_key: Option<String>,

    #[arg(long, env = "NIMBUS_STORE_HOST")]
    store_host: Option<String>,

    #[arg(long, env = "NIMBUS_STORE_TOKEN")]
    store_token: Option<String>,

    /// Chance per second that the access point disappears
    #[arg(long, default_value = "0.0")]
    outage_rate: f64,

    /// Length of each outage in seconds
    #[arg(long, default_value = "60")]
    outage_secs: u64,

    #[arg(long, default_value = "0.0")]
    dns_failure_rate: f64,

    #[arg(long, default_value = "0.0")]
    http_failure_rate: f64,
}

impl Args {
    fn faults(&self) -> Result<FaultProfile> {
        let faults = FaultProfile {
            outage_rate: self.outage_rate,
            outage_length: Duration::from_secs(self.outage_secs),
            dns_failure_rate: self.dns_failure_rate,
            http_failure_rate: self.http_failure_rate,
            ..FaultProfile::default()
        };
        faults.validate()?;
        Ok(faults)
    }
}

fn load_config(args: &Args) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => NodeConfig::default(),
    };

    if config.internet.ssid.is_empty() {
        config.internet.ssid = "nimbus-sim".into();
    }
    if let Some(key) = &args.api_key {
        config.primary.api_key = key.clone();
    }
    if let Some(host) = &args.store_host {
        config.secondary.host = host.clone();
    }
    if let Some(token) = &args.store_token {
        config.secondary.auth_token = token.clone();
    }
    if !args.live && config.secondary.host.is_empty() {
        config.secondary.host = SIMULATED_STORE_HOST.into();
    }

    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

/// Locally administered unicast MAC derived from the seed.
fn simulated_mac(seed: u64) -> [u8; 6] {
    let [_, _, _, a, b, c, d, e] = seed.to_be_bytes();
    [0x02, a, b, c, d, e]
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let faults = args.faults()?;
    let seed = args.seed.unwrap_or_else(rand::random);

    let clock = if args.realtime {
        SimClock::realtime()
    } else {
        SimClock::accelerated()
    };
    let network = SimNetwork::new(clock.clone(), seed, faults);

    info!(
        "Simulating {} s ({}, {} services, seed {})",
        args.duration,
        if args.realtime { "realtime" } else { "accelerated" },
        if args.live { "live" } else { "simulated" },
        seed
    );

    if args.live {
        let http = LiveHttp::new(network.clone());
        block_on(run(&args, config, seed, clock, network, http))
    } else {
        let http = SimHttp::new(network.clone());
        block_on(run(&args, config, seed, clock, network, http))
    }
}

async fn run<H>(
    args: &Args,
    config: NodeConfig,
    seed: u64,
    clock: SimClock,
    network: SimNetwork,
    http: H,
) -> Result<()>
where
    H: HttpClient + Clone,
{
    let mut delay = SimDelay::new(clock.clone());

    // -----------------------------------------------------------------------
    // Link
    // -----------------------------------------------------------------------

    let mut link = ConnectivityManager::new(
        SimLinkDriver::new(network.clone()),
        clock.clone(),
        delay.clone(),
        StatusIndicator::<NoIndicator>::Log,
        config.internet.clone(),
        config.link.clone(),
    );
    if let Err(e) = link.connect().await {
        warn!("Starting offline: {e}");
    }

    // -----------------------------------------------------------------------
    // Sinks
    // -----------------------------------------------------------------------

    let mut primary = PrimarySink::new(http.clone(), delay.clone(), config.primary.clone());
    if link.is_available() && !primary.check_reachable().await {
        warn!("Primary service not reachable, uploads will be retried per reading");
    }

    let device = DeviceId::from_mac(simulated_mac(seed));
    let boot_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let info = DeviceInfo::new(
        &device,
        &config.secondary.firmware_version,
        &config.secondary.model_type,
        "simulator",
        boot_secs,
    );
    info!("Device id {} (MAC {})", device, device.mac_string());

    let store = RtdbStore::new(http, &config.secondary);
    let mut secondary = SecondarySink::new(store, clock.clone(), device, config.secondary.clone());
    if let Err(e) = secondary.initialize(&info).await {
        warn!("Backup store unavailable: {e}");
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    let mut node: DeliveryPipeline<_, _, _, _, _, _, DEFAULT_WINDOW_LEN> = DeliveryPipeline::new(
        WeatherSimulator::new(StdRng::seed_from_u64(seed)),
        CentroidClassifier::new(),
        link,
        primary,
        secondary,
        clock.clone(),
        config.pipeline.clone(),
    );
    node.start();

    let end = clock.now() + Duration::from_secs(args.duration);
    while clock.now() < end {
        network.step();
        node.tick().await;

        let now = clock.now();
        let wake = node.next_due().min(end);
        let wait = wake.saturating_duration_since(now);
        if wait.as_ticks() > 0 {
            delay.delay_ms(delay_millis(wait).max(1)).await;
        }
    }

    if node.secondary().is_initialized() {
        if let Err(e) = node.secondary_mut().update_status(false).await {
            warn!("Could not mark device offline: {e}");
        }
    }
    node.stop();
    node.link().log_statistics();
    node.secondary().log_statistics();
    info!("Simulation finished at t={} s", clock.now().as_secs());
    Ok(())
}
