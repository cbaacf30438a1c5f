#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embassy_time::{Delay, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::WifiDevice;
use log::{LevelFilter, info, warn};
use static_cell::StaticCell;

use nimbus_core::classifier::CentroidClassifier;
use nimbus_core::config::{InternetConfig, NodeConfig, PrimarySinkConfig, SecondarySinkConfig};
use nimbus_core::delivery::{DeviceId, DeviceInfo, PrimarySink, RtdbStore, SecondarySink};
use nimbus_core::link::ConnectivityManager;
use nimbus_core::aggregation::DEFAULT_WINDOW_LEN;
use nimbus_core::pipeline::DeliveryPipeline;
use nimbus_core::sensors::WeatherSimulator;
use nimbus_core::status::{NoIndicator, StatusIndicator};

use nimbus_firmware::clock::EmbassyClock;
use nimbus_firmware::http::StackHttp;
use nimbus_firmware::link::{WifiLink, WifiSetupError};
use nimbus_firmware::rng::HardwareRng;
use nimbus_firmware::wifi_secrets;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

fn node_config() -> NodeConfig {
    NodeConfig {
        internet: InternetConfig {
            ssid: wifi_secrets::WIFI_SSID.into(),
            password: wifi_secrets::WIFI_PASSWORD.into(),
        },
        primary: PrimarySinkConfig {
            api_key: wifi_secrets::PRIMARY_API_KEY.into(),
            channel_id: wifi_secrets::PRIMARY_CHANNEL.into(),
            ..PrimarySinkConfig::default()
        },
        secondary: SecondarySinkConfig {
            enabled: !wifi_secrets::STORE_HOST.is_empty(),
            host: wifi_secrets::STORE_HOST.into(),
            auth_token: wifi_secrets::STORE_TOKEN.into(),
            ..SecondarySinkConfig::default()
        },
        ..NodeConfig::default()
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized");

    let node_config = node_config();
    if let Err(e) = node_config.validate() {
        panic!("invalid configuration: {}", e);
    }

    // -----------------------------------------------------------------------
    // Radio and IP stack
    // -----------------------------------------------------------------------

    let rng = Rng::new();
    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(_) => panic!("{}", WifiSetupError::Radio),
    };
    let (controller, interfaces) =
        match esp_radio::wifi::new(radio, peripherals.WIFI, Default::default()) {
            Ok(parts) => parts,
            Err(e) => panic!("{}", WifiSetupError::Controller(e)),
        };

    let device = DeviceId::from_mac(interfaces.sta.mac_address());
    info!("Device id {}", device);

    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner).expect("net task already spawned"));

    // -----------------------------------------------------------------------
    // Link
    // -----------------------------------------------------------------------

    let mut link = ConnectivityManager::new(
        WifiLink::new(controller, stack),
        EmbassyClock,
        Delay,
        StatusIndicator::<NoIndicator>::Log,
        node_config.internet.clone(),
        node_config.link.clone(),
    );
    if let Err(e) = link.connect().await {
        warn!("Starting offline: {}", e);
    }

    // -----------------------------------------------------------------------
    // Sinks
    // -----------------------------------------------------------------------

    let mut primary = PrimarySink::new(StackHttp::new(stack), Delay, node_config.primary.clone());
    if link.is_available() && !primary.check_reachable().await {
        warn!("Primary service not reachable");
    }

    let info = DeviceInfo::new(
        &device,
        &node_config.secondary.firmware_version,
        &node_config.secondary.model_type,
        "ESP32-S3",
        Instant::now().as_secs(),
    );
    let store = RtdbStore::new(StackHttp::new(stack), &node_config.secondary);
    let mut secondary = SecondarySink::new(
        store,
        EmbassyClock,
        device,
        node_config.secondary.clone(),
    );
    if let Err(e) = secondary.initialize(&info).await {
        warn!("Backup store unavailable: {}", e);
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    let mut node: DeliveryPipeline<_, _, _, _, _, _, DEFAULT_WINDOW_LEN> = DeliveryPipeline::new(
        WeatherSimulator::new(HardwareRng::new(rng)),
        CentroidClassifier::new(),
        link,
        primary,
        secondary,
        EmbassyClock,
        node_config.pipeline.clone(),
    );
    node.start();

    loop {
        node.tick().await;
        Timer::at(node.next_due()).await;
    }
}
