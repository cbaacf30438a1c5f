//! Credentials baked in at build time by `build.rs`.

pub const WIFI_SSID: &str = env!("NIMBUS_WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("NIMBUS_WIFI_PASSWORD");

pub const PRIMARY_API_KEY: &str = env!("NIMBUS_PRIMARY_API_KEY");
pub const PRIMARY_CHANNEL: &str = env!("NIMBUS_PRIMARY_CHANNEL");

pub const STORE_HOST: &str = env!("NIMBUS_STORE_HOST");
pub const STORE_TOKEN: &str = env!("NIMBUS_STORE_TOKEN");
