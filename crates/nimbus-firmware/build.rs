//! Bakes credentials from `.env` (or the environment) into the firmware.

const KEYS: &[&str] = &[
    "NIMBUS_WIFI_SSID",
    "NIMBUS_WIFI_PASSWORD",
    "NIMBUS_PRIMARY_API_KEY",
    "NIMBUS_PRIMARY_CHANNEL",
    "NIMBUS_STORE_HOST",
    "NIMBUS_STORE_TOKEN",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    for key in KEYS {
        println!("cargo:rerun-if-env-changed={key}");
    }

    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=no .env loaded ({e}), using environment only");
    }

    for key in KEYS {
        let value = std::env::var(key).unwrap_or_default();
        if value.is_empty() {
            println!("cargo:warning={key} is not set");
        }
        println!("cargo:rustc-env={key}={value}");
    }
}
