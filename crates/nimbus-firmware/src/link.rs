//! WiFi station driver for the connectivity manager.

use alloc::string::String;

use embassy_net::Stack;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiError};
use log::{debug, warn};
use thiserror_no_std::Error;

use nimbus_core::config::InternetConfig;
use nimbus_core::link::{LinkDiagnostics, LinkDriver, LinkFailure};

#[derive(Error, Debug)]
pub enum WifiSetupError {
    #[error("radio init failed")]
    Radio,
    #[error("WiFi controller: {0:?}")]
    Controller(WifiError),
}

/// Station mode controller plus the IP stack riding on it
///
/// The link counts as active once the station is associated and DHCP has
/// handed out an address.
pub struct WifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
    last_failure: LinkFailure,
}

impl WifiLink {
    pub fn new(controller: WifiController<'static>, stack: Stack<'static>) -> Self {
        Self {
            controller,
            stack,
            last_failure: LinkFailure::Timeout,
        }
    }

    pub fn stack(&self) -> Stack<'static> {
        self.stack
    }

    fn station_config(credentials: &InternetConfig) -> ModeConfig {
        ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(String::from(credentials.ssid.as_str()))
                .with_password(String::from(credentials.password.as_str())),
        )
    }
}

fn classify(error: &WifiError) -> LinkFailure {
    match error {
        WifiError::Disconnected => LinkFailure::SignalLost,
        _ => LinkFailure::Driver,
    }
}

impl LinkDriver for WifiLink {
    async fn disconnect(&mut self) {
        if matches!(self.controller.is_connected(), Ok(true)) {
            if let Err(e) = self.controller.disconnect_async().await {
                debug!("wifi: disconnect: {:?}", e);
            }
        }
    }

    async fn begin(&mut self, credentials: &InternetConfig) -> Result<(), LinkFailure> {
        if credentials.ssid.is_empty() {
            self.last_failure = LinkFailure::NetworkNotFound;
            return Err(LinkFailure::NetworkNotFound);
        }

        let mode = Self::station_config(credentials);
        self.controller.set_config(&mode).map_err(|e| {
            warn!("wifi: station config rejected: {:?}", e);
            self.last_failure = classify(&e);
            self.last_failure
        })?;

        if !matches!(self.controller.is_started(), Ok(true)) {
            self.controller.start_async().await.map_err(|e| {
                warn!("wifi: start failed: {:?}", e);
                self.last_failure = classify(&e);
                self.last_failure
            })?;
        }

        self.controller.connect().map_err(|e| {
            warn!("wifi: connect request failed: {:?}", e);
            self.last_failure = classify(&e);
            self.last_failure
        })?;
        self.last_failure = LinkFailure::Timeout;
        Ok(())
    }

    fn is_active(&self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.is_config_up()
    }

    fn last_failure(&self) -> LinkFailure {
        match self.controller.is_connected() {
            Ok(true) => LinkFailure::Timeout,
            Ok(false) if self.stack.is_link_up() => LinkFailure::SignalLost,
            Ok(false) => self.last_failure,
            Err(ref e) => classify(e),
        }
    }

    fn diagnostics(&self) -> LinkDiagnostics {
        LinkDiagnostics {
            local_addr: self.stack.config_v4().map(|cfg| cfg.address.address()),
            rssi: self
                .controller
                .rssi()
                .ok()
                .and_then(|rssi| i8::try_from(rssi).ok()),
        }
    }
}
