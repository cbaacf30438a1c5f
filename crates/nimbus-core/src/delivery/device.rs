use core::fmt::{self, Write};

use alloc::string::String;
use serde::Serialize;

/// Stable device identifier: the station MAC as 12 uppercase hex digits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
    mac: [u8; 6],
    id: heapless::String<12>,
}

impl DeviceId {
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let mut id = heapless::String::new();
        for byte in mac {
            // 6 bytes × 2 digits always fits
            let _ = write!(id, "{:02X}", byte);
        }
        Self { mac, id }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub const fn mac(&self) -> [u8; 6] {
        self.mac
    }

    /// Colon-separated MAC, e.g. `A4:CF:12:0B:3E:7D`
    pub fn mac_string(&self) -> String {
        let mut out = String::with_capacity(17);
        for (i, byte) in self.mac.iter().enumerate() {
            if i > 0 {
                out.push(':');
            }
            let _ = write!(out, "{:02X}", byte);
        }
        out
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Contents of the `devices/{id}/info` document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub firmware_version: String,
    pub model_type: String,
    pub chip_model: String,
    pub mac_address: String,
    /// Seconds since boot when the document was written
    pub last_boot: u64,
}

impl DeviceInfo {
    pub fn new(
        device: &DeviceId,
        firmware_version: &str,
        model_type: &str,
        chip_model: &str,
        last_boot: u64,
    ) -> Self {
        Self {
            device_id: String::from(device.as_str()),
            firmware_version: String::from(firmware_version),
            model_type: String::from(model_type),
            chip_model: String::from(chip_model),
            mac_address: device.mac_string(),
            last_boot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_twelve_uppercase_hex_digits() {
        let id = DeviceId::from_mac([0xa4, 0xcf, 0x12, 0x0b, 0x3e, 0x7d]);

        assert_eq!(id.as_str(), "A4CF120B3E7D");
        assert_eq!(id.as_str().len(), 12);
        assert_eq!(id.mac_string(), "A4:CF:12:0B:3E:7D");
    }

    #[test]
    fn leading_zero_bytes_keep_two_digits() {
        let id = DeviceId::from_mac([0, 1, 2, 0x0a, 0xb0, 0xff]);
        assert_eq!(alloc::format!("{id}"), "0001020AB0FF");
    }
}
