//! # Bluetooth Devices
//!
//! Capability interfaces between the connection logic and a platform's
//! Bluetooth stack, plus the device-facing building blocks:
//!
//! - [`link`]: [`DeviceLink`], the per-device connection state machine
//! - [`directory`]: [`DeviceDirectory`], bonded-device enumeration and discovery
//! - [`permission`]: [`GroupPermissionChecker`], Unix group based permission checks
//!
//! The core never calls platform APIs directly. A backend provides an
//! [`AdapterProvider`] and a [`PermissionChecker`]; the BlueZ backend lives in
//! [`crate::transport::bluetooth`].

pub mod directory;
pub mod link;
pub mod permission;

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PrinterError;

pub use directory::{DeviceDirectory, DiscoveryGuard};
pub use link::{ConnectionState, DeviceLink};
pub use permission::GroupPermissionChecker;

/// Serial Port Profile service class UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805f9b34fb);

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// A validated Bluetooth device address, stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn parse(mac: &str) -> Result<Self, PrinterError> {
        let mac = mac.trim();
        if !is_valid_mac(mac) {
            return Err(PrinterError::InvalidAddress(mac.to_string()));
        }
        Ok(Self(mac.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceAddress {
    type Err = PrinterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = PrinterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.0
    }
}

/// A reachable printer candidate as reported by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub address: DeviceAddress,
    pub name: Option<String>,
    /// Service class UUIDs the device advertises (may be empty).
    pub service_uuids: Vec<Uuid>,
    /// Whether the host has completed pairing with this device.
    pub bonded: bool,
}

impl DeviceCandidate {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            name: None,
            service_uuids: Vec::new(),
            bonded: false,
        }
    }

    pub fn bonded(mut self) -> Self {
        self.bonded = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_services(mut self, uuids: impl IntoIterator<Item = Uuid>) -> Self {
        self.service_uuids = uuids.into_iter().collect();
        self
    }

    /// Service to open: SPP when advertised, otherwise the first advertised
    /// service, otherwise SPP.
    pub fn resolve_service(&self) -> Uuid {
        if self.service_uuids.contains(&SPP_UUID) {
            return SPP_UUID;
        }
        self.service_uuids.first().copied().unwrap_or(SPP_UUID)
    }
}

/// An open RFCOMM channel.
pub trait RfcommSocket: Send {
    /// Whether the transport layer still reports the channel open.
    fn is_connected(&self) -> bool;

    /// Stream for writing to the device.
    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>>;

    fn close(&mut self) -> io::Result<()>;
}

/// Callback invoked for each device found during an active scan.
pub type DiscoveryListener = Arc<dyn Fn(DeviceCandidate) + Send + Sync>;

/// Handle identifying a registered discovery listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A local Bluetooth radio.
pub trait BluetoothAdapter: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Devices the host is paired with.
    fn bonded_devices(&self) -> io::Result<Vec<DeviceCandidate>>;

    /// Open an RFCOMM channel to `device` for the given service.
    fn connect_rfcomm(&self, device: &DeviceCandidate, service: Uuid)
    -> io::Result<Box<dyn RfcommSocket>>;

    fn is_discovering(&self) -> bool;

    fn start_discovery(&self) -> io::Result<()>;

    fn cancel_discovery(&self);

    fn register_discovery_listener(&self, listener: DiscoveryListener) -> ListenerId;

    /// Returns false if the listener was not registered.
    fn unregister_discovery_listener(&self, id: ListenerId) -> bool;
}

/// Supplies the current adapter, if the platform has one.
pub trait AdapterProvider: Send + Sync {
    fn adapter(&self) -> Option<Arc<dyn BluetoothAdapter>>;
}

/// Programmatic permission checks performed before radio operations.
pub trait PermissionChecker: Send + Sync {
    fn assert_connect_permission(&self) -> Result<(), PrinterError>;

    fn assert_scan_permission(&self) -> Result<(), PrinterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_mac_addresses() {
        assert!(is_valid_mac("00:11:22:33:44:55"));
        assert!(is_valid_mac("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_invalid_mac_addresses() {
        assert!(!is_valid_mac("00:11:22:33:44")); // too short
        assert!(!is_valid_mac("00:11:22:33:44:55:66")); // too long
        assert!(!is_valid_mac("00-11-22-33-44-55")); // wrong separator
        assert!(!is_valid_mac("GG:HH:II:JJ:KK:LL")); // invalid hex
        assert!(!is_valid_mac(""));
    }

    #[test]
    fn test_address_is_normalized() {
        let address = DeviceAddress::parse(" 00:11:62:ab:cd:ef ").unwrap();
        assert_eq!(address.as_str(), "00:11:62:AB:CD:EF");
        assert_eq!(address, "00:11:62:AB:CD:EF".parse().unwrap());
        assert!(DeviceAddress::parse("printer").is_err());
    }

    #[test]
    fn test_service_resolution() {
        let address = DeviceAddress::parse("00:11:22:33:44:55").unwrap();
        let other = Uuid::from_u128(0x0000110a_0000_1000_8000_00805f9b34fb);

        let bare = DeviceCandidate::new(address.clone());
        assert_eq!(bare.resolve_service(), SPP_UUID);

        let only_other = bare.clone().with_services([other]);
        assert_eq!(only_other.resolve_service(), other);

        let both = bare.with_services([other, SPP_UUID]);
        assert_eq!(both.resolve_service(), SPP_UUID);
    }

    #[test]
    fn test_spp_uuid_text() {
        assert_eq!(SPP_UUID.to_string(), "00001101-0000-1000-8000-00805f9b34fb");
    }
}
