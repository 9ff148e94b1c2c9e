//! # Manager Configuration
//!
//! Runtime settings for [`ConnectionManager`](crate::ConnectionManager),
//! loaded from JSON. Every field is optional:
//!
//! ```json
//! {
//!   "discovery_retry": { "max_attempts": 3, "initial_delay_ms": 500, "multiplier": 1.5, "max_delay_ms": 2000 },
//!   "print_retry": { "max_attempts": 3, "initial_delay_ms": 300, "multiplier": 2.0, "max_delay_ms": 1500 },
//!   "print_timeout_ms": 30000,
//!   "preferred_address": "00:11:62:AB:CD:EF",
//!   "rfcomm_device": 0,
//!   "connect_group": "dialout",
//!   "scan_group": null
//! }
//! ```
//!
//! Retry policies and the address are validated while parsing, so a bad
//! file fails at load time rather than on first print.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceAddress;
use crate::device::permission::{DEFAULT_CONNECT_GROUP, GroupPermissionChecker};
use crate::error::PrinterError;
use crate::retry::RetryPolicy;

/// Default overall deadline of one print.
pub const DEFAULT_PRINT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Policy for finding and opening a channel
    pub discovery_retry: RetryPolicy,

    /// Policy for the whole connect-encode-send sequence
    pub print_retry: RetryPolicy,

    /// Deadline of one print, lock wait included
    pub print_timeout_ms: u64,

    /// Address tried first before anything has connected
    pub preferred_address: Option<DeviceAddress>,

    /// N of the `/dev/rfcommN` node bound on connect
    pub rfcomm_device: u8,

    /// Group required for opening channels (`None` = unrestricted)
    pub connect_group: Option<String>,

    /// Group required for scanning (`None` = unrestricted)
    pub scan_group: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            discovery_retry: RetryPolicy::DISCOVERY,
            print_retry: RetryPolicy::TRANSMISSION,
            print_timeout_ms: DEFAULT_PRINT_TIMEOUT.as_millis() as u64,
            preferred_address: None,
            rfcomm_device: 0,
            connect_group: Some(DEFAULT_CONNECT_GROUP.to_string()),
            scan_group: None,
        }
    }
}

impl ManagerConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PrinterError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| PrinterError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
            .map_err(|e| PrinterError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_millis(self.print_timeout_ms)
    }

    pub fn permissions(&self) -> GroupPermissionChecker {
        GroupPermissionChecker::new(self.connect_group.clone(), self.scan_group.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_object_is_default() {
        let config = ManagerConfig::from_json("{}").unwrap();
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.print_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_group.as_deref(), Some("dialout"));
    }

    #[test]
    fn test_partial_override() {
        let config = ManagerConfig::from_json(
            r#"{ "print_timeout_ms": 5000, "preferred_address": "00:11:62:ab:cd:ef" }"#,
        )
        .unwrap();
        assert_eq!(config.print_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.preferred_address.unwrap().as_str(),
            "00:11:62:AB:CD:EF"
        );
        assert_eq!(config.print_retry, RetryPolicy::TRANSMISSION);
    }

    #[test]
    fn test_rejects_invalid_policy() {
        let json = r#"{ "print_retry": { "max_attempts": 0, "initial_delay_ms": 300 } }"#;
        assert!(ManagerConfig::from_json(json).is_err());

        let json = r#"{ "discovery_retry": { "max_attempts": 3, "initial_delay_ms": 500, "multiplier": 0.5 } }"#;
        assert!(ManagerConfig::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_bad_address_and_unknown_fields() {
        assert!(ManagerConfig::from_json(r#"{ "preferred_address": "printer" }"#).is_err());
        assert!(ManagerConfig::from_json(r#"{ "timeout": 1 }"#).is_err());
    }
}
