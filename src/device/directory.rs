//! # Device Directory
//!
//! Enumerates printers the host can reach without a scan (the bonded set),
//! and runs scoped discovery scans.
//!
//! ## Scoped Discovery
//!
//! [`DeviceDirectory::listen_for_discovery`] returns a [`DiscoveryGuard`].
//! The scan and its listener live exactly as long as the guard: dropping it
//! unregisters the listener and cancels the scan, so a scan can never outlive
//! the code that started it.
//!
//! ```no_run
//! # use crema::device::DeviceDirectory;
//! # fn demo(directory: &DeviceDirectory) -> Result<(), crema::PrinterError> {
//! {
//!     let _scan = directory.listen_for_discovery(|found| {
//!         println!("found {}", found.address);
//!     })?;
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//! } // scan stopped here
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    AdapterProvider, BluetoothAdapter, DeviceCandidate, DeviceLink, ListenerId, PermissionChecker,
};
use crate::error::PrinterError;

/// # Device Directory
#[derive(Clone)]
pub struct DeviceDirectory {
    adapters: Arc<dyn AdapterProvider>,
    permissions: Arc<dyn PermissionChecker>,
}

impl DeviceDirectory {
    pub fn new(adapters: Arc<dyn AdapterProvider>, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self {
            adapters,
            permissions,
        }
    }

    /// Currently reachable candidates.
    ///
    /// An adapter that is switched off, or has nothing paired, yields an
    /// empty list rather than an error.
    pub fn candidates(&self) -> Result<Vec<DeviceCandidate>, PrinterError> {
        self.permissions.assert_scan_permission()?;
        self.permissions.assert_connect_permission()?;
        let adapter = self
            .adapters
            .adapter()
            .ok_or(PrinterError::TransportUnavailable)?;

        if !adapter.is_enabled() {
            debug!("bluetooth adapter is off");
            return Ok(Vec::new());
        }

        let bonded = adapter.bonded_devices().map_err(|e| {
            warn!(error = %e, "unable to query bonded devices");
            PrinterError::TransportUnavailable
        })?;

        Ok(bonded
            .into_iter()
            .map(|device| DeviceCandidate {
                bonded: true,
                ..device
            })
            .collect())
    }

    /// Build the link for a chosen candidate.
    pub fn link(&self, candidate: DeviceCandidate) -> DeviceLink {
        DeviceLink::new(
            candidate,
            Arc::clone(&self.adapters),
            Arc::clone(&self.permissions),
        )
    }

    /// Start a discovery scan, calling `on_found` for each device seen.
    ///
    /// The scan runs until the returned guard is dropped.
    pub fn listen_for_discovery<F>(&self, on_found: F) -> Result<DiscoveryGuard, PrinterError>
    where
        F: Fn(DeviceCandidate) + Send + Sync + 'static,
    {
        self.permissions.assert_scan_permission()?;
        let adapter = self
            .adapters
            .adapter()
            .ok_or(PrinterError::TransportUnavailable)?;

        let id = adapter.register_discovery_listener(Arc::new(on_found));
        let guard = DiscoveryGuard {
            adapter: Arc::clone(&adapter),
            id: Some(id),
        };

        if adapter.is_discovering() {
            adapter.cancel_discovery();
        }
        adapter.start_discovery().map_err(|e| {
            warn!(error = %e, "unable to start discovery");
            PrinterError::TransportUnavailable
        })?;
        debug!(listener = id.0, "discovery started");

        Ok(guard)
    }
}

/// Keeps a discovery scan alive; stops it on drop.
#[must_use = "discovery stops as soon as the guard is dropped"]
pub struct DiscoveryGuard {
    adapter: Arc<dyn BluetoothAdapter>,
    id: Option<ListenerId>,
}

impl DiscoveryGuard {
    pub fn listener_id(&self) -> Option<ListenerId> {
        self.id
    }

    /// Stop the scan now.
    pub fn stop(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(id) = self.id.take() {
            if !self.adapter.unregister_discovery_listener(id) {
                debug!(listener = id.0, "listener was already unregistered");
            }
            self.adapter.cancel_discovery();
            debug!(listener = id.0, "discovery stopped");
        }
    }
}

impl Drop for DiscoveryGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}
