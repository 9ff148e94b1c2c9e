//! # Crema - Bluetooth Receipt Printing for Café POS
//!
//! Crema connects a point-of-sale host to a Bluetooth ESC/POS receipt
//! printer and keeps that connection healthy. It provides:
//!
//! - **Connection management**: one serialized session per printer, reused
//!   across prints, with the last working printer tried first
//! - **Retry**: exponential backoff for discovery and transmission
//! - **Deadlines**: every print is bounded by a timeout
//! - **Transport**: framed RFCOMM writes with a size-proportional settle time
//! - **Protocol**: a small receipt markup encoded to ESC/POS (EUC-KR)
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use crema::{
//!     ConnectionManager,
//!     config::ManagerConfig,
//!     device::DeviceDirectory,
//!     transport::BluezAdapterProvider,
//! };
//!
//! # async fn demo() -> Result<(), crema::PrinterError> {
//! let config = ManagerConfig::default();
//! let directory = DeviceDirectory::new(
//!     Arc::new(BluezAdapterProvider::new(config.rfcomm_device)),
//!     Arc::new(config.permissions()),
//! );
//! let manager = ConnectionManager::new(directory, &config)?;
//!
//! manager.print("[C]<font size='big'>No. 42</font>\n[L]Latte[R]2").await?;
//! manager.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`manager`] | Serialized connect / print / disconnect |
//! | [`device`] | Addresses, candidates, links and discovery |
//! | [`transport`] | Framed writes and the BlueZ backend |
//! | [`protocol`] | ESC/POS commands and the markup encoder |
//! | [`retry`] | Backoff policies |
//! | [`sleep`] | Cancellable waits |
//! | [`printer`] | Printer configurations and print jobs |
//! | [`config`] | Manager settings |
//! | [`error`] | Error types |

pub mod config;
pub mod device;
pub mod error;
pub mod manager;
pub mod printer;
pub mod protocol;
pub mod receipt;
pub mod retry;
pub mod sleep;
pub mod transport;

// Re-exports for convenience
pub use config::ManagerConfig;
pub use error::PrinterError;
pub use manager::ConnectionManager;
pub use printer::{PrintJob, PrinterConfig};
pub use retry::{BackoffRetry, RetryPolicy};
