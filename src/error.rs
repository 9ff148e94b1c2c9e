//! # Error Types
//!
//! This module defines the error taxonomy used throughout crema.
//!
//! | Variant | Retried? | Raised by |
//! |---------|----------|-----------|
//! | `PermissionDenied` | never | permission checks |
//! | `TransportUnavailable` | within discovery | directory, link |
//! | `ConnectionFailed` | yes | link connect, send |
//! | `NotConnected` | yes | send on a closed link |
//! | `Timeout` | never | `ConnectionManager::print` |
//! | `Interrupted` | never | cancelled waits |

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::retry::Retryable;
use crate::sleep::Interrupted;

/// Shared, type-erased failure cause.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for crema operations
#[derive(Debug, Error)]
pub enum PrinterError {
    /// A required Bluetooth permission is missing
    #[error("Missing permission: {0}")]
    PermissionDenied(String),

    /// The Bluetooth adapter is absent or cannot be queried
    #[error("Bluetooth adapter is unavailable")]
    TransportUnavailable,

    /// A device refused the channel, or an open channel failed mid-send
    #[error("Unable to connect to bluetooth device: {0}")]
    ConnectionFailed(#[source] Cause),

    /// Data was sent on a transport without a live output stream
    #[error("Unable to send data to device: not connected")]
    NotConnected,

    /// The overall print deadline elapsed
    #[error("Print timed out after {0:?}")]
    Timeout(Duration),

    /// A wait was cancelled before it completed
    #[error("Interrupted while waiting")]
    Interrupted,

    /// Retry policy parameters violate their constraints
    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),

    /// Malformed Bluetooth device address
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrinterError {
    /// Wrap any error as a connection failure, keeping it as the source.
    pub fn connection_failed<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PrinterError::ConnectionFailed(Arc::new(cause))
    }

    /// The preserved cause of a `ConnectionFailed`, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            PrinterError::ConnectionFailed(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }

    /// Whether this failure already belongs to the public classification
    /// and must reach the caller as-is.
    pub(crate) fn is_classified(&self) -> bool {
        matches!(
            self,
            PrinterError::PermissionDenied(_)
                | PrinterError::TransportUnavailable
                | PrinterError::ConnectionFailed(_)
                | PrinterError::Timeout(_)
                | PrinterError::Interrupted
        )
    }
}

impl From<Interrupted> for PrinterError {
    fn from(_: Interrupted) -> Self {
        PrinterError::Interrupted
    }
}

impl Retryable for PrinterError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PrinterError::PermissionDenied(_)
                | PrinterError::Interrupted
                | PrinterError::Timeout(_)
                | PrinterError::InvalidPolicy(_)
                | PrinterError::InvalidAddress(_)
                | PrinterError::Config(_)
        )
    }
}
