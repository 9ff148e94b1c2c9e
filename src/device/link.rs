//! # Device Link
//!
//! A connection to one physical printer. The link owns the RFCOMM socket and
//! its output stream, and tracks a small state machine:
//!
//! ```text
//!                 connect()            success
//! Disconnected ─────────────> Connecting ─────────> Connected
//!      ^                          │
//!      │ disconnect()             │ I/O failure
//!      └──────────────────── Failed(cause)
//! ```
//!
//! A failed connect releases everything it acquired, so the next `connect()`
//! starts clean from `Failed`.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{AdapterProvider, DeviceAddress, DeviceCandidate, PermissionChecker, RfcommSocket};
use crate::error::{Cause, PrinterError};
use crate::sleep::Pacer;
use crate::transport::FramedTransport;

/// Connection state of a [`DeviceLink`].
#[derive(Debug, Clone)]
pub enum ConnectionState {
    Disconnected,
    Connecting(DeviceAddress),
    Connected(DeviceAddress),
    Failed(DeviceAddress, Cause),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    pub fn address(&self) -> Option<&DeviceAddress> {
        match self {
            Self::Disconnected => None,
            Self::Connecting(address) | Self::Connected(address) | Self::Failed(address, _) => {
                Some(address)
            }
        }
    }
}

impl PartialEq for ConnectionState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Disconnected, Self::Disconnected) => true,
            (Self::Connecting(a), Self::Connecting(b)) => a == b,
            (Self::Connected(a), Self::Connected(b)) => a == b,
            (Self::Failed(a, x), Self::Failed(b, y)) => a == b && x.to_string() == y.to_string(),
            _ => false,
        }
    }
}

/// # Device Link
///
/// Transport bound to a single device address.
pub struct DeviceLink {
    device: DeviceCandidate,
    adapters: Arc<dyn AdapterProvider>,
    permissions: Arc<dyn PermissionChecker>,
    socket: Option<Box<dyn RfcommSocket>>,
    transport: FramedTransport<Box<dyn Write + Send>>,
    state: watch::Sender<ConnectionState>,
}

impl DeviceLink {
    pub fn new(
        device: DeviceCandidate,
        adapters: Arc<dyn AdapterProvider>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            device,
            adapters,
            permissions,
            socket: None,
            transport: FramedTransport::new(),
            state,
        }
    }

    pub fn device(&self) -> &DeviceCandidate {
        &self.device
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.device.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// True only when the channel is open AND an output stream is held.
    ///
    /// A socket can still report itself open after a failed send has torn
    /// the stream down; such a link is not connected.
    pub fn is_connected(&self) -> bool {
        self.socket.as_ref().is_some_and(|socket| socket.is_connected())
            && self.transport.is_attached()
    }

    /// Open the channel. Does nothing if already connected.
    pub fn connect(&mut self) -> Result<(), PrinterError> {
        if self.is_connected() {
            return Ok(());
        }

        self.permissions.assert_connect_permission()?;
        let adapter = self
            .adapters
            .adapter()
            .ok_or(PrinterError::TransportUnavailable)?;

        // Drop anything left over from a half-dead previous session.
        self.release();
        self.set_state(ConnectionState::Connecting(self.address().clone()));

        let service = self.device.resolve_service();
        debug!(address = %self.address(), %service, "opening rfcomm channel");
        adapter.cancel_discovery();

        let opened = adapter
            .connect_rfcomm(&self.device, service)
            .and_then(|mut socket| match socket.output_stream() {
                Ok(stream) => Ok((socket, stream)),
                Err(e) => {
                    let _ = socket.close();
                    Err(e)
                }
            });

        match opened {
            Ok((socket, stream)) => {
                self.socket = Some(socket);
                self.transport.attach(stream);
                self.set_state(ConnectionState::Connected(self.address().clone()));
                info!(address = %self.address(), "printer connected");
                Ok(())
            }
            Err(e) => {
                warn!(address = %self.address(), error = %e, "printer connection failed");
                self.release();
                let cause: Cause = Arc::new(e);
                self.set_state(ConnectionState::Failed(self.address().clone(), cause.clone()));
                Err(PrinterError::ConnectionFailed(cause))
            }
        }
    }

    /// Close stream and socket. Valid from any state; close errors are ignored.
    pub fn disconnect(&mut self) {
        let was_open = self.socket.is_some() || self.transport.is_attached();
        self.release();
        self.set_state(ConnectionState::Disconnected);
        if was_open {
            info!(address = %self.address(), "printer disconnected");
        }
    }

    /// Queue bytes for the next [`send`](Self::send).
    pub fn write(&mut self, bytes: &[u8]) {
        self.transport.write(bytes);
    }

    /// Flush queued bytes and wait for the printer to settle.
    pub fn send(&mut self, extra_delay: Duration, pacer: &Pacer<'_>) -> Result<(), PrinterError> {
        if !self.is_connected() {
            return Err(PrinterError::NotConnected);
        }
        self.transport.send(extra_delay, pacer)
    }

    fn release(&mut self) {
        self.transport.clear();
        if let Some(mut stream) = self.transport.detach() {
            if let Err(e) = stream.flush() {
                debug!(address = %self.address(), error = %e, "ignoring flush error on close");
            }
        }
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close() {
                debug!(address = %self.address(), error = %e, "ignoring socket close error");
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("device", &self.device)
            .field("state", &*self.state.borrow())
            .field("pending", &self.transport.pending())
            .finish()
    }
}
