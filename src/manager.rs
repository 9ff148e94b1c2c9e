//! # Connection Manager
//!
//! The single entry point for printing. A [`ConnectionManager`] is a cheap
//! clonable handle over one printer session; every operation holds the
//! session lock for its whole duration, so connects, prints and disconnects
//! from any number of callers are totally ordered.
//!
//! ## Print Flow
//!
//! ```text
//! print(text)
//!   └─ timeout(print_timeout)
//!        └─ lock session
//!             └─ transmission retry
//!                  ├─ ensure connection ── discovery retry
//!                  │                          └─ candidates, last-known-good first
//!                  ├─ encode + buffer
//!                  └─ flush + settle          (failure: tear down link)
//! ```
//!
//! Device I/O and backoff waits are blocking, so the locked session runs on
//! a `spawn_blocking` worker while other callers park on the async lock.
//! When the deadline passes the operation's [`CancelToken`] is tripped; its
//! next wait returns [`PrinterError::Interrupted`] and the lock is released.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::device::{DeviceAddress, DeviceDirectory, DeviceLink};
use crate::error::PrinterError;
use crate::printer::{PrintJob, PrinterConfig};
use crate::protocol::EscPosEncoder;
use crate::retry::{BackoffRetry, Retryable};
use crate::sleep::{CancelToken, Pacer, Sleeper, ThreadSleeper};

// ============================================================================
// SESSION
// ============================================================================

/// Connection state guarded by the manager lock.
struct Session {
    directory: DeviceDirectory,
    encoder: EscPosEncoder,
    discovery: BackoffRetry,
    transmission: BackoffRetry,
    sleeper: Arc<dyn Sleeper>,
    last_good: Option<DeviceAddress>,
    active_link: Option<DeviceLink>,
    active_printer: Option<EscPosEncoder>,
}

impl Session {
    fn is_connected(&self) -> bool {
        self.active_printer.is_some()
            && self.active_link.as_ref().is_some_and(DeviceLink::is_connected)
    }

    fn ensure_connection(&mut self, pacer: &Pacer<'_>) -> Result<(), PrinterError> {
        if self.is_connected() {
            return Ok(());
        }
        // A link whose socket died under it still holds resources.
        self.teardown();

        let discovery = self.discovery;
        discovery.run(pacer, |attempt| self.connect_first_reachable(attempt, pacer))
    }

    /// One discovery attempt: try every candidate, preferred address first.
    fn connect_first_reachable(
        &mut self,
        attempt: u32,
        pacer: &Pacer<'_>,
    ) -> Result<(), PrinterError> {
        let mut candidates = self.directory.candidates()?;
        if candidates.is_empty() {
            debug!(attempt, "no bonded printers");
            return Err(PrinterError::TransportUnavailable);
        }

        let preferred = self.last_good.as_ref();
        candidates.sort_by_key(|candidate| preferred != Some(&candidate.address));

        let mut last_failure = None;
        for candidate in candidates {
            pacer.cancel_token().check()?;

            let mut link = self.directory.link(candidate);
            match link.connect() {
                Ok(()) => {
                    info!(address = %link.address(), attempt, "printer ready");
                    self.last_good = Some(link.address().clone());
                    self.active_printer = Some(self.encoder.clone());
                    self.active_link = Some(link);
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    debug!(address = %link.address(), attempt, error = %e, "candidate unreachable");
                    last_failure = Some(e);
                }
            }
        }

        Err(last_failure.unwrap_or(PrinterError::TransportUnavailable))
    }

    fn print(&mut self, job: &PrintJob, pacer: &Pacer<'_>) -> Result<(), PrinterError> {
        let transmission = self.transmission;
        let result = transmission.run(pacer, |attempt| {
            let sent = self.transmit(job, pacer);
            if let Err(e) = &sent {
                warn!(attempt, error = %e, "print attempt failed");
                self.teardown();
            }
            sent
        });

        result.map_err(|e| {
            if e.is_classified() {
                e
            } else {
                PrinterError::connection_failed(e)
            }
        })
    }

    fn transmit(&mut self, job: &PrintJob, pacer: &Pacer<'_>) -> Result<(), PrinterError> {
        self.ensure_connection(pacer)?;
        let (Some(link), Some(printer)) = (self.active_link.as_mut(), self.active_printer.as_ref())
        else {
            return Err(PrinterError::NotConnected);
        };
        printer.print(link, job, pacer)?;
        debug!(address = %link.address(), "receipt sent");
        Ok(())
    }

    fn teardown(&mut self) {
        self.active_printer = None;
        if let Some(mut link) = self.active_link.take() {
            link.disconnect();
        }
    }
}

// ============================================================================
// MANAGER HANDLE
// ============================================================================

/// # Connection Manager
///
/// ## Example
///
/// ```no_run
/// use std::sync::Arc;
/// use crema::config::ManagerConfig;
/// use crema::device::DeviceDirectory;
/// use crema::transport::BluezAdapterProvider;
/// use crema::ConnectionManager;
///
/// # async fn demo() -> Result<(), crema::PrinterError> {
/// let config = ManagerConfig::default();
/// let directory = DeviceDirectory::new(
///     Arc::new(BluezAdapterProvider::new(config.rfcomm_device)),
///     Arc::new(config.permissions()),
/// );
/// let manager = ConnectionManager::new(directory, &config)?;
/// manager.print_and_disconnect("[C]<b>Hello</b>").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    session: Arc<Mutex<Session>>,
    print_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(directory: DeviceDirectory, config: &ManagerConfig) -> Result<Self, PrinterError> {
        Self::with_sleeper(directory, config, Arc::new(ThreadSleeper))
    }

    /// Like [`new`](Self::new), with all backoff and settle waits going
    /// through `sleeper`.
    pub fn with_sleeper(
        directory: DeviceDirectory,
        config: &ManagerConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, PrinterError> {
        let session = Session {
            directory,
            encoder: EscPosEncoder::new(PrinterConfig::default())?,
            discovery: config.discovery_retry.backoff(),
            transmission: config.print_retry.backoff(),
            sleeper,
            last_good: config.preferred_address.clone(),
            active_link: None,
            active_printer: None,
        };
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            print_timeout: config.print_timeout(),
        })
    }

    /// Connect if not already connected.
    pub async fn connect(&self) -> Result<(), PrinterError> {
        self.run(CancelToken::new(), |session, pacer| {
            session.ensure_connection(pacer)
        })
        .await
    }

    /// Close the active connection, if any. Never fails.
    pub async fn disconnect(&self) {
        let closed = self
            .run(CancelToken::new(), |session, _| {
                session.teardown();
                Ok(())
            })
            .await;
        if let Err(e) = closed {
            debug!(error = %e, "disconnect did not run");
        }
    }

    /// Print markup text with the default feed distance.
    pub async fn print(&self, text: impl Into<String>) -> Result<(), PrinterError> {
        self.print_job(PrintJob::new(text)).await
    }

    /// Print a job, connecting first if needed.
    ///
    /// The whole call, waiting for the lock included, is bounded by the
    /// configured print timeout.
    pub async fn print_job(&self, job: PrintJob) -> Result<(), PrinterError> {
        let cancel = CancelToken::new();
        let work = self.run(cancel.clone(), move |session, pacer| {
            session.print(&job, pacer)
        });

        match tokio::time::timeout(self.print_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                warn!(timeout_ms = self.print_timeout.as_millis() as u64, "print timed out");
                Err(PrinterError::Timeout(self.print_timeout))
            }
        }
    }

    /// Print, then always disconnect. Only the print outcome is reported.
    pub async fn print_and_disconnect(&self, text: impl Into<String>) -> Result<(), PrinterError> {
        let printed = self.print(text).await;
        self.disconnect().await;
        printed
    }

    pub async fn is_connected(&self) -> bool {
        self.run(CancelToken::new(), |session, _| Ok(session.is_connected()))
            .await
            .unwrap_or(false)
    }

    /// Address of the most recent successful connection.
    pub async fn last_known_good(&self) -> Option<DeviceAddress> {
        self.run(CancelToken::new(), |session, _| Ok(session.last_good.clone()))
            .await
            .ok()
            .flatten()
    }

    /// Lock the session and run `op` on a blocking worker.
    async fn run<T, F>(&self, cancel: CancelToken, op: F) -> Result<T, PrinterError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session, &Pacer<'_>) -> Result<T, PrinterError> + Send + 'static,
    {
        let mut session = Arc::clone(&self.session).lock_owned().await;
        let handle = tokio::task::spawn_blocking(move || {
            let sleeper = Arc::clone(&session.sleeper);
            let pacer = Pacer::new(sleeper.as_ref(), &cancel);
            op(&mut *session, &pacer)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                debug!(error = %e, "session task cancelled");
                Err(PrinterError::Interrupted)
            }
        }
    }
}
