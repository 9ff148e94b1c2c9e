//! Shared fakes for the integration tests: an in-memory Bluetooth adapter,
//! switchable permissions and a sleeper that records instead of sleeping.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crema::device::{
    AdapterProvider, BluetoothAdapter, DeviceAddress, DeviceCandidate, DeviceDirectory,
    DiscoveryListener, ListenerId, PermissionChecker, RfcommSocket,
};
use crema::sleep::{CancelToken, Interrupted, Sleeper};
use crema::{ConnectionManager, ManagerConfig, PrinterError};
use uuid::Uuid;

pub fn address(mac: &str) -> DeviceAddress {
    DeviceAddress::parse(mac).unwrap()
}

pub fn bonded(mac: &str) -> DeviceCandidate {
    DeviceCandidate::new(address(mac)).bonded()
}

// ============================================================================
// ADAPTER
// ============================================================================

/// State shared between the adapter and the sockets/streams it hands out.
#[derive(Default)]
pub struct Wire {
    pub bytes: Mutex<Vec<u8>>,
    /// Flushes that pushed written bytes out
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
    /// Upcoming writes that fail
    pub write_failures: AtomicU32,
    /// Write failures produced so far
    pub failed_writes: AtomicU32,
    /// The radio reports the current channel closed; streams stay writable
    pub channel_dropped: AtomicBool,
}

pub struct FakeAdapter {
    pub enabled: AtomicBool,
    pub bonded: Mutex<Vec<DeviceCandidate>>,
    pub bonded_query_fails: AtomicBool,
    pub refuse: Mutex<HashSet<DeviceAddress>>,
    pub connects: Mutex<Vec<(DeviceAddress, Uuid)>>,
    pub wire: Arc<Wire>,
    pub discovering: AtomicBool,
    pub discovery_starts: AtomicUsize,
    pub discovery_cancels: AtomicUsize,
    listeners: Mutex<Vec<(ListenerId, DiscoveryListener)>>,
    next_listener: AtomicU64,
}

impl FakeAdapter {
    pub fn new(bonded: Vec<DeviceCandidate>) -> Arc<Self> {
        Arc::new(Self {
            enabled: AtomicBool::new(true),
            bonded: Mutex::new(bonded),
            bonded_query_fails: AtomicBool::new(false),
            refuse: Mutex::new(HashSet::new()),
            connects: Mutex::new(Vec::new()),
            wire: Arc::new(Wire::default()),
            discovering: AtomicBool::new(false),
            discovery_starts: AtomicUsize::new(0),
            discovery_cancels: AtomicUsize::new(0),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        })
    }

    pub fn refuse(&self, mac: &str) {
        self.refuse.lock().unwrap().insert(address(mac));
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.wire.write_failures.store(count, Ordering::SeqCst);
    }

    /// Make the open channel report itself closed without detaching its stream.
    pub fn drop_channel(&self) {
        self.wire.channel_dropped.store(true, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> Vec<DeviceAddress> {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .map(|(address, _)| address.clone())
            .collect()
    }

    pub fn wire_bytes(&self) -> Vec<u8> {
        self.wire.bytes.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.wire.flushes.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Deliver a discovery event to every registered listener.
    pub fn announce(&self, candidate: DeviceCandidate) {
        let listeners: Vec<DiscoveryListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(candidate.clone());
        }
    }
}

impl BluetoothAdapter for FakeAdapter {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn bonded_devices(&self) -> io::Result<Vec<DeviceCandidate>> {
        if self.bonded_query_fails.load(Ordering::SeqCst) {
            return Err(io::Error::other("adapter busy"));
        }
        Ok(self.bonded.lock().unwrap().clone())
    }

    fn connect_rfcomm(
        &self,
        device: &DeviceCandidate,
        service: Uuid,
    ) -> io::Result<Box<dyn RfcommSocket>> {
        self.connects
            .lock()
            .unwrap()
            .push((device.address.clone(), service));
        if self.refuse.lock().unwrap().contains(&device.address) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused", device.address),
            ));
        }
        self.wire.channel_dropped.store(false, Ordering::SeqCst);
        Ok(Box::new(FakeSocket {
            open: true,
            wire: self.wire.clone(),
        }))
    }

    fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    fn start_discovery(&self) -> io::Result<()> {
        self.discovery_starts.fetch_add(1, Ordering::SeqCst);
        self.discovering.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn cancel_discovery(&self) {
        if self.discovering.swap(false, Ordering::SeqCst) {
            self.discovery_cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn register_discovery_listener(&self, listener: DiscoveryListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    fn unregister_discovery_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }
}

pub struct FakeSocket {
    open: bool,
    wire: Arc<Wire>,
}

impl RfcommSocket for FakeSocket {
    fn is_connected(&self) -> bool {
        self.open && !self.wire.channel_dropped.load(Ordering::SeqCst)
    }

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(FakeStream {
            wire: self.wire.clone(),
            dirty: false,
        }))
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        self.wire.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes one byte at a time and yields between bytes, so two unsynchronized
/// writers would interleave on the wire.
pub struct FakeStream {
    wire: Arc<Wire>,
    dirty: bool,
}

impl Write for FakeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let failing = self
            .wire
            .write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            let n = self.wire.failed_writes.fetch_add(1, Ordering::SeqCst) + 1;
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("write failure {n}"),
            ));
        }
        for &byte in buf {
            self.wire.bytes.lock().unwrap().push(byte);
            std::thread::yield_now();
        }
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if std::mem::take(&mut self.dirty) {
            self.wire.flushes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct FakeProvider {
    pub adapter: Option<Arc<FakeAdapter>>,
}

impl AdapterProvider for FakeProvider {
    fn adapter(&self) -> Option<Arc<dyn BluetoothAdapter>> {
        self.adapter
            .clone()
            .map(|adapter| adapter as Arc<dyn BluetoothAdapter>)
    }
}

// ============================================================================
// PERMISSIONS AND SLEEPER
// ============================================================================

pub struct FakePermissions {
    pub connect: AtomicBool,
    pub scan: AtomicBool,
    pub checks: AtomicUsize,
}

impl FakePermissions {
    pub fn granted() -> Arc<Self> {
        Arc::new(Self {
            connect: AtomicBool::new(true),
            scan: AtomicBool::new(true),
            checks: AtomicUsize::new(0),
        })
    }
}

impl PermissionChecker for FakePermissions {
    fn assert_connect_permission(&self) -> Result<(), PrinterError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.connect.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PrinterError::PermissionDenied("BLUETOOTH_CONNECT".into()))
        }
    }

    fn assert_scan_permission(&self) -> Result<(), PrinterError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.scan.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PrinterError::PermissionDenied("BLUETOOTH_SCAN".into()))
        }
    }
}

/// Records requested waits and returns at once, unless cancelled.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn sleeps_ms(&self) -> Vec<u64> {
        self.sleeps().iter().map(|d| d.as_millis() as u64).collect()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Interrupted> {
        self.sleeps.lock().unwrap().push(duration);
        cancel.check()
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub adapter: Arc<FakeAdapter>,
    pub permissions: Arc<FakePermissions>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub fn new(bonded: Vec<DeviceCandidate>) -> Self {
        Self {
            adapter: FakeAdapter::new(bonded),
            permissions: FakePermissions::granted(),
            sleeper: Arc::new(RecordingSleeper::default()),
        }
    }

    pub fn directory(&self) -> DeviceDirectory {
        DeviceDirectory::new(
            Arc::new(FakeProvider {
                adapter: Some(self.adapter.clone()),
            }),
            self.permissions.clone(),
        )
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager_with(&ManagerConfig::default())
    }

    pub fn manager_with(&self, config: &ManagerConfig) -> ConnectionManager {
        ConnectionManager::with_sleeper(self.directory(), config, self.sleeper.clone()).unwrap()
    }
}
