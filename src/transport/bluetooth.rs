//! # BlueZ Bluetooth Backend
//!
//! [`BluetoothAdapter`] implementation for Linux hosts running BlueZ. The
//! radio is driven through the `bluetoothctl` and `rfcomm` command line
//! tools, and the printer channel is the `/dev/rfcommN` TTY they create.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must be paired before it shows up as a candidate:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# scan on
//! # Note the printer address, e.g. 00:11:62:XX:XX:XX
//! [bluetooth]# pair 00:11:62:XX:XX:XX
//! ```
//!
//! Connecting binds the RFCOMM device on demand (`rfcomm bind N <MAC> 1`),
//! which needs root or `CAP_NET_ADMIN`. An existing binding for the same
//! address is reused.
//!
//! ## TTY Configuration
//!
//! The RFCOMM device is opened in raw mode to ensure binary data is
//! transmitted without modification:
//!
//! - **No input processing**: Disable IGNBRK, BRKINT, PARMRK, ISTRIP, etc.
//! - **No output processing**: Disable OPOST (no CR/LF translation)
//! - **8-bit characters**: CS8 (8 data bits, no parity)
//! - **No echo**: Disable ECHO, ECHONL
//! - **Non-canonical mode**: Disable ICANON (no line buffering)

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::{
    AdapterProvider, BluetoothAdapter, DeviceAddress, DeviceCandidate, DiscoveryListener,
    ListenerId, RfcommSocket,
};

/// Where the kernel lists local Bluetooth controllers.
const SYSFS_BLUETOOTH: &str = "/sys/class/bluetooth";

/// Time for a fresh ACL link or RFCOMM node to settle.
const SETUP_SETTLE: Duration = Duration::from_millis(500);

type Listeners = Arc<Mutex<Vec<(ListenerId, DiscoveryListener)>>>;

// ============================================================================
// ADAPTER
// ============================================================================

/// # BlueZ Adapter
///
/// ## Example
///
/// ```no_run
/// use crema::device::BluetoothAdapter;
/// use crema::transport::BluezAdapter;
///
/// let adapter = BluezAdapter::new(0);
/// for device in adapter.bonded_devices()? {
///     println!("{} {:?}", device.address, device.name);
/// }
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct BluezAdapter {
    rfcomm_device: u8,
    listeners: Listeners,
    next_listener: AtomicU64,
    scan: Mutex<Option<Child>>,
}

impl BluezAdapter {
    /// `rfcomm_device` is the N of the `/dev/rfcommN` node bound on connect.
    pub fn new(rfcomm_device: u8) -> Self {
        Self {
            rfcomm_device,
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(1),
            scan: Mutex::new(None),
        }
    }

    fn device_info(&self, address: &DeviceAddress) -> io::Result<String> {
        bluetoothctl(&["info", address.as_str()])
    }
}

impl BluetoothAdapter for BluezAdapter {
    fn is_enabled(&self) -> bool {
        match bluetoothctl(&["show"]) {
            Ok(output) => parse_powered(&output),
            Err(e) => {
                debug!(error = %e, "bluetoothctl show failed");
                false
            }
        }
    }

    fn bonded_devices(&self) -> io::Result<Vec<DeviceCandidate>> {
        let output = bluetoothctl(&["devices", "Paired"])?;
        let mut devices = Vec::new();
        for line in output.lines() {
            let Some(mut candidate) = parse_device_line(line) else {
                continue;
            };
            match self.device_info(&candidate.address) {
                Ok(info) => candidate = candidate.with_services(parse_uuids(&info)),
                Err(e) => debug!(address = %candidate.address, error = %e, "no device info"),
            }
            devices.push(candidate.bonded());
        }
        Ok(devices)
    }

    fn connect_rfcomm(
        &self,
        device: &DeviceCandidate,
        service: Uuid,
    ) -> io::Result<Box<dyn RfcommSocket>> {
        let mac = device.address.as_str();
        debug!(address = mac, %service, "opening rfcomm channel");

        let path = match find_rfcomm_for_mac(mac)? {
            Some(path) => path,
            None => setup_rfcomm(mac, self.rfcomm_device)?,
        };
        Ok(Box::new(TtySocket::open(path)?))
    }

    fn is_discovering(&self) -> bool {
        let mut scan = self.scan.lock().unwrap_or_else(PoisonError::into_inner);
        match scan.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(_) => {
                *scan = None;
                false
            }
            None => false,
        }
    }

    fn start_discovery(&self) -> io::Result<()> {
        let mut scan = self.scan.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut child) = scan.take() {
            let _ = child.kill();
            let _ = child.wait();
        }

        let mut child = Command::new("bluetoothctl")
            .args(["scan", "on"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("bluetoothctl stdout unavailable"))?;

        let listeners = Arc::clone(&self.listeners);
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                let Some(found) = parse_scan_line(&line) else {
                    continue;
                };
                debug!(address = %found.address, "discovered device");
                let snapshot: Vec<DiscoveryListener> = listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .map(|(_, listener)| Arc::clone(listener))
                    .collect();
                for listener in snapshot {
                    listener(found.clone());
                }
            }
        });

        info!("bluetooth discovery started");
        *scan = Some(child);
        Ok(())
    }

    fn cancel_discovery(&self) {
        let child = self
            .scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill() {
                debug!(error = %e, "scan process already gone");
            }
            let _ = child.wait();
            info!("bluetooth discovery stopped");
        }
    }

    fn register_discovery_listener(&self, listener: DiscoveryListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn unregister_discovery_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }
}

impl Drop for BluezAdapter {
    fn drop(&mut self) {
        self.cancel_discovery();
    }
}

/// Hands out the BlueZ adapter while the kernel reports a controller.
pub struct BluezAdapterProvider {
    adapter: Arc<BluezAdapter>,
}

impl BluezAdapterProvider {
    pub fn new(rfcomm_device: u8) -> Self {
        Self {
            adapter: Arc::new(BluezAdapter::new(rfcomm_device)),
        }
    }
}

impl AdapterProvider for BluezAdapterProvider {
    fn adapter(&self) -> Option<Arc<dyn BluetoothAdapter>> {
        let has_controller = fs::read_dir(SYSFS_BLUETOOTH)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .any(|entry| entry.file_name().to_string_lossy().starts_with("hci"))
            })
            .unwrap_or(false);

        if has_controller {
            Some(self.adapter.clone() as Arc<dyn BluetoothAdapter>)
        } else {
            None
        }
    }
}

// ============================================================================
// RFCOMM TTY SOCKET
// ============================================================================

/// An open `/dev/rfcommN` node.
#[derive(Debug)]
pub struct TtySocket {
    path: PathBuf,
    file: Option<File>,
}

impl TtySocket {
    /// Open the device for raw binary writes.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The device doesn't exist
    /// - Permission denied (may need root or dialout group)
    /// - TTY configuration fails
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().write(true).open(&path).map_err(|e| {
            io::Error::new(e.kind(), format!("Failed to open {}: {}", path.display(), e))
        })?;

        configure_tty_raw(&file)?;
        info!(device = %path.display(), "rfcomm device open");

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RfcommSocket for TtySocket {
    fn is_connected(&self) -> bool {
        self.file.is_some() && self.path.exists()
    }

    fn output_stream(&mut self) -> io::Result<Box<dyn Write + Send>> {
        let file = self.file.as_ref().ok_or(io::ErrorKind::NotConnected)?;
        Ok(Box::new(file.try_clone()?))
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            debug!(device = %self.path.display(), "closing rfcomm device");
            file.sync_all().or_else(|e| match e.kind() {
                // TTYs do not support fsync
                io::ErrorKind::InvalidInput => Ok(()),
                _ => Err(e),
            })?;
        }
        Ok(())
    }
}

/// Configure a file for raw TTY mode.
///
/// This disables all input/output processing so binary data passes through
/// unmodified. Essential for printer communication.
///
/// Note: IXON/IXOFF/IXANY disable XON/XOFF software flow control. This is critical
/// because 0x11 (XON/DC1) and 0x13 (XOFF/DC3) can appear in EUC-KR text.
#[cfg(unix)]
fn configure_tty_raw(file: &File) -> io::Result<()> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        let e = io::Error::last_os_error();
        return Err(io::Error::new(e.kind(), format!("tcgetattr failed: {e}")));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        let e = io::Error::last_os_error();
        return Err(io::Error::new(e.kind(), format!("tcsetattr failed: {e}")));
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_file: &File) -> io::Result<()> {
    Ok(())
}

// ============================================================================
// RFCOMM SETUP HELPERS
// ============================================================================

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to `rfcomm -a` command.
/// Returns the device path (e.g., "/dev/rfcomm0") if found.
pub fn find_rfcomm_for_mac(mac: &str) -> io::Result<Option<PathBuf>> {
    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        if let Some(path) = rfcomm_path_in(&contents, mac) {
            return Ok(Some(path));
        }
    }

    let output = Command::new("rfcomm")
        .arg("-a")
        .output()
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to run 'rfcomm -a': {e}")))?;
    Ok(rfcomm_path_in(&String::from_utf8_lossy(&output.stdout), mac))
}

/// Existing `/dev/rfcommN` in a binding table (`rfcomm0: MAC channel N ...`).
fn rfcomm_path_in(table: &str, mac: &str) -> Option<PathBuf> {
    let mac_upper = mac.to_uppercase();
    table
        .lines()
        .filter(|line| line.to_uppercase().contains(&mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(|name| PathBuf::from(format!("/dev/{}", name.trim())))
        .find(|path| path.exists())
}

/// Set up an RFCOMM device for a Bluetooth MAC address.
///
/// Runs:
/// 1. `bluetoothctl connect <MAC>` - connect to device
/// 2. `l2ping -c 1 <MAC>` - verify connectivity
/// 3. `rfcomm bind <device> <MAC> 1` - create /dev/rfcommN
///
/// **Requires root privileges** for `rfcomm bind`.
pub fn setup_rfcomm(mac: &str, rfcomm_device: u8) -> io::Result<PathBuf> {
    let mac_upper = mac.to_uppercase();
    let device_path = PathBuf::from(format!("/dev/rfcomm{rfcomm_device}"));

    // May fail if already connected; l2ping verifies below
    debug!(address = %mac_upper, "bluetoothctl connect");
    match bluetoothctl(&["connect", &mac_upper]) {
        Ok(stdout)
            if stdout.contains("Connection successful") || stdout.contains("already connected") =>
        {
            debug!(address = %mac_upper, "acl link up");
        }
        Ok(stdout) => debug!(output = stdout.trim(), "bluetoothctl connect"),
        Err(e) => warn!(error = %e, "bluetoothctl connect failed"),
    }

    thread::sleep(SETUP_SETTLE);

    let output = Command::new("l2ping")
        .args(["-c", "1", &mac_upper])
        .output()
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to run l2ping: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::new(
            io::ErrorKind::HostUnreachable,
            format!("Device {} not reachable: {}", mac_upper, stderr.trim()),
        ));
    }

    debug!(device = %device_path.display(), "rfcomm bind");
    let output = Command::new("rfcomm")
        .arg("bind")
        .arg(rfcomm_device.to_string())
        .arg(&mac_upper)
        .arg("1") // RFCOMM channel 1 (standard for SPP)
        .output()
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to run rfcomm bind: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!(
            "rfcomm bind failed: {}",
            stderr.trim()
        )));
    }

    thread::sleep(SETUP_SETTLE);

    if !device_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Device {} was not created", device_path.display()),
        ));
    }

    info!(device = %device_path.display(), address = %mac_upper, "rfcomm device bound");
    Ok(device_path)
}

fn bluetoothctl(args: &[&str]) -> io::Result<String> {
    let output = Command::new("bluetoothctl")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| io::Error::new(e.kind(), format!("Failed to run bluetoothctl: {e}")))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ============================================================================
// BLUETOOTHCTL OUTPUT PARSING
// ============================================================================

/// `Powered: yes` in `bluetoothctl show`.
fn parse_powered(show: &str) -> bool {
    show.lines()
        .filter_map(|line| line.trim().strip_prefix("Powered:"))
        .any(|value| value.trim() == "yes")
}

/// `Device <MAC> <name>` as printed by `devices` and scan events.
fn parse_device_line(line: &str) -> Option<DeviceCandidate> {
    let rest = line.trim().strip_prefix("Device ")?;
    let (mac, name) = match rest.split_once(' ') {
        Some((mac, name)) => (mac, name.trim()),
        None => (rest, ""),
    };
    let address = DeviceAddress::parse(mac).ok()?;
    let candidate = DeviceCandidate::new(address);

    // Unnamed devices echo their address with dashes as the name
    if name.is_empty() || name.replace('-', ":").eq_ignore_ascii_case(mac) {
        Some(candidate)
    } else {
        Some(candidate.with_name(name))
    }
}

/// `UUID: Serial Port (00001101-...)` lines in `bluetoothctl info`.
fn parse_uuids(info: &str) -> Vec<Uuid> {
    info.lines()
        .filter(|line| line.trim_start().starts_with("UUID:"))
        .filter_map(|line| {
            let open = line.rfind('(')?;
            let close = line.rfind(')')?;
            Uuid::parse_str(line.get(open + 1..close)?).ok()
        })
        .collect()
}

/// `[NEW] Device <MAC> <name>` from `bluetoothctl scan on`, colored or not.
fn parse_scan_line(line: &str) -> Option<DeviceCandidate> {
    let after_tag = &line[line.find("[NEW]")? + "[NEW]".len()..];
    let device = &after_tag[after_tag.find("Device ")?..];
    parse_device_line(device)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SPP_UUID;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_powered() {
        let show = "Controller 00:1A:7D:DA:71:13 (public)\n\tName: till\n\tPowered: yes\n\tDiscoverable: no\n";
        assert!(parse_powered(show));
        assert!(!parse_powered("Controller 00:1A:7D:DA:71:13\n\tPowered: no\n"));
        assert!(!parse_powered("No default controller available\n"));
    }

    #[test]
    fn test_parse_device_line() {
        let device = parse_device_line("Device 00:11:62:AB:CD:EF BlueTooth Printer").unwrap();
        assert_eq!(device.address.as_str(), "00:11:62:AB:CD:EF");
        assert_eq!(device.name.as_deref(), Some("BlueTooth Printer"));

        let unnamed = parse_device_line("Device 00:11:62:AB:CD:EF 00-11-62-AB-CD-EF").unwrap();
        assert_eq!(unnamed.name, None);

        assert!(parse_device_line("Controller 00:11:62:AB:CD:EF").is_none());
        assert!(parse_device_line("Device not-a-mac name").is_none());
    }

    #[test]
    fn test_parse_uuids() {
        let info = "Device 00:11:62:AB:CD:EF (public)\n\
                    \tName: BlueTooth Printer\n\
                    \tPaired: yes\n\
                    \tUUID: Serial Port               (00001101-0000-1000-8000-00805f9b34fb)\n\
                    \tUUID: Generic Access Profile    (00001800-0000-1000-8000-00805f9b34fb)\n";
        let uuids = parse_uuids(info);
        assert_eq!(uuids.len(), 2);
        assert_eq!(uuids[0], SPP_UUID);
    }

    #[test]
    fn test_parse_scan_line() {
        let plain = parse_scan_line("[NEW] Device 00:11:62:AB:CD:EF Printer").unwrap();
        assert_eq!(plain.address.as_str(), "00:11:62:AB:CD:EF");

        let colored =
            parse_scan_line("\u{1b}[0;92m[NEW]\u{1b}[0m Device 00:11:62:AB:CD:EF Printer").unwrap();
        assert_eq!(colored.name.as_deref(), Some("Printer"));

        assert!(parse_scan_line("[CHG] Device 00:11:62:AB:CD:EF RSSI: -60").is_none());
        assert!(parse_scan_line("Discovery started").is_none());
    }

    #[test]
    fn test_rfcomm_table_without_match() {
        let table = "rfcomm0: 00:11:62:AB:CD:EF channel 1 clean\n";
        assert_eq!(rfcomm_path_in(table, "AA:BB:CC:DD:EE:FF"), None);
    }

    #[test]
    fn test_listener_registration() {
        let adapter = BluezAdapter::new(0);
        let first = adapter.register_discovery_listener(Arc::new(|_: DeviceCandidate| {}));
        let second = adapter.register_discovery_listener(Arc::new(|_: DeviceCandidate| {}));
        assert_ne!(first, second);

        assert!(adapter.unregister_discovery_listener(first));
        assert!(!adapter.unregister_discovery_listener(first));
        assert!(adapter.unregister_discovery_listener(second));
    }

    #[test]
    fn test_not_discovering_initially() {
        let adapter = BluezAdapter::new(0);
        assert!(!adapter.is_discovering());
        adapter.cancel_discovery();
    }
}
