//! # Permission Checks
//!
//! On Linux the RFCOMM TTYs (`/dev/rfcommN`) belong to a device group,
//! usually `dialout`, and BlueZ may restrict scanning to a `bluetooth`
//! group. [`GroupPermissionChecker`] maps the connect/scan permissions onto
//! membership of those groups. Root always passes.

use super::PermissionChecker;
use crate::error::PrinterError;

/// Default group owning `/dev/rfcommN`.
pub const DEFAULT_CONNECT_GROUP: &str = "dialout";

/// Grants a permission when the process belongs to the configured group.
///
/// A permission with no group configured is always granted.
#[derive(Debug, Clone)]
pub struct GroupPermissionChecker {
    connect_group: Option<String>,
    scan_group: Option<String>,
}

impl GroupPermissionChecker {
    pub fn new(connect_group: Option<String>, scan_group: Option<String>) -> Self {
        Self {
            connect_group,
            scan_group,
        }
    }

    fn ensure(&self, group: Option<&str>, permission: &str) -> Result<(), PrinterError> {
        let Some(group) = group else {
            return Ok(());
        };
        if is_root() || in_group(group) {
            return Ok(());
        }
        Err(PrinterError::PermissionDenied(format!(
            "{permission} (requires membership of group '{group}')"
        )))
    }
}

impl Default for GroupPermissionChecker {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CONNECT_GROUP.to_string()), None)
    }
}

impl PermissionChecker for GroupPermissionChecker {
    fn assert_connect_permission(&self) -> Result<(), PrinterError> {
        self.ensure(self.connect_group.as_deref(), "BLUETOOTH_CONNECT")
    }

    fn assert_scan_permission(&self) -> Result<(), PrinterError> {
        self.ensure(self.scan_group.as_deref(), "BLUETOOTH_SCAN")
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// Whether the process' effective or supplementary groups include `name`.
#[cfg(unix)]
fn in_group(name: &str) -> bool {
    let Some(gid) = group_id(name) else {
        return false;
    };

    if unsafe { libc::getegid() } == gid {
        return true;
    }

    let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
    if count <= 0 {
        return false;
    }
    let mut groups: Vec<libc::gid_t> = vec![0; count as usize];
    let filled = unsafe { libc::getgroups(count, groups.as_mut_ptr()) };
    if filled < 0 {
        return false;
    }
    groups.truncate(filled as usize);
    groups.contains(&gid)
}

/// Look up a group id by name with the reentrant `getgrnam_r`.
#[cfg(unix)]
fn group_id(name: &str) -> Option<libc::gid_t> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let c_name = CString::new(name).ok()?;
    let mut buf: Vec<libc::c_char> = vec![0; 1024];

    loop {
        let mut group = MaybeUninit::<libc::group>::uninit();
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = unsafe {
            libc::getgrnam_r(
                c_name.as_ptr(),
                group.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        match rc {
            0 if result.is_null() => return None,
            0 => return Some(unsafe { group.assume_init() }.gr_gid),
            // Large groups need a bigger member buffer.
            libc::ERANGE if buf.len() < 1 << 20 => buf.resize(buf.len() * 2, 0),
            _ => return None,
        }
    }
}

#[cfg(not(unix))]
fn in_group(_name: &str) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_permission_is_granted() {
        let checker = GroupPermissionChecker::new(None, None);
        assert!(checker.assert_connect_permission().is_ok());
        assert!(checker.assert_scan_permission().is_ok());
    }

    #[test]
    fn test_unknown_group_is_denied_for_non_root() {
        let checker =
            GroupPermissionChecker::new(Some("crema-no-such-group-for-tests".into()), None);
        let result = checker.assert_connect_permission();
        if is_root() {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(PrinterError::PermissionDenied(_))));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_group_lookup() {
        assert_eq!(group_id("crema-no-such-group-for-tests"), None);
        assert_eq!(group_id("bad\0name"), None);
        assert_eq!(group_id("root"), Some(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_primary_group_is_granted() {
        let gid = unsafe { libc::getegid() };
        let entry = unsafe { libc::getgrgid(gid) };
        if entry.is_null() {
            return;
        }
        let name = unsafe { std::ffi::CStr::from_ptr((*entry).gr_name) }
            .to_string_lossy()
            .into_owned();
        let checker = GroupPermissionChecker::new(Some(name), None);
        assert!(checker.assert_connect_permission().is_ok());
    }
}
