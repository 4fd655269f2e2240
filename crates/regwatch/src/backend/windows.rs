//! The Windows registry via `windows-sys`.

use std::iter;
use std::ptr;
use std::time::Duration;

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_SUCCESS, GetLastError, HANDLE, WAIT_ABANDONED_0, WAIT_FAILED,
    WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Registry::{
    HKEY, HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE,
    HKEY_USERS, KEY_READ, KEY_WRITE, REG_NOTIFY_CHANGE_LAST_SET, REG_NOTIFY_CHANGE_NAME,
    REG_OPTION_NON_VOLATILE, RegCloseKey, RegCreateKeyExW, RegNotifyChangeKeyValue,
    RegOpenKeyExW, RegQueryValueExW, RegSetValueExW,
};
use windows_sys::Win32::System::Threading::{CreateEventW, WaitForMultipleObjects};

use super::{Access, Backend, NotifyFilter, RawEvent, RawKey, ValueInfo, WaitOutcome};
use crate::error::ErrorCode;
use crate::path::Root;

/// `WaitForMultipleObjects` accepts at most this many handles per call.
const MAX_WAIT_OBJECTS: usize = 64;

/// [`Backend`] over the live Windows registry.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    /// Creates the backend. It holds no state of its own.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

const fn root_handle(root: Root) -> HKEY {
    match root {
        Root::ClassesRoot => HKEY_CLASSES_ROOT,
        Root::CurrentUser => HKEY_CURRENT_USER,
        Root::LocalMachine => HKEY_LOCAL_MACHINE,
        Root::Users => HKEY_USERS,
        Root::CurrentConfig => HKEY_CURRENT_CONFIG,
    }
}

const fn rights(access: Access) -> u32 {
    let mut sam = 0;
    if access.read {
        sam |= KEY_READ;
    }
    if access.write {
        sam |= KEY_WRITE;
    }
    sam
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(iter::once(0)).collect()
}

const fn check(status: u32) -> Result<(), ErrorCode> {
    if status == ERROR_SUCCESS {
        Ok(())
    } else {
        Err(ErrorCode(status))
    }
}

fn hkey(key: RawKey) -> HKEY {
    key.0 as HKEY
}

fn handle(event: RawEvent) -> HANDLE {
    event.0 as HANDLE
}

fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1)
}

impl Backend for WindowsBackend {
    fn open_key(&self, root: Root, subpath: &str, access: Access) -> Result<RawKey, ErrorCode> {
        let subpath = wide(subpath);
        let mut out: HKEY = ptr::null_mut();
        // SAFETY: `subpath` is NUL-terminated and outlives the call; `out` is a valid out-pointer.
        let status = unsafe {
            RegOpenKeyExW(root_handle(root), subpath.as_ptr(), 0, rights(access), &mut out)
        };
        check(status)?;
        Ok(RawKey(out as usize))
    }

    fn create_key(&self, root: Root, subpath: &str, access: Access) -> Result<RawKey, ErrorCode> {
        let subpath = wide(subpath);
        let mut out: HKEY = ptr::null_mut();
        // SAFETY: as above; class and security attributes are optional and passed as null.
        let status = unsafe {
            RegCreateKeyExW(
                root_handle(root),
                subpath.as_ptr(),
                0,
                ptr::null(),
                REG_OPTION_NON_VOLATILE,
                rights(access),
                ptr::null(),
                &mut out,
                ptr::null_mut(),
            )
        };
        check(status)?;
        Ok(RawKey(out as usize))
    }

    fn close_key(&self, key: RawKey) -> Result<(), ErrorCode> {
        // SAFETY: the handle came from RegOpenKeyExW/RegCreateKeyExW and is closed once.
        check(unsafe { RegCloseKey(hkey(key)) })
    }

    fn query_value(
        &self,
        key: RawKey,
        name: &str,
        buf: Option<&mut [u8]>,
    ) -> Result<ValueInfo, ErrorCode> {
        let name = wide(name);
        let mut type_code = 0u32;
        let (data, mut size) = match buf {
            Some(buf) => (
                buf.as_mut_ptr(),
                u32::try_from(buf.len()).map_err(|_| ErrorCode::INVALID_PARAMETER)?,
            ),
            None => (ptr::null_mut(), 0),
        };

        // SAFETY: `data` is either null or valid for `size` bytes.
        let status = unsafe {
            RegQueryValueExW(
                hkey(key),
                name.as_ptr(),
                ptr::null(),
                &mut type_code,
                data,
                &mut size,
            )
        };
        check(status)?;

        Ok(ValueInfo {
            type_code,
            size: size as usize,
        })
    }

    fn set_value(
        &self,
        key: RawKey,
        name: &str,
        type_code: u32,
        data: &[u8],
    ) -> Result<(), ErrorCode> {
        let name = wide(name);
        let len = u32::try_from(data.len()).map_err(|_| ErrorCode::INVALID_PARAMETER)?;
        // SAFETY: `data` is valid for `len` bytes.
        check(unsafe { RegSetValueExW(hkey(key), name.as_ptr(), 0, type_code, data.as_ptr(), len) })
    }

    fn notify_change(
        &self,
        key: RawKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: RawEvent,
        asynchronous: bool,
    ) -> Result<(), ErrorCode> {
        let mut flags = 0;
        if filter.last_set {
            flags |= REG_NOTIFY_CHANGE_LAST_SET;
        }
        if filter.name {
            flags |= REG_NOTIFY_CHANGE_NAME;
        }

        // SAFETY: key and event handles are live for the duration of the call.
        check(unsafe {
            RegNotifyChangeKeyValue(
                hkey(key),
                i32::from(watch_subtree),
                flags,
                handle(event),
                i32::from(asynchronous),
            )
        })
    }

    fn create_event(&self) -> Result<RawEvent, ErrorCode> {
        // SAFETY: unnamed auto-reset event with default security.
        let event = unsafe { CreateEventW(ptr::null(), 0, 0, ptr::null()) };
        if event.is_null() {
            // SAFETY: reads the calling thread's last-error value.
            return Err(ErrorCode(unsafe { GetLastError() }));
        }
        Ok(RawEvent(event as usize))
    }

    fn wait_multiple(&self, events: &[RawEvent], wait_all: bool, timeout: Duration) -> WaitOutcome {
        if events.len() > MAX_WAIT_OBJECTS && !wait_all {
            // Too many for one call: poll each chunk without blocking.
            for (chunk_index, chunk) in events.chunks(MAX_WAIT_OBJECTS).enumerate() {
                match self.wait_multiple(chunk, false, Duration::ZERO) {
                    WaitOutcome::Timeout => {}
                    WaitOutcome::Signaled(i) => {
                        return WaitOutcome::Signaled(chunk_index * MAX_WAIT_OBJECTS + i);
                    }
                    WaitOutcome::Abandoned(i) => {
                        return WaitOutcome::Abandoned(chunk_index * MAX_WAIT_OBJECTS + i);
                    }
                    failed @ WaitOutcome::Failed(_) => return failed,
                }
            }
            return WaitOutcome::Timeout;
        }

        let handles: Vec<HANDLE> = events.iter().map(|e| handle(*e)).collect();
        let Ok(count) = u32::try_from(handles.len()) else {
            return WaitOutcome::Failed(ErrorCode::INVALID_PARAMETER);
        };

        // SAFETY: `handles` holds `count` live event handles.
        let result = unsafe {
            WaitForMultipleObjects(count, handles.as_ptr(), i32::from(wait_all), timeout_millis(timeout))
        };

        match result {
            WAIT_TIMEOUT => WaitOutcome::Timeout,
            // SAFETY: reads the calling thread's last-error value.
            WAIT_FAILED => WaitOutcome::Failed(ErrorCode(unsafe { GetLastError() })),
            r if r >= WAIT_OBJECT_0 && r < WAIT_OBJECT_0 + count => {
                WaitOutcome::Signaled((r - WAIT_OBJECT_0) as usize)
            }
            r if r >= WAIT_ABANDONED_0 && r < WAIT_ABANDONED_0 + count => {
                WaitOutcome::Abandoned((r - WAIT_ABANDONED_0) as usize)
            }
            other => WaitOutcome::Failed(ErrorCode(other)),
        }
    }

    fn close_event(&self, event: RawEvent) -> Result<(), ErrorCode> {
        // SAFETY: the handle came from CreateEventW and is closed once.
        if unsafe { CloseHandle(handle(event)) } == 0 {
            // SAFETY: reads the calling thread's last-error value.
            return Err(ErrorCode(unsafe { GetLastError() }));
        }
        Ok(())
    }

    fn error_text(&self, code: ErrorCode) -> String {
        #[allow(clippy::cast_possible_wrap)]
        let text = std::io::Error::from_raw_os_error(code.raw() as i32).to_string();
        text
    }
}
