//! Native binding for the host configuration store.
//!
//! The [`Backend`] trait is the only place where this crate touches the
//! operating system. Everything above it (key handles, monitored keys, the
//! dispatcher) is written against the trait, so the engine can run on the
//! real store or on an in-memory simulation.
//!
//! # Built-in Backends
//!
//! - [`WindowsBackend`] - the Windows registry via `windows-sys` (Windows only)
//! - [`MemoryBackend`] - an in-process store with the same semantics
//!
//! # Custom Backends
//!
//! ```rust,ignore
//! use regwatch::backend::{Backend, RawKey, Access};
//!
//! struct AuditingBackend<B> { inner: B }
//!
//! impl<B: Backend> Backend for AuditingBackend<B> {
//!     fn open_key(&self, root: Root, subpath: &str, access: Access) -> Result<RawKey, ErrorCode> {
//!         println!("open {root}\\{subpath}");
//!         self.inner.open_key(root, subpath, access)
//!     }
//!     // ...
//! }
//! ```

mod memory;
#[cfg(windows)]
mod windows;

pub use memory::MemoryBackend;
#[cfg(windows)]
pub use self::windows::WindowsBackend;

use std::time::Duration;

use crate::error::ErrorCode;
use crate::path::Root;

/// Opaque native key handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawKey(pub usize);

/// Opaque native wait object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawEvent(pub usize);

/// Rights requested when opening or creating a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Access {
    /// Query values and register for notifications.
    pub read: bool,
    /// Set values and create subkeys.
    pub write: bool,
}

impl Access {
    /// Read-only access.
    pub const READ: Self = Self {
        read: true,
        write: false,
    };

    /// Read and write access.
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };
}

/// Which changes a notification registration reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotifyFilter {
    /// A value was set or deleted.
    pub last_set: bool,
    /// A subkey was added or removed.
    pub name: bool,
}

impl NotifyFilter {
    /// Filter for a key: value writes always, subkey changes when recursive.
    #[must_use]
    pub const fn for_watch(recursive: bool) -> Self {
        Self {
            last_set: true,
            name: recursive,
        }
    }
}

/// Type and size reported by a value query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueInfo {
    /// Native type code.
    pub type_code: u32,
    /// Size in bytes: required size for a probe, bytes written for a fill.
    pub size: usize,
}

/// Result of waiting on a set of wait objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The wait object at this index was signaled (and, being auto-reset,
    /// is no longer).
    Signaled(usize),
    /// Nothing was signaled before the timeout.
    Timeout,
    /// The wait object at this index was abandoned.
    Abandoned(usize),
    /// The wait itself failed.
    Failed(ErrorCode),
}

/// The native key-access and notification primitives.
///
/// Every method is synchronous. Errors are native codes; callers decide
/// how to interpret them (see [`ErrorCode::is_not_found`] and
/// [`ErrorCode::is_key_deleted`]).
pub trait Backend {
    /// Opens an existing key.
    fn open_key(&self, root: Root, subpath: &str, access: Access) -> Result<RawKey, ErrorCode>;

    /// Opens a key, creating it and any missing ancestors.
    fn create_key(&self, root: Root, subpath: &str, access: Access) -> Result<RawKey, ErrorCode>;

    /// Releases a key handle.
    fn close_key(&self, key: RawKey) -> Result<(), ErrorCode>;

    /// Queries a value.
    ///
    /// With `buf == None` this only reports the type and required size.
    /// With a buffer it fills it and reports the bytes written, or fails
    /// with [`ErrorCode::MORE_DATA`] if the buffer is too small.
    fn query_value(
        &self,
        key: RawKey,
        name: &str,
        buf: Option<&mut [u8]>,
    ) -> Result<ValueInfo, ErrorCode>;

    /// Stores a value.
    fn set_value(&self, key: RawKey, name: &str, type_code: u32, data: &[u8])
    -> Result<(), ErrorCode>;

    /// Registers for one change notification on `key`, delivered by
    /// signaling `event`.
    fn notify_change(
        &self,
        key: RawKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: RawEvent,
        asynchronous: bool,
    ) -> Result<(), ErrorCode>;

    /// Creates an auto-reset, initially non-signaled wait object.
    fn create_event(&self) -> Result<RawEvent, ErrorCode>;

    /// Waits until one (or, with `wait_all`, every) wait object is signaled.
    fn wait_multiple(&self, events: &[RawEvent], wait_all: bool, timeout: Duration)
    -> WaitOutcome;

    /// Releases a wait object.
    fn close_event(&self, event: RawEvent) -> Result<(), ErrorCode>;

    /// Human-readable text for a native code, or an empty string.
    fn error_text(&self, code: ErrorCode) -> String {
        code.description().to_string()
    }
}
