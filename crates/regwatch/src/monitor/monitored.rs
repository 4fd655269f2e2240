//! A key registered for change notification, shared by every subscriber of
//! the same `(path, recursive)` pair.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::backend::{Backend, NotifyFilter, RawEvent};
use crate::error::{Error, Result};
use crate::key::{DEFAULT_RETRIES, KeyAccess, KeyHandle, OpenOptions};
use crate::leak::{self, ResourceKind};
use crate::path::KeyPath;

/// Identifies one callback registered on a [`MonitoredKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(pub(crate) u64);

/// Callback invoked with the key that changed.
pub type KeyCallback = Rc<dyn Fn(&MonitoredKey)>;

/// Lifecycle state of a [`MonitoredKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    /// No native key handle is held.
    Closed,
    /// The key is open but no wait object is registered.
    OpenUnwatched,
    /// The key is open and registered for change notification.
    Watching,
}

#[derive(Clone, Copy)]
struct LiveEvent {
    raw: RawEvent,
    tracker: u64,
}

/// A key plus its wait object and fan-out list.
///
/// Obtained through [`Registry::monitor_key`](crate::Registry::monitor_key)
/// and handed to every callback. It implements [`KeyAccess`], so callbacks
/// can read values directly:
///
/// ```rust,ignore
/// registry.monitor_key(r"HKCU\Software\Vendor", WatchOptions::new(), |key| {
///     if let Ok(value) = key.get_value("Theme") {
///         println!("theme is now {value}");
///     }
/// })?;
/// ```
pub struct MonitoredKey {
    key: KeyHandle,
    recursive: bool,
    event: Cell<Option<LiveEvent>>,
    callbacks: RefCell<Vec<(CallbackId, KeyCallback)>>,
}

impl MonitoredKey {
    pub(crate) fn new(
        backend: Rc<dyn Backend>,
        path: KeyPath,
        recursive: bool,
        create_if_missing: bool,
    ) -> Self {
        let key = KeyHandle::new(
            backend,
            path,
            OpenOptions::new().create_if_missing(create_if_missing),
        );
        key.set_quiet_drop();

        Self {
            key,
            recursive,
            event: Cell::new(None),
            callbacks: RefCell::new(Vec::new()),
        }
    }

    /// The watched key path.
    #[must_use]
    pub const fn path(&self) -> &KeyPath {
        self.key.path()
    }

    /// Whether the whole subtree is watched.
    #[must_use]
    pub const fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        match (self.key.is_open(), self.event.get().is_some()) {
            (false, _) => MonitorState::Closed,
            (true, false) => MonitorState::OpenUnwatched,
            (true, true) => MonitorState::Watching,
        }
    }

    /// Returns `true` while the key handle is open.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.key.is_open()
    }

    /// Returns `true` while a wait object is registered.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.event.get().is_some()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub(crate) fn raw_event(&self) -> Option<RawEvent> {
        self.event.get().map(|event| event.raw)
    }

    /// Opens the key if needed.
    pub(crate) fn open(&self) -> Result<()> {
        self.key.open()
    }

    /// Creates the wait object and registers for notification.
    ///
    /// Idempotent while watching.
    pub(crate) fn start(&self) -> Result<()> {
        if self.is_watching() {
            return Ok(());
        }

        let raw = self
            .key
            .backend()
            .create_event()
            .map_err(|code| self.key.os_error("create wait object", code))?;
        let tracker = leak::track(ResourceKind::WaitObject, &self.path().to_string());
        self.event.set(Some(LiveEvent { raw, tracker }));

        if let Err(err) = self.register() {
            log_error!(path = %self.path(), error = %err, "failed to register for change notification");
            let _ = self.release_event();
            return Err(err);
        }

        log_debug!(path = %self.path(), recursive = self.recursive, "watching key");
        Ok(())
    }

    /// Arms a one-shot notification on the current key handle.
    ///
    /// Goes through the key handle's own retry, which reopens the handle
    /// only; re-registering is this call's job.
    fn register(&self) -> Result<()> {
        let Some(event) = self.raw_event() else {
            return Err(Error::Stopped {
                path: self.path().to_string(),
            });
        };
        let recursive = self.recursive;

        self.key
            .invoke_with_retry("register notification", DEFAULT_RETRIES, |backend, raw| {
                backend.notify_change(
                    raw,
                    recursive,
                    NotifyFilter::for_watch(recursive),
                    event,
                    true,
                )
            })
    }

    /// Handles one signal: re-arms, then runs every callback registered
    /// when the signal arrived.
    ///
    /// Callbacks removed by an earlier callback in the same round are
    /// skipped.
    pub(crate) fn on_signaled(&self) {
        if let Err(err) = self.register() {
            log_warn!(path = %self.path(), error = %err, "failed to re-arm change notification");
        }

        let snapshot = self.callbacks.borrow().clone();
        for (id, callback) in snapshot {
            if self.has_callback(id) {
                callback(self);
            }
        }
    }

    /// Closes the wait object and forgets every callback.
    ///
    /// The key handle stays as it is.
    pub(crate) fn stop(&self) -> Result<()> {
        if !self.is_watching() {
            return Ok(());
        }
        self.release_event()?;
        let dropped = std::mem::take(&mut *self.callbacks.borrow_mut());
        drop(dropped);
        log_debug!(path = %self.path(), "stopped watching key");
        Ok(())
    }

    fn release_event(&self) -> Result<()> {
        let Some(event) = self.event.take() else {
            return Ok(());
        };
        leak::untrack(event.tracker);

        self.key
            .backend()
            .close_event(event.raw)
            .map_err(|code| self.key.os_error("close wait object", code))
    }

    /// Closes the key handle.
    pub(crate) fn close(&self) -> Result<()> {
        self.key.close()
    }

    pub(crate) fn add_callback(&self, id: CallbackId, callback: KeyCallback) {
        self.callbacks.borrow_mut().push((id, callback));
    }

    /// Moves every callback from `other` into `self`, keeping their order.
    pub(crate) fn adopt_callbacks(&self, other: &Self) {
        let moved = std::mem::take(&mut *other.callbacks.borrow_mut());
        self.callbacks.borrow_mut().extend(moved);
    }

    /// Removes a callback. Returns `false` if it was not registered.
    ///
    /// Removing the last callback stops the watch and closes the key.
    pub(crate) fn remove_callback(&self, id: CallbackId) -> bool {
        let removed = {
            let mut callbacks = self.callbacks.borrow_mut();
            let Some(index) = callbacks.iter().position(|(cid, _)| *cid == id) else {
                return false;
            };
            callbacks.remove(index)
        };

        // The closure may own tokens for this key; their drop re-enters here.
        drop(removed);

        if self.callbacks.borrow().is_empty() {
            self.teardown();
        }
        true
    }

    pub(crate) fn has_callback(&self, id: CallbackId) -> bool {
        self.callbacks.borrow().iter().any(|(cid, _)| *cid == id)
    }

    /// Stops and closes, logging rather than returning failures.
    pub(crate) fn teardown(&self) {
        if let Err(err) = self.stop() {
            log_warn!(path = %self.path(), error = %err, "failed to stop watch");
        }
        if let Err(err) = self.close() {
            log_warn!(path = %self.path(), error = %err, "failed to close watched key");
        }
    }
}

impl KeyAccess for MonitoredKey {
    fn handle(&self) -> &KeyHandle {
        &self.key
    }

    /// Reopens the key and, while watching, re-registers the notification
    /// on the fresh handle.
    fn reopen(&self) -> Result<()> {
        self.key.reopen()?;
        if self.raw_event().is_some() {
            self.register()?;
        }
        Ok(())
    }
}

impl Drop for MonitoredKey {
    fn drop(&mut self) {
        if self.is_watching() {
            log_debug!(path = %self.path(), "dropping watched key");
        }
        let _ = self.release_event();
    }
}

impl fmt::Debug for MonitoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoredKey")
            .field("path", self.path())
            .field("recursive", &self.recursive)
            .field("state", &self.state())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}
