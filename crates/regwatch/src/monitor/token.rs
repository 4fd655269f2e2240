//! Subscription handles.

use std::fmt;
use std::rc::{Rc, Weak};

use super::registry::Shared;
use super::value_watch::ValueTracker;
use super::CallbackId;
use crate::path::KeyPath;
use crate::value::Value;

/// One subscription returned by
/// [`Registry::monitor_key`](crate::Registry::monitor_key) or
/// [`Registry::monitor_value`](crate::Registry::monitor_value).
///
/// Several tokens may share one native watch; stopping a token removes only
/// its own callback. The watch is released when the last token stops.
///
/// Dropping an active token stops it and logs a warning.
#[must_use = "dropping a token stops its monitor"]
pub struct MonitorToken {
    registry: Weak<Shared>,
    path: KeyPath,
    recursive: bool,
    callback: Option<CallbackId>,
    value: Option<Rc<ValueTracker>>,
}

impl MonitorToken {
    pub(crate) const fn new(
        registry: Weak<Shared>,
        path: KeyPath,
        recursive: bool,
        callback: CallbackId,
    ) -> Self {
        Self {
            registry,
            path,
            recursive,
            callback: Some(callback),
            value: None,
        }
    }

    pub(crate) fn with_value(mut self, tracker: Rc<ValueTracker>) -> Self {
        self.value = Some(tracker);
        self
    }

    /// Stops the subscription.
    ///
    /// Returns `true` if this call stopped it, `false` if it was already
    /// stopped (which is logged, not an error).
    pub fn stop(&mut self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.stop_monitor(self),
            None => {
                // The registry is gone and has released every watch already.
                if self.callback.take().is_some() {
                    true
                } else {
                    log_warn!(path = %self.path, "monitor already stopped");
                    false
                }
            }
        }
    }

    /// Returns `true` until the token is stopped.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    /// The watched key.
    #[must_use]
    pub const fn path(&self) -> &KeyPath {
        &self.path
    }

    /// Whether the subscription covers the whole subtree.
    #[must_use]
    pub const fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// For value monitors, the watched value's name.
    #[must_use]
    pub fn value_name(&self) -> Option<&str> {
        self.value.as_deref().map(ValueTracker::name)
    }

    /// For value monitors, the baseline new reads are compared against: the
    /// fixed compare value, or the last observed value when tracking.
    #[must_use]
    pub fn tracked_value(&self) -> Option<Value> {
        self.value.as_deref().and_then(ValueTracker::baseline)
    }

    /// For value monitors, whether the baseline is a fixed compare value.
    #[must_use]
    pub fn is_fixed_compare(&self) -> bool {
        self.value.as_deref().is_some_and(ValueTracker::is_fixed)
    }

    pub(crate) const fn take_callback(&mut self) -> Option<CallbackId> {
        self.callback.take()
    }
}

impl Drop for MonitorToken {
    fn drop(&mut self) {
        if self.callback.is_some() && self.registry.strong_count() > 0 {
            log_warn!(path = %self.path, "monitor token dropped while active; stopping it");
            self.stop();
        }
    }
}

impl fmt::Debug for MonitorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorToken")
            .field("path", &self.path)
            .field("recursive", &self.recursive)
            .field("active", &self.is_active())
            .field("value", &self.value_name())
            .finish()
    }
}
