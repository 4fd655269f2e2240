//! Single-value change detection layered on a key watch.
//!
//! A key notification only says "something under this key changed". The
//! tracker narrows that to one named value: it re-reads the value on every
//! notification and fires only when it differs from the baseline.
//!
//! Two modes:
//!
//! - **fixed**: the baseline is a caller-supplied compare value and never
//!   moves; the callback fires on every notification while the stored value
//!   differs from it.
//! - **tracking**: the baseline is the last observed value and advances
//!   every time the callback fires.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::codec;
use crate::error::{Error, Result};
use crate::key::KeyAccess;
use crate::monitor::MonitoredKey;
use crate::value::{Value, ValueType};

/// Callback invoked with the key, the current value and the baseline it was
/// compared against (`None` when the value has just appeared).
pub type ValueCallback = Rc<dyn Fn(&MonitoredKey, &Value, Option<&Value>)>;

pub(crate) struct ValueTracker {
    name: String,
    fixed: bool,
    baseline: RefCell<Option<Value>>,
    exists: Cell<bool>,
    ty: Cell<ValueType>,
    callback: ValueCallback,
}

impl ValueTracker {
    pub(crate) fn new(name: &str, compare: Option<Value>, callback: ValueCallback) -> Self {
        Self {
            name: name.to_string(),
            fixed: compare.is_some(),
            baseline: RefCell::new(compare),
            exists: Cell::new(false),
            ty: Cell::new(ValueType::None),
            callback,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn baseline(&self) -> Option<Value> {
        self.baseline.borrow().clone()
    }

    pub(crate) fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Reads the initial state when the subscription is made.
    ///
    /// In fixed mode a stored value that already differs from the compare
    /// value fires at once. A value with an unsupported encoding fails the
    /// subscription.
    pub(crate) fn prime(&self, key: &MonitoredKey) -> Result<()> {
        match key.get_value_with_type(&self.name) {
            Ok((ty, current)) => {
                self.exists.set(true);
                self.ty.set(ty);
                if self.fixed {
                    self.fire_if_changed(key, ty, &current);
                } else {
                    *self.baseline.borrow_mut() = Some(current);
                }
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                self.exists.set(false);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Handles one key notification.
    pub(crate) fn observe(&self, key: &MonitoredKey) {
        let (ty, current) = match key.get_value_with_type(&self.name) {
            Ok(read) => read,
            Err(err) if err.is_not_found() => {
                if self.exists.replace(false) {
                    log_debug!(path = %key.path(), name = %self.name, "watched value removed");
                }
                return;
            }
            Err(Error::UnsupportedType { ty }) => {
                log_error!(
                    path = %key.path(),
                    name = %self.name,
                    ty = %ty,
                    "watched value changed to an unsupported type"
                );
                return;
            }
            Err(err) => {
                log_warn!(path = %key.path(), name = %self.name, error = %err, "failed to read watched value");
                return;
            }
        };

        let appeared = !self.exists.replace(true);
        if self.ty.replace(ty) != ty && !appeared {
            log_debug!(path = %key.path(), name = %self.name, ty = %ty, "watched value changed type");
        }

        if appeared && !self.fixed {
            *self.baseline.borrow_mut() = Some(current.clone());
            (self.callback)(key, &current, None);
            return;
        }

        self.fire_if_changed(key, ty, &current);
    }

    fn fire_if_changed(&self, key: &MonitoredKey, ty: ValueType, current: &Value) {
        let previous = self.baseline.borrow().clone();
        match previous {
            Some(previous) if codec::equals(current, &previous, ty) => {}
            Some(previous) => {
                if !self.fixed {
                    *self.baseline.borrow_mut() = Some(current.clone());
                }
                (self.callback)(key, current, Some(&previous));
            }
            None => {
                *self.baseline.borrow_mut() = Some(current.clone());
                (self.callback)(key, current, None);
            }
        }
    }
}
