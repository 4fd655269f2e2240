//! Key handles and typed value access.
//!
//! A [`KeyHandle`] owns at most one native handle to a key. The
//! [`KeyAccess`] trait layers the value operations on top of any handle
//! owner, routing every native call through
//! [`invoke_with_retry`](KeyAccess::invoke_with_retry) so that a key deleted
//! and recreated underneath an open handle is transparently reopened.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::backend::{Access, Backend, RawKey};
use crate::codec;
use crate::error::{Error, ErrorCode, Result};
use crate::leak::{self, ResourceKind};
use crate::path::KeyPath;
use crate::value::{Value, ValueType};

/// Retries granted to a native call that hits a key marked for deletion.
pub const DEFAULT_RETRIES: usize = 1;

/// How a key is opened.
///
/// Keys are read-only and never created by default. Asking for creation
/// implies write access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenOptions {
    create_if_missing: bool,
    read_only: bool,
}

impl OpenOptions {
    /// Read-only, no creation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            create_if_missing: false,
            read_only: true,
        }
    }

    /// Create the key (and its ancestors) if it does not exist.
    #[must_use]
    pub const fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        if create {
            self.read_only = false;
        }
        self
    }

    /// Request read-only access. Ignored when creation is enabled.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only && !self.create_if_missing;
        self
    }

    /// Whether missing keys are created.
    #[must_use]
    pub const fn creates(&self) -> bool {
        self.create_if_missing
    }

    /// Whether the key is opened read-only.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    const fn access(self) -> Access {
        if self.read_only {
            Access::READ
        } else {
            Access::READ_WRITE
        }
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
struct Live {
    raw: RawKey,
    tracker: u64,
}

/// Owner of one native key handle.
///
/// All methods take `&self`; the handle is replaced in place on reopen.
/// Close it explicitly with [`KeyHandle::close`]: dropping an open handle
/// releases it but logs a warning.
pub struct KeyHandle {
    backend: Rc<dyn Backend>,
    path: KeyPath,
    options: OpenOptions,
    live: Cell<Option<Live>>,
    /// Set by owners that manage the lifecycle themselves.
    quiet_drop: Cell<bool>,
}

impl KeyHandle {
    /// Creates a closed handle for `path`. Nothing is opened yet.
    pub(crate) fn new(backend: Rc<dyn Backend>, path: KeyPath, options: OpenOptions) -> Self {
        Self {
            backend,
            path,
            options,
            live: Cell::new(None),
            quiet_drop: Cell::new(false),
        }
    }

    /// The key path.
    #[must_use]
    pub const fn path(&self) -> &KeyPath {
        &self.path
    }

    /// The options the key was opened with.
    #[must_use]
    pub const fn options(&self) -> OpenOptions {
        self.options
    }

    /// Returns `true` while a native handle is held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.live.get().is_some()
    }

    /// The native handle, if open.
    #[must_use]
    pub fn raw(&self) -> Option<RawKey> {
        self.live.get().map(|live| live.raw)
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    pub(crate) fn set_quiet_drop(&self) {
        self.quiet_drop.set(true);
    }

    /// Opens the key. Does nothing if it is already open.
    ///
    /// A missing key is created when the options allow it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Os`] if the key is missing (and may not be created)
    /// or the store refuses access.
    pub fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        match self
            .backend
            .open_key(self.path.root(), self.path.subpath(), self.options.access())
        {
            Ok(raw) => {
                self.adopt(raw);
                Ok(())
            }

            Err(code) if code.is_not_found() && self.options.creates() => self.create(),

            Err(code) => {
                let err = self.os_error("open key", code);
                if code.is_not_found() {
                    log_debug!(path = %self.path, "key does not exist");
                } else {
                    log_error!(path = %self.path, code = %code, error = %err, "failed to open key");
                }
                Err(err)
            }
        }
    }

    /// Creates the key (and missing ancestors) with read and write rights.
    ///
    /// Any handle already held is closed first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CreateNotPermitted`] without touching the store if
    /// the handle was not opened with `create_if_missing`, or [`Error::Os`]
    /// if creation fails.
    pub fn create(&self) -> Result<()> {
        if !self.options.creates() {
            return Err(Error::CreateNotPermitted {
                path: self.path.to_string(),
            });
        }

        if self.is_open() {
            self.close()?;
        }

        match self
            .backend
            .create_key(self.path.root(), self.path.subpath(), Access::READ_WRITE)
        {
            Ok(raw) => {
                self.adopt(raw);
                log_info!(path = %self.path, "created key");
                Ok(())
            }

            Err(code) => {
                let err = self.os_error("create key", code);
                log_error!(path = %self.path, code = %code, error = %err, "failed to create key");
                Err(err)
            }
        }
    }

    /// Releases the native handle. Closing a closed handle succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Os`] if the store rejects the close. The handle is
    /// considered released either way.
    pub fn close(&self) -> Result<()> {
        let Some(live) = self.live.take() else {
            return Ok(());
        };
        leak::untrack(live.tracker);

        self.backend.close_key(live.raw).map_err(|code| {
            let err = self.os_error("close key", code);
            log_warn!(path = %self.path, code = %code, "failed to close key");
            err
        })
    }

    /// Closes and opens the key again, e.g. after it was deleted and
    /// recreated underneath this handle.
    ///
    /// # Errors
    ///
    /// Returns the error from [`KeyHandle::open`].
    pub fn reopen(&self) -> Result<()> {
        // A failed close still drops our handle; only the open matters.
        let _ = self.close();
        self.open()
    }

    fn adopt(&self, raw: RawKey) {
        let tracker = leak::track(ResourceKind::Key, &self.path.to_string());
        self.live.set(Some(Live { raw, tracker }));
    }

    pub(crate) fn os_error(&self, op: &'static str, code: ErrorCode) -> Error {
        Error::Os {
            op,
            path: self.path.to_string(),
            code,
            message: self.backend.error_text(code),
        }
    }
}

impl Drop for KeyHandle {
    fn drop(&mut self) {
        if self.is_open() {
            if !self.quiet_drop.get() {
                log_warn!(path = %self.path, "key handle dropped without being closed");
            }
            let _ = self.close();
        }
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Value access
// ============================================================================

/// Typed value access for anything that owns a [`KeyHandle`].
///
/// Implemented by [`KeyHandle`] itself and by
/// [`MonitoredKey`](crate::MonitoredKey), whose `reopen` additionally
/// re-registers its change notification.
pub trait KeyAccess {
    /// The underlying key handle.
    fn handle(&self) -> &KeyHandle;

    /// Reopens the key after it was deleted underneath the handle.
    ///
    /// # Errors
    ///
    /// Returns the error that prevented reopening.
    fn reopen(&self) -> Result<()>;

    /// Runs a native operation, reopening the key and retrying when the
    /// store reports it as marked for deletion.
    ///
    /// At most `max_retries + 1` attempts are made. Any other failure is
    /// returned immediately.
    ///
    /// # Errors
    ///
    /// [`Error::NotOpen`] if the key is closed, or [`Error::Os`] once the
    /// operation fails for good.
    fn invoke_with_retry<T, F>(&self, op: &'static str, max_retries: usize, mut f: F) -> Result<T>
    where
        F: FnMut(&dyn Backend, RawKey) -> Result<T, ErrorCode>,
    {
        let key = self.handle();
        let mut retries = 0;

        loop {
            let raw = key.raw().ok_or_else(|| Error::NotOpen {
                path: key.path().to_string(),
            })?;

            match f(key.backend(), raw) {
                Ok(value) => return Ok(value),

                Err(code) if code.is_key_deleted() && retries < max_retries => {
                    retries += 1;
                    log_debug!(path = %key.path(), op, "key marked for deletion, reopening");
                    self.reopen()?;
                }

                Err(code) => return Err(key.os_error(op, code)),
            }
        }
    }

    /// Reads a value together with its stored type.
    ///
    /// The value is read in two phases: a size probe, then a read into a
    /// buffer of exactly that size.
    ///
    /// # Errors
    ///
    /// [`Error::Os`] if the value is missing (see [`Error::is_not_found`]) or
    /// unreadable, [`Error::SizeMismatch`] if it changed size between the two
    /// phases, [`Error::UnsupportedType`] for encodings this crate does not
    /// decode.
    fn get_value_with_type(&self, name: &str) -> Result<(ValueType, Value)> {
        let result = read_value(self, name);
        if let Err(err) = &result {
            if err.is_not_found() {
                log_debug!(path = %self.handle().path(), name, "value does not exist");
            } else {
                log_error!(path = %self.handle().path(), name, error = %err, "failed to read value");
            }
        }
        result
    }

    /// Reads a value.
    ///
    /// # Errors
    ///
    /// See [`KeyAccess::get_value_with_type`].
    fn get_value(&self, name: &str) -> Result<Value> {
        self.get_value_with_type(name).map(|(_, value)| value)
    }

    /// Writes a value.
    ///
    /// Without an explicit `ty`, the type already stored under `name` is
    /// reused; if nothing is stored yet the value's natural type is used.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedType`] / [`Error::TypeMismatch`] if the value
    /// cannot be encoded as the chosen type, or [`Error::Os`] if looking up
    /// the stored type or writing fails.
    fn set_value(&self, name: &str, value: &Value, ty: Option<ValueType>) -> Result<()> {
        let result = write_value(self, name, value, ty);
        if let Err(err) = &result {
            log_error!(path = %self.handle().path(), name, error = %err, "failed to write value");
        }
        result
    }

    /// Returns the stored type of a value, or [`ValueType::None`] if the
    /// value does not exist.
    ///
    /// # Errors
    ///
    /// [`Error::Os`] for failures other than "not found".
    fn value_type(&self, name: &str) -> Result<ValueType> {
        match self.invoke_with_retry("query value", DEFAULT_RETRIES, |backend, raw| {
            backend.query_value(raw, name, None)
        }) {
            Ok(info) => type_from_code(info.type_code),
            Err(err) if err.is_not_found() => Ok(ValueType::None),
            Err(err) => {
                log_error!(path = %self.handle().path(), name, error = %err, "failed to query value type");
                Err(err)
            }
        }
    }

    /// Returns `true` if the value exists.
    ///
    /// "Not found" yields `false` silently; any other failure also yields
    /// `false` but is logged.
    fn value_exists(&self, name: &str) -> bool {
        match self.invoke_with_retry("query value", DEFAULT_RETRIES, |backend, raw| {
            backend.query_value(raw, name, None)
        }) {
            Ok(_) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => {
                log_error!(path = %self.handle().path(), name, error = %err, "failed to probe value");
                false
            }
        }
    }
}

impl KeyAccess for KeyHandle {
    fn handle(&self) -> &KeyHandle {
        self
    }

    fn reopen(&self) -> Result<()> {
        Self::reopen(self)
    }
}

fn type_from_code(code: u32) -> Result<ValueType> {
    ValueType::from_code(code)
        .ok_or_else(|| Error::malformed(ValueType::None, format!("unknown type code {code}")))
}

fn read_value<K: KeyAccess + ?Sized>(key: &K, name: &str) -> Result<(ValueType, Value)> {
    let probe = key.invoke_with_retry("query value", DEFAULT_RETRIES, |backend, raw| {
        backend.query_value(raw, name, None)
    })?;

    let mut buf = vec![0u8; probe.size];
    let filled = key.invoke_with_retry("query value", DEFAULT_RETRIES, |backend, raw| {
        backend.query_value(raw, name, Some(buf.as_mut_slice()))
    })?;

    if filled.size != probe.size {
        return Err(Error::SizeMismatch {
            path: key.handle().path().to_string(),
            name: name.to_string(),
            expected: probe.size,
            actual: filled.size,
        });
    }

    let ty = type_from_code(filled.type_code)?;
    if !ty.is_supported() {
        return Err(Error::UnsupportedType { ty });
    }

    Ok((ty, codec::decode(&buf, ty)?))
}

fn write_value<K: KeyAccess + ?Sized>(
    key: &K,
    name: &str,
    value: &Value,
    ty: Option<ValueType>,
) -> Result<()> {
    let ty = match ty {
        Some(ty) => ty,
        None => match key.value_type(name)? {
            ValueType::None => value.natural_type(),
            stored => stored,
        },
    };

    let data = codec::encode(value, ty)?;
    key.invoke_with_retry("set value", DEFAULT_RETRIES, |backend, raw| {
        backend.set_value(raw, name, ty.code(), &data)
    })
}
