//! The public facade: path-level value access plus subscription management.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam_channel::select;

use super::dispatch::{Dispatcher, PollTimer};
use super::token::MonitorToken;
use super::value_watch::{ValueCallback, ValueTracker};
use super::{CallbackId, KeyCallback, MonitoredKey, WatchOptions};
use crate::backend::{Backend, WaitOutcome};
use crate::config::{self, MonitorConfig};
use crate::diag;
use crate::error::Result;
use crate::key::{KeyAccess, KeyHandle, OpenOptions};
use crate::path::KeyPath;
use crate::value::{Value, ValueType};

pub(crate) struct Shared {
    backend: Rc<dyn Backend>,
    dispatcher: RefCell<Dispatcher>,
    poll_interval: Cell<Duration>,
    next_callback: Cell<u64>,
}

/// Entry point for value access and change monitoring.
///
/// A `Registry` is single-threaded: every callback runs on the thread that
/// calls [`dispatch_pending`](Registry::dispatch_pending) or
/// [`run_for`](Registry::run_for). Clones share the same watches.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use regwatch::{KeyAccess, MonitorConfig, Registry, WatchOptions};
///
/// let registry = Registry::native();
///
/// let mut token = registry.monitor_key(
///     r"HKCU\Software\Vendor\App",
///     WatchOptions::new().recursive(true),
///     |key| println!("{} changed", key.path()),
/// )?;
///
/// registry.run_for(Duration::from_secs(30));
/// token.stop();
/// ```
#[derive(Clone)]
pub struct Registry {
    shared: Rc<Shared>,
}

impl Registry {
    /// Creates a registry over `backend`.
    ///
    /// The configuration's logging flag is applied process-wide.
    pub fn new(backend: impl Backend + 'static, config: MonitorConfig) -> Self {
        diag::set_logging_enabled(config.logging());

        let mut interval = config.poll_interval();
        if config::validate_interval(interval).is_err() {
            log_warn!("zero poll interval configured, using the default");
            interval = config::DEFAULT_POLL_INTERVAL;
        }

        Self {
            shared: Rc::new(Shared {
                backend: Rc::new(backend),
                dispatcher: RefCell::new(Dispatcher::default()),
                poll_interval: Cell::new(interval),
                next_callback: Cell::new(1),
            }),
        }
    }

    /// Creates a registry over the live Windows registry with the default
    /// configuration.
    #[cfg(windows)]
    #[must_use]
    pub fn native() -> Self {
        Self::new(crate::backend::WindowsBackend::new(), MonitorConfig::default())
    }

    // =========================================================================
    // Key and value access
    // =========================================================================

    /// Opens a key read-only.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPath`](crate::Error::InvalidPath) or the open failure.
    pub fn open_key(&self, path: &str) -> Result<KeyHandle> {
        self.open_key_with(path, OpenOptions::new())
    }

    /// Opens a key with explicit options.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPath`](crate::Error::InvalidPath) or the open failure.
    pub fn open_key_with(&self, path: &str, options: OpenOptions) -> Result<KeyHandle> {
        let path = parse_path(path)?;
        let key = KeyHandle::new(Rc::clone(&self.shared.backend), path, options);
        key.open()?;
        Ok(key)
    }

    /// Closes a key handle obtained from [`open_key`](Registry::open_key).
    ///
    /// # Errors
    ///
    /// Returns the native close failure.
    pub fn close_key(&self, key: &KeyHandle) -> Result<()> {
        key.close()
    }

    /// Reads one value.
    ///
    /// # Errors
    ///
    /// Fails if the key or value is missing or unreadable; see
    /// [`KeyAccess::get_value`].
    pub fn get_value(&self, path: &str, name: &str) -> Result<Value> {
        self.with_key(path, OpenOptions::new(), |key| key.get_value(name))
    }

    /// Writes one value, creating the key if it does not exist.
    ///
    /// See [`KeyAccess::set_value`] for how the type is chosen.
    ///
    /// # Errors
    ///
    /// Fails if the key cannot be created or the write is rejected.
    pub fn set_value(
        &self,
        path: &str,
        name: &str,
        value: &Value,
        ty: Option<ValueType>,
    ) -> Result<()> {
        self.with_key(path, OpenOptions::new().create_if_missing(true), |key| {
            key.set_value(name, value, ty)
        })
    }

    /// Returns the stored type of a value, or [`ValueType::None`] if the key
    /// or the value does not exist.
    ///
    /// # Errors
    ///
    /// Fails for errors other than "not found".
    pub fn get_value_type(&self, path: &str, name: &str) -> Result<ValueType> {
        match self.with_key(path, OpenOptions::new(), |key| key.value_type(name)) {
            Err(err) if err.is_not_found() => Ok(ValueType::None),
            other => other,
        }
    }

    /// Returns `true` if the key exists and holds the value.
    #[must_use]
    pub fn value_exists(&self, path: &str, name: &str) -> bool {
        self.with_key(path, OpenOptions::new(), |key| Ok(key.value_exists(name)))
            .unwrap_or(false)
    }

    fn with_key<T>(
        &self,
        path: &str,
        options: OpenOptions,
        f: impl FnOnce(&KeyHandle) -> Result<T>,
    ) -> Result<T> {
        let key = self.open_key_with(path, options)?;
        let result = f(&key);
        let _ = key.close();
        result
    }

    // =========================================================================
    // Monitoring
    // =========================================================================

    /// Subscribes to changes under a key.
    ///
    /// Subscriptions with the same path (compared case-insensitively) and
    /// the same recursion flag share one native watch; callbacks run in
    /// subscription order.
    ///
    /// # Errors
    ///
    /// Fails if the path does not parse, the key cannot be opened, or the
    /// native watch cannot be registered.
    pub fn monitor_key<F>(&self, path: &str, options: WatchOptions, callback: F) -> Result<MonitorToken>
    where
        F: Fn(&MonitoredKey) + 'static,
    {
        let path = parse_path(path)?;
        let (token, _) = Shared::subscribe(&self.shared, path, options, Rc::new(callback))?;
        Ok(token)
    }

    /// Subscribes to changes of a single value.
    ///
    /// With `compare` set, the callback fires on every notification while
    /// the value differs from it, including once immediately if it already
    /// does. Without `compare`, the value present at subscription becomes
    /// the baseline and the callback fires whenever it changes, receiving
    /// the previous value.
    ///
    /// # Errors
    ///
    /// Fails as [`monitor_key`](Registry::monitor_key) does, or with
    /// [`Error::UnsupportedType`](crate::Error::UnsupportedType) if the value
    /// is stored with an encoding this crate cannot decode.
    pub fn monitor_value<F>(
        &self,
        path: &str,
        name: &str,
        compare: Option<Value>,
        create_if_missing: bool,
        callback: F,
    ) -> Result<MonitorToken>
    where
        F: Fn(&MonitoredKey, &Value, Option<&Value>) + 'static,
    {
        let path = parse_path(path)?;
        let callback: ValueCallback = Rc::new(callback);
        let tracker = Rc::new(ValueTracker::new(name, compare, callback));

        let observer = Rc::clone(&tracker);
        let options = WatchOptions::new().create_if_missing(create_if_missing);
        let (mut token, key) = Shared::subscribe(
            &self.shared,
            path,
            options,
            Rc::new(move |key: &MonitoredKey| observer.observe(key)),
        )?;

        if let Err(err) = tracker.prime(&key) {
            log_error!(path = %key.path(), name, error = %err, "cannot monitor value");
            token.stop();
            return Err(err);
        }

        Ok(token.with_value(tracker))
    }

    /// Stops a subscription. Equivalent to [`MonitorToken::stop`].
    pub fn stop_monitor(&self, token: &mut MonitorToken) -> bool {
        self.shared.stop_monitor(token)
    }

    /// Runs every pending notification and returns how many were handled.
    ///
    /// Keeps waiting without blocking until nothing is signaled. Callbacks
    /// may subscribe or stop subscriptions, including their own.
    pub fn dispatch_pending(&self) -> usize {
        self.shared.dispatch_pending()
    }

    /// Drives dispatch from the poll timer until `duration` has elapsed or
    /// nothing is being watched any more. Returns the notifications handled.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut dispatched = 0;

        loop {
            let Some(ticker) = self.shared.dispatcher.borrow().timer().map(PollTimer::ticker)
            else {
                break;
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            select! {
                recv(ticker) -> _ => dispatched += self.dispatch_pending(),
                default(remaining) => break,
            }
        }

        dispatched
    }

    /// Returns `true` while the poll timer runs, i.e. while at least one
    /// key is watched.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.shared.dispatcher.borrow().timer().is_some()
    }

    /// Number of distinct native watches.
    #[must_use]
    pub fn active_monitors(&self) -> usize {
        self.shared.dispatcher.borrow().len()
    }

    /// The shared watch for a path, if one exists.
    #[must_use]
    pub fn monitored_key(&self, path: &str, recursive: bool) -> Option<Rc<MonitoredKey>> {
        let path = KeyPath::parse(path).ok()?;
        self.shared
            .dispatcher
            .borrow()
            .lookup(&path.cache_key(), recursive)
    }

    /// Interval between dispatch ticks.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.shared.poll_interval.get()
    }

    /// Changes the tick interval, restarting a running timer.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`](crate::Error::InvalidConfig) for zero.
    pub fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        config::validate_interval(interval)?;
        self.shared.poll_interval.set(interval);
        self.shared.dispatcher.borrow_mut().restart_timer(interval);
        Ok(())
    }

    /// Releases every watch and stops the timer.
    ///
    /// Outstanding tokens become inert; stopping them later is harmless.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("active_monitors", &self.active_monitors())
            .field("polling", &self.is_polling())
            .field("poll_interval", &self.poll_interval())
            .finish_non_exhaustive()
    }
}

fn parse_path(path: &str) -> Result<KeyPath> {
    KeyPath::parse(path).inspect_err(|err| {
        log_error!(path, error = %err, "invalid key path");
    })
}

impl Shared {
    fn next_callback_id(&self) -> CallbackId {
        let id = self.next_callback.get();
        self.next_callback.set(id + 1);
        CallbackId(id)
    }

    /// Adds a callback to the shared watch for `path`, creating or
    /// replacing the watch as needed.
    fn subscribe(
        this: &Rc<Self>,
        path: KeyPath,
        options: WatchOptions,
        callback: KeyCallback,
    ) -> Result<(MonitorToken, Rc<MonitoredKey>)> {
        let cache_key = path.cache_key();
        let existing = this.dispatcher.borrow().lookup(&cache_key, options.recursive);

        let key = match existing {
            Some(key) if key.is_valid() && key.is_watching() => key,
            stale => {
                let fresh = Rc::new(MonitoredKey::new(
                    Rc::clone(&this.backend),
                    path.clone(),
                    options.recursive,
                    options.create_if_missing,
                ));

                if let Err(err) = fresh.open().and_then(|()| fresh.start()) {
                    fresh.teardown();
                    return Err(err);
                }

                if let Some(stale) = stale {
                    log_warn!(path = %path, "replacing invalid watch");
                    fresh.adopt_callbacks(&stale);
                    stale.teardown();
                }

                this.dispatcher.borrow_mut().insert(
                    cache_key,
                    Rc::clone(&fresh),
                    this.poll_interval.get(),
                );
                fresh
            }
        };

        let id = this.next_callback_id();
        key.add_callback(id, callback);
        log_debug!(path = %path, recursive = options.recursive, callbacks = key.callback_count(), "subscribed");

        let token = MonitorToken::new(Rc::downgrade(this), path, options.recursive, id);
        Ok((token, key))
    }

    pub(crate) fn stop_monitor(&self, token: &mut MonitorToken) -> bool {
        let Some(id) = token.take_callback() else {
            log_warn!(path = %token.path(), "monitor already stopped");
            return false;
        };

        let cache_key = token.path().cache_key();
        let key = self.dispatcher.borrow().lookup(&cache_key, token.is_recursive());
        let Some(key) = key else {
            log_debug!(path = %token.path(), "watch already released");
            return true;
        };

        if key.remove_callback(id) && key.callback_count() == 0 {
            self.dispatcher
                .borrow_mut()
                .remove(&cache_key, &key, self.poll_interval.get());
            log_debug!(path = %token.path(), "released watch");
        }
        true
    }

    fn dispatch_pending(&self) -> usize {
        let mut dispatched = 0;

        loop {
            let (events, keys) = self.dispatcher.borrow().snapshot();
            if events.is_empty() {
                break;
            }

            match self.backend.wait_multiple(&events, false, Duration::ZERO) {
                WaitOutcome::Signaled(index) => {
                    let Some(key) = keys.get(index) else {
                        log_error!(index, "wait reported an index outside the wait array");
                        break;
                    };
                    key.on_signaled();
                    dispatched += 1;
                }

                WaitOutcome::Timeout => break,

                WaitOutcome::Failed(code) => {
                    log_error!(
                        code = %code,
                        message = %self.backend.error_text(code),
                        "waiting for change notifications failed"
                    );
                    break;
                }

                WaitOutcome::Abandoned(index) => {
                    log_error!(index, "change notification wait object abandoned");
                    break;
                }
            }
        }

        dispatched
    }

    fn shutdown(&self) {
        let keys = self.dispatcher.borrow_mut().drain(self.poll_interval.get());
        for key in &keys {
            key.teardown();
        }
        if !keys.is_empty() {
            log_debug!(released = keys.len(), "registry shut down");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}
