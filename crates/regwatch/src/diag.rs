//! Logging switch and crate-internal logging macros.
//!
//! All diagnostics go through [`tracing`]. A process-wide flag can silence
//! them; it never changes what an operation returns.

use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING: AtomicBool = AtomicBool::new(true);

/// Enables or disables all log output from this crate.
pub fn set_logging_enabled(enabled: bool) {
    LOGGING.store(enabled, Ordering::Release);
}

/// Returns `true` if log output is enabled.
#[must_use]
pub fn logging_enabled() -> bool {
    LOGGING.load(Ordering::Acquire)
}

macro_rules! log_error {
    ($($arg:tt)+) => {
        if $crate::diag::logging_enabled() {
            ::tracing::error!($($arg)+);
        }
    };
}

macro_rules! log_warn {
    ($($arg:tt)+) => {
        if $crate::diag::logging_enabled() {
            ::tracing::warn!($($arg)+);
        }
    };
}

macro_rules! log_info {
    ($($arg:tt)+) => {
        if $crate::diag::logging_enabled() {
            ::tracing::info!($($arg)+);
        }
    };
}

macro_rules! log_debug {
    ($($arg:tt)+) => {
        if $crate::diag::logging_enabled() {
            ::tracing::debug!($($arg)+);
        }
    };
}
