//! Change monitoring for keys and individual values.
//!
//! # Features
//!
//! - **Shared watches** - subscriptions to the same key reuse one native
//!   registration and fan out to every callback in subscription order
//! - **Value monitors** - fire only when a named value actually changes
//! - **Self-healing** - a key deleted and recreated underneath a watch is
//!   reopened and re-armed transparently
//! - **Reentrancy** - callbacks may subscribe and stop subscriptions,
//!   including their own, while being dispatched
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use regwatch::{Registry, Value, WatchOptions};
//!
//! let registry = Registry::native();
//!
//! let mut token = registry.monitor_value(
//!     r"HKCU\Software\Vendor\App",
//!     "Theme",
//!     None,
//!     false,
//!     |_key, current, previous| {
//!         println!("Theme: {previous:?} -> {current}");
//!     },
//! )?;
//!
//! loop {
//!     registry.run_for(Duration::from_secs(1));
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  signal  ┌──────────────┐  fan-out  ┌──────────────┐
//! │ wait objects │─────────▶│ MonitoredKey │──────────▶│  callbacks   │
//! │ (one per key)│          │  (re-arm)    │           │ (per token)  │
//! └──────────────┘          └──────────────┘           └──────────────┘
//!        ▲                         ▲
//!        │ wait, no timeout        │ dedup by (path, recursive)
//! ┌──────────────┐          ┌──────────────┐
//! │  poll timer  │─────────▶│   Registry   │
//! └──────────────┘   tick   └──────────────┘
//! ```
//!
//! Native notifications are one-shot. Each handled signal first re-arms the
//! registration and only then runs callbacks, so a change made by a callback
//! is itself observed.

mod dispatch;
mod monitored;
mod registry;
mod token;
mod value_watch;

pub use monitored::{CallbackId, KeyCallback, MonitorState, MonitoredKey};
pub use registry::Registry;
pub use token::MonitorToken;
pub use value_watch::ValueCallback;

/// How a key is watched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Also report changes in subkeys, and subkeys being added or removed.
    pub recursive: bool,
    /// Create the key if it does not exist.
    pub create_if_missing: bool,
}

impl WatchOptions {
    /// Non-recursive, no creation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            recursive: false,
            create_if_missing: false,
        }
    }

    /// Sets recursion.
    #[must_use]
    pub const fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Sets key creation.
    #[must_use]
    pub const fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}
