//! # regwatch
//!
//! Typed value access and change monitoring for the Windows registry.
//!
//! `regwatch` wraps the registry's key handles, value encodings and one-shot
//! change notifications in a small single-threaded engine: many subscribers
//! to the same key share one native watch, callbacks fan out in subscription
//! order, and keys deleted and recreated underneath a handle are reopened
//! without the caller noticing.
//!
//! ## Features
//!
//! - **Typed values** - integers, strings, string lists and binary blobs
//!   decoded from and encoded to the native byte layouts
//! - **Shared watches** - one native registration per `(path, recursive)`,
//!   any number of callbacks
//! - **Value monitors** - callbacks that fire only when one named value
//!   changes, against a fixed or a moving baseline
//! - **Self-healing handles** - "key marked for deletion" triggers a reopen
//!   and a retry
//! - **Pluggable backend** - the live registry on Windows, an in-memory
//!   store everywhere (used by the test suite)
//! - **Rich diagnostics** - errors carry codes and help text via [`miette`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use regwatch::{KeyAccess, Registry, Value, WatchOptions};
//!
//! fn main() -> regwatch::Result<()> {
//!     let registry = Registry::native();
//!
//!     registry.set_value(r"HKCU\Software\Vendor\App", "Enabled", &Value::U32(1), None)?;
//!
//!     let _token = registry.monitor_key(
//!         r"HKCU\Software\Vendor\App",
//!         WatchOptions::new(),
//!         |key| {
//!             if let Ok(enabled) = key.get_value("Enabled") {
//!                 println!("Enabled = {enabled}");
//!             }
//!         },
//!     )?;
//!
//!     registry.run_for(Duration::from_secs(60));
//!     Ok(())
//! }
//! ```
//!
//! ## Value Types
//!
//! | Type | Rust value | Read/write |
//! |------|------------|------------|
//! | `U32` | [`Value::U32`] | Yes |
//! | `U64` | [`Value::U64`] | Yes |
//! | `STRING`, `EXPANDABLE_STRING` | [`Value::String`] | Yes |
//! | `MULTI_STRING` | [`Value::MultiString`] | Yes |
//! | `BINARY` | [`Value::Binary`] | Yes |
//! | `U32_BE`, `LINK`, resource lists, `NONE` | - | No ([`Error::UnsupportedType`]) |
//!
//! ## Threading
//!
//! Everything runs on the thread that owns the [`Registry`]. Callbacks run
//! inside [`Registry::dispatch_pending`] / [`Registry::run_for`] and may
//! freely subscribe or stop subscriptions, including their own.
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|---------|
//! | `serde` | `Serialize`/`Deserialize` for [`MonitorConfig`] | No |
//! | `toml` | [`MonitorConfig::from_toml_str`] (implies `serde`) | No |
//!
//! ## Logging
//!
//! Diagnostics are emitted through [`tracing`]; install any subscriber to
//! see them. [`diag::set_logging_enabled`] silences the crate entirely.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
pub mod diag;

pub mod backend;
pub mod codec;
mod config;
mod error;
mod key;
pub mod leak;
mod monitor;
mod path;
mod value;

pub use backend::MemoryBackend;
#[cfg(windows)]
pub use backend::WindowsBackend;
pub use config::{
    DEFAULT_POLL_INTERVAL, ENV_LOGGING, ENV_POLL_INTERVAL, MonitorConfig, MonitorConfigBuilder,
};
pub use error::{Error, ErrorCode, Result};
pub use key::{DEFAULT_RETRIES, KeyAccess, KeyHandle, OpenOptions};
pub use monitor::{
    CallbackId, KeyCallback, MonitorState, MonitorToken, MonitoredKey, Registry, ValueCallback,
    WatchOptions,
};
pub use path::{KeyPath, Root};
pub use value::{Value, ValueType};

// Re-export miette for users who want fancy error output
pub use miette;

/// Common imports.
pub mod prelude {
    pub use crate::{
        Error, KeyAccess, MonitorConfig, MonitorToken, MonitoredKey, Registry, Result, Value,
        ValueType, WatchOptions,
    };
}
