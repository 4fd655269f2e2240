//! Error types for registry access and monitoring.
//!
//! This module contains the [`Error`] enum and the [`ErrorCode`] newtype used
//! to classify native failures.
//!
//! # Error Variants
//!
//! | Variant | When It Occurs |
//! |---------|----------------|
//! | [`Error::InvalidPath`] | Path is malformed or names an unknown root |
//! | [`Error::UnsupportedType`] | Value encoding outside the supported set |
//! | [`Error::TypeMismatch`] | Value shape does not fit the requested encoding |
//! | [`Error::MalformedData`] | Stored bytes cannot be decoded |
//! | [`Error::Os`] | A native call failed |
//! | [`Error::SizeMismatch`] | A value changed size between query phases |
//! | [`Error::CreateNotPermitted`] | `create()` on a key opened without create rights |
//! | [`Error::NotOpen`] | Operation on a closed key handle |
//! | [`Error::Stopped`] | Operation on a stopped monitor |
//! | [`Error::InvalidConfig`] | Bad poll interval or environment setting |
//!
//! Native failures keep their numeric [`ErrorCode`] so callers can branch on
//! it even when logging is disabled:
//!
//! ```rust,ignore
//! match registry.get_value(r"HKCU\Software\App", "Port") {
//!     Ok(value) => println!("port = {value}"),
//!     Err(e) if e.is_not_found() => println!("port not configured"),
//!     Err(e) => eprintln!("{:?}", miette::Report::from(e)),
//! }
//! ```

use std::fmt::{self, Display, Formatter};

use miette::Diagnostic;
use thiserror::Error as ThisError;

use crate::value::ValueType;

/// A native error code as reported by the host store.
///
/// Only a handful of codes are interpreted by this crate; everything else is
/// carried through opaquely and rendered with the OS-provided text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    /// The operation completed successfully.
    pub const SUCCESS: Self = Self(0);

    /// The key or value does not exist.
    pub const NOT_FOUND: Self = Self(2);

    /// The caller lacks the requested rights.
    pub const ACCESS_DENIED: Self = Self(5);

    /// The handle is not (or no longer) valid.
    pub const INVALID_HANDLE: Self = Self(6);

    /// An argument was rejected by the store.
    pub const INVALID_PARAMETER: Self = Self(87);

    /// The supplied buffer is too small for the value.
    pub const MORE_DATA: Self = Self(234);

    /// The key was marked for deletion while a handle was still open.
    pub const KEY_DELETED: Self = Self(1018);

    /// Returns the raw numeric code.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` for the "not found" condition.
    #[must_use]
    pub const fn is_not_found(self) -> bool {
        self.0 == Self::NOT_FOUND.0
    }

    /// Returns `true` for the "key marked for deletion" condition.
    #[must_use]
    pub const fn is_key_deleted(self) -> bool {
        self.0 == Self::KEY_DELETED.0
    }

    /// Built-in description for the codes this crate distinguishes.
    ///
    /// Returns an empty string for anything else.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self.0 {
            0 => "The operation completed successfully.",
            2 => "The system cannot find the file specified.",
            5 => "Access is denied.",
            6 => "The handle is invalid.",
            87 => "The parameter is incorrect.",
            234 => "More data is available.",
            1018 => "Illegal operation attempted on a registry key that has been marked for deletion.",
            _ => "",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

/// Errors that can occur when accessing or monitoring the store.
///
/// Every fallible operation returns this type. It integrates with [`miette`]
/// for rich terminal diagnostics.
#[derive(Debug, ThisError, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    /// The path is malformed or its root is not one of the known roots.
    #[error("invalid key path '{path}': {reason}")]
    #[diagnostic(
        code(regwatch::invalid_path),
        help("paths look like HKCU\\Software\\Vendor; valid roots are HKCR, HKCU, HKLM, HKU, HKCC")
    )]
    InvalidPath {
        /// The offending path text.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The value encoding is not one of the read/write-supported encodings.
    #[error("unsupported value type {ty}")]
    #[diagnostic(
        code(regwatch::unsupported_type),
        help("supported types are U32, U64, STRING, EXPANDABLE_STRING, MULTI_STRING and BINARY")
    )]
    UnsupportedType {
        /// The rejected type.
        ty: ValueType,
    },

    /// A value cannot be written with the requested encoding.
    #[error("a {found} value cannot be stored as {expected}")]
    #[diagnostic(code(regwatch::type_mismatch))]
    TypeMismatch {
        /// The encoding that was requested.
        expected: ValueType,
        /// The shape of the value that was supplied.
        found: &'static str,
    },

    /// Stored bytes do not form a valid instance of their declared type.
    #[error("malformed {ty} data: {message}")]
    #[diagnostic(code(regwatch::malformed_data))]
    MalformedData {
        /// The declared type.
        ty: ValueType,
        /// What was wrong with the bytes.
        message: String,
    },

    /// A native call failed.
    #[error("{op} failed for '{path}': {message} (code {code})")]
    #[diagnostic(code(regwatch::os_error))]
    Os {
        /// The native operation that failed.
        op: &'static str,
        /// The key path the operation targeted.
        path: String,
        /// The native error code.
        code: ErrorCode,
        /// OS-provided text, possibly empty.
        message: String,
    },

    /// The value changed size between the size probe and the read.
    #[error("value '{name}' under '{path}' changed size while reading ({expected} != {actual} bytes)")]
    #[diagnostic(
        code(regwatch::size_mismatch),
        help("the value was modified concurrently; retry the read")
    )]
    SizeMismatch {
        /// Key path.
        path: String,
        /// Value name.
        name: String,
        /// Size reported by the probe.
        expected: usize,
        /// Size reported by the read.
        actual: usize,
    },

    /// `create()` was called on a key handle that may not create keys.
    #[error("creating '{path}' is not permitted for this handle")]
    #[diagnostic(
        code(regwatch::create_not_permitted),
        help("open the key with create_if_missing(true)")
    )]
    CreateNotPermitted {
        /// Key path.
        path: String,
    },

    /// The key handle is closed.
    #[error("key '{path}' is not open")]
    #[diagnostic(code(regwatch::not_open))]
    NotOpen {
        /// Key path.
        path: String,
    },

    /// The monitor was already stopped.
    #[error("monitor for '{path}' has been stopped")]
    #[diagnostic(code(regwatch::stopped))]
    Stopped {
        /// Key path.
        path: String,
    },

    /// A configuration setting is invalid.
    #[error("invalid configuration for {setting}: {message}")]
    #[diagnostic(code(regwatch::invalid_config))]
    InvalidConfig {
        /// Setting or environment variable name.
        setting: String,
        /// What was wrong with it.
        message: String,
    },
}

impl Error {
    /// Create an `InvalidPath` error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a `MalformedData` error.
    pub fn malformed(ty: ValueType, message: impl Into<String>) -> Self {
        Self::MalformedData {
            ty,
            message: message.into(),
        }
    }

    /// Create an `InvalidConfig` error.
    pub fn invalid_config(setting: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            setting: setting.into(),
            message: message.into(),
        }
    }

    /// Returns the native code for OS failures.
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Os { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns `true` if a native call reported "not found".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code().is_some_and(ErrorCode::is_not_found)
    }

    /// Returns `true` if a native call reported "key marked for deletion".
    #[must_use]
    pub fn is_key_deleted(&self) -> bool {
        self.code().is_some_and(ErrorCode::is_key_deleted)
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
