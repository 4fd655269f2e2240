//! Key paths.
//!
//! A [`KeyPath`] is a [`Root`] plus a backslash-separated subpath, written
//! `HKCU\Software\Vendor`. Roots are matched case-insensitively in either
//! their short (`HKLM`) or long (`HKEY_LOCAL_MACHINE`) form, and a trailing
//! colon after the root (`HKCU:\Software`) is tolerated.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::{Error, Result};

/// One of the fixed top-level namespaces of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Root {
    /// `HKEY_CLASSES_ROOT`
    ClassesRoot,
    /// `HKEY_CURRENT_USER`
    CurrentUser,
    /// `HKEY_LOCAL_MACHINE`
    LocalMachine,
    /// `HKEY_USERS`
    Users,
    /// `HKEY_CURRENT_CONFIG`
    CurrentConfig,
}

impl Root {
    /// All roots, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::ClassesRoot,
        Self::CurrentUser,
        Self::LocalMachine,
        Self::Users,
        Self::CurrentConfig,
    ];

    /// Short identifier, e.g. `HKCU`.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::ClassesRoot => "HKCR",
            Self::CurrentUser => "HKCU",
            Self::LocalMachine => "HKLM",
            Self::Users => "HKU",
            Self::CurrentConfig => "HKCC",
        }
    }

    /// Long identifier, e.g. `HKEY_CURRENT_USER`.
    #[must_use]
    pub const fn long_name(self) -> &'static str {
        match self {
            Self::ClassesRoot => "HKEY_CLASSES_ROOT",
            Self::CurrentUser => "HKEY_CURRENT_USER",
            Self::LocalMachine => "HKEY_LOCAL_MACHINE",
            Self::Users => "HKEY_USERS",
            Self::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }

    /// Resolves a root identifier, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|root| {
            name.eq_ignore_ascii_case(root.short_name()) || name.eq_ignore_ascii_case(root.long_name())
        })
    }
}

impl Display for Root {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A parsed key path.
///
/// # Example
///
/// ```rust,ignore
/// use regwatch::{KeyPath, Root};
///
/// let path: KeyPath = r"hkey_current_user:\Software\\Vendor\".parse()?;
/// assert_eq!(path.root(), Root::CurrentUser);
/// assert_eq!(path.subpath(), r"Software\Vendor");
/// assert_eq!(path.to_string(), r"HKCU\Software\Vendor");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPath {
    root: Root,
    subpath: String,
}

impl KeyPath {
    /// Creates a path from an already-resolved root and subpath.
    ///
    /// The subpath is normalized the same way [`KeyPath::parse`] does.
    pub fn new(root: Root, subpath: &str) -> Self {
        Self {
            root,
            subpath: normalize(subpath),
        }
    }

    /// Parses `ROOT\Sub\Key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the path is empty or the root is not
    /// one of the known roots.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_path(text, "path is empty"));
        }

        let (root_part, rest) = trimmed.split_once('\\').unwrap_or((trimmed, ""));
        let root_name = root_part.strip_suffix(':').unwrap_or(root_part);

        let root = Root::from_name(root_name)
            .ok_or_else(|| Error::invalid_path(text, format!("unknown root '{root_name}'")))?;

        Ok(Self::new(root, rest))
    }

    /// The root namespace.
    #[must_use]
    pub const fn root(&self) -> Root {
        self.root
    }

    /// The subpath below the root, without leading or trailing separators.
    #[must_use]
    pub fn subpath(&self) -> &str {
        &self.subpath
    }

    /// Returns `true` if this path names a root itself.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.subpath.is_empty()
    }

    /// Appends a child segment (or several, separated by `\`).
    #[must_use]
    pub fn join(&self, child: &str) -> Self {
        let child = normalize(child);
        if child.is_empty() {
            return self.clone();
        }
        if self.subpath.is_empty() {
            return Self {
                root: self.root,
                subpath: child,
            };
        }
        Self {
            root: self.root,
            subpath: format!("{}\\{child}", self.subpath),
        }
    }

    /// Case-folded form used to deduplicate watches on the same key.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl Display for KeyPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.subpath.is_empty() {
            write!(f, "{}", self.root)
        } else {
            write!(f, "{}\\{}", self.root, self.subpath)
        }
    }
}

impl FromStr for KeyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for KeyPath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn normalize(subpath: &str) -> String {
    subpath
        .split('\\')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_long_roots() {
        let short = KeyPath::parse(r"HKLM\Software\Vendor").unwrap();
        let long = KeyPath::parse(r"HKEY_LOCAL_MACHINE\Software\Vendor").unwrap();
        assert_eq!(short, long);
        assert_eq!(short.root(), Root::LocalMachine);
        assert_eq!(short.subpath(), r"Software\Vendor");
    }

    #[test]
    fn test_parse_case_insensitive_with_colon() {
        let path = KeyPath::parse(r"hkcu:\Software\Test").unwrap();
        assert_eq!(path.root(), Root::CurrentUser);
        assert_eq!(path.to_string(), r"HKCU\Software\Test");
    }

    #[test]
    fn test_parse_collapses_separators() {
        let path = KeyPath::parse(r"HKCU\\Software\\\Test\").unwrap();
        assert_eq!(path.subpath(), r"Software\Test");
    }

    #[test]
    fn test_root_only() {
        let path = KeyPath::parse("HKU").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "HKU");
    }

    #[test]
    fn test_unknown_root_is_validation_error() {
        let err = KeyPath::parse(r"HKXX\Software").unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        assert!(err.to_string().contains("HKXX"));

        assert!(KeyPath::parse("").is_err());
        assert!(KeyPath::parse(r"\Software").is_err());
    }

    #[test]
    fn test_join() {
        let base = KeyPath::parse("HKCU").unwrap();
        let child = base.join(r"Software\Test");
        assert_eq!(child.to_string(), r"HKCU\Software\Test");
        assert_eq!(child.join("Sub").subpath(), r"Software\Test\Sub");
        assert_eq!(child.join(""), child);
    }

    #[test]
    fn test_cache_key_folds_case() {
        let a = KeyPath::parse(r"HKCU\Software\TEST").unwrap();
        let b = KeyPath::parse(r"hkey_current_user\software\test").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
