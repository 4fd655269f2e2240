//! Value encodings and typed values.
//!
//! [`ValueType`] enumerates every encoding the store knows about, while
//! [`Value`] holds the decoded payload for the subset this crate can read
//! and write.
//!
//! # Example
//!
//! ```rust,ignore
//! use regwatch::{Value, ValueType};
//!
//! let port = Value::from(8080u32);
//! assert_eq!(port.natural_type(), ValueType::U32);
//! let port: u16 = port.cast().unwrap();
//! ```

use std::fmt::{self, Display, Formatter};

use num_traits::{NumCast, ToPrimitive};

// ============================================================================
// ValueType
// ============================================================================

/// The encoding tag stored alongside every value.
///
/// Only the types for which [`ValueType::is_supported`] returns `true` can be
/// decoded or encoded; the rest are recognized so they can be reported
/// precisely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// No value, or the value does not exist.
    #[default]
    None,
    /// NUL-terminated UTF-16 string.
    String,
    /// NUL-terminated UTF-16 string containing unexpanded `%VAR%` references.
    ExpandableString,
    /// Raw bytes.
    Binary,
    /// Little-endian 32-bit unsigned integer.
    U32,
    /// Big-endian 32-bit unsigned integer.
    U32BigEndian,
    /// Symbolic link.
    Link,
    /// Sequence of NUL-terminated UTF-16 strings.
    MultiString,
    /// Hardware resource list.
    ResourceList,
    /// Hardware resource descriptor.
    FullResourceDescriptor,
    /// Hardware resource requirements list.
    ResourceRequirementsList,
    /// Little-endian 64-bit unsigned integer.
    U64,
}

impl ValueType {
    /// Maps a native type code to a `ValueType`.
    ///
    /// Returns `None` for codes outside the known set.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::String,
            2 => Self::ExpandableString,
            3 => Self::Binary,
            4 => Self::U32,
            5 => Self::U32BigEndian,
            6 => Self::Link,
            7 => Self::MultiString,
            8 => Self::ResourceList,
            9 => Self::FullResourceDescriptor,
            10 => Self::ResourceRequirementsList,
            11 => Self::U64,
            _ => return None,
        })
    }

    /// Returns the native type code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::String => 1,
            Self::ExpandableString => 2,
            Self::Binary => 3,
            Self::U32 => 4,
            Self::U32BigEndian => 5,
            Self::Link => 6,
            Self::MultiString => 7,
            Self::ResourceList => 8,
            Self::FullResourceDescriptor => 9,
            Self::ResourceRequirementsList => 10,
            Self::U64 => 11,
        }
    }

    /// Returns `true` if values of this type can be decoded and encoded.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Self::U32
                | Self::U64
                | Self::String
                | Self::ExpandableString
                | Self::MultiString
                | Self::Binary
        )
    }

    /// Canonical upper-case name, as used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::String => "STRING",
            Self::ExpandableString => "EXPANDABLE_STRING",
            Self::Binary => "BINARY",
            Self::U32 => "U32",
            Self::U32BigEndian => "U32_BE",
            Self::Link => "LINK",
            Self::MultiString => "MULTI_STRING",
            Self::ResourceList => "RESOURCE_LIST",
            Self::FullResourceDescriptor => "FULL_RESOURCE_DESCRIPTOR",
            Self::ResourceRequirementsList => "RESOURCE_REQUIREMENTS_LIST",
            Self::U64 => "U64",
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Value
// ============================================================================

/// A decoded value.
///
/// The variant fixes the payload shape; the encoding it is stored with is
/// chosen separately (a [`Value::String`] may be stored as either
/// [`ValueType::String`] or [`ValueType::ExpandableString`]).
///
/// | Variant | Encodings |
/// |---------|-----------|
/// | `U32` | `U32` |
/// | `U64` | `U64` |
/// | `String` | `STRING`, `EXPANDABLE_STRING` |
/// | `MultiString` | `MULTI_STRING` |
/// | `Binary` | `BINARY` |
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// A single string.
    String(String),
    /// An ordered sequence of strings.
    MultiString(Vec<String>),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl Value {
    /// The encoding used when no explicit or stored type applies.
    #[must_use]
    pub const fn natural_type(&self) -> ValueType {
        match self {
            Self::U32(_) => ValueType::U32,
            Self::U64(_) => ValueType::U64,
            Self::String(_) => ValueType::String,
            Self::MultiString(_) => ValueType::MultiString,
            Self::Binary(_) => ValueType::Binary,
        }
    }

    /// Returns `true` if this payload can be stored with `ty`.
    #[must_use]
    pub const fn fits(&self, ty: ValueType) -> bool {
        matches!(
            (self, ty),
            (Self::U32(_), ValueType::U32)
                | (Self::U64(_), ValueType::U64)
                | (
                    Self::String(_),
                    ValueType::String | ValueType::ExpandableString
                )
                | (Self::MultiString(_), ValueType::MultiString)
                | (Self::Binary(_), ValueType::Binary)
        )
    }

    /// Short name of the payload shape.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::String(_) => "string",
            Self::MultiString(_) => "multi-string",
            Self::Binary(_) => "binary",
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the multi-string payload, if any.
    #[must_use]
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Self::MultiString(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the binary payload, if any.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Converts to `u32` if the value is numeric and in range.
    #[must_use]
    pub fn to_u32(&self) -> Option<u32> {
        match self {
            Self::U32(n) => Some(*n),
            Self::U64(n) => n.to_u32(),
            _ => None,
        }
    }

    /// Converts to `u64` if the value is numeric.
    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        match self {
            Self::U32(n) => Some(<u64 as From<u32>>::from(*n)),
            Self::U64(n) => Some(*n),
            _ => None,
        }
    }

    /// Casts a numeric value to any primitive number type.
    ///
    /// Returns `None` for non-numeric values or when the value is out of
    /// range for `T`.
    #[must_use]
    pub fn cast<T: NumCast>(&self) -> Option<T> {
        match self {
            Self::U32(n) => <T as NumCast>::from(*n),
            Self::U64(n) => <T as NumCast>::from(*n),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::U32(n) => write!(f, "{n}"),

            Self::U64(n) => write!(f, "{n}"),

            Self::String(s) => f.write_str(s),

            Self::MultiString(v) => write!(f, "[{}]", v.join(", ")),

            Self::Binary(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Generates `From<T>` implementations for `Value`
macro_rules! impl_from {
    ($($t:ty => |$v:ident| $body:expr),+ $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from($v: $t) -> Self {
                    $body
                }
            }
        )+
    };
}

impl_from! {
    u8 => |n| Value::U32(<u32 as From<u8>>::from(n)),
    u16 => |n| Value::U32(<u32 as From<u16>>::from(n)),
    u32 => |n| Value::U32(n),
    u64 => |n| Value::U64(n),
    String => |s| Value::String(s),
    &str => |s| Value::String(s.to_string()),
    Vec<String> => |v| Value::MultiString(v),
    Vec<&str> => |v| Value::MultiString(v.into_iter().map(str::to_string).collect()),
    Vec<u8> => |b| Value::Binary(b),
    &[u8] => |b| Value::Binary(b.to_vec()),
}
