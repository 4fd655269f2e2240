//! Wire encoding for stored values.
//!
//! - `U32` / `U64`: fixed-width little-endian.
//! - `STRING` / `EXPANDABLE_STRING`: UTF-16LE with one NUL terminator.
//! - `MULTI_STRING`: each string NUL-terminated, followed by one extra NUL.
//! - `BINARY`: untouched.
//!
//! Decoding a multi-string keeps empty strings that sit between other
//! strings, so `decode(encode(v))` is the identity for any sequence of
//! NUL-free strings. A final string that runs to the end of the buffer
//! without a terminator is accepted.
//!
//! String buffers with an odd byte count are read leniently: the trailing
//! half code unit is ignored rather than rejected, since the store accepts
//! such writes from other tools.

use crate::error::{Error, Result};
use crate::value::{Value, ValueType};

/// Decodes `buf` as a value of type `ty`.
///
/// # Errors
///
/// [`Error::UnsupportedType`] for encodings outside the supported set and
/// [`Error::MalformedData`] for integers of the wrong width.
pub fn decode(buf: &[u8], ty: ValueType) -> Result<Value> {
    match ty {
        ValueType::U32 => {
            let bytes: [u8; 4] = buf
                .try_into()
                .map_err(|_| Error::malformed(ty, format!("expected 4 bytes, got {}", buf.len())))?;
            Ok(Value::U32(u32::from_le_bytes(bytes)))
        }

        ValueType::U64 => {
            let bytes: [u8; 8] = buf
                .try_into()
                .map_err(|_| Error::malformed(ty, format!("expected 8 bytes, got {}", buf.len())))?;
            Ok(Value::U64(u64::from_le_bytes(bytes)))
        }

        ValueType::String | ValueType::ExpandableString => {
            let units = to_units(buf);
            let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
            Ok(Value::String(String::from_utf16_lossy(&units[..end])))
        }

        ValueType::MultiString => Ok(Value::MultiString(decode_multi(&to_units(buf)))),

        ValueType::Binary => Ok(Value::Binary(buf.to_vec())),

        other => Err(Error::UnsupportedType { ty: other }),
    }
}

/// Encodes `value` with encoding `ty`.
///
/// # Errors
///
/// [`Error::UnsupportedType`] for encodings outside the supported set and
/// [`Error::TypeMismatch`] when the payload shape does not fit `ty`.
pub fn encode(value: &Value, ty: ValueType) -> Result<Vec<u8>> {
    if !ty.is_supported() {
        return Err(Error::UnsupportedType { ty });
    }

    match (value, ty) {
        (Value::U32(n), ValueType::U32) => Ok(n.to_le_bytes().to_vec()),

        (Value::U64(n), ValueType::U64) => Ok(n.to_le_bytes().to_vec()),

        (Value::String(s), ValueType::String | ValueType::ExpandableString) => {
            let mut out = Vec::with_capacity((s.len() + 1) * 2);
            push_terminated(&mut out, s);
            Ok(out)
        }

        (Value::MultiString(items), ValueType::MultiString) => {
            let mut out = Vec::new();
            for item in items {
                push_terminated(&mut out, item);
            }
            out.extend_from_slice(&[0, 0]);
            Ok(out)
        }

        (Value::Binary(b), ValueType::Binary) => Ok(b.clone()),

        (value, expected) => Err(Error::TypeMismatch {
            expected,
            found: value.kind(),
        }),
    }
}

/// Compares two values under the rules for `ty`.
///
/// Scalars, strings and binary compare by content; multi-strings compare
/// length first and then element by element. Values whose shape does not
/// fit `ty` are never equal.
#[must_use]
pub fn equals(a: &Value, b: &Value, ty: ValueType) -> bool {
    if !a.fits(ty) || !b.fits(ty) {
        return false;
    }

    match (a, b) {
        (Value::U32(x), Value::U32(y)) => x == y,

        (Value::U64(x), Value::U64(y)) => x == y,

        (Value::String(x), Value::String(y)) => x == y,

        (Value::MultiString(x), Value::MultiString(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| l == r)
        }

        (Value::Binary(x), Value::Binary(y)) => x == y,

        _ => false,
    }
}

fn to_units(buf: &[u8]) -> Vec<u16> {
    buf.chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn push_terminated(out: &mut Vec<u8>, s: &str) {
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
}

fn decode_multi(units: &[u16]) -> Vec<String> {
    // A lone terminator (or nothing at all) is the empty sequence.
    if matches!(units, [] | [0]) {
        return Vec::new();
    }

    let mut body = units;
    if body.ends_with(&[0, 0]) {
        body = &body[..body.len() - 1];
    }
    if body.ends_with(&[0]) {
        body = &body[..body.len() - 1];
    }

    body.split(|&u| u == 0)
        .map(String::from_utf16_lossy)
        .collect()
}
