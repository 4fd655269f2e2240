//! Path-level value access through the registry facade.

#![allow(clippy::pedantic)]

use regwatch::{
    Error, ErrorCode, KeyAccess, MemoryBackend, MonitorConfig, OpenOptions, Registry, Value,
    ValueType,
};

fn setup() -> (MemoryBackend, Registry) {
    let store = MemoryBackend::new();
    let registry = Registry::new(store.clone(), MonitorConfig::default());
    (store, registry)
}

// ============================================================================
// Reading and Writing
// ============================================================================

#[test]
fn test_set_then_get_each_type() {
    let (_, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Types";

    let cases = [
        ("dword", Value::U32(0xDEAD_BEEF)),
        ("qword", Value::U64(u64::MAX - 7)),
        ("text", Value::from("hello")),
        ("list", Value::from(vec!["a", "", "c"])),
        ("blob", Value::from(vec![0u8, 1, 2, 255])),
    ];

    for (name, value) in &cases {
        registry.set_value(path, name, value, None).unwrap();
    }
    for (name, value) in &cases {
        assert_eq!(&registry.get_value(path, name).unwrap(), value, "value {name}");
    }

    assert_eq!(registry.get_value_type(path, "dword").unwrap(), ValueType::U32);
    assert_eq!(registry.get_value_type(path, "qword").unwrap(), ValueType::U64);
    assert_eq!(registry.get_value_type(path, "list").unwrap(), ValueType::MultiString);
}

#[test]
fn test_set_value_creates_missing_key() {
    let (store, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Deep\Er";

    assert!(!store.key_exists(path));
    registry.set_value(path, "x", &Value::U32(1), None).unwrap();
    assert!(store.key_exists(path));
    assert_eq!(store.live_handles(), 0, "path-level calls close their handle");
}

#[test]
fn test_explicit_type_wins() {
    let (_, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Explicit";

    registry
        .set_value(path, "p", &Value::from("%PATH%"), Some(ValueType::ExpandableString))
        .unwrap();
    assert_eq!(
        registry.get_value_type(path, "p").unwrap(),
        ValueType::ExpandableString
    );
}

#[test]
fn test_unsupported_stored_type_blocks_read_and_implicit_write() {
    let (store, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Be";
    store
        .write_raw(path, "n", ValueType::U32BigEndian, &1u32.to_be_bytes())
        .unwrap();

    assert!(registry.value_exists(path, "n"));
    assert_eq!(registry.get_value_type(path, "n").unwrap(), ValueType::U32BigEndian);
    assert!(matches!(
        registry.get_value(path, "n"),
        Err(Error::UnsupportedType { ty: ValueType::U32BigEndian })
    ));

    // Without an explicit type the stored one is reused, and rejected.
    assert!(registry.set_value(path, "n", &Value::U32(2), None).is_err());

    // An explicit supported type replaces it.
    registry
        .set_value(path, "n", &Value::U32(2), Some(ValueType::U32))
        .unwrap();
    assert_eq!(registry.get_value(path, "n").unwrap(), Value::U32(2));
}

#[test]
fn test_unsupported_write_type_is_an_error() {
    let (_, registry) = setup();
    let err = registry
        .set_value(r"HKCU\Software\RegwatchTest", "l", &Value::from("x"), Some(ValueType::Link))
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedType { ty: ValueType::Link }));
}

#[test]
fn test_multi_string_scenario() {
    let (store, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Multi";

    // "first\0\0third\0\0" in UTF-16LE.
    let mut raw = Vec::new();
    for unit in "first\0\0third\0\0".encode_utf16() {
        raw.extend_from_slice(&unit.to_le_bytes());
    }
    store.write_raw(path, "m", ValueType::MultiString, &raw).unwrap();

    let value = registry.get_value(path, "m").unwrap();
    assert_eq!(value.as_strings().unwrap(), &["first", "", "third"]);
}

#[test]
fn test_multi_string_write_then_read_keeps_order() {
    let (_, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\K";

    registry
        .set_value(path, "N", &Value::from(vec!["1", "2", "3"]), Some(ValueType::MultiString))
        .unwrap();

    assert_eq!(
        registry.get_value(path, "N").unwrap(),
        Value::from(vec!["1", "2", "3"])
    );
}

#[test]
fn test_existence_follows_writes() {
    let (_, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Exists";

    assert!(!registry.value_exists(path, "flag"));
    assert_eq!(registry.get_value_type(path, "flag").unwrap(), ValueType::None);

    registry.set_value(path, "flag", &Value::U32(1), None).unwrap();
    assert!(registry.value_exists(path, "flag"));
    assert_eq!(registry.get_value_type(path, "flag").unwrap(), ValueType::U32);
}

// ============================================================================
// Missing Keys and Values
// ============================================================================

#[test]
fn test_missing_key_and_value() {
    let (store, registry) = setup();
    store.create(r"HKCU\Software\RegwatchTest\Empty").unwrap();

    assert!(!registry.value_exists(r"HKCU\Software\RegwatchTest\Empty", "nope"));
    assert!(!registry.value_exists(r"HKCU\Software\RegwatchTest\Nowhere", "nope"));

    assert_eq!(
        registry
            .get_value_type(r"HKCU\Software\RegwatchTest\Nowhere", "nope")
            .unwrap(),
        ValueType::None
    );
    assert!(
        registry
            .get_value(r"HKCU\Software\RegwatchTest\Empty", "nope")
            .unwrap_err()
            .is_not_found()
    );
}

#[test]
fn test_invalid_path_is_rejected() {
    let (_, registry) = setup();
    assert!(matches!(
        registry.get_value(r"HKEY_NOWHERE\Software", "x"),
        Err(Error::InvalidPath { .. })
    ));
    assert!(matches!(registry.open_key(""), Err(Error::InvalidPath { .. })));
}

// ============================================================================
// Key Handles
// ============================================================================

#[test]
fn test_open_key_and_read_through_handle() {
    let (store, registry) = setup();
    store
        .write(r"HKLM\Software\Vendor", "Version", &Value::U32(3))
        .unwrap();

    let key = registry.open_key(r"hklm\SOFTWARE\vendor").unwrap();
    assert!(key.value_exists("version"));
    assert_eq!(key.get_value("VERSION").unwrap(), Value::U32(3));
    registry.close_key(&key).unwrap();
    assert!(!key.is_open());
}

#[test]
fn test_read_only_handle_cannot_write() {
    let (store, registry) = setup();
    store.create(r"HKCU\Software\RegwatchTest\Ro").unwrap();

    let key = registry.open_key(r"HKCU\Software\RegwatchTest\Ro").unwrap();
    let err = key.set_value("x", &Value::U32(1), None).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::ACCESS_DENIED));
    registry.close_key(&key).unwrap();
}

#[test]
fn test_handle_survives_delete_and_recreate() {
    let (store, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Phoenix";
    store.write(path, "v", &Value::from("old")).unwrap();

    let key = registry
        .open_key_with(path, OpenOptions::new().read_only(false))
        .unwrap();

    assert!(store.delete_key(path));
    store.write(path, "v", &Value::from("new")).unwrap();

    assert_eq!(key.get_value("v").unwrap(), Value::from("new"));
    key.set_value("w", &Value::U32(9), None).unwrap();
    assert_eq!(store.live_handles(), 1);
    registry.close_key(&key).unwrap();
}

#[test]
fn test_deleted_key_without_recreate_fails() {
    let (store, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Gone";
    store.write(path, "v", &Value::U32(1)).unwrap();

    let key = registry.open_key(path).unwrap();
    assert!(store.delete_key(path));

    let err = key.get_value("v").unwrap_err();
    assert!(err.is_not_found());
    assert!(!key.is_open());
}

#[test]
fn test_open_with_create() {
    let (store, registry) = setup();
    let path = r"HKCU\Software\RegwatchTest\Created";

    assert!(registry.open_key(path).unwrap_err().is_not_found());

    let key = registry
        .open_key_with(path, OpenOptions::new().create_if_missing(true))
        .unwrap();
    assert!(store.key_exists(path));
    registry.close_key(&key).unwrap();
}
