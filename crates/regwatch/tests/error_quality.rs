//! Error message quality tests.
//!
//! Ensures errors name what failed and carry diagnostic codes.

#![allow(clippy::pedantic)]

use regwatch::miette::Diagnostic;
use regwatch::{
    Error, ErrorCode, MemoryBackend, MonitorConfig, Registry, Value, ValueType, WatchOptions,
};

fn registry() -> (MemoryBackend, Registry) {
    let store = MemoryBackend::new();
    (store.clone(), Registry::new(store, MonitorConfig::default()))
}

fn code_of(err: &Error) -> String {
    Diagnostic::code(err).map(|c| c.to_string()).unwrap_or_default()
}

#[test]
fn test_invalid_root_names_root_and_path() {
    let (_, registry) = registry();
    let err = registry.get_value(r"HKEY_BOGUS\Software", "x").unwrap_err();
    let display = err.to_string();

    assert!(display.contains("HKEY_BOGUS"), "should name the path: {display}");
    assert_eq!(code_of(&err), "regwatch::invalid_path");
    assert!(err.help().is_some(), "invalid paths should explain valid roots");
}

#[test]
fn test_missing_key_names_operation_and_path() {
    let (_, registry) = registry();
    let err = registry
        .monitor_key(r"HKCU\Software\Nowhere", WatchOptions::new(), |_| {})
        .unwrap_err();
    let display = err.to_string();

    assert!(display.contains(r"HKCU\Software\Nowhere"), "{display}");
    assert!(display.contains("open key"), "{display}");
    assert_eq!(err.code(), Some(ErrorCode::NOT_FOUND));
    assert_eq!(code_of(&err), "regwatch::os_error");
}

#[test]
fn test_type_mismatch_names_both_sides() {
    let (_, registry) = registry();
    let err = registry
        .set_value(r"HKCU\Software\T", "n", &Value::from("text"), Some(ValueType::U32))
        .unwrap_err();
    let display = err.to_string();

    assert!(display.contains("U32"), "{display}");
    assert!(display.contains("string"), "{display}");
    assert_eq!(code_of(&err), "regwatch::type_mismatch");
}

#[test]
fn test_unsupported_type_has_help() {
    let (store, registry) = registry();
    store
        .write_raw(r"HKCU\Software\T", "l", ValueType::Link, &[])
        .unwrap();

    let err = registry.get_value(r"HKCU\Software\T", "l").unwrap_err();
    assert_eq!(code_of(&err), "regwatch::unsupported_type");
    assert!(err.help().unwrap().to_string().contains("MULTI_STRING"));
}

#[test]
fn test_invalid_config_names_setting() {
    let (_, registry) = registry();
    let err = registry
        .set_poll_interval(std::time::Duration::ZERO)
        .unwrap_err();

    assert!(err.to_string().contains("poll_interval"));
    assert_eq!(code_of(&err), "regwatch::invalid_config");
}
