//! Integration tests for key monitoring.
//!
//! All tests run against the in-memory backend, mutating keys "from
//! outside" through a clone of the store and then driving dispatch by hand.

#![allow(clippy::pedantic)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use regwatch::{
    ErrorCode, KeyAccess, MemoryBackend, MonitorConfig, MonitorState, MonitorToken, Registry,
    Value, WatchOptions,
    backend::WaitOutcome,
};

const KEY: &str = r"HKCU\Software\RegwatchTest\Watched";

fn setup() -> (MemoryBackend, Registry) {
    let store = MemoryBackend::new();
    store.create(KEY).unwrap();
    let config = MonitorConfig::builder()
        .poll_interval(Duration::from_millis(5))
        .build()
        .unwrap();
    let registry = Registry::new(store.clone(), config);
    (store, registry)
}

fn counter() -> (Rc<Cell<u32>>, impl Fn(&regwatch::MonitoredKey) + 'static) {
    let hits = Rc::new(Cell::new(0));
    let inner = Rc::clone(&hits);
    (hits, move |_: &regwatch::MonitoredKey| inner.set(inner.get() + 1))
}

// ============================================================================
// Sharing and Fan-out
// ============================================================================

#[test]
fn test_two_tokens_share_one_watch() {
    let (store, registry) = setup();
    let (hits_a, cb_a) = counter();
    let (hits_b, cb_b) = counter();

    let mut token_a = registry.monitor_key(KEY, WatchOptions::new(), cb_a).unwrap();
    let mut token_b = registry.monitor_key(KEY, WatchOptions::new(), cb_b).unwrap();

    assert_eq!(registry.active_monitors(), 1);
    assert_eq!(store.live_events(), 1);

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    assert_eq!(registry.dispatch_pending(), 1);
    assert_eq!((hits_a.get(), hits_b.get()), (1, 1));

    // Stopping one keeps the other alive.
    assert!(token_a.stop());
    assert!(!token_a.is_active());
    store.write(KEY, "v", &Value::U32(2)).unwrap();
    registry.dispatch_pending();
    assert_eq!((hits_a.get(), hits_b.get()), (1, 2));
    assert_eq!(store.closed_events(), 0);

    // Stopping the last one releases the wait object exactly once.
    assert!(token_b.stop());
    assert_eq!(store.closed_events(), 1);
    assert_eq!(store.live_events(), 0);
    assert_eq!(store.live_handles(), 0);
    assert_eq!(registry.active_monitors(), 0);

    // Second stop is a logged no-op.
    assert!(!token_b.stop());
    assert_eq!(store.closed_events(), 1);
}

#[test]
fn test_paths_are_deduplicated_case_insensitively() {
    let (store, registry) = setup();
    let _a = registry
        .monitor_key(r"HKCU\Software\RegwatchTest\Watched", WatchOptions::new(), |_| {})
        .unwrap();
    let _b = registry
        .monitor_key(r"hkcu\SOFTWARE\regwatchtest\watched\", WatchOptions::new(), |_| {})
        .unwrap();

    assert_eq!(registry.active_monitors(), 1);
    assert_eq!(store.live_events(), 1);

    let key = registry.monitored_key(KEY, false).unwrap();
    assert_eq!(key.callback_count(), 2);
}

#[test]
fn test_recursive_and_flat_watches_are_distinct() {
    let (store, registry) = setup();
    let _flat = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();
    let _deep = registry
        .monitor_key(KEY, WatchOptions::new().recursive(true), |_| {})
        .unwrap();

    assert_eq!(registry.active_monitors(), 2);
    assert_eq!(store.live_events(), 2);
    assert!(registry.monitored_key(KEY, true).unwrap().is_recursive());
}

#[test]
fn test_callbacks_run_in_subscription_order() {
    let (store, registry) = setup();
    let order = Rc::new(RefCell::new(Vec::new()));

    let tokens: Vec<MonitorToken> = (0..4)
        .map(|n| {
            let order = Rc::clone(&order);
            registry
                .monitor_key(KEY, WatchOptions::new(), move |_| order.borrow_mut().push(n))
                .unwrap()
        })
        .collect();

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    registry.dispatch_pending();
    assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
    drop(tokens);
}

#[test]
fn test_callback_can_read_through_key() {
    let (store, registry) = setup();
    let seen = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);

    let _token = registry
        .monitor_key(KEY, WatchOptions::new(), move |key| {
            *sink.borrow_mut() = key.get_value("Theme").ok();
        })
        .unwrap();

    store.write(KEY, "Theme", &Value::from("dark")).unwrap();
    registry.dispatch_pending();
    assert_eq!(*seen.borrow(), Some(Value::from("dark")));
}

// ============================================================================
// Recursion
// ============================================================================

#[test]
fn test_recursive_watch_sees_child_changes() {
    let (store, registry) = setup();
    let (deep_hits, deep_cb) = counter();
    let (flat_hits, flat_cb) = counter();

    let _deep = registry
        .monitor_key(KEY, WatchOptions::new().recursive(true), deep_cb)
        .unwrap();
    let _flat = registry.monitor_key(KEY, WatchOptions::new(), flat_cb).unwrap();

    store
        .write(&format!(r"{KEY}\Child"), "x", &Value::U32(1))
        .unwrap();
    registry.dispatch_pending();

    assert_eq!(deep_hits.get(), 1);
    assert_eq!(flat_hits.get(), 0);
}

// ============================================================================
// Reentrancy
// ============================================================================

#[test]
fn test_callback_stops_its_own_token() {
    let (store, registry) = setup();
    let slot: Rc<RefCell<Option<MonitorToken>>> = Rc::new(RefCell::new(None));
    let hits = Rc::new(Cell::new(0));

    let (inner_slot, inner_hits) = (Rc::clone(&slot), Rc::clone(&hits));
    let token = registry
        .monitor_key(KEY, WatchOptions::new(), move |_| {
            inner_hits.set(inner_hits.get() + 1);
            if let Some(token) = inner_slot.borrow_mut().as_mut() {
                token.stop();
            }
        })
        .unwrap();
    *slot.borrow_mut() = Some(token);

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    registry.dispatch_pending();
    assert_eq!(hits.get(), 1);
    assert_eq!(registry.active_monitors(), 0);
    assert_eq!(store.live_events(), 0);

    store.write(KEY, "v", &Value::U32(2)).unwrap();
    registry.dispatch_pending();
    assert_eq!(hits.get(), 1);
}

#[test]
fn test_callback_stopping_a_later_subscriber_skips_it() {
    let (store, registry) = setup();
    let victim: Rc<RefCell<Option<MonitorToken>>> = Rc::new(RefCell::new(None));
    let (victim_hits, victim_cb) = counter();

    let killer_slot = Rc::clone(&victim);
    let _killer = registry
        .monitor_key(KEY, WatchOptions::new(), move |_| {
            if let Some(token) = killer_slot.borrow_mut().as_mut() {
                token.stop();
            }
        })
        .unwrap();
    *victim.borrow_mut() = Some(registry.monitor_key(KEY, WatchOptions::new(), victim_cb).unwrap());

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    registry.dispatch_pending();

    assert_eq!(victim_hits.get(), 0);
    assert_eq!(registry.active_monitors(), 1);
}

#[test]
fn test_stopping_callback_that_owns_sibling_token() {
    let (store, registry) = setup();
    let sibling = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();
    let mut owner = registry
        .monitor_key(KEY, WatchOptions::new(), move |_| {
            let _held = &sibling;
        })
        .unwrap();
    assert_eq!(registry.monitored_key(KEY, false).unwrap().callback_count(), 2);

    // Dropping the closure drops the sibling token, which stops itself.
    assert!(owner.stop());
    assert_eq!(registry.active_monitors(), 0);
    assert_eq!(store.live_events(), 0);
    assert_eq!(store.closed_events(), 1);
    assert_eq!(store.live_handles(), 0);
}

#[test]
fn test_dropping_token_whose_callback_owns_sibling_token() {
    let (store, registry) = setup();
    let (hits, callback) = counter();
    let survivor = registry.monitor_key(KEY, WatchOptions::new(), callback).unwrap();
    let sibling = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();
    let owner = registry
        .monitor_key(KEY, WatchOptions::new(), move |_| {
            let _held = &sibling;
        })
        .unwrap();

    drop(owner);
    let key = registry.monitored_key(KEY, false).unwrap();
    assert_eq!(key.callback_count(), 1);
    assert!(survivor.is_active());

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    registry.dispatch_pending();
    assert_eq!(hits.get(), 1);
    assert_eq!(store.live_events(), 1);
}

#[test]
fn test_callback_subscribes_during_dispatch() {
    let (store, registry) = setup();
    let other = r"HKCU\Software\RegwatchTest\Other";
    store.create(other).unwrap();

    let spawned: Rc<RefCell<Vec<MonitorToken>>> = Rc::new(RefCell::new(Vec::new()));
    let (inner_registry, inner_spawned) = (registry.clone(), Rc::clone(&spawned));
    let mut token = registry
        .monitor_key(KEY, WatchOptions::new(), move |_| {
            let token = inner_registry
                .monitor_key(other, WatchOptions::new(), |_| {})
                .unwrap();
            inner_spawned.borrow_mut().push(token);
        })
        .unwrap();

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    registry.dispatch_pending();
    assert_eq!(registry.active_monitors(), 2);
    assert_eq!(spawned.borrow().len(), 1);

    // Breaks the registry <-> callback cycle.
    token.stop();
    spawned.borrow_mut().clear();
    assert_eq!(registry.active_monitors(), 0);
}

#[test]
fn test_callback_write_is_observed_in_same_dispatch() {
    let (store, registry) = setup();
    let writer = store.clone();
    let hits = Rc::new(Cell::new(0));
    let inner = Rc::clone(&hits);

    let _token = registry
        .monitor_key(KEY, WatchOptions::new(), move |_| {
            inner.set(inner.get() + 1);
            if inner.get() == 1 {
                writer.write(KEY, "echo", &Value::U32(1)).unwrap();
            }
        })
        .unwrap();

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    assert_eq!(registry.dispatch_pending(), 2);
    assert_eq!(hits.get(), 2);
}

// ============================================================================
// Key Lifecycle
// ============================================================================

#[test]
fn test_watch_rearms_after_delete_and_recreate() {
    let (store, registry) = setup();
    let (hits, cb) = counter();
    let _token = registry.monitor_key(KEY, WatchOptions::new(), cb).unwrap();

    assert!(store.delete_key(KEY));
    store.create(KEY).unwrap();
    registry.dispatch_pending();
    assert_eq!(hits.get(), 1);

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    registry.dispatch_pending();
    assert_eq!(hits.get(), 2);
    assert_eq!(
        registry.monitored_key(KEY, false).unwrap().state(),
        MonitorState::Watching
    );
}

#[test]
fn test_dead_watch_is_replaced_and_keeps_subscribers() {
    let (store, registry) = setup();
    let (old_hits, old_cb) = counter();
    let (new_hits, new_cb) = counter();

    let mut old = registry.monitor_key(KEY, WatchOptions::new(), old_cb).unwrap();

    // Deleted and not recreated: the handle cannot be reopened.
    assert!(store.delete_key(KEY));
    registry.dispatch_pending();
    assert_eq!(old_hits.get(), 1);
    assert_eq!(
        registry.monitored_key(KEY, false).unwrap().state(),
        MonitorState::Closed
    );

    store.create(KEY).unwrap();
    let mut new = registry.monitor_key(KEY, WatchOptions::new(), new_cb).unwrap();
    assert_eq!(registry.active_monitors(), 1);
    assert_eq!(store.live_events(), 1);

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    registry.dispatch_pending();
    assert_eq!((old_hits.get(), new_hits.get()), (2, 1));

    assert!(old.stop());
    assert!(new.stop());
    assert_eq!(store.live_events(), 0);
}

#[test]
fn test_missing_key_without_create_fails() {
    let (store, registry) = setup();
    let missing = r"HKCU\Software\RegwatchTest\Missing";

    let err = registry
        .monitor_key(missing, WatchOptions::new(), |_| {})
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(registry.active_monitors(), 0);
    assert_eq!(store.live_events(), 0);
    assert!(!registry.is_polling());
}

#[test]
fn test_missing_key_with_create_is_created() {
    let (store, registry) = setup();
    let missing = r"HKCU\Software\RegwatchTest\Fresh";

    let _token = registry
        .monitor_key(missing, WatchOptions::new().create_if_missing(true), |_| {})
        .unwrap();
    assert!(store.key_exists(missing));
}

#[test]
fn test_dropped_token_stops_monitor() {
    let (store, registry) = setup();
    let token = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();
    drop(token);
    assert_eq!(store.live_events(), 0);
    assert_eq!(registry.active_monitors(), 0);
}

#[test]
fn test_shutdown_releases_everything() {
    let (store, registry) = setup();
    let mut a = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();
    let _b = registry
        .monitor_key(KEY, WatchOptions::new().recursive(true), |_| {})
        .unwrap();

    registry.shutdown();
    assert_eq!(store.live_events(), 0);
    assert_eq!(store.live_handles(), 0);
    assert!(!registry.is_polling());

    // Tokens outlive the watches harmlessly.
    assert!(a.stop());
}

#[test]
fn test_dropping_registry_releases_everything() {
    let store = MemoryBackend::new();
    store.create(KEY).unwrap();
    let token = {
        let registry = Registry::new(store.clone(), MonitorConfig::default());
        registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap()
    };

    assert_eq!(store.live_events(), 0);
    assert_eq!(store.live_handles(), 0);
    drop(token);
}

// ============================================================================
// Dispatch Loop
// ============================================================================

#[test]
fn test_nothing_pending() {
    let (_, registry) = setup();
    assert_eq!(registry.dispatch_pending(), 0);

    let _token = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();
    assert_eq!(registry.dispatch_pending(), 0);
}

#[test]
fn test_failed_wait_ends_round_and_recovers() {
    let (store, registry) = setup();
    let (hits, cb) = counter();
    let _token = registry.monitor_key(KEY, WatchOptions::new(), cb).unwrap();

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    store.inject_wait_outcome(WaitOutcome::Failed(ErrorCode::INVALID_HANDLE));
    assert_eq!(registry.dispatch_pending(), 0);
    assert_eq!(hits.get(), 0);

    // The signal is still pending for the next round.
    assert_eq!(registry.dispatch_pending(), 1);
    assert_eq!(hits.get(), 1);
}

#[test]
fn test_abandoned_wait_ends_round() {
    let (store, registry) = setup();
    let (hits, cb) = counter();
    let _token = registry.monitor_key(KEY, WatchOptions::new(), cb).unwrap();

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    store.inject_wait_outcome(WaitOutcome::Abandoned(0));
    assert_eq!(registry.dispatch_pending(), 0);
    assert_eq!(hits.get(), 0);
}

#[test]
fn test_out_of_range_index_ends_round() {
    let (store, registry) = setup();
    let _token = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();

    store.inject_wait_outcome(WaitOutcome::Signaled(42));
    assert_eq!(registry.dispatch_pending(), 0);
}

// ============================================================================
// Poll Timer
// ============================================================================

#[test]
fn test_timer_runs_only_while_watching() {
    let (_, registry) = setup();
    assert!(!registry.is_polling());

    let mut token = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();
    assert!(registry.is_polling());

    token.stop();
    assert!(!registry.is_polling());
}

#[test]
fn test_poll_interval_changes() {
    let (_, registry) = setup();
    assert_eq!(registry.poll_interval(), Duration::from_millis(5));

    assert!(registry.set_poll_interval(Duration::ZERO).is_err());
    assert_eq!(registry.poll_interval(), Duration::from_millis(5));

    let _token = registry.monitor_key(KEY, WatchOptions::new(), |_| {}).unwrap();
    registry.set_poll_interval(Duration::from_millis(20)).unwrap();
    assert_eq!(registry.poll_interval(), Duration::from_millis(20));
    assert!(registry.is_polling());
}

#[test]
fn test_run_for_dispatches_on_ticks() {
    let (store, registry) = setup();
    let (hits, cb) = counter();
    let _token = registry.monitor_key(KEY, WatchOptions::new(), cb).unwrap();

    store.write(KEY, "v", &Value::U32(1)).unwrap();
    let handled = registry.run_for(Duration::from_millis(200));
    assert_eq!(handled, 1);
    assert_eq!(hits.get(), 1);
}

#[test]
fn test_run_for_returns_when_idle() {
    let (_, registry) = setup();
    let started = std::time::Instant::now();
    assert_eq!(registry.run_for(Duration::from_secs(10)), 0);
    assert!(started.elapsed() < Duration::from_secs(1));
}
