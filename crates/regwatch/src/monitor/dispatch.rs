//! The set of watched keys and the wait array built from it.
//!
//! Keys live in two insertion-ordered maps keyed by case-folded path, one
//! for recursive and one for non-recursive watches. After every membership
//! change the maps are flattened into parallel arrays (recursive watches
//! first) that the tick loop hands to the backend's multi-object wait.
//!
//! The poll timer exists exactly while the wait array is non-empty.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, tick};
use indexmap::IndexMap;

use super::MonitoredKey;
use crate::backend::RawEvent;

/// Periodic tick driving [`Registry::dispatch_pending`](crate::Registry::dispatch_pending).
pub(crate) struct PollTimer {
    ticker: Receiver<Instant>,
    interval: Duration,
}

impl PollTimer {
    fn start(interval: Duration) -> Self {
        log_debug!(interval = ?interval, "poll timer started");
        Self {
            ticker: tick(interval),
            interval,
        }
    }

    pub(crate) fn ticker(&self) -> Receiver<Instant> {
        self.ticker.clone()
    }
}

#[derive(Default)]
pub(crate) struct Dispatcher {
    recursive: IndexMap<String, Rc<MonitoredKey>>,
    flat: IndexMap<String, Rc<MonitoredKey>>,
    keys: Vec<Rc<MonitoredKey>>,
    events: Vec<RawEvent>,
    timer: Option<PollTimer>,
}

impl Dispatcher {
    fn map(&self, recursive: bool) -> &IndexMap<String, Rc<MonitoredKey>> {
        if recursive { &self.recursive } else { &self.flat }
    }

    fn map_mut(&mut self, recursive: bool) -> &mut IndexMap<String, Rc<MonitoredKey>> {
        if recursive {
            &mut self.recursive
        } else {
            &mut self.flat
        }
    }

    pub(crate) fn lookup(&self, cache_key: &str, recursive: bool) -> Option<Rc<MonitoredKey>> {
        self.map(recursive).get(cache_key).cloned()
    }

    pub(crate) fn insert(&mut self, cache_key: String, key: Rc<MonitoredKey>, interval: Duration) {
        let recursive = key.is_recursive();
        self.map_mut(recursive).insert(cache_key, key);
        self.rebuild(interval);
    }

    /// Removes `key` if it is still the entry for `cache_key`.
    pub(crate) fn remove(
        &mut self,
        cache_key: &str,
        key: &Rc<MonitoredKey>,
        interval: Duration,
    ) -> bool {
        let map = self.map_mut(key.is_recursive());
        let is_current = map
            .get(cache_key)
            .is_some_and(|current| Rc::ptr_eq(current, key));
        let removed = is_current && map.shift_remove(cache_key).is_some();
        if removed {
            self.rebuild(interval);
        }
        removed
    }

    /// Empties both maps, returning every key that was watched.
    pub(crate) fn drain(&mut self, interval: Duration) -> Vec<Rc<MonitoredKey>> {
        let keys: Vec<_> = self
            .recursive
            .drain(..)
            .chain(self.flat.drain(..))
            .map(|(_, key)| key)
            .collect();
        self.rebuild(interval);
        keys
    }

    /// Flattens the maps into the wait array and starts or stops the timer.
    pub(crate) fn rebuild(&mut self, interval: Duration) {
        self.keys.clear();
        self.events.clear();

        for key in self.recursive.values().chain(self.flat.values()) {
            if let Some(event) = key.raw_event() {
                self.keys.push(Rc::clone(key));
                self.events.push(event);
            }
        }

        match (self.timer.is_some(), self.events.is_empty()) {
            (false, false) => self.timer = Some(PollTimer::start(interval)),
            (true, true) => {
                self.timer = None;
                log_debug!("poll timer stopped");
            }
            _ => {}
        }
    }

    /// Replaces a running timer with one at the new interval.
    pub(crate) fn restart_timer(&mut self, interval: Duration) {
        if self.timer.as_ref().is_some_and(|timer| timer.interval != interval) {
            self.timer = Some(PollTimer::start(interval));
        }
    }

    pub(crate) fn snapshot(&self) -> (Vec<RawEvent>, Vec<Rc<MonitoredKey>>) {
        (self.events.clone(), self.keys.clone())
    }

    pub(crate) fn timer(&self) -> Option<&PollTimer> {
        self.timer.as_ref()
    }

    pub(crate) fn len(&self) -> usize {
        self.recursive.len() + self.flat.len()
    }
}
