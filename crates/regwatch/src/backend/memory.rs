//! In-process simulation of the configuration store.
//!
//! [`MemoryBackend`] reproduces the parts of the native semantics the
//! engine depends on:
//!
//! - key and value names compare case-insensitively
//! - handles to a deleted key fail with [`ErrorCode::KEY_DELETED`]
//! - change registrations are one-shot and signal auto-reset wait objects
//! - value writes report to `last_set` watchers, subkey creation and removal
//!   report to `name` watchers, and subtree watchers see their descendants
//! - closing a handle discards its pending registrations without signaling
//!   them (the native store signals the wait object instead), so code must
//!   not rely on a close producing a notification
//!
//! Clones share one store, so a test can hold a clone and mutate keys "from
//! outside" while a [`Registry`](crate::Registry) watches them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Access, Backend, NotifyFilter, RawEvent, RawKey, ValueInfo, WaitOutcome};
use crate::codec;
use crate::error::{ErrorCode, Result};
use crate::path::{KeyPath, Root};
use crate::value::{Value, ValueType};

type NodeId = u64;

struct Node {
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    values: BTreeMap<String, StoredValue>,
    deleted: bool,
}

impl Node {
    const fn new(parent: Option<NodeId>) -> Self {
        Self {
            parent,
            children: BTreeMap::new(),
            values: BTreeMap::new(),
            deleted: false,
        }
    }
}

#[derive(Clone)]
struct StoredValue {
    type_code: u32,
    data: Vec<u8>,
}

struct OpenHandle {
    node: NodeId,
    access: Access,
}

struct Registration {
    handle: usize,
    node: NodeId,
    subtree: bool,
    filter: NotifyFilter,
    event: usize,
}

#[derive(Clone, Copy)]
enum Change {
    Value,
    Name,
    Deleted,
}

#[derive(Default)]
struct Store {
    nodes: HashMap<NodeId, Node>,
    roots: HashMap<Root, NodeId>,
    next_node: NodeId,
    handles: HashMap<usize, OpenHandle>,
    next_handle: usize,
    events: HashMap<usize, bool>,
    next_event: usize,
    registrations: Vec<Registration>,
    events_closed: usize,
    injected_wait: Option<WaitOutcome>,
}

impl Store {
    fn alloc_node(&mut self, parent: Option<NodeId>) -> NodeId {
        self.next_node += 1;
        let id = self.next_node;
        self.nodes.insert(id, Node::new(parent));
        id
    }

    fn root_node(&mut self, root: Root) -> NodeId {
        if let Some(id) = self.roots.get(&root) {
            return *id;
        }
        let id = self.alloc_node(None);
        self.roots.insert(root, id);
        id
    }

    fn lookup(&mut self, root: Root, subpath: &str) -> Option<NodeId> {
        let mut current = self.root_node(root);
        for segment in segments(subpath) {
            current = *self.nodes.get(&current)?.children.get(&segment)?;
        }
        Some(current)
    }

    fn lookup_or_create(&mut self, root: Root, subpath: &str) -> NodeId {
        let mut current = self.root_node(root);
        for segment in segments(subpath) {
            let existing = self
                .nodes
                .get(&current)
                .and_then(|node| node.children.get(&segment).copied());

            current = match existing {
                Some(child) => child,
                None => {
                    let child = self.alloc_node(Some(current));
                    if let Some(node) = self.nodes.get_mut(&current) {
                        node.children.insert(segment, child);
                    }
                    self.notify(current, Change::Name);
                    child
                }
            };
        }
        current
    }

    fn open_handle(&mut self, node: NodeId, access: Access) -> RawKey {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.handles.insert(raw, OpenHandle { node, access });
        RawKey(raw)
    }

    fn live_node(&self, key: RawKey) -> Result<(NodeId, Access), ErrorCode> {
        let handle = self.handles.get(&key.0).ok_or(ErrorCode::INVALID_HANDLE)?;
        match self.nodes.get(&handle.node) {
            Some(node) if !node.deleted => Ok((handle.node, handle.access)),
            _ => Err(ErrorCode::KEY_DELETED),
        }
    }

    /// Returns `true` if `node` is `ancestor` or lies below it.
    fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Fires and consumes every registration interested in a change at `node`.
    fn notify(&mut self, node: NodeId, change: Change) {
        let registrations = std::mem::take(&mut self.registrations);
        let mut kept = Vec::with_capacity(registrations.len());

        for registration in registrations {
            let in_scope = registration.node == node
                || (registration.subtree && self.is_within(node, registration.node));
            let wanted = match change {
                Change::Value => registration.filter.last_set,
                Change::Name => registration.filter.name,
                Change::Deleted => true,
            };

            if in_scope && wanted {
                if let Some(signaled) = self.events.get_mut(&registration.event) {
                    *signaled = true;
                }
            } else {
                kept.push(registration);
            }
        }

        self.registrations = kept;
    }

    fn delete_subtree(&mut self, node: NodeId) {
        let children: Vec<NodeId> = self
            .nodes
            .get(&node)
            .map(|n| n.children.values().copied().collect())
            .unwrap_or_default();

        for child in children {
            self.delete_subtree(child);
        }

        // Watchers of the deleted key itself are told it went away.
        self.notify(node, Change::Deleted);
        if let Some(n) = self.nodes.get_mut(&node) {
            n.deleted = true;
            n.children.clear();
            n.values.clear();
        }
    }

    fn write_value(&mut self, node: NodeId, name: &str, type_code: u32, data: &[u8]) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.values.insert(
                fold(name),
                StoredValue {
                    type_code,
                    data: data.to_vec(),
                },
            );
        }
        self.notify(node, Change::Value);
    }
}

/// An in-memory store implementing [`Backend`].
///
/// # Example
///
/// ```rust,ignore
/// use regwatch::{MemoryBackend, MonitorConfig, Registry, Value};
///
/// let store = MemoryBackend::new();
/// let registry = Registry::new(store.clone(), MonitorConfig::default());
///
/// store.write(r"HKCU\Software\Test", "Enabled", &Value::U32(1))?;
/// assert_eq!(registry.get_value(r"HKCU\Software\Test", "Enabled")?, Value::U32(1));
/// ```
#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a value with its natural encoding, creating the key if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not parse.
    pub fn write(&self, path: &str, name: &str, value: &Value) -> Result<()> {
        let ty = value.natural_type();
        let data = codec::encode(value, ty)?;
        self.write_raw(path, name, ty, &data)
    }

    /// Writes raw bytes under any type code, creating the key if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not parse.
    pub fn write_raw(&self, path: &str, name: &str, ty: ValueType, data: &[u8]) -> Result<()> {
        let path = KeyPath::parse(path)?;
        let mut store = self.store.lock();
        let node = store.lookup_or_create(path.root(), path.subpath());
        store.write_value(node, name, ty.code(), data);
        Ok(())
    }

    /// Creates a key and any missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not parse.
    pub fn create(&self, path: &str) -> Result<()> {
        let path = KeyPath::parse(path)?;
        self.store.lock().lookup_or_create(path.root(), path.subpath());
        Ok(())
    }

    /// Deletes a key and its whole subtree.
    ///
    /// Returns `false` if the key did not exist. Open handles to deleted keys
    /// start failing with [`ErrorCode::KEY_DELETED`].
    #[must_use = "returns whether the key existed"]
    pub fn delete_key(&self, path: &str) -> bool {
        let Ok(path) = KeyPath::parse(path) else {
            return false;
        };
        if path.is_root() {
            return false;
        }

        let mut store = self.store.lock();
        let Some(node) = store.lookup(path.root(), path.subpath()) else {
            return false;
        };

        let parent = store.nodes.get(&node).and_then(|n| n.parent);
        store.delete_subtree(node);

        if let Some(parent) = parent {
            if let Some(p) = store.nodes.get_mut(&parent) {
                p.children.retain(|_, child| *child != node);
            }
            store.notify(parent, Change::Name);
        }
        true
    }

    /// Deletes a single value. Returns `false` if it did not exist.
    #[must_use = "returns whether the value existed"]
    pub fn delete_value(&self, path: &str, name: &str) -> bool {
        let Ok(path) = KeyPath::parse(path) else {
            return false;
        };

        let mut store = self.store.lock();
        let Some(node) = store.lookup(path.root(), path.subpath()) else {
            return false;
        };

        let removed = store
            .nodes
            .get_mut(&node)
            .is_some_and(|n| n.values.remove(&fold(name)).is_some());
        if removed {
            store.notify(node, Change::Value);
        }
        removed
    }

    /// Returns `true` if the key exists.
    #[must_use]
    pub fn key_exists(&self, path: &str) -> bool {
        KeyPath::parse(path).is_ok_and(|p| self.store.lock().lookup(p.root(), p.subpath()).is_some())
    }

    /// Number of wait objects currently alive.
    #[must_use]
    pub fn live_events(&self) -> usize {
        self.store.lock().events.len()
    }

    /// Number of wait objects closed over the store's lifetime.
    #[must_use]
    pub fn closed_events(&self) -> usize {
        self.store.lock().events_closed
    }

    /// Number of key handles currently open.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.store.lock().handles.len()
    }

    /// Number of change registrations that have not fired yet.
    #[must_use]
    pub fn pending_registrations(&self) -> usize {
        self.store.lock().registrations.len()
    }

    /// Makes the next [`Backend::wait_multiple`] call return `outcome`.
    pub fn inject_wait_outcome(&self, outcome: WaitOutcome) {
        self.store.lock().injected_wait = Some(outcome);
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.lock();
        f.debug_struct("MemoryBackend")
            .field("keys", &store.nodes.values().filter(|n| !n.deleted).count())
            .field("handles", &store.handles.len())
            .field("events", &store.events.len())
            .finish_non_exhaustive()
    }
}

impl Backend for MemoryBackend {
    fn open_key(&self, root: Root, subpath: &str, access: Access) -> Result<RawKey, ErrorCode> {
        let mut store = self.store.lock();
        let node = store.lookup(root, subpath).ok_or(ErrorCode::NOT_FOUND)?;
        Ok(store.open_handle(node, access))
    }

    fn create_key(&self, root: Root, subpath: &str, access: Access) -> Result<RawKey, ErrorCode> {
        let mut store = self.store.lock();
        let node = store.lookup_or_create(root, subpath);
        Ok(store.open_handle(node, access))
    }

    fn close_key(&self, key: RawKey) -> Result<(), ErrorCode> {
        let mut store = self.store.lock();
        store
            .handles
            .remove(&key.0)
            .ok_or(ErrorCode::INVALID_HANDLE)?;
        store.registrations.retain(|r| r.handle != key.0);
        Ok(())
    }

    fn query_value(
        &self,
        key: RawKey,
        name: &str,
        buf: Option<&mut [u8]>,
    ) -> Result<ValueInfo, ErrorCode> {
        let store = self.store.lock();
        let (node, _) = store.live_node(key)?;
        let value = store
            .nodes
            .get(&node)
            .and_then(|n| n.values.get(&fold(name)))
            .ok_or(ErrorCode::NOT_FOUND)?;

        let size = value.data.len();
        if let Some(buf) = buf {
            if buf.len() < size {
                return Err(ErrorCode::MORE_DATA);
            }
            buf[..size].copy_from_slice(&value.data);
        }

        Ok(ValueInfo {
            type_code: value.type_code,
            size,
        })
    }

    fn set_value(
        &self,
        key: RawKey,
        name: &str,
        type_code: u32,
        data: &[u8],
    ) -> Result<(), ErrorCode> {
        let mut store = self.store.lock();
        let (node, access) = store.live_node(key)?;
        if !access.write {
            return Err(ErrorCode::ACCESS_DENIED);
        }
        store.write_value(node, name, type_code, data);
        Ok(())
    }

    fn notify_change(
        &self,
        key: RawKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: RawEvent,
        asynchronous: bool,
    ) -> Result<(), ErrorCode> {
        let mut store = self.store.lock();
        let (node, _) = store.live_node(key)?;
        if !asynchronous || !store.events.contains_key(&event.0) {
            return Err(ErrorCode::INVALID_PARAMETER);
        }

        store.registrations.push(Registration {
            handle: key.0,
            node,
            subtree: watch_subtree,
            filter,
            event: event.0,
        });
        Ok(())
    }

    fn create_event(&self) -> Result<RawEvent, ErrorCode> {
        let mut store = self.store.lock();
        store.next_event += 1;
        let raw = store.next_event;
        store.events.insert(raw, false);
        Ok(RawEvent(raw))
    }

    fn wait_multiple(
        &self,
        events: &[RawEvent],
        wait_all: bool,
        _timeout: Duration,
    ) -> WaitOutcome {
        let mut store = self.store.lock();
        if let Some(outcome) = store.injected_wait.take() {
            return outcome;
        }

        let mut states = Vec::with_capacity(events.len());
        for event in events {
            match store.events.get(&event.0) {
                Some(signaled) => states.push(*signaled),
                None => return WaitOutcome::Failed(ErrorCode::INVALID_HANDLE),
            }
        }

        if wait_all {
            if !states.is_empty() && states.iter().all(|s| *s) {
                for event in events {
                    store.events.insert(event.0, false);
                }
                return WaitOutcome::Signaled(0);
            }
            return WaitOutcome::Timeout;
        }

        match states.iter().position(|s| *s) {
            Some(index) => {
                store.events.insert(events[index].0, false);
                WaitOutcome::Signaled(index)
            }
            None => WaitOutcome::Timeout,
        }
    }

    fn close_event(&self, event: RawEvent) -> Result<(), ErrorCode> {
        let mut store = self.store.lock();
        store
            .events
            .remove(&event.0)
            .ok_or(ErrorCode::INVALID_HANDLE)?;
        store.registrations.retain(|r| r.event != event.0);
        store.events_closed += 1;
        Ok(())
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

fn segments(subpath: &str) -> impl Iterator<Item = String> + '_ {
    subpath
        .split('\\')
        .filter(|s| !s.is_empty())
        .map(fold)
}
