//! Live native resource tracking.
//!
//! Debug builds record every open key handle and wait object here so a
//! process can list what is still alive before it exits. Resources are
//! released by their owners' `Drop` impls; this table only observes.
//! Release builds skip the bookkeeping and always report nothing.
//!
//! ```rust,ignore
//! registry.shutdown();
//! if regwatch::leak::report() > 0 {
//!     eprintln!("native resources still open at exit");
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, const_mutex};

/// Kind of native resource being tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// An open key handle.
    Key,
    /// A change-notification wait object.
    WaitObject,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key => f.write_str("key handle"),
            Self::WaitObject => f.write_str("wait object"),
        }
    }
}

/// One live native resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveResource {
    /// Process-unique tracking id.
    pub id: u64,
    /// What kind of resource this is.
    pub kind: ResourceKind,
    /// Key path the resource belongs to.
    pub path: String,
}

static LIVE: Mutex<BTreeMap<u64, LiveResource>> = const_mutex(BTreeMap::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Records a newly acquired resource and returns its tracking id.
pub(crate) fn track(kind: ResourceKind, path: &str) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    if cfg!(debug_assertions) {
        LIVE.lock().insert(
            id,
            LiveResource {
                id,
                kind,
                path: path.to_string(),
            },
        );
    }
    id
}

/// Forgets a released resource.
pub(crate) fn untrack(id: u64) {
    if cfg!(debug_assertions) {
        LIVE.lock().remove(&id);
    }
}

/// Lists every resource that is still alive, oldest first.
#[must_use]
pub fn live() -> Vec<LiveResource> {
    LIVE.lock().values().cloned().collect()
}

/// Logs a warning for each live resource and returns how many there are.
pub fn report() -> usize {
    let live = live();
    for resource in &live {
        log_warn!(
            id = resource.id,
            kind = %resource.kind,
            path = %resource.path,
            "native resource still open"
        );
    }
    live.len()
}
