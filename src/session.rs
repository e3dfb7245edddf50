//! Registry of live connections.
//!
//! `SessionRegistry` stores non-owning weak references to connection
//! handles. A connection's lifetime is governed by its own task; the
//! registry only observes it. Dead entries are pruned lazily, at lookup
//! time or when listing live handles.
use std::{
    fmt,
    sync::{
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;

use crate::connection::{ConnectionHandle, handle::Shared};

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate a process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Concurrent registry of connection handles keyed by [`ConnectionId`].
#[derive(Default)]
pub struct SessionRegistry(DashMap<ConnectionId, Weak<Shared>>);

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("entries", &self.0.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Retrieve the handle for `id` if the connection is still alive.
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        let guard = self.0.get(id);
        let handle = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if handle.is_none() {
            self.0.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        handle.map(ConnectionHandle::from_shared)
    }

    /// Track a newly established connection.
    pub fn insert(&self, handle: &ConnectionHandle) { self.0.insert(handle.id(), handle.downgrade()); }

    /// Stop tracking a connection, typically on teardown.
    pub fn remove(&self, id: &ConnectionId) { self.0.remove(id); }

    /// Prune stale weak references, then collect the remaining live handles.
    #[must_use]
    pub fn active_handles(&self) -> Vec<ConnectionHandle> {
        let mut handles = Vec::with_capacity(self.0.len());
        self.0.retain(|_, weak| {
            if let Some(inner) = weak.upgrade() {
                handles.push(ConnectionHandle::from_shared(inner));
                true
            } else {
                false
            }
        });
        handles
    }

    /// Prune stale weak references, then return the IDs of the live connections.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ConnectionId> {
        let mut ids = Vec::with_capacity(self.0.len());
        self.0.retain(|id, weak| {
            if weak.strong_count() > 0 {
                ids.push(*id);
                true
            } else {
                false
            }
        });
        ids
    }

    /// Number of tracked entries, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether the registry tracks no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
