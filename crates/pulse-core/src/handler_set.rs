#![forbid(unsafe_code)]

//! Thread-safe handler collection with cached immutable snapshots.
//!
//! Registration (`add`/`remove`) may happen from any thread, including from
//! inside a handler that is currently being dispatched. Dispatch never walks
//! the live list: it takes a [`Snapshot`] once per pass and iterates that.
//!
//! # Invariants
//!
//! 1. A snapshot never changes after it has been handed out.
//! 2. Every mutation invalidates the cached snapshot and bumps the generation.
//! 3. A new snapshot is built lazily on the first request after invalidation,
//!    so a burst of mutations costs a single rebuild.
//! 4. The lock is held only for the list operation itself, never while
//!    collaborator code runs.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handler::HandleId;

/// Immutable point-in-time view of a [`HandlerSet`].
pub type Snapshot<T> = Arc<[Arc<T>]>;

struct Inner<T: ?Sized> {
    items: Vec<Arc<T>>,
    snapshot: Option<Snapshot<T>>,
    generation: u64,
}

impl<T: ?Sized> Inner<T> {
    #[inline]
    fn invalidate(&mut self) {
        self.snapshot = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Mutable, lock-protected list of shared handles.
pub struct HandlerSet<T: ?Sized> {
    inner: Mutex<Inner<T>>,
}

impl<T: ?Sized> HandlerSet<T> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                snapshot: None,
                generation: 0,
            }),
        }
    }

    /// Append a handle.
    ///
    /// Registering the same handle twice is a caller error: debug builds
    /// assert, release builds keep both entries and visit the handle twice.
    pub fn add(&self, handle: Arc<T>) {
        let mut inner = self.inner.lock();
        debug_assert!(
            !inner.items.iter().any(|h| Arc::ptr_eq(h, &handle)),
            "handle registered twice"
        );
        inner.items.push(handle);
        inner.invalidate();
    }

    /// Remove the first entry with the same identity as `handle`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove<U: ?Sized>(&self, handle: &Arc<U>) -> bool {
        self.remove_id(HandleId::of(handle))
    }

    /// Remove the first entry whose identity is `id`.
    pub fn remove_id(&self, id: HandleId) -> bool {
        let mut inner = self.inner.lock();
        match inner.items.iter().position(|h| HandleId::of(h) == id) {
            Some(pos) => {
                inner.items.remove(pos);
                inner.invalidate();
                true
            }
            None => false,
        }
    }

    /// Remove the first entry matching `pred` and return it.
    ///
    /// `pred` runs under the registry lock and must not touch this set.
    pub fn remove_where<F>(&self, mut pred: F) -> Option<Arc<T>>
    where
        F: FnMut(&Arc<T>) -> bool,
    {
        let mut inner = self.inner.lock();
        let pos = inner.items.iter().position(|h| pred(h))?;
        let removed = inner.items.remove(pos);
        inner.invalidate();
        Some(removed)
    }

    /// True if a handle with this identity is registered.
    pub fn contains_id(&self, id: HandleId) -> bool {
        self.inner.lock().items.iter().any(|h| HandleId::of(h) == id)
    }

    /// True if `handle` is registered.
    pub fn contains<U: ?Sized>(&self, handle: &Arc<U>) -> bool {
        self.contains_id(HandleId::of(handle))
    }

    /// Current snapshot, rebuilt if a mutation happened since the last call.
    pub fn snapshot(&self) -> Snapshot<T> {
        let mut inner = self.inner.lock();
        if let Some(snapshot) = &inner.snapshot {
            return Arc::clone(snapshot);
        }
        let snapshot: Snapshot<T> = inner.items.iter().cloned().collect();
        inner.snapshot = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Drop every handle. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.items.len();
        if removed > 0 {
            inner.items.clear();
            inner.invalidate();
        }
        removed
    }

    /// Number of registered handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// True if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Mutation counter. Changes whenever the cached snapshot is invalidated.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }
}

impl<T: ?Sized> Default for HandlerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for HandlerSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HandlerSet")
            .field("len", &inner.items.len())
            .field("generation", &inner.generation)
            .field("cached", &inner.snapshot.is_some())
            .finish()
    }
}
