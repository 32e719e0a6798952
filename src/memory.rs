//! Memory accounting for heap allocated containers.
//!
//! Aggregation engines usually limit memory per query, so every heap container allocated by
//! `CombinedEstimator` is reported to the [`MemoryTracker`] installed for the current thread.
//! The reported amount is the size of the estimator slot holding the container pointer.
//!
//! The tracker is captured when a container is allocated and the matching `free` is always
//! reported to the same tracker, even if the estimator is dropped on another thread.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of bytes reported per heap container
pub(crate) const TRACKED_SLOT_SIZE: usize = size_of::<usize>();

/// Receiver of allocation and deallocation events.
pub trait MemoryTracker: Send + Sync {
    fn alloc(&self, bytes: usize);
    fn free(&self, bytes: usize);
}

thread_local! {
    static CURRENT_TRACKER: RefCell<Option<Arc<dyn MemoryTracker>>> = const { RefCell::new(None) };
}

/// Return tracker installed for the current thread, if any.
pub fn current_tracker() -> Option<Arc<dyn MemoryTracker>> {
    CURRENT_TRACKER
        .try_with(|current| current.borrow().clone())
        .ok()
        .flatten()
}

/// Install `tracker` for the current thread until the returned guard is dropped.
#[must_use = "tracker is uninstalled when the guard is dropped"]
pub fn set_current_tracker(tracker: Arc<dyn MemoryTracker>) -> TrackerGuard {
    TrackerGuard::replace(Some(tracker))
}

/// Disable memory accounting for the current thread until the returned guard is dropped.
#[must_use = "previous tracker is restored when the guard is dropped"]
pub fn clear_current_tracker() -> TrackerGuard {
    TrackerGuard::replace(None)
}

/// Restores previously installed tracker on drop.
pub struct TrackerGuard {
    previous: Option<Arc<dyn MemoryTracker>>,
    // Guard restores thread-local state, so it must stay on its thread.
    _not_send: PhantomData<*const ()>,
}

impl TrackerGuard {
    fn replace(tracker: Option<Arc<dyn MemoryTracker>>) -> Self {
        let previous = CURRENT_TRACKER
            .try_with(|current| current.replace(tracker))
            .ok()
            .flatten();
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = CURRENT_TRACKER.try_with(|current| *current.borrow_mut() = previous);
    }
}

/// Thread-safe tracker which keeps totals of reported events.
#[derive(Default)]
pub struct MemoryCounter {
    current: AtomicU64,
    peak: AtomicU64,
    allocations: AtomicU64,
    frees: AtomicU64,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes allocated and not yet freed
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Highest observed value of `current`
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Number of reported allocations
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of reported frees
    pub fn frees(&self) -> u64 {
        self.frees.load(Ordering::Relaxed)
    }
}

impl MemoryTracker for MemoryCounter {
    fn alloc(&self, bytes: usize) {
        let bytes = bytes as u64;
        let current = self.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak.fetch_max(current, Ordering::AcqRel);
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    fn free(&self, bytes: usize) {
        let bytes = bytes as u64;
        let _ = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
        self.frees.fetch_add(1, Ordering::Relaxed);
    }
}

/// Heap container paired with the tracker notified about its allocation.
pub(crate) struct Tracked<T> {
    value: T,
    tracker: Option<Arc<dyn MemoryTracker>>,
}

impl<T> Tracked<T> {
    /// Move `value` to the heap and report allocation to the current tracker
    pub(crate) fn new(value: T) -> Box<Self> {
        let tracker = current_tracker();
        if let Some(tracker) = &tracker {
            tracker.alloc(TRACKED_SLOT_SIZE);
        }
        Box::new(Self { value, tracker })
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        if let Some(tracker) = &self.tracker {
            tracker.free(TRACKED_SLOT_SIZE);
        }
    }
}
