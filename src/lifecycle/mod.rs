//! Lifecycle observer registry: fans host service signals out to whoever
//! subscribed, without subscribers knowing about each other.
//!
//! A publish delivers to a snapshot of the subscriber list taken at publish
//! start, outside the lock. Observers may freely register or unregister
//! from inside a callback; an unregistration during a publish excludes the
//! observer from publishes not yet started, never from the in-flight one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, instrument};

/// Subscriber to host lifecycle signals. All callbacks default to no-ops,
/// so implementors override only what they care about.
///
/// Callbacks must return promptly; long-running reactions belong on a task
/// of the observer's own.
pub trait LifecycleObserver: Send + Sync {
    /// The hosting service was torn down and recreated. `pinned` carries
    /// the notification id the recreated host wants kept in the
    /// foreground, if any.
    fn on_restarted(&self, pinned: Option<i64>) {
        let _ = pinned;
    }

    /// The host task was removed by the user.
    fn on_task_removed(&self) {}

    /// The hosting service is going away for good.
    fn on_destroyed(&self) {}
}

/// Token returned by [`LifecycleRegistry::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Owner of the subscriber list.
///
/// Lifecycle signals arrive serially from the host, at most once per actual
/// occurrence; ordering across successive publishes for one observer is
/// FIFO. No ordering is guaranteed between observers within one publish.
#[derive(Default)]
pub struct LifecycleRegistry {
    subscribers: Mutex<Vec<(ObserverId, Arc<dyn LifecycleObserver>)>>,
    next_id: AtomicU64,
}

impl LifecycleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber and returns its unregistration token.
    pub fn register(&self, observer: Arc<dyn LifecycleObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().push((id, observer));
        debug!(observer = id.0, "lifecycle observer registered");
        id
    }

    /// Removes a subscriber. Returns false when the token was already gone.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        let removed = subscribers.len() != before;
        drop(subscribers);
        debug!(observer = id.0, removed, "lifecycle observer unregistered");
        removed
    }

    /// Number of current subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Broadcasts "the hosting service was recreated".
    #[instrument(skip(self))]
    pub fn publish_restarted(&self, pinned: Option<i64>) {
        for observer in self.snapshot() {
            observer.on_restarted(pinned);
        }
    }

    /// Broadcasts "the host task was removed".
    #[instrument(skip(self))]
    pub fn publish_task_removed(&self) {
        for observer in self.snapshot() {
            observer.on_task_removed();
        }
    }

    /// Broadcasts "the hosting service was destroyed".
    #[instrument(skip(self))]
    pub fn publish_destroyed(&self) {
        for observer in self.snapshot() {
            observer.on_destroyed();
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn LifecycleObserver>> {
        let subscribers = self.lock();
        debug!(count = subscribers.len(), "publishing lifecycle signal");
        subscribers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ObserverId, Arc<dyn LifecycleObserver>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRegistry")
            .field("subscribers", &self.len())
            .finish_non_exhaustive()
    }
}
