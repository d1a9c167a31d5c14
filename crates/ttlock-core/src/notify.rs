//! State change subscribers.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::models::LockId;
use crate::state::LockState;

/// Callback invoked with the new state after every committed change.
pub type StateCallback = Arc<dyn Fn(&LockState) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber list for one lock.
#[derive(Default)]
pub struct Subscribers {
    entries: Mutex<Vec<(SubscriptionId, StateCallback)>>,
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}

impl Subscribers {
    /// Register `callback`.
    pub fn subscribe(&self, callback: StateCallback) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    /// Remove a subscriber. Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// No subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every subscriber in registration order. A panicking callback is
    /// logged and skipped.
    pub fn notify(&self, lock_id: LockId, state: &LockState) {
        // callbacks may subscribe or unsubscribe, so call them on a snapshot
        let callbacks: Vec<(SubscriptionId, StateCallback)> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, callback) in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
                error!(%lock_id, subscription = %id, "State subscriber panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, StateCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: StateCallback = Arc::new(move |_: &LockState| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn test_notify_calls_every_subscriber() {
        let subscribers = Subscribers::default();
        let (a, a_cb) = counter();
        let (b, b_cb) = counter();
        subscribers.subscribe(a_cb);
        subscribers.subscribe(b_cb);

        subscribers.notify(LockId(1), &LockState::default());

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let subscribers = Subscribers::default();
        let (count, callback) = counter();
        let id = subscribers.subscribe(callback);

        assert!(subscribers.unsubscribe(id));
        assert!(!subscribers.unsubscribe(id));
        assert!(subscribers.is_empty());

        subscribers.notify(LockId(1), &LockState::default());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let subscribers = Subscribers::default();
        subscribers.subscribe(Arc::new(|_: &LockState| panic!("subscriber bug")));
        let (count, callback) = counter();
        subscribers.subscribe(callback);

        subscribers.notify(LockId(1), &LockState::default());
        subscribers.notify(LockId(1), &LockState::default());

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(subscribers.len(), 2);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_during_notify() {
        let subscribers = Arc::new(Subscribers::default());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::default();

        let list = Arc::clone(&subscribers);
        let own_id = Arc::clone(&slot);
        let id = subscribers.subscribe(Arc::new(move |_: &LockState| {
            if let Some(id) = *own_id.lock().unwrap() {
                list.unsubscribe(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        subscribers.notify(LockId(1), &LockState::default());
        assert!(subscribers.is_empty());
    }
}
