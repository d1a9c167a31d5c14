//! Single-slot relock timer.
//!
//! A [`RelockSlot`] holds at most one armed timer. Arming aborts whatever was
//! armed before, so superseded timers never fire. Each timer carries a token;
//! the fire path must [`claim`](RelockSlot::claim) its token under the same
//! lock that guards the slot, which closes the window between a timer waking
//! up and a newer timer being armed.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug)]
struct ArmedTimer {
    token: u64,
    handle: JoinHandle<()>,
}

/// Holder for the pending relock timer of one lock.
#[derive(Debug, Default)]
pub struct RelockSlot {
    armed: Option<ArmedTimer>,
    next_token: u64,
}

impl RelockSlot {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any armed timer and arm a new one that runs `fire(token)` after `delay`.
    ///
    /// Returns the new timer's token.
    pub fn arm<F, Fut>(&mut self, delay: Duration, fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);

        let on_fire = fire(token);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });

        self.armed = Some(ArmedTimer { token, handle });
        token
    }

    /// Abort the armed timer, if any. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Called from the timer itself: disarm the slot if `token` is still the
    /// armed one. A `false` return means the timer was superseded and must not
    /// touch any state.
    pub fn claim(&mut self, token: u64) -> bool {
        if self.armed.as_ref().is_some_and(|timer| timer.token == token) {
            // the running task is the caller, so it is not aborted here
            self.armed = None;
            true
        } else {
            false
        }
    }

    /// A timer is armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for RelockSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce(u64) -> BoxFuture<'static, ()> {
        let counter = Arc::clone(counter);
        move |_| {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = RelockSlot::new();
        slot.arm(Duration::from_secs(1), counting(&fired));

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_timer() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut slot = RelockSlot::new();

        let old = slot.arm(Duration::from_secs(1), counting(&first));
        let new = slot.arm(Duration::from_secs(2), counting(&second));
        assert_ne!(old, new);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = RelockSlot::new();
        slot.arm(Duration::from_secs(1), counting(&fired));

        assert!(slot.cancel());
        assert!(!slot.cancel());
        assert!(!slot.is_armed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_only_matches_current_token() {
        let mut slot = RelockSlot::new();
        let stale = slot.arm(Duration::from_secs(60), |_| std::future::ready(()));
        let current = slot.arm(Duration::from_secs(60), |_| std::future::ready(()));

        assert!(!slot.claim(stale));
        assert!(slot.is_armed());
        assert!(slot.claim(current));
        assert!(!slot.is_armed());
        assert!(!slot.claim(current));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let mut slot = RelockSlot::new();
            slot.arm(Duration::from_secs(1), counting(&fired));
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
