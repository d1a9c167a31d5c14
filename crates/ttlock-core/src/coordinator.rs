//! Per-lock reconciliation engine.
//!
//! A [`LockCoordinator`] owns the [`LockState`] of one lock and is the only
//! writer to it. It merges three sources of truth:
//!
//! - **polls** ([`refresh`](LockCoordinator::refresh)), which replace the
//!   device-reported fields;
//! - **pushed events** ([`process_event`](LockCoordinator::process_event)),
//!   which move the bolt, record who did it and arm or cancel the relock
//!   timer;
//! - **the relock timer**, which locks the cached state once the auto-lock
//!   delay has passed outside the passage-mode window.
//!
//! All of them serialise on a per-lock gate held for the full duration of a
//! refresh, so an event never sees a half-applied poll. Subscribers are
//! notified under the same gate after each committed change.
//!
//! Commands ([`lock`](LockCoordinator::lock), settings writes) talk to the
//! cloud without holding the gate. They report failure as `false` instead of
//! an error; the next poll brings the cache back in line either way.
//!
//! Passcode management and record queries are not cached. They pass straight
//! through to the cloud and return its errors.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::LocksConfig;
use crate::error::Result;
use crate::events::Action;
use crate::features::Features;
use crate::gateway::Gateway;
use crate::models::{LockDetail, LockId, LockRecord, NewPasscode, Passcode, RecordQuery, WebhookEvent};
use crate::notify::{StateCallback, SubscriptionId, Subscribers};
use crate::relock::RelockSlot;
use crate::schedule::PassageModeWindow;
use crate::state::{LockState, PollSnapshot};

/// Settings shared by every coordinator of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Timezone the locks live in.
    pub timezone: Tz,
    /// Relock delay used when auto-lock is switched on.
    pub auto_lock_seconds: u32,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            auto_lock_seconds: 10,
        }
    }
}

impl From<&LocksConfig> for CoordinatorSettings {
    fn from(config: &LocksConfig) -> Self {
        Self {
            timezone: config.timezone,
            auto_lock_seconds: config.auto_lock_seconds,
        }
    }
}

/// What [`LockCoordinator::process_event`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The lock is now locked.
    Locked,
    /// The lock is now unlocked.
    Unlocked,
    /// Recorded (battery, door sensor) without moving the bolt.
    Observed,
    /// The event reported a failed operation and was not applied.
    Rejected,
    /// The event belongs to another lock.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Lock,
    Unlock,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => f.write_str("lock"),
            Self::Unlock => f.write_str("unlock"),
        }
    }
}

#[derive(Debug)]
struct LockCell {
    state: LockState,
    relock: RelockSlot,
    /// Lock and unlock commands sent but not yet answered.
    commands_in_flight: usize,
}

struct Inner {
    lock_id: LockId,
    gateway: Arc<dyn Gateway>,
    settings: CoordinatorSettings,
    cell: Mutex<LockCell>,
    refresh_generation: AtomicU64,
    subscribers: Subscribers,
}

/// Reconciliation engine for one lock. Clones share the same engine.
#[derive(Clone)]
pub struct LockCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("lock_id", &self.inner.lock_id)
            .field("settings", &self.inner.settings)
            .field("subscribers", &self.inner.subscribers)
            .finish_non_exhaustive()
    }
}

impl LockCoordinator {
    /// Create the engine for `lock_id` from an initial poll.
    ///
    /// # Errors
    ///
    /// Fails if any part of the initial poll fails or the lock's feature
    /// value cannot be parsed.
    pub async fn register(
        lock_id: LockId,
        gateway: Arc<dyn Gateway>,
        settings: CoordinatorSettings,
    ) -> Result<Self> {
        let detail = gateway.fetch_lock_detail(lock_id).await?;
        let state = LockState::from_detail(&detail)?;

        let coordinator = Self {
            inner: Arc::new(Inner {
                lock_id,
                gateway,
                settings,
                cell: Mutex::new(LockCell {
                    state,
                    relock: RelockSlot::new(),
                    commands_in_flight: 0,
                }),
                refresh_generation: AtomicU64::new(0),
                subscribers: Subscribers::default(),
            }),
        };

        {
            let mut cell = coordinator.inner.cell.lock().await;
            coordinator.inner.poll(&mut cell, Some(detail)).await?;
            info!(
                %lock_id,
                name = %cell.state.name,
                features = ?cell.state.features.names(),
                "Registered lock"
            );
        }

        Ok(coordinator)
    }

    /// Cloud identifier of the lock.
    #[must_use]
    pub fn lock_id(&self) -> LockId {
        self.inner.lock_id
    }

    /// Timezone the lock's schedule is evaluated in.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.inner.settings.timezone
    }

    /// Snapshot of the cached state.
    pub async fn current_state(&self) -> LockState {
        self.inner.cell.lock().await.state.clone()
    }

    /// A relock timer is armed.
    pub async fn relock_pending(&self) -> bool {
        self.inner.cell.lock().await.relock.is_armed()
    }

    /// Passage mode currently holds the lock open.
    pub async fn passage_mode_active(&self) -> bool {
        let now = Utc::now().with_timezone(&self.inner.settings.timezone);
        self.inner.cell.lock().await.state.passage_mode_active(&now)
    }

    /// Poll the cloud and merge the result.
    ///
    /// Concurrent calls coalesce: a call that had to wait for another refresh
    /// to finish returns as soon as that refresh succeeds, without polling
    /// again.
    ///
    /// # Errors
    ///
    /// Propagates the first gateway or decode failure; the cached state is
    /// left untouched in that case.
    pub async fn refresh(&self) -> Result<()> {
        let observed = self.inner.refresh_generation.load(Ordering::SeqCst);
        let mut cell = self.inner.cell.lock().await;

        if self.inner.refresh_generation.load(Ordering::SeqCst) != observed {
            debug!(lock_id = %self.inner.lock_id, "Refresh coalesced with one already completed");
            return Ok(());
        }

        self.inner.poll(&mut cell, None).await
    }

    /// Apply a pushed event.
    pub async fn process_event(&self, event: &WebhookEvent) -> EventOutcome {
        let inner = &self.inner;
        if event.lock_id != inner.lock_id {
            debug!(lock_id = %inner.lock_id, event_lock_id = %event.lock_id, "Ignoring event for another lock");
            return EventOutcome::Ignored;
        }

        let mut cell = inner.cell.lock().await;
        let Some(action) = cell.state.apply_push_event(event) else {
            debug!(
                lock_id = %inner.lock_id,
                code = event.event.0,
                "Ignoring event for a failed operation"
            );
            return EventOutcome::Rejected;
        };

        let outcome = match action {
            Action::Lock => {
                cell.relock.cancel();
                EventOutcome::Locked
            }
            Action::Unlock => {
                cell.relock.cancel();
                let local = event.lock_timestamp.with_timezone(&inner.settings.timezone);
                if let Some(delay) = cell.state.auto_lock_delay(&local) {
                    self.arm_relock(&mut cell.relock, delay);
                }
                EventOutcome::Unlocked
            }
            Action::Unknown => EventOutcome::Observed,
        };

        debug!(
            lock_id = %inner.lock_id,
            code = event.event.0,
            reason = event.event.describe().description,
            ?outcome,
            "Processed event"
        );
        inner.subscribers.notify(inner.lock_id, &cell.state);
        outcome
    }

    fn arm_relock(&self, slot: &mut RelockSlot, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);
        slot.arm(delay, move |token| async move {
            if let Some(inner) = weak.upgrade() {
                inner.fire_relock(token).await;
            }
        });
        debug!(lock_id = %self.inner.lock_id, ?delay, "Armed auto-lock timer");
    }

    /// Ask the cloud to lock. Returns whether the cloud accepted the command.
    ///
    /// The cached bolt position is not changed; the resulting event or the
    /// next poll does that.
    pub async fn lock(&self) -> bool {
        self.send_command(Command::Lock).await
    }

    /// Ask the cloud to unlock. Returns whether the cloud accepted the command.
    pub async fn unlock(&self) -> bool {
        self.send_command(Command::Unlock).await
    }

    async fn send_command(&self, command: Command) -> bool {
        // run detached so a dropped caller cannot leave action_pending set
        let inner = Arc::clone(&self.inner);
        match tokio::spawn(async move { inner.run_command(command).await }).await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(lock_id = %self.inner.lock_id, %command, error = %e, "Command task failed");
                false
            }
        }
    }

    /// Replace the passage-mode schedule. The cache is updated only if the cloud accepts it.
    pub async fn set_passage_mode(&self, window: PassageModeWindow) -> bool {
        let inner = &self.inner;
        match inner.gateway.set_passage_mode(inner.lock_id, &window).await {
            Ok(()) => {
                inner
                    .commit(|state| state.set_passage_mode_config(window))
                    .await;
                true
            }
            Err(e) => {
                warn!(lock_id = %inner.lock_id, error = %e, "Failed to set passage mode");
                false
            }
        }
    }

    /// Switch auto-lock on (with the configured delay) or off.
    pub async fn set_auto_lock(&self, enabled: bool) -> bool {
        let inner = &self.inner;
        let seconds = if enabled {
            i64::from(inner.settings.auto_lock_seconds)
        } else {
            -1
        };

        match inner.gateway.set_auto_lock(inner.lock_id, seconds).await {
            Ok(()) => {
                inner
                    .commit(|state| state.set_auto_lock_seconds(seconds))
                    .await;
                true
            }
            Err(e) => {
                warn!(lock_id = %inner.lock_id, enabled, error = %e, "Failed to set auto-lock");
                false
            }
        }
    }

    /// Switch the lock sound on or off.
    pub async fn set_lock_sound(&self, on: bool) -> bool {
        let inner = &self.inner;
        match inner.gateway.set_lock_sound(inner.lock_id, on).await {
            Ok(()) => {
                inner.commit(|state| state.set_lock_sound(on)).await;
                true
            }
            Err(e) => {
                warn!(lock_id = %inner.lock_id, on, error = %e, "Failed to set lock sound");
                false
            }
        }
    }

    /// Keypad passcodes stored on the lock.
    ///
    /// # Errors
    ///
    /// Propagates the gateway failure.
    pub async fn passcodes(&self) -> Result<Vec<Passcode>> {
        self.inner.gateway.list_passcodes(self.inner.lock_id).await
    }

    /// Add a custom passcode. Returns its cloud id.
    ///
    /// # Errors
    ///
    /// Propagates the gateway failure.
    pub async fn create_passcode(&self, passcode: &NewPasscode) -> Result<i64> {
        let lock_id = self.inner.lock_id;
        let id = self.inner.gateway.add_passcode(lock_id, passcode).await?;
        info!(%lock_id, passcode_id = id, name = %passcode.name, "Created passcode");
        Ok(id)
    }

    /// Delete every expired temporary passcode and return the names of the
    /// ones removed. A passcode the cloud refuses to delete is logged and
    /// left out of the result.
    ///
    /// # Errors
    ///
    /// Fails only if the passcode list cannot be fetched.
    pub async fn cleanup_expired_passcodes(&self) -> Result<Vec<String>> {
        let lock_id = self.inner.lock_id;
        let now = Utc::now();
        let mut removed = Vec::new();

        for code in self.passcodes().await? {
            if !code.is_expired(now) {
                continue;
            }
            match self.inner.gateway.delete_passcode(lock_id, code.id).await {
                Ok(()) => removed.push(code.display_name()),
                Err(e) => warn!(%lock_id, passcode_id = code.id, error = %e, "Failed to delete expired passcode"),
            }
        }

        info!(%lock_id, removed = removed.len(), "Cleaned up expired passcodes");
        Ok(removed)
    }

    /// One page of the lock's history.
    ///
    /// # Errors
    ///
    /// Propagates the gateway failure.
    pub async fn records(&self, query: &RecordQuery) -> Result<Vec<LockRecord>> {
        self.inner.gateway.list_records(self.inner.lock_id, query).await
    }

    /// Call `callback` after every committed change.
    pub fn subscribe(&self, callback: StateCallback) -> SubscriptionId {
        self.inner.subscribers.subscribe(callback)
    }

    /// Stop calling a subscriber. Returns `false` for an unknown id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }

    /// Cancel the pending relock timer. The engine stays usable.
    pub async fn shutdown(&self) {
        if self.inner.cell.lock().await.relock.cancel() {
            debug!(lock_id = %self.inner.lock_id, "Cancelled auto-lock timer on shutdown");
        }
    }
}

impl Inner {
    /// Fetch everything and merge it. The caller holds the gate.
    async fn poll(&self, cell: &mut LockCell, prefetched: Option<LockDetail>) -> Result<()> {
        let lock_id = self.lock_id;
        let detail = match prefetched {
            Some(detail) => detail,
            None => self.gateway.fetch_lock_detail(lock_id).await?,
        };
        let status = self.gateway.fetch_lock_state(lock_id).await?;

        let passage_mode = if cell.state.features.contains(Features::PASSAGE_MODE) {
            Some(self.gateway.fetch_passage_mode(lock_id).await?)
        } else {
            None
        };

        let sensor = if cell.state.needs_sensor_fetch() {
            Some(self.gateway.fetch_sensor_detail(lock_id).await?)
        } else {
            None
        };

        cell.state.apply_poll_snapshot(
            PollSnapshot {
                detail,
                status,
                passage_mode,
                sensor,
            },
            Utc::now(),
        );
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);

        debug!(%lock_id, locked = ?cell.state.locked, "Refreshed lock");
        self.subscribers.notify(lock_id, &cell.state);
        Ok(())
    }

    async fn commit(&self, change: impl FnOnce(&mut LockState)) {
        let mut cell = self.cell.lock().await;
        change(&mut cell.state);
        self.subscribers.notify(self.lock_id, &cell.state);
    }

    async fn run_command(&self, command: Command) -> bool {
        {
            let mut cell = self.cell.lock().await;
            cell.commands_in_flight += 1;
            if cell.commands_in_flight == 1 {
                cell.state.mark_action_pending();
                self.subscribers.notify(self.lock_id, &cell.state);
            }
        }

        let sent = AssertUnwindSafe(async {
            match command {
                Command::Lock => self.gateway.send_lock(self.lock_id).await,
                Command::Unlock => self.gateway.send_unlock(self.lock_id).await,
            }
        })
        .catch_unwind()
        .await;

        {
            let mut cell = self.cell.lock().await;
            cell.commands_in_flight = cell.commands_in_flight.saturating_sub(1);
            // only the last outstanding command clears the flag
            if cell.commands_in_flight == 0 {
                cell.state.clear_action_pending();
                self.subscribers.notify(self.lock_id, &cell.state);
            }
        }

        match sent {
            Ok(Ok(())) => {
                info!(lock_id = %self.lock_id, %command, "Command accepted");
                true
            }
            Ok(Err(e)) => {
                warn!(lock_id = %self.lock_id, %command, error = %e, "Command failed");
                false
            }
            Err(_) => {
                error!(lock_id = %self.lock_id, %command, "Gateway panicked while sending command");
                false
            }
        }
    }

    async fn fire_relock(&self, token: u64) {
        let mut cell = self.cell.lock().await;
        if !cell.relock.claim(token) {
            debug!(lock_id = %self.lock_id, "Superseded auto-lock timer skipped");
            return;
        }

        cell.state.apply_auto_lock();
        info!(lock_id = %self.lock_id, "Auto-locked");
        self.subscribers.notify(self.lock_id, &cell.state);
    }
}
