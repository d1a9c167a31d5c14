//! All locks of one TTLock account.
//!
//! The registry owns one [`LockCoordinator`] per lock, routes pushed events to
//! the right one and drives poll cycles across all of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::coordinator::{CoordinatorSettings, EventOutcome, LockCoordinator};
use crate::error::{Result, TtlockError};
use crate::gateway::Gateway;
use crate::models::{LockId, WebhookEvent};
use crate::state::LockState;

/// Outcome of [`LockRegistry::ingest`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records applied to a registered lock.
    pub processed: usize,
    /// Malformed records and records for unregistered locks.
    pub dropped: usize,
}

/// Registered locks, keyed by id.
pub struct LockRegistry {
    gateway: Arc<dyn Gateway>,
    settings: CoordinatorSettings,
    locks: RwLock<HashMap<LockId, LockCoordinator>>,
    /// Set once the lock list has been fetched successfully.
    discovered: AtomicBool,
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRegistry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LockRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, settings: CoordinatorSettings) -> Self {
        Self {
            gateway,
            settings,
            locks: RwLock::new(HashMap::new()),
            discovered: AtomicBool::new(false),
        }
    }

    /// Register every lock on the account that is not registered yet.
    ///
    /// A lock whose initial poll fails is logged and skipped. Returns the ids
    /// registered by this call.
    ///
    /// # Errors
    ///
    /// Fails only if the lock list itself cannot be fetched.
    pub async fn discover(&self) -> Result<Vec<LockId>> {
        let ids = self.gateway.list_locks().await?;
        self.discovered.store(true, Ordering::SeqCst);
        let mut added = Vec::new();

        for lock_id in ids {
            if self.locks.read().await.contains_key(&lock_id) {
                continue;
            }
            match self.register(lock_id).await {
                Ok(_) => added.push(lock_id),
                Err(e) => warn!(%lock_id, error = %e, "Skipping lock whose initial poll failed"),
            }
        }

        info!(added = added.len(), "Lock discovery finished");
        Ok(added)
    }

    /// No lock list has been fetched yet, or nothing could be registered from it.
    pub async fn needs_discovery(&self) -> bool {
        !self.discovered.load(Ordering::SeqCst) || self.locks.read().await.is_empty()
    }

    /// Register one lock, replacing any existing engine for it.
    ///
    /// # Errors
    ///
    /// Fails if the initial poll fails.
    pub async fn register(&self, lock_id: LockId) -> Result<LockCoordinator> {
        let coordinator =
            LockCoordinator::register(lock_id, Arc::clone(&self.gateway), self.settings).await?;

        let previous = self
            .locks
            .write()
            .await
            .insert(lock_id, coordinator.clone());
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        Ok(coordinator)
    }

    /// Remove a lock and cancel its relock timer.
    ///
    /// # Errors
    ///
    /// Returns [`TtlockError::UnknownLock`] if the lock is not registered.
    pub async fn deregister(&self, lock_id: LockId) -> Result<()> {
        let coordinator = self
            .locks
            .write()
            .await
            .remove(&lock_id)
            .ok_or(TtlockError::UnknownLock(lock_id))?;
        coordinator.shutdown().await;
        info!(%lock_id, "Deregistered lock");
        Ok(())
    }

    /// Engine of a registered lock.
    ///
    /// # Errors
    ///
    /// Returns [`TtlockError::UnknownLock`] if the lock is not registered.
    pub async fn get(&self, lock_id: LockId) -> Result<LockCoordinator> {
        self.locks
            .read()
            .await
            .get(&lock_id)
            .cloned()
            .ok_or(TtlockError::UnknownLock(lock_id))
    }

    /// Registered ids, sorted.
    pub async fn lock_ids(&self) -> Vec<LockId> {
        let mut ids: Vec<LockId> = self.locks.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    async fn coordinators(&self) -> Vec<LockCoordinator> {
        let mut coordinators: Vec<LockCoordinator> =
            self.locks.read().await.values().cloned().collect();
        coordinators.sort_unstable_by_key(LockCoordinator::lock_id);
        coordinators
    }

    /// Cached state of every lock, sorted by id.
    pub async fn snapshots(&self) -> Vec<(LockId, LockState)> {
        let mut snapshots = Vec::new();
        for coordinator in self.coordinators().await {
            snapshots.push((coordinator.lock_id(), coordinator.current_state().await));
        }
        snapshots
    }

    /// Route a decoded event to its lock.
    ///
    /// # Errors
    ///
    /// Returns [`TtlockError::UnknownLock`] if the lock is not registered.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<EventOutcome> {
        let coordinator = self.get(event.lock_id).await?;
        Ok(coordinator.process_event(event).await)
    }

    /// Decode and dispatch a raw webhook payload.
    ///
    /// Accepts a single record, an array of records, or an object whose
    /// `records` field holds an array or a JSON-encoded array. Records are
    /// handled one by one in order; a bad record is dropped without affecting
    /// the others.
    pub async fn ingest(&self, payload: Value) -> IngestReport {
        let mut report = IngestReport::default();

        for record in records(payload) {
            let event = match WebhookEvent::decode(record) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed webhook record");
                    report.dropped += 1;
                    continue;
                }
            };

            match self.dispatch(&event).await {
                Ok(outcome) => {
                    debug!(lock_id = %event.lock_id, ?outcome, "Webhook record applied");
                    report.processed += 1;
                }
                Err(e) => {
                    warn!(lock_id = %event.lock_id, error = %e, "Dropping webhook record");
                    report.dropped += 1;
                }
            }
        }

        report
    }

    /// Refresh every lock. Failures are logged and returned; they do not stop
    /// the other locks from refreshing.
    pub async fn refresh_all(&self) -> Vec<(LockId, TtlockError)> {
        let mut failures = Vec::new();

        for coordinator in self.coordinators().await {
            let lock_id = coordinator.lock_id();
            if let Err(e) = coordinator.refresh().await {
                warn!(%lock_id, error = %e, recoverable = e.is_recoverable(), "Refresh failed");
                failures.push((lock_id, e));
            }
        }

        failures
    }

    /// Cancel every pending relock timer.
    pub async fn shutdown(&self) {
        for coordinator in self.coordinators().await {
            coordinator.shutdown().await;
        }
        info!("Lock registry shut down");
    }
}

/// Flatten the accepted payload shapes into individual records.
fn records(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(records) => records,
        Value::Object(mut object) => match object.remove("records") {
            Some(Value::Array(records)) => records,
            Some(Value::String(encoded)) => match serde_json::from_str::<Value>(&encoded) {
                Ok(Value::Array(records)) => records,
                Ok(single @ Value::Object(_)) => vec![single],
                Ok(_) | Err(_) => {
                    warn!("Webhook 'records' field is not a JSON array");
                    vec![Value::String(encoded)]
                }
            },
            Some(other) => vec![other],
            None => vec![Value::Object(object)],
        },
        other => vec![other],
    }
}
