//! Boundary to the TTLock cloud.
//!
//! The engine talks to the cloud only through [`Gateway`]. The production
//! implementation is [`HttpGateway`](crate::client::HttpGateway); tests and
//! the server's test-suite use [`mock::MockGateway`] (enabled by the
//! `mock-gateway` feature).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::models::{
    LockDetail, LockId, LockRecord, LockStatus, NewPasscode, Passcode, RecordQuery, SensorDetail,
};
use crate::schedule::PassageModeWindow;

/// Operations the bridge needs from the cloud.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Every lock on the account.
    async fn list_locks(&self) -> Result<Vec<LockId>>;

    /// Metadata, battery and settings of one lock.
    async fn fetch_lock_detail(&self, lock_id: LockId) -> Result<LockDetail>;

    /// Current bolt (and door) position.
    async fn fetch_lock_state(&self, lock_id: LockId) -> Result<LockStatus>;

    /// Door sensor details.
    async fn fetch_sensor_detail(&self, lock_id: LockId) -> Result<SensorDetail>;

    /// Passage-mode schedule.
    async fn fetch_passage_mode(&self, lock_id: LockId) -> Result<PassageModeWindow>;

    /// Throw the bolt.
    async fn send_lock(&self, lock_id: LockId) -> Result<()>;

    /// Retract the bolt.
    async fn send_unlock(&self, lock_id: LockId) -> Result<()>;

    /// Replace the passage-mode schedule.
    async fn set_passage_mode(&self, lock_id: LockId, window: &PassageModeWindow) -> Result<()>;

    /// Set the relock delay. `-1` disables auto-lock.
    async fn set_auto_lock(&self, lock_id: LockId, seconds: i64) -> Result<()>;

    /// Switch the lock's sound on or off.
    async fn set_lock_sound(&self, lock_id: LockId, on: bool) -> Result<()>;

    /// Keypad passcodes stored on the lock.
    async fn list_passcodes(&self, lock_id: LockId) -> Result<Vec<Passcode>>;

    /// Add a custom passcode. Returns its cloud id.
    async fn add_passcode(&self, lock_id: LockId, passcode: &NewPasscode) -> Result<i64>;

    /// Remove a passcode from the lock.
    async fn delete_passcode(&self, lock_id: LockId, passcode_id: i64) -> Result<()>;

    /// One page of the lock's history.
    async fn list_records(&self, lock_id: LockId, query: &RecordQuery) -> Result<Vec<LockRecord>>;
}

/// Process-wide gate serialising commands and state queries to the cloud.
///
/// The cloud answers concurrent requests for the same gateway unreliably, so
/// every lock, unlock, state query and settings write holds this gate for
/// the duration of one request. Clones share the same gate.
#[derive(Debug, Clone, Default)]
pub struct CommandGate(Arc<Mutex<()>>);

impl CommandGate {
    /// A fresh, unshared gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of the cloud.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

#[cfg(any(test, feature = "mock-gateway"))]
pub mod mock {
    //! In-memory [`Gateway`] for tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::Gateway;
    use crate::error::{Result, TtlockError};
    use crate::models::{
        DoorState, LockDetail, LockId, LockRecord, LockStatus, NewPasscode, OnOff, Passcode,
        PasscodeType, RecordQuery, RemoteLockState, SensorDetail,
    };
    use crate::schedule::PassageModeWindow;

    /// Feature value with remote lock, gateway unlock, door sensor and passage mode.
    pub const FEATURES_WITH_SENSOR: &str = "F44354CF5F3";

    /// Feature value with remote lock, gateway unlock and passage mode.
    pub const FEATURES_WITHOUT_SENSOR: &str = "F44354CD5F3";

    /// Gateway operations, for call counting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum GatewayCall {
        /// [`Gateway::list_locks`]
        ListLocks,
        /// [`Gateway::fetch_lock_detail`]
        LockDetail,
        /// [`Gateway::fetch_lock_state`]
        LockState,
        /// [`Gateway::fetch_sensor_detail`]
        SensorDetail,
        /// [`Gateway::fetch_passage_mode`]
        PassageMode,
        /// [`Gateway::send_lock`]
        Lock,
        /// [`Gateway::send_unlock`]
        Unlock,
        /// [`Gateway::set_passage_mode`]
        SetPassageMode,
        /// [`Gateway::set_auto_lock`]
        SetAutoLock,
        /// [`Gateway::set_lock_sound`]
        SetLockSound,
        /// [`Gateway::list_passcodes`]
        ListPasscodes,
        /// [`Gateway::add_passcode`]
        AddPasscode,
        /// [`Gateway::delete_passcode`]
        DeletePasscode,
        /// [`Gateway::list_records`]
        ListRecords,
    }

    const CALL_KINDS: usize = 14;

    impl GatewayCall {
        const fn index(self) -> usize {
            self as usize
        }
    }

    /// A lock as the mock cloud knows it.
    #[derive(Debug, Clone)]
    pub struct MockLock {
        /// Returned by `fetch_lock_detail`.
        pub detail: LockDetail,
        /// Returned by `fetch_lock_state`.
        pub status: LockStatus,
        /// Returned by `fetch_passage_mode`.
        pub passage_mode: PassageModeWindow,
        /// Returned by `fetch_sensor_detail`.
        pub sensor: SensorDetail,
        /// Returned by `list_passcodes`.
        pub passcodes: Vec<Passcode>,
        /// Returned by `list_records`, oldest first.
        pub records: Vec<LockRecord>,
    }

    #[derive(Debug, Default)]
    struct Behaviour {
        locks: HashMap<LockId, MockLock>,
        fail_reads: bool,
        fail_commands: bool,
        fail_config_writes: bool,
        panic_on_command: bool,
        latency: Option<Duration>,
        next_passcode_id: i64,
        last_record_query: Option<RecordQuery>,
    }

    /// Scriptable in-memory cloud.
    #[derive(Debug, Default)]
    pub struct MockGateway {
        behaviour: Mutex<Behaviour>,
        calls: [AtomicUsize; CALL_KINDS],
    }

    /// A plausible `lock/detail` response.
    #[must_use]
    pub fn sample_detail(lock_id: LockId, feature_value: &str) -> LockDetail {
        LockDetail {
            id: lock_id,
            name: format!("Lock {lock_id}"),
            mac: format!("16:72:4C:CC:{:02X}:C4", lock_id.0.rem_euclid(256)),
            battery_level: Some(90),
            feature_value: Some(feature_value.to_string()),
            model: Some("SN9206_PV53".to_string()),
            hardware_revision: Some("1.6".to_string()),
            firmware_revision: Some("6.0.6.210622".to_string()),
            auto_lock_seconds: -1,
            lock_sound: OnOff::On,
        }
    }

    impl MockGateway {
        /// An account with no locks.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a lock with the given detail, reported as locked with the door closed.
        #[must_use]
        pub fn with_lock(self, detail: LockDetail) -> Self {
            self.add_lock(detail);
            self
        }

        /// Add a lock with the given detail, reported as locked with the door closed.
        pub fn add_lock(&self, detail: LockDetail) {
            let lock = MockLock {
                detail,
                status: LockStatus {
                    locked: RemoteLockState::Locked,
                    door: Some(DoorState::Closed),
                },
                passage_mode: PassageModeWindow::default(),
                sensor: SensorDetail {
                    battery_level: Some(80),
                },
                passcodes: Vec::new(),
                records: Vec::new(),
            };
            self.with_behaviour(|b| {
                b.locks.insert(lock.detail.id, lock);
            });
        }

        /// Edit a lock in place. Does nothing for unknown ids.
        pub fn update_lock(&self, lock_id: LockId, edit: impl FnOnce(&mut MockLock)) {
            self.with_behaviour(|b| {
                if let Some(lock) = b.locks.get_mut(&lock_id) {
                    edit(lock);
                }
            });
        }

        /// Report this bolt position on the next state query.
        pub fn set_remote_state(&self, lock_id: LockId, locked: RemoteLockState) {
            self.update_lock(lock_id, |lock| lock.status.locked = locked);
        }

        /// Fail every read with a transport error.
        pub fn fail_reads(&self, fail: bool) {
            self.with_behaviour(|b| b.fail_reads = fail);
        }

        /// Fail lock and unlock commands with a rejection.
        pub fn fail_commands(&self, fail: bool) {
            self.with_behaviour(|b| b.fail_commands = fail);
        }

        /// Fail settings writes with a rejection.
        pub fn fail_config_writes(&self, fail: bool) {
            self.with_behaviour(|b| b.fail_config_writes = fail);
        }

        /// Panic inside lock and unlock commands.
        pub fn panic_on_command(&self, panic: bool) {
            self.with_behaviour(|b| b.panic_on_command = panic);
        }

        /// Delay every call by `latency`.
        pub fn set_latency(&self, latency: Option<Duration>) {
            self.with_behaviour(|b| b.latency = latency);
        }

        /// How many times `call` has been made.
        #[must_use]
        pub fn call_count(&self, call: GatewayCall) -> usize {
            self.calls[call.index()].load(Ordering::SeqCst)
        }

        /// Query passed to the latest `list_records` call.
        #[must_use]
        pub fn last_record_query(&self) -> Option<RecordQuery> {
            self.with_behaviour(|b| b.last_record_query)
        }

        /// Current mock-side copy of a lock.
        #[must_use]
        pub fn lock(&self, lock_id: LockId) -> Option<MockLock> {
            self.with_behaviour(|b| b.locks.get(&lock_id).cloned())
        }

        fn with_behaviour<R>(&self, f: impl FnOnce(&mut Behaviour) -> R) -> R {
            let mut guard = self.behaviour.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        }

        async fn enter(&self, call: GatewayCall) {
            self.calls[call.index()].fetch_add(1, Ordering::SeqCst);
            let latency = self.with_behaviour(|b| b.latency);
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
        }

        fn read<R>(&self, lock_id: LockId, f: impl FnOnce(&MockLock) -> R) -> Result<R> {
            self.with_behaviour(|b| {
                if b.fail_reads {
                    return Err(TtlockError::Transport("connection refused".to_string()));
                }
                b.locks.get(&lock_id).map(f).ok_or_else(|| not_found(lock_id))
            })
        }

        fn command(&self, lock_id: LockId) -> Result<()> {
            let (panic, fail, known) = self.with_behaviour(|b| {
                (
                    b.panic_on_command,
                    b.fail_commands,
                    b.locks.contains_key(&lock_id),
                )
            });
            assert!(!panic, "mock gateway panicked while sending a command");
            if fail {
                return Err(TtlockError::RemoteRejection {
                    code: -3003,
                    message: "Gateway is busy".to_string(),
                });
            }
            if known {
                Ok(())
            } else {
                Err(not_found(lock_id))
            }
        }

        fn write(&self, lock_id: LockId, f: impl FnOnce(&mut MockLock)) -> Result<()> {
            self.with_behaviour(|b| {
                if b.fail_config_writes {
                    return Err(TtlockError::RemoteRejection {
                        code: -4043,
                        message: "The function is not supported for this lock".to_string(),
                    });
                }
                let lock = b.locks.get_mut(&lock_id).ok_or_else(|| not_found(lock_id))?;
                f(lock);
                Ok(())
            })
        }
    }

    fn not_found(lock_id: LockId) -> TtlockError {
        TtlockError::RemoteRejection {
            code: 1,
            message: format!("lock {lock_id} does not exist"),
        }
    }

    #[async_trait]
    impl Gateway for MockGateway {
        async fn list_locks(&self) -> Result<Vec<LockId>> {
            self.enter(GatewayCall::ListLocks).await;
            self.with_behaviour(|b| {
                if b.fail_reads {
                    return Err(TtlockError::Transport("connection refused".to_string()));
                }
                let mut ids: Vec<LockId> = b.locks.keys().copied().collect();
                ids.sort_unstable();
                Ok(ids)
            })
        }

        async fn fetch_lock_detail(&self, lock_id: LockId) -> Result<LockDetail> {
            self.enter(GatewayCall::LockDetail).await;
            self.read(lock_id, |lock| lock.detail.clone())
        }

        async fn fetch_lock_state(&self, lock_id: LockId) -> Result<LockStatus> {
            self.enter(GatewayCall::LockState).await;
            self.read(lock_id, |lock| lock.status)
        }

        async fn fetch_sensor_detail(&self, lock_id: LockId) -> Result<SensorDetail> {
            self.enter(GatewayCall::SensorDetail).await;
            self.read(lock_id, |lock| lock.sensor)
        }

        async fn fetch_passage_mode(&self, lock_id: LockId) -> Result<PassageModeWindow> {
            self.enter(GatewayCall::PassageMode).await;
            self.read(lock_id, |lock| lock.passage_mode.clone())
        }

        async fn send_lock(&self, lock_id: LockId) -> Result<()> {
            self.enter(GatewayCall::Lock).await;
            self.command(lock_id)
        }

        async fn send_unlock(&self, lock_id: LockId) -> Result<()> {
            self.enter(GatewayCall::Unlock).await;
            self.command(lock_id)
        }

        async fn set_passage_mode(
            &self,
            lock_id: LockId,
            window: &PassageModeWindow,
        ) -> Result<()> {
            self.enter(GatewayCall::SetPassageMode).await;
            self.write(lock_id, |lock| lock.passage_mode = window.clone())
        }

        async fn set_auto_lock(&self, lock_id: LockId, seconds: i64) -> Result<()> {
            self.enter(GatewayCall::SetAutoLock).await;
            self.write(lock_id, |lock| lock.detail.auto_lock_seconds = seconds)
        }

        async fn set_lock_sound(&self, lock_id: LockId, on: bool) -> Result<()> {
            self.enter(GatewayCall::SetLockSound).await;
            self.write(lock_id, |lock| lock.detail.lock_sound = OnOff::from_bool(on))
        }

        async fn list_passcodes(&self, lock_id: LockId) -> Result<Vec<Passcode>> {
            self.enter(GatewayCall::ListPasscodes).await;
            self.read(lock_id, |lock| lock.passcodes.clone())
        }

        async fn add_passcode(&self, lock_id: LockId, passcode: &NewPasscode) -> Result<i64> {
            self.enter(GatewayCall::AddPasscode).await;
            let id = self.with_behaviour(|b| {
                b.next_passcode_id += 1;
                b.next_passcode_id
            });
            self.write(lock_id, |lock| {
                lock.passcodes.push(Passcode {
                    id,
                    passcode: passcode.passcode.clone(),
                    name: Some(passcode.name.clone()),
                    kind: PasscodeType::Temporary,
                    start: Some(passcode.start),
                    end: Some(passcode.end),
                });
            })?;
            Ok(id)
        }

        async fn delete_passcode(&self, lock_id: LockId, passcode_id: i64) -> Result<()> {
            self.enter(GatewayCall::DeletePasscode).await;
            self.write(lock_id, |lock| lock.passcodes.retain(|code| code.id != passcode_id))
        }

        async fn list_records(&self, lock_id: LockId, query: &RecordQuery) -> Result<Vec<LockRecord>> {
            self.enter(GatewayCall::ListRecords).await;
            self.with_behaviour(|b| b.last_record_query = Some(*query));
            let skip = (query.page_no.saturating_sub(1) * query.page_size) as usize;
            self.read(lock_id, |lock| {
                lock.records
                    .iter()
                    .filter(|record| query.start.map_or(true, |start| record.lock_date >= start))
                    .filter(|record| query.end.map_or(true, |end| record.lock_date <= end))
                    .skip(skip)
                    .take(query.page_size as usize)
                    .cloned()
                    .collect()
            })
        }
    }
}
