//! In-memory view of a single lock.
//!
//! [`LockState`] is owned by exactly one
//! [`LockCoordinator`](crate::coordinator::LockCoordinator), which serialises
//! every mutation behind its per-lock gate. The methods here are synchronous
//! and do no I/O; they only describe how polls, pushed events and commands
//! change the model.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;
use crate::events::{Action, DOOR_SENSOR_OPEN};
use crate::features::Features;
use crate::models::{LockDetail, LockStatus, RemoteLockState, SensorDetail, WebhookEvent};
use crate::schedule::{self, PassageModeWindow};

/// Reason recorded when the relock timer fires.
pub const AUTO_LOCK_REASON: &str = "Auto Lock";

/// Bolt position as far as the bridge knows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockedState {
    /// Bolt thrown.
    Locked,
    /// Bolt retracted.
    Unlocked,
    /// No poll or event has told us yet.
    #[default]
    Unknown,
}

impl From<RemoteLockState> for LockedState {
    fn from(state: RemoteLockState) -> Self {
        match state {
            RemoteLockState::Locked => Self::Locked,
            RemoteLockState::Unlocked => Self::Unlocked,
            RemoteLockState::Unknown => Self::Unknown,
        }
    }
}

/// Door sensor readings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorData {
    /// Door open, if reported.
    pub opened: Option<bool>,
    /// Sensor battery percentage.
    pub battery: Option<u8>,
    /// When the sensor detail was fetched. Set once per lock lifetime.
    pub last_fetched: Option<DateTime<Utc>>,
}

/// Everything one refresh pulled from the cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSnapshot {
    /// `lock/detail`.
    pub detail: LockDetail,
    /// `lock/queryOpenState`.
    pub status: LockStatus,
    /// `lock/getPassageModeConfig`, only for locks that support passage mode.
    pub passage_mode: Option<PassageModeWindow>,
    /// `doorSensor/query`, only on the first refresh of a lock with a sensor.
    pub sensor: Option<SensorDetail>,
}

/// Cached state of one lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    /// Display name.
    pub name: String,
    /// Bluetooth MAC address. Never changes after creation.
    pub mac: String,
    /// Hardware model.
    pub model: Option<String>,
    /// Hardware revision.
    pub hardware_version: Option<String>,
    /// Firmware revision.
    pub firmware_version: Option<String>,
    /// Capabilities parsed from the first detail fetch.
    pub features: Features,
    /// Bolt position.
    pub locked: LockedState,
    /// Lock battery percentage.
    pub battery_level: Option<u8>,
    /// A lock or unlock command is in flight.
    pub action_pending: bool,
    /// User behind the latest processed event.
    pub last_user: Option<String>,
    /// Description of the latest processed event.
    pub last_reason: Option<String>,
    /// Whether the lock beeps.
    pub lock_sound: Option<bool>,
    /// Door sensor, for locks that have one.
    pub sensor: Option<SensorData>,
    /// Relock delay in seconds. Zero, negative or absent disables auto-lock.
    pub auto_lock_seconds: Option<i64>,
    /// Passage-mode schedule. Absent means auto-lock is never suppressed.
    pub passage_mode_config: Option<PassageModeWindow>,
}

impl LockState {
    /// Build the initial state from the first detail fetch.
    ///
    /// # Errors
    ///
    /// Returns [`TtlockError::Decode`](crate::error::TtlockError::Decode) if the
    /// feature value is not valid hex.
    pub fn from_detail(detail: &LockDetail) -> Result<Self> {
        let features = Features::from_feature_value(detail.feature_value.as_deref())?;

        Ok(Self {
            name: detail.name.clone(),
            mac: detail.mac.clone(),
            features,
            ..Self::default()
        })
    }

    /// `true` until the door sensor detail has been fetched once.
    #[must_use]
    pub fn needs_sensor_fetch(&self) -> bool {
        self.features.contains(Features::DOOR_SENSOR)
            && self.sensor.as_ref().and_then(|s| s.last_fetched).is_none()
    }

    /// Merge a poll result. Provenance and `action_pending` are left alone, and
    /// an `Unknown` bolt position does not overwrite a known one.
    pub fn apply_poll_snapshot(&mut self, snapshot: PollSnapshot, now: DateTime<Utc>) {
        let PollSnapshot {
            detail,
            status,
            passage_mode,
            sensor,
        } = snapshot;

        self.name = detail.name;
        self.model = detail.model;
        self.hardware_version = detail.hardware_revision;
        self.firmware_version = detail.firmware_revision;
        self.auto_lock_seconds = Some(detail.auto_lock_seconds);
        if detail.battery_level.is_some() {
            self.battery_level = detail.battery_level;
        }
        if let Some(on) = detail.lock_sound.as_bool() {
            self.lock_sound = Some(on);
        }

        match LockedState::from(status.locked) {
            LockedState::Unknown => {}
            known => self.locked = known,
        }

        if let Some(window) = passage_mode {
            self.passage_mode_config = Some(window);
        }

        if let Some(sensor_detail) = sensor {
            let data = self.sensor.get_or_insert_with(SensorData::default);
            data.battery = sensor_detail.battery_level;
            data.last_fetched = Some(now);
        }

        if let (Some(data), Some(opened)) = (
            self.sensor.as_mut(),
            status.door.and_then(|door| door.is_open()),
        ) {
            data.opened = Some(opened);
        }
    }

    /// Apply a pushed event for this lock.
    ///
    /// Returns the event's action, or `None` when the event reports a failed
    /// operation and nothing was changed.
    pub fn apply_push_event(&mut self, event: &WebhookEvent) -> Option<Action> {
        if !event.success {
            return None;
        }

        if event.battery_level.is_some() {
            self.battery_level = event.battery_level;
        }

        let described = event.event.describe();
        match described.action {
            Action::Lock => self.locked = LockedState::Locked,
            Action::Unlock => self.locked = LockedState::Unlocked,
            Action::Unknown => {
                if event.event.is_door_sensor() {
                    let data = self.sensor.get_or_insert_with(SensorData::default);
                    data.opened = Some(event.event == DOOR_SENSOR_OPEN);
                }
                return Some(Action::Unknown);
            }
        }

        self.last_user.clone_from(&event.user);
        self.last_reason = Some(described.description.to_string());
        Some(described.action)
    }

    /// A lock or unlock command was sent.
    pub fn mark_action_pending(&mut self) {
        self.action_pending = true;
    }

    /// The in-flight command finished, one way or another.
    pub fn clear_action_pending(&mut self) {
        self.action_pending = false;
    }

    /// The relock timer fired.
    pub fn apply_auto_lock(&mut self) {
        self.locked = LockedState::Locked;
        self.last_reason = Some(AUTO_LOCK_REASON.to_string());
        self.last_user = None;
    }

    /// The cloud accepted a new passage-mode schedule.
    pub fn set_passage_mode_config(&mut self, window: PassageModeWindow) {
        self.passage_mode_config = Some(window);
    }

    /// The cloud accepted a new relock delay.
    pub fn set_auto_lock_seconds(&mut self, seconds: i64) {
        self.auto_lock_seconds = Some(seconds);
    }

    /// The cloud accepted a new lock sound setting.
    pub fn set_lock_sound(&mut self, on: bool) {
        self.lock_sound = Some(on);
    }

    /// Auto-lock is configured with a positive delay.
    #[must_use]
    pub fn auto_lock_enabled(&self) -> bool {
        self.auto_lock_seconds.is_some_and(|s| s > 0)
    }

    /// `true` if passage mode holds the lock open at local time `at`.
    pub fn passage_mode_active<T>(&self, at: &T) -> bool
    where
        T: Datelike + Timelike,
    {
        self.passage_mode_config
            .as_ref()
            .is_some_and(|window| schedule::is_within_window(window, at))
    }

    /// Relock delay for an unlock at local time `at`.
    pub fn auto_lock_delay<T>(&self, at: &T) -> Option<Duration>
    where
        T: Datelike + Timelike,
    {
        schedule::auto_lock_delay(self, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventCode;
    use crate::models::{DoorState, LockId, OnOff};
    use chrono::TimeZone;

    const WITH_SENSOR: &str = "F44354CF5F3";
    const WITHOUT_SENSOR: &str = "F44354CD5F3";

    fn detail(feature_value: &str) -> LockDetail {
        LockDetail {
            id: LockId(7_252_408),
            name: "Front Door".to_string(),
            mac: "16:72:4C:CC:01:C4".to_string(),
            battery_level: Some(90),
            feature_value: Some(feature_value.to_string()),
            model: Some("SN9206_PV53".to_string()),
            hardware_revision: Some("1.6".to_string()),
            firmware_revision: Some("6.0.6.210622".to_string()),
            auto_lock_seconds: 60,
            lock_sound: OnOff::Off,
        }
    }

    fn snapshot(feature_value: &str, locked: RemoteLockState) -> PollSnapshot {
        PollSnapshot {
            detail: detail(feature_value),
            status: LockStatus { locked, door: None },
            passage_mode: None,
            sensor: None,
        }
    }

    fn event(code: i64, success: bool) -> WebhookEvent {
        let ts = Utc.timestamp_millis_opt(1_682_244_497_000).unwrap();
        WebhookEvent {
            lock_id: LockId(7_252_408),
            mac: None,
            battery_level: Some(40),
            server_timestamp: ts,
            lock_timestamp: ts,
            event: EventCode(code),
            user: Some("test".to_string()),
            success,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 4, 23, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_from_detail() {
        let state = LockState::from_detail(&detail(WITH_SENSOR)).unwrap();
        assert_eq!(state.name, "Front Door");
        assert_eq!(state.mac, "16:72:4C:CC:01:C4");
        assert_eq!(state.locked, LockedState::Unknown);
        assert!(state.features.contains(Features::DOOR_SENSOR));
        assert!(state.needs_sensor_fetch());
    }

    #[test]
    fn test_from_detail_rejects_bad_features() {
        let err = LockState::from_detail(&detail("zz")).unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_poll_populates_state() {
        let mut state = LockState::from_detail(&detail(WITHOUT_SENSOR)).unwrap();
        state.apply_poll_snapshot(snapshot(WITHOUT_SENSOR, RemoteLockState::Locked), now());

        assert_eq!(state.locked, LockedState::Locked);
        assert_eq!(state.battery_level, Some(90));
        assert_eq!(state.auto_lock_seconds, Some(60));
        assert_eq!(state.lock_sound, Some(false));
        assert_eq!(state.firmware_version.as_deref(), Some("6.0.6.210622"));
        assert!(state.sensor.is_none());
        assert!(!state.needs_sensor_fetch());
    }

    #[test]
    fn test_poll_unknown_keeps_known_state() {
        let mut state = LockState::from_detail(&detail(WITHOUT_SENSOR)).unwrap();
        state.apply_poll_snapshot(snapshot(WITHOUT_SENSOR, RemoteLockState::Unlocked), now());
        state.apply_poll_snapshot(snapshot(WITHOUT_SENSOR, RemoteLockState::Unknown), now());
        assert_eq!(state.locked, LockedState::Unlocked);
    }

    #[test]
    fn test_poll_keeps_provenance_and_pending() {
        let mut state = LockState::from_detail(&detail(WITHOUT_SENSOR)).unwrap();
        state.apply_push_event(&event(47, true));
        state.mark_action_pending();

        state.apply_poll_snapshot(snapshot(WITHOUT_SENSOR, RemoteLockState::Unlocked), now());

        assert_eq!(state.last_user.as_deref(), Some("test"));
        assert_eq!(state.last_reason.as_deref(), Some("lock by lock key"));
        assert!(state.action_pending);
    }

    #[test]
    fn test_poll_sensor_fetched_once() {
        let mut state = LockState::from_detail(&detail(WITH_SENSOR)).unwrap();

        let mut first = snapshot(WITH_SENSOR, RemoteLockState::Locked);
        first.sensor = Some(SensorDetail {
            battery_level: Some(75),
        });
        first.status.door = Some(DoorState::Closed);
        state.apply_poll_snapshot(first, now());

        let sensor = state.sensor.clone().unwrap();
        assert_eq!(sensor.battery, Some(75));
        assert_eq!(sensor.opened, Some(false));
        assert_eq!(sensor.last_fetched, Some(now()));
        assert!(!state.needs_sensor_fetch());

        let mut second = snapshot(WITH_SENSOR, RemoteLockState::Locked);
        second.status.door = Some(DoorState::Open);
        state.apply_poll_snapshot(second, now() + chrono::Duration::hours(1));

        let sensor = state.sensor.unwrap();
        assert_eq!(sensor.opened, Some(true));
        assert_eq!(sensor.battery, Some(75));
        assert_eq!(sensor.last_fetched, Some(now()));
    }

    #[test]
    fn test_push_lock_sets_provenance() {
        let mut state = LockState::default();
        assert_eq!(state.apply_push_event(&event(47, true)), Some(Action::Lock));
        assert_eq!(state.locked, LockedState::Locked);
        assert_eq!(state.battery_level, Some(40));
        assert_eq!(state.last_user.as_deref(), Some("test"));
        assert_eq!(state.last_reason.as_deref(), Some("lock by lock key"));
    }

    #[test]
    fn test_push_unlock() {
        let mut state = LockState::default();
        assert_eq!(state.apply_push_event(&event(7, true)), Some(Action::Unlock));
        assert_eq!(state.locked, LockedState::Unlocked);
        assert_eq!(state.last_reason.as_deref(), Some("unlock by IC card"));
    }

    #[test]
    fn test_failed_event_changes_nothing() {
        let mut state = LockState::default();
        let before = state.clone();
        assert_eq!(state.apply_push_event(&event(7, false)), None);
        assert_eq!(state, before);
    }

    #[test]
    fn test_unknown_event_updates_battery_only() {
        let mut state = LockState::default();
        state.apply_push_event(&event(47, true));

        let mut alarm = event(44, true);
        alarm.battery_level = Some(12);
        alarm.user = Some("intruder".to_string());
        assert_eq!(state.apply_push_event(&alarm), Some(Action::Unknown));

        assert_eq!(state.battery_level, Some(12));
        assert_eq!(state.locked, LockedState::Locked);
        assert_eq!(state.last_user.as_deref(), Some("test"));
        assert_eq!(state.last_reason.as_deref(), Some("lock by lock key"));
    }

    #[test]
    fn test_door_sensor_events() {
        let mut state = LockState::from_detail(&detail(WITH_SENSOR)).unwrap();

        state.apply_push_event(&event(31, true));
        assert_eq!(state.sensor.as_ref().unwrap().opened, Some(true));

        state.apply_push_event(&event(30, true));
        assert_eq!(state.sensor.as_ref().unwrap().opened, Some(false));
        assert_eq!(state.locked, LockedState::Unknown);

        // sensor readings from events do not count as the one-time fetch
        assert!(state.needs_sensor_fetch());
    }

    #[test]
    fn test_auto_lock_transition() {
        let mut state = LockState::default();
        state.apply_push_event(&event(7, true));
        state.apply_auto_lock();

        assert_eq!(state.locked, LockedState::Locked);
        assert_eq!(state.last_reason.as_deref(), Some(AUTO_LOCK_REASON));
        assert!(state.last_user.is_none());
    }

    #[test]
    fn test_action_pending_toggle() {
        let mut state = LockState::default();
        state.mark_action_pending();
        assert!(state.action_pending);
        state.clear_action_pending();
        assert!(!state.action_pending);
    }

    #[test]
    fn test_setters() {
        let mut state = LockState::default();
        assert!(!state.auto_lock_enabled());

        state.set_auto_lock_seconds(10);
        assert!(state.auto_lock_enabled());
        state.set_auto_lock_seconds(-1);
        assert!(!state.auto_lock_enabled());

        state.set_lock_sound(true);
        assert_eq!(state.lock_sound, Some(true));

        let window = PassageModeWindow {
            enabled: true,
            all_day: true,
            week_days: (1..=7).collect(),
            ..PassageModeWindow::default()
        };
        state.set_passage_mode_config(window.clone());
        assert_eq!(state.passage_mode_config, Some(window));
        assert!(state.passage_mode_active(&now().with_timezone(&chrono_tz::UTC)));
    }
}
