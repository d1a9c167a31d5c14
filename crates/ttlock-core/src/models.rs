//! TTLock cloud wire models.
//!
//! These mirror the JSON the TTLock v3 API returns (camelCase keys, on/off
//! flags encoded as `1`/`2`, timestamps as epoch milliseconds) and convert
//! into the typed values the rest of the crate works with.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, TtlockError};
use crate::events::EventCode;
use crate::schedule::PassageModeWindow;

/// Identifier the TTLock cloud assigns to a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(pub i64);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LockId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Tri-state flag used by the cloud for settings (`0` unknown, `1` on, `2` off).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum OnOff {
    /// Not reported.
    #[default]
    Unknown,
    /// Enabled.
    On,
    /// Disabled.
    Off,
}

impl OnOff {
    /// `true` only for [`OnOff::On`].
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    /// `None` when unknown.
    #[must_use]
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Unknown => None,
        }
    }

    /// Encode a boolean setting for a request.
    #[must_use]
    pub const fn from_bool(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl From<i64> for OnOff {
    fn from(value: i64) -> Self {
        match value {
            1 => Self::On,
            2 => Self::Off,
            _ => Self::Unknown,
        }
    }
}

impl From<OnOff> for i64 {
    fn from(value: OnOff) -> Self {
        match value {
            OnOff::Unknown => 0,
            OnOff::On => 1,
            OnOff::Off => 2,
        }
    }
}

/// Lock details as returned by `lock/detail`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockDetail {
    /// Cloud identifier.
    #[serde(rename = "lockId")]
    pub id: LockId,

    /// User-facing name.
    #[serde(rename = "lockAlias", default = "default_lock_name")]
    pub name: String,

    /// Bluetooth MAC address.
    #[serde(rename = "lockMac")]
    pub mac: String,

    /// Battery percentage.
    #[serde(rename = "electricQuantity", default)]
    pub battery_level: Option<u8>,

    /// Hex-encoded feature bitmask.
    #[serde(rename = "featureValue", default)]
    pub feature_value: Option<String>,

    /// Hardware model number.
    #[serde(rename = "modelNum", default)]
    pub model: Option<String>,

    /// Hardware revision.
    #[serde(rename = "hardwareRevision", default)]
    pub hardware_revision: Option<String>,

    /// Firmware revision.
    #[serde(rename = "firmwareRevision", default)]
    pub firmware_revision: Option<String>,

    /// Relock delay in seconds; `-1` or `0` when disabled.
    #[serde(rename = "autoLockTime", default = "default_auto_lock_time")]
    pub auto_lock_seconds: i64,

    /// Whether the lock beeps.
    #[serde(rename = "lockSound", default)]
    pub lock_sound: OnOff,
}

fn default_lock_name() -> String {
    "Lock".to_string()
}

const fn default_auto_lock_time() -> i64 {
    -1
}

/// Bolt position reported by `lock/queryOpenState`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum RemoteLockState {
    /// Bolt thrown.
    Locked,
    /// Bolt retracted.
    Unlocked,
    /// The gateway could not tell.
    #[default]
    Unknown,
}

impl From<i64> for RemoteLockState {
    fn from(value: i64) -> Self {
        match value {
            0 => Self::Locked,
            1 => Self::Unlocked,
            _ => Self::Unknown,
        }
    }
}

/// Door position reported alongside the bolt state by locks with a door sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i64")]
pub enum DoorState {
    /// Door open.
    Open,
    /// Door closed.
    Closed,
    /// Sensor did not report.
    Unknown,
}

impl From<i64> for DoorState {
    fn from(value: i64) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closed,
            _ => Self::Unknown,
        }
    }
}

impl DoorState {
    /// `Some(true)` when open, `None` when unknown.
    #[must_use]
    pub const fn is_open(self) -> Option<bool> {
        match self {
            Self::Open => Some(true),
            Self::Closed => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Response of `lock/queryOpenState`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LockStatus {
    /// Bolt position.
    #[serde(rename = "state", default)]
    pub locked: RemoteLockState,

    /// Door position, if the lock has a sensor.
    #[serde(rename = "sensorState", default)]
    pub door: Option<DoorState>,
}

/// Response of `doorSensor/query`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SensorDetail {
    /// Sensor battery percentage.
    #[serde(rename = "electricQuantity", default)]
    pub battery_level: Option<u8>,
}

/// Response of `lock/getPassageModeConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PassageModeConfig {
    /// Passage mode switched on.
    #[serde(rename = "passageMode", default)]
    pub enabled: OnOff,

    /// Unlock automatically when the window opens.
    #[serde(rename = "autoUnlock", default)]
    pub auto_unlock: OnOff,

    /// The window covers the whole day.
    #[serde(rename = "isAllDay", default)]
    pub all_day: OnOff,

    /// Window start, minutes since local midnight. The cloud sends `null` for all-day windows.
    #[serde(rename = "startDate", default, deserialize_with = "null_as_zero")]
    pub start_minute: u16,

    /// Window end, minutes since local midnight.
    #[serde(rename = "endDate", default, deserialize_with = "null_as_zero")]
    pub end_minute: u16,

    /// Weekdays, Monday = 1 .. Sunday = 7.
    #[serde(rename = "weekDays", default)]
    pub week_days: Vec<u8>,
}

impl From<PassageModeConfig> for PassageModeWindow {
    fn from(config: PassageModeConfig) -> Self {
        Self {
            enabled: config.enabled.is_on(),
            auto_unlock: config.auto_unlock.is_on(),
            all_day: config.all_day.is_on(),
            start_minute: config.start_minute,
            end_minute: config.end_minute,
            week_days: config.week_days.into_iter().collect::<BTreeSet<u8>>(),
        }
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u16>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of `lock/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LockListEntry {
    /// Cloud identifier.
    #[serde(rename = "lockId")]
    pub id: LockId,
}

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    /// Entries on this page.
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

/// Page returned by `lock/list`.
pub type LockListPage = Page<LockListEntry>;

// =============================================================================
// PASSCODES
// =============================================================================

/// Kind of keypad passcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum PasscodeType {
    /// Any type the bridge does not model.
    #[default]
    Unknown,
    /// Valid forever.
    Permanent,
    /// Valid between its start and end dates.
    Temporary,
}

impl PasscodeType {
    /// Lower-case name used in API responses.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Permanent => "permanent",
            Self::Temporary => "temporary",
        }
    }
}

impl From<i64> for PasscodeType {
    fn from(value: i64) -> Self {
        match value {
            2 => Self::Permanent,
            3 => Self::Temporary,
            _ => Self::Unknown,
        }
    }
}

impl From<PasscodeType> for i64 {
    fn from(value: PasscodeType) -> Self {
        match value {
            PasscodeType::Unknown => 0,
            PasscodeType::Permanent => 2,
            PasscodeType::Temporary => 3,
        }
    }
}

/// A keypad passcode, as listed by `lock/listKeyboardPwd`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Passcode {
    /// Cloud identifier of the passcode.
    #[serde(rename = "keyboardPwdId")]
    pub id: i64,

    /// The digits.
    #[serde(rename = "keyboardPwd", default)]
    pub passcode: String,

    /// Label given when the passcode was created.
    #[serde(rename = "keyboardPwdName", default)]
    pub name: Option<String>,

    /// Permanent, temporary or unknown.
    #[serde(rename = "keyboardPwdType", default)]
    pub kind: PasscodeType,

    /// Start of validity. The cloud sends `0` when unset.
    #[serde(rename = "startDate", default, deserialize_with = "optional_epoch_ms")]
    pub start: Option<DateTime<Utc>>,

    /// End of validity. The cloud sends `0` when unset.
    #[serde(rename = "endDate", default, deserialize_with = "optional_epoch_ms")]
    pub end: Option<DateTime<Utc>>,
}

impl Passcode {
    /// A temporary passcode whose end date lies before `now`.
    ///
    /// Permanent and unknown passcodes never expire.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.kind == PasscodeType::Temporary && self.end.is_some_and(|end| end < now)
    }

    /// Name to report for this passcode, falling back to its id.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A custom passcode to add to a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPasscode {
    /// The digits.
    pub passcode: String,
    /// Label shown in the TTLock app.
    pub name: String,
    /// Start of validity.
    pub start: DateTime<Utc>,
    /// End of validity.
    pub end: DateTime<Utc>,
}

/// Response of `keyboardPwd/add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AddedPasscode {
    /// Cloud identifier of the new passcode.
    #[serde(rename = "keyboardPwdId")]
    pub id: i64,
}

// =============================================================================
// LOCK RECORDS
// =============================================================================

/// Page size used when a record query does not name one.
pub const DEFAULT_RECORD_PAGE_SIZE: u32 = 50;

/// Largest record page the bridge asks for.
pub const MAX_RECORD_PAGE_SIZE: u32 = 200;

/// Filter and page for `lockRecord/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordQuery {
    /// Only records at or after this instant.
    pub start: Option<DateTime<Utc>>,
    /// Only records at or before this instant.
    pub end: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page_no: u32,
    /// Records per page, at most [`MAX_RECORD_PAGE_SIZE`].
    pub page_size: u32,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            page_no: 1,
            page_size: DEFAULT_RECORD_PAGE_SIZE,
        }
    }
}

impl RecordQuery {
    /// Build a query, filling in defaults and capping the page size.
    #[must_use]
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page_no: Option<u32>,
        page_size: Option<u32>,
    ) -> Self {
        Self {
            start,
            end,
            page_no: page_no.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_RECORD_PAGE_SIZE)
                .clamp(1, MAX_RECORD_PAGE_SIZE),
        }
    }
}

/// One entry of a lock's history, as listed by `lockRecord/list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockRecord {
    /// Cloud identifier of the record.
    #[serde(rename = "recordId")]
    pub id: i64,

    /// Lock the record belongs to.
    #[serde(rename = "lockId")]
    pub lock_id: LockId,

    /// Raw type code as stored by the lock.
    #[serde(rename = "recordTypeFromLock", default)]
    pub record_type_from_lock: Option<i64>,

    /// What happened.
    #[serde(rename = "recordType")]
    pub record_type: EventCode,

    /// Whether the operation succeeded.
    #[serde(deserialize_with = "flag")]
    pub success: bool,

    /// Account that triggered the record.
    #[serde(default)]
    pub username: Option<String>,

    /// Passcode entered, for keypad records.
    #[serde(rename = "keyboardPwd", default)]
    pub keyboard_pwd: Option<String>,

    /// When the lock produced the record.
    #[serde(rename = "lockDate", deserialize_with = "required_epoch_ms")]
    pub lock_date: DateTime<Utc>,

    /// When the cloud received the record.
    #[serde(rename = "serverDate", deserialize_with = "required_epoch_ms")]
    pub server_date: DateTime<Utc>,
}

// =============================================================================
// PUSH EVENTS
// =============================================================================

/// A lock record exactly as the cloud pushes it to the webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWebhookRecord {
    #[serde(rename = "lockId")]
    lock_id: LockId,
    #[serde(rename = "lockMac", default)]
    mac: Option<String>,
    #[serde(rename = "electricQuantity", default)]
    battery_level: Option<u8>,
    #[serde(rename = "serverDate")]
    server_date: i64,
    #[serde(rename = "lockDate")]
    lock_date: i64,
    #[serde(rename = "recordType")]
    record_type: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(deserialize_with = "flag")]
    success: bool,
}

/// A decoded push event, ready for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Lock the event belongs to.
    pub lock_id: LockId,
    /// MAC address of the lock, when present.
    pub mac: Option<String>,
    /// Battery percentage reported with the event.
    pub battery_level: Option<u8>,
    /// When the cloud received the record.
    pub server_timestamp: DateTime<Utc>,
    /// When the lock produced the record.
    pub lock_timestamp: DateTime<Utc>,
    /// What happened.
    pub event: EventCode,
    /// Account that triggered the event.
    pub user: Option<String>,
    /// Whether the operation succeeded.
    pub success: bool,
}

impl WebhookEvent {
    /// Decode a single pushed record.
    ///
    /// # Errors
    ///
    /// Returns [`TtlockError::Decode`] if required fields are missing or the
    /// timestamps are out of range.
    pub fn decode(value: serde_json::Value) -> Result<Self> {
        let raw: RawWebhookRecord = serde_json::from_value(value)?;
        Self::try_from(raw)
    }
}

impl TryFrom<RawWebhookRecord> for WebhookEvent {
    type Error = TtlockError;

    fn try_from(raw: RawWebhookRecord) -> Result<Self> {
        Ok(Self {
            lock_id: raw.lock_id,
            mac: raw.mac,
            battery_level: raw.battery_level,
            server_timestamp: epoch_ms(raw.server_date, "serverDate")?,
            lock_timestamp: epoch_ms(raw.lock_date, "lockDate")?,
            event: EventCode(raw.record_type),
            user: raw.username,
            success: raw.success,
        })
    }
}

fn epoch_ms(value: i64, field: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| TtlockError::Decode(format!("{field} out of range: {value}")))
}

fn required_epoch_ms<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {value}")))
}

fn optional_epoch_ms<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<i64>::deserialize(deserializer)? {
        None | Some(0) => Ok(None),
        Some(value) => DateTime::from_timestamp_millis(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {value}"))),
    }
}

fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i == 1),
        Flag::Text(s) => match s.as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid flag: {other}"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Action;
    use chrono::TimeZone;
    use serde_json::json;

    fn basic_lock_details() -> serde_json::Value {
        json!({
            "date": 1_669_690_212_000_i64,
            "lockAlias": "Front Door",
            "lockSound": 2,
            "modelNum": "SN9206_PV53",
            "lockMac": "16:72:4C:CC:01:C4",
            "featureValue": "F44354CD5F3",
            "autoLockTime": 60,
            "lockName": "S31_c401cc",
            "firmwareRevision": "6.0.6.210622",
            "passageMode": 1,
            "timezoneRawOffset": 46_800_000,
            "lockId": 7_252_408,
            "electricQuantity": 90,
            "hardwareRevision": "1.6",
        })
    }

    #[test]
    fn test_lock_detail_parses() {
        let detail: LockDetail = serde_json::from_value(basic_lock_details()).unwrap();
        assert_eq!(detail.id, LockId(7_252_408));
        assert_eq!(detail.name, "Front Door");
        assert_eq!(detail.battery_level, Some(90));
        assert_eq!(detail.auto_lock_seconds, 60);
        assert_eq!(detail.lock_sound, OnOff::Off);
        assert_eq!(detail.model.as_deref(), Some("SN9206_PV53"));
    }

    #[test]
    fn test_lock_detail_minimal() {
        let detail: LockDetail = serde_json::from_value(json!({
            "lockId": 1,
            "lockMac": "00:00:00:00:00:00",
        }))
        .unwrap();
        assert_eq!(detail.name, "Lock");
        assert_eq!(detail.auto_lock_seconds, -1);
        assert_eq!(detail.lock_sound, OnOff::Unknown);
        assert!(detail.feature_value.is_none());
    }

    #[test]
    fn test_lock_status() {
        let locked: LockStatus =
            serde_json::from_value(json!({"state": 0, "electricQuantity": 90})).unwrap();
        assert_eq!(locked.locked, RemoteLockState::Locked);
        assert!(locked.door.is_none());

        let unlocked: LockStatus =
            serde_json::from_value(json!({"state": 1, "sensorState": 1})).unwrap();
        assert_eq!(unlocked.locked, RemoteLockState::Unlocked);
        assert_eq!(unlocked.door, Some(DoorState::Closed));

        let unknown: LockStatus = serde_json::from_value(json!({"state": 2})).unwrap();
        assert_eq!(unknown.locked, RemoteLockState::Unknown);
    }

    #[test]
    fn test_passage_mode_config() {
        let parsed: PassageModeConfig = serde_json::from_value(json!({
            "autoUnlock": 2,
            "isAllDay": 2,
            "endDate": 1200,
            "weekDays": [1, 2, 3, 4, 5, 6, 7],
            "passageMode": 1,
            "startDate": 420,
        }))
        .unwrap();
        let window = PassageModeWindow::from(parsed);
        assert!(window.enabled);
        assert!(!window.all_day);
        assert!(!window.auto_unlock);
        assert_eq!(window.start_minute, 420);
        assert_eq!(window.end_minute, 1200);
        assert_eq!(window.week_days.len(), 7);
    }

    #[test]
    fn test_passage_mode_null_start_end() {
        let parsed: PassageModeConfig = serde_json::from_value(json!({
            "autoUnlock": 2,
            "isAllDay": 1,
            "endDate": null,
            "weekDays": [1, 2, 3, 4, 5, 6, 7],
            "passageMode": 2,
            "startDate": null,
        }))
        .unwrap();
        assert_eq!(parsed.start_minute, 0);
        assert_eq!(parsed.end_minute, 0);
        assert_eq!(parsed.enabled, OnOff::Off);
        assert_eq!(parsed.all_day, OnOff::On);
    }

    #[test]
    fn test_on_off_round_trip_codes() {
        assert_eq!(i64::from(OnOff::from_bool(true)), 1);
        assert_eq!(i64::from(OnOff::from_bool(false)), 2);
        assert_eq!(OnOff::from(7), OnOff::Unknown);
        assert_eq!(OnOff::Unknown.as_bool(), None);
    }

    #[test]
    fn test_webhook_event_decodes() {
        let event = WebhookEvent::decode(json!({
            "lockId": 7_252_408,
            "lockMac": "16:72:4C:CC:01:C4",
            "electricQuantity": 40,
            "serverDate": 1_682_244_497_000_i64,
            "lockDate": 1_682_244_497_000_i64,
            "recordType": 47,
            "username": "test",
            "success": 1,
        }))
        .unwrap();

        assert_eq!(event.lock_id, LockId(7_252_408));
        assert_eq!(event.battery_level, Some(40));
        assert!(event.success);
        assert_eq!(event.user.as_deref(), Some("test"));
        assert_eq!(event.event.describe().action, Action::Lock);
        assert_eq!(event.lock_timestamp.timestamp(), 1_682_244_497);
    }

    #[test]
    fn test_webhook_event_success_as_bool() {
        let event = WebhookEvent::decode(json!({
            "lockId": 1,
            "serverDate": 0,
            "lockDate": 0,
            "recordType": 7,
            "success": false,
        }))
        .unwrap();
        assert!(!event.success);
        assert!(event.user.is_none());
    }

    #[test]
    fn test_webhook_event_missing_field_is_decode_error() {
        let err = WebhookEvent::decode(json!({
            "lockId": 1,
            "recordType": 7,
            "success": 1,
        }))
        .unwrap_err();
        assert!(err.is_decode_error());
    }

    fn passcode(kind: i64, end_ms: i64) -> Passcode {
        serde_json::from_value(json!({
            "keyboardPwdId": 311_183_184,
            "lockId": 7_252_408,
            "keyboardPwdType": kind,
            "keyboardPwdName": "Person A",
            "keyboardPwd": "1234",
            "startDate": 1_682_244_497_000_i64,
            "endDate": end_ms,
            "keyboardPwdVersion": 4,
        }))
        .unwrap()
    }

    #[test]
    fn test_passcode_parses() {
        let code = passcode(2, 0);
        assert_eq!(code.id, 311_183_184);
        assert_eq!(code.passcode, "1234");
        assert_eq!(code.kind, PasscodeType::Permanent);
        assert_eq!(code.kind.name(), "permanent");
        assert_eq!(code.start.unwrap().timestamp(), 1_682_244_497);
        assert!(code.end.is_none());
        assert_eq!(code.display_name(), "Person A");
    }

    #[test]
    fn test_only_temporary_passcodes_expire() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let past = 1_690_000_000_000_i64;
        let future = 1_710_000_000_000_i64;

        assert!(passcode(3, past).is_expired(now));
        assert!(!passcode(3, future).is_expired(now));
        assert!(!passcode(2, past).is_expired(now));
        assert!(!passcode(0, past).is_expired(now));
        assert!(!passcode(3, 0).is_expired(now));
    }

    #[test]
    fn test_record_query_defaults_and_cap() {
        let query = RecordQuery::new(None, None, None, None);
        assert_eq!(query, RecordQuery::default());
        assert_eq!(query.page_size, 50);

        let capped = RecordQuery::new(None, None, Some(0), Some(1_000));
        assert_eq!(capped.page_no, 1);
        assert_eq!(capped.page_size, MAX_RECORD_PAGE_SIZE);
    }

    #[test]
    fn test_lock_record_parses() {
        let page: Page<LockRecord> = serde_json::from_value(json!({
            "list": [{
                "recordId": 9,
                "lockId": 7_252_408,
                "recordTypeFromLock": 17,
                "recordType": 4,
                "success": 1,
                "username": "owner",
                "keyboardPwd": "1234",
                "lockDate": 1_682_244_497_000_i64,
                "serverDate": 1_682_244_498_000_i64,
            }],
            "pageNo": 1,
            "pageSize": 50,
        }))
        .unwrap();

        let record = &page.list[0];
        assert_eq!(record.lock_id, LockId(7_252_408));
        assert_eq!(record.record_type.describe().action, Action::Unlock);
        assert!(record.success);
        assert_eq!(record.keyboard_pwd.as_deref(), Some("1234"));
        assert_eq!(record.server_date.timestamp(), 1_682_244_498);
    }

    #[test]
    fn test_webhook_event_out_of_range_timestamp() {
        let err = WebhookEvent::decode(json!({
            "lockId": 1,
            "serverDate": i64::MAX,
            "lockDate": 0,
            "recordType": 7,
            "success": 1,
        }))
        .unwrap_err();
        assert!(err.is_decode_error());
    }
}
