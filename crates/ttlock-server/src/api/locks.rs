//! Lock state and command endpoints.
//!
//! Reads come from the bridge's cached view, so they never touch the cloud.
//! Commands and setting changes go straight to the TTLock cloud; a refused
//! request is reported as `502 Bad Gateway` and leaves the cache unchanged.
//! Passcodes and the lock history are not cached and are always fetched live.

use std::collections::BTreeSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ttlock_core::schedule::MINUTES_PER_DAY;
use ttlock_core::{
    LockCoordinator, LockId, LockRecord, LockState, LockedState, NewPasscode, PassageModeWindow,
    Passcode, RecordQuery,
};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the locks router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_locks))
        .route("/{id}", get(get_lock))
        .route("/{id}/lock", post(lock))
        .route("/{id}/unlock", post(unlock))
        .route("/{id}/refresh", post(refresh))
        .route("/{id}/passage-mode", put(set_passage_mode))
        .route("/{id}/auto-lock", put(set_auto_lock))
        .route("/{id}/lock-sound", put(set_lock_sound))
        .route("/{id}/passcodes", get(list_passcodes).post(create_passcode))
        .route("/{id}/passcodes/cleanup", post(cleanup_passcodes))
        .route("/{id}/records", get(list_records))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Bolt position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LockPosition {
    /// Bolt thrown.
    Locked,
    /// Bolt retracted.
    Unlocked,
    /// Not reported yet.
    Unknown,
}

impl From<LockedState> for LockPosition {
    fn from(state: LockedState) -> Self {
        match state {
            LockedState::Locked => Self::Locked,
            LockedState::Unlocked => Self::Unlocked,
            LockedState::Unknown => Self::Unknown,
        }
    }
}

/// Weekly passage-mode schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "enabled": true,
    "auto_unlock": false,
    "all_day": false,
    "start_minute": 480,
    "end_minute": 1080,
    "week_days": [1, 2, 3, 4, 5]
}))]
pub struct PassageModeSchedule {
    /// Passage mode switched on.
    #[schema(example = true)]
    pub enabled: bool,

    /// Unlock automatically when the window opens.
    #[serde(default)]
    #[schema(example = false)]
    pub auto_unlock: bool,

    /// The window covers the whole of each selected day.
    #[serde(default)]
    #[schema(example = false)]
    pub all_day: bool,

    /// Window start in minutes since local midnight.
    #[serde(default)]
    #[schema(example = 480, minimum = 0, maximum = 1439)]
    pub start_minute: u16,

    /// Window end in minutes since local midnight. At or before the start wraps past midnight.
    #[serde(default)]
    #[schema(example = 1080, minimum = 0, maximum = 1439)]
    pub end_minute: u16,

    /// Selected weekdays, Monday = 1 through Sunday = 7.
    #[serde(default)]
    pub week_days: Vec<u8>,
}

impl PassageModeSchedule {
    fn into_window(self) -> ApiResult<PassageModeWindow> {
        if self.start_minute >= MINUTES_PER_DAY || self.end_minute >= MINUTES_PER_DAY {
            return Err(invalid_schedule(format!(
                "start_minute and end_minute must be below {MINUTES_PER_DAY}"
            )));
        }
        if let Some(day) = self.week_days.iter().find(|d| !(1..=7).contains(*d)) {
            return Err(invalid_schedule(format!(
                "week day {day} is out of range, expected 1 (Monday) to 7 (Sunday)"
            )));
        }

        Ok(PassageModeWindow {
            enabled: self.enabled,
            auto_unlock: self.auto_unlock,
            all_day: self.all_day,
            start_minute: self.start_minute,
            end_minute: self.end_minute,
            week_days: self.week_days.into_iter().collect::<BTreeSet<u8>>(),
        })
    }
}

impl From<&PassageModeWindow> for PassageModeSchedule {
    fn from(window: &PassageModeWindow) -> Self {
        Self {
            enabled: window.enabled,
            auto_unlock: window.auto_unlock,
            all_day: window.all_day,
            start_minute: window.start_minute,
            end_minute: window.end_minute,
            week_days: window.week_days.iter().copied().collect(),
        }
    }
}

fn invalid_schedule(message: String) -> ApiError {
    ApiError::BadRequest {
        error_code: "INVALID_PASSAGE_MODE".to_string(),
        message,
    }
}

/// Door sensor readings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DoorSensorResponse {
    /// Door open, if reported.
    #[schema(example = false, nullable)]
    pub opened: Option<bool>,

    /// Sensor battery percentage.
    #[schema(example = 80, nullable)]
    pub battery: Option<u8>,
}

/// Cached state of one lock.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 12345,
    "name": "Front Door",
    "mac": "16:72:4C:CC:01:C4",
    "model": "SN9206_PV53",
    "hardware_version": "1.6",
    "firmware_version": "6.0.6.210622",
    "features": ["LOCK_REMOTELY", "UNLOCK_VIA_GATEWAY", "DOOR_SENSOR", "PASSAGE_MODE"],
    "locked": "locked",
    "battery_level": 90,
    "action_pending": false,
    "last_user": "owner",
    "last_reason": "lock by app",
    "lock_sound": true,
    "door_sensor": {"opened": false, "battery": 80},
    "auto_lock_seconds": 10,
    "auto_lock_enabled": true,
    "passage_mode": null,
    "passage_mode_active": false,
    "relock_pending": false
}))]
pub struct LockResponse {
    /// Cloud identifier of the lock.
    #[schema(example = 12345)]
    pub id: i64,

    /// Display name.
    #[schema(example = "Front Door")]
    pub name: String,

    /// Bluetooth MAC address.
    #[schema(example = "16:72:4C:CC:01:C4")]
    pub mac: String,

    /// Hardware model.
    #[schema(nullable)]
    pub model: Option<String>,

    /// Hardware revision.
    #[schema(nullable)]
    pub hardware_version: Option<String>,

    /// Firmware revision.
    #[schema(nullable)]
    pub firmware_version: Option<String>,

    /// Named capabilities.
    pub features: Vec<String>,

    /// Bolt position.
    pub locked: LockPosition,

    /// Lock battery percentage.
    #[schema(example = 90, nullable)]
    pub battery_level: Option<u8>,

    /// A lock or unlock command is in flight.
    pub action_pending: bool,

    /// User behind the latest processed event.
    #[schema(nullable)]
    pub last_user: Option<String>,

    /// Description of the latest processed event.
    #[schema(nullable)]
    pub last_reason: Option<String>,

    /// Whether the lock beeps.
    #[schema(nullable)]
    pub lock_sound: Option<bool>,

    /// Door sensor, for locks that have one.
    #[schema(nullable)]
    pub door_sensor: Option<DoorSensorResponse>,

    /// Relock delay in seconds. Zero or negative means auto-lock is off.
    #[schema(nullable)]
    pub auto_lock_seconds: Option<i64>,

    /// Auto-lock is switched on.
    pub auto_lock_enabled: bool,

    /// Passage-mode schedule.
    #[schema(nullable)]
    pub passage_mode: Option<PassageModeSchedule>,

    /// Passage mode currently holds the lock open.
    pub passage_mode_active: bool,

    /// An auto-relock is scheduled.
    pub relock_pending: bool,
}

impl LockResponse {
    fn from_state(lock_id: LockId, state: &LockState) -> Self {
        Self {
            id: lock_id.0,
            name: state.name.clone(),
            mac: state.mac.clone(),
            model: state.model.clone(),
            hardware_version: state.hardware_version.clone(),
            firmware_version: state.firmware_version.clone(),
            features: state.features.names().into_iter().map(str::to_string).collect(),
            locked: state.locked.into(),
            battery_level: state.battery_level,
            action_pending: state.action_pending,
            last_user: state.last_user.clone(),
            last_reason: state.last_reason.clone(),
            lock_sound: state.lock_sound,
            door_sensor: state.sensor.as_ref().map(|sensor| DoorSensorResponse {
                opened: sensor.opened,
                battery: sensor.battery,
            }),
            auto_lock_seconds: state.auto_lock_seconds,
            auto_lock_enabled: state.auto_lock_enabled(),
            passage_mode: state.passage_mode_config.as_ref().map(PassageModeSchedule::from),
            passage_mode_active: false,
            relock_pending: false,
        }
    }

    async fn describe(coordinator: &LockCoordinator) -> Self {
        let mut response = Self::from_state(coordinator.lock_id(), &coordinator.current_state().await);
        response.passage_mode_active = coordinator.passage_mode_active().await;
        response.relock_pending = coordinator.relock_pending().await;
        response
    }
}

/// All registered locks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LockListResponse {
    /// Locks sorted by id.
    pub locks: Vec<LockResponse>,
}

/// Switch a setting on or off.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({"enabled": true}))]
pub struct ToggleRequest {
    /// Desired setting.
    #[schema(example = true)]
    pub enabled: bool,
}

/// Result of an accepted command or setting change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommandResponse {
    /// Always `true`; refusals are reported as errors.
    #[schema(example = true)]
    pub success: bool,

    /// Lock state after the request.
    pub lock: LockResponse,
}

impl CommandResponse {
    async fn accepted(coordinator: &LockCoordinator) -> Json<Self> {
        Json(Self {
            success: true,
            lock: LockResponse::describe(coordinator).await,
        })
    }
}

/// A keypad passcode stored on a lock.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 311183184,
    "name": "Person A",
    "passcode": "1234",
    "type": "temporary",
    "start_date": "2024-05-01T08:00:00Z",
    "end_date": "2024-05-03T18:00:00Z",
    "expired": true
}))]
pub struct PasscodeResponse {
    /// Cloud identifier of the passcode.
    pub id: i64,

    /// Label given when the passcode was created.
    #[schema(nullable)]
    pub name: Option<String>,

    /// The digits.
    pub passcode: String,

    /// `permanent`, `temporary` or `unknown`.
    #[serde(rename = "type")]
    #[schema(example = "temporary")]
    pub kind: String,

    /// Start of validity.
    #[schema(nullable)]
    pub start_date: Option<DateTime<Utc>>,

    /// End of validity.
    #[schema(nullable)]
    pub end_date: Option<DateTime<Utc>>,

    /// A temporary passcode past its end date.
    pub expired: bool,
}

impl PasscodeResponse {
    fn from_passcode(code: Passcode, now: DateTime<Utc>) -> Self {
        Self {
            expired: code.is_expired(now),
            id: code.id,
            name: code.name,
            passcode: code.passcode,
            kind: code.kind.name().to_string(),
            start_date: code.start,
            end_date: code.end,
        }
    }
}

/// Passcodes of one lock.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasscodeListResponse {
    /// Passcodes in the order the cloud lists them.
    pub passcodes: Vec<PasscodeResponse>,
}

/// A custom passcode to add.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "passcode": "246810",
    "name": "Cleaner",
    "start_date": "2024-05-01T08:00:00Z",
    "end_date": "2024-05-01T12:00:00Z"
}))]
pub struct CreatePasscodeRequest {
    /// 4 to 9 digits.
    #[schema(example = "246810")]
    pub passcode: String,

    /// Label shown in the TTLock app.
    #[schema(example = "Cleaner")]
    pub name: String,

    /// Start of validity.
    pub start_date: DateTime<Utc>,

    /// End of validity. Must be after the start.
    pub end_date: DateTime<Utc>,
}

impl CreatePasscodeRequest {
    fn into_new_passcode(self) -> ApiResult<NewPasscode> {
        let digits = self.passcode.chars().all(|c| c.is_ascii_digit());
        if !digits || !(4..=9).contains(&self.passcode.len()) {
            return Err(invalid_passcode("passcode must be 4 to 9 digits".to_string()));
        }
        if self.end_date <= self.start_date {
            return Err(invalid_passcode("end_date must be after start_date".to_string()));
        }

        Ok(NewPasscode {
            passcode: self.passcode,
            name: self.name,
            start: self.start_date,
            end: self.end_date,
        })
    }
}

fn invalid_passcode(message: String) -> ApiError {
    ApiError::BadRequest {
        error_code: "INVALID_PASSCODE".to_string(),
        message,
    }
}

/// A passcode was added.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePasscodeResponse {
    /// Always `true`; refusals are reported as errors.
    #[schema(example = true)]
    pub success: bool,

    /// Cloud identifier of the new passcode.
    #[schema(example = 311183185)]
    pub id: i64,
}

/// Expired passcodes that were deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"removed": ["Person A"]}))]
pub struct CleanupResponse {
    /// Names of the deleted passcodes.
    pub removed: Vec<String>,
}

/// Filter and page for the lock history.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecordListParams {
    /// Only records at or after this instant (RFC 3339).
    pub start_date: Option<DateTime<Utc>>,

    /// Only records at or before this instant (RFC 3339).
    pub end_date: Option<DateTime<Utc>>,

    /// 1-based page number. Defaults to 1.
    #[param(minimum = 1)]
    pub page_no: Option<u32>,

    /// Records per page. Defaults to 50, capped at 200.
    #[param(minimum = 1, maximum = 200)]
    pub page_size: Option<u32>,
}

impl From<RecordListParams> for RecordQuery {
    fn from(params: RecordListParams) -> Self {
        Self::new(params.start_date, params.end_date, params.page_no, params.page_size)
    }
}

/// One entry of a lock's history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordResponse {
    /// Cloud identifier of the record.
    pub id: i64,

    /// Lock the record belongs to.
    pub lock_id: i64,

    /// Record type code.
    #[schema(example = 4)]
    pub record_type: i64,

    /// What the record type means.
    #[schema(example = "unlock by passcode")]
    pub description: String,

    /// Raw type code as stored by the lock.
    #[schema(nullable)]
    pub record_type_from_lock: Option<i64>,

    /// Whether the operation succeeded.
    pub success: bool,

    /// Account that triggered the record.
    #[schema(nullable)]
    pub username: Option<String>,

    /// Passcode entered, for keypad records.
    #[schema(nullable)]
    pub keyboard_pwd: Option<String>,

    /// When the lock produced the record.
    pub lock_date: DateTime<Utc>,

    /// When the cloud received the record.
    pub server_date: DateTime<Utc>,
}

impl From<LockRecord> for RecordResponse {
    fn from(record: LockRecord) -> Self {
        Self {
            id: record.id,
            lock_id: record.lock_id.0,
            record_type: record.record_type.0,
            description: record.record_type.describe().description.to_string(),
            record_type_from_lock: record.record_type_from_lock,
            success: record.success,
            username: record.username,
            keyboard_pwd: record.keyboard_pwd,
            lock_date: record.lock_date,
            server_date: record.server_date,
        }
    }
}

/// One page of a lock's history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordListResponse {
    /// Records on this page.
    pub records: Vec<RecordResponse>,

    /// Page that was fetched.
    pub page_no: u32,

    /// Page size that was used, after capping.
    pub page_size: u32,
}

// ============================================================================
// Handlers
// ============================================================================

/// List every registered lock.
#[utoipa::path(
    get,
    path = "/api/locks",
    tag = "locks",
    operation_id = "listLocks",
    summary = "List locks",
    description = "Returns the cached state of every lock registered with the bridge.",
    responses(
        (status = 200, description = "Locks retrieved", body = LockListResponse)
    )
)]
pub async fn list_locks(State(state): State<SharedState>) -> Json<LockListResponse> {
    let mut locks = Vec::new();
    for lock_id in state.registry().lock_ids().await {
        // deregistered between the two calls
        if let Ok(coordinator) = state.registry().get(lock_id).await {
            locks.push(LockResponse::describe(&coordinator).await);
        }
    }
    Json(LockListResponse { locks })
}

/// Get one lock.
#[utoipa::path(
    get,
    path = "/api/locks/{id}",
    tag = "locks",
    operation_id = "getLock",
    summary = "Get lock state",
    params(("id" = i64, Path, description = "Lock id")),
    responses(
        (status = 200, description = "Lock retrieved", body = LockResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse)
    )
)]
pub async fn get_lock(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LockResponse>> {
    let coordinator = state.registry().get(LockId(id)).await?;
    Ok(Json(LockResponse::describe(&coordinator).await))
}

/// Lock the door.
#[utoipa::path(
    post,
    path = "/api/locks/{id}/lock",
    tag = "locks",
    operation_id = "lockLock",
    summary = "Lock",
    description = "Sends a lock command through the cloud. The reported bolt \
        position changes once the lock confirms via webhook or the next poll.",
    params(("id" = i64, Path, description = "Lock id")),
    responses(
        (status = 200, description = "Command accepted", body = CommandResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud refused the command", body = ErrorResponse)
    )
)]
pub async fn lock(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CommandResponse>> {
    let coordinator = state.registry().get(LockId(id)).await?;
    if !coordinator.lock().await {
        return Err(ApiError::command_failed("lock"));
    }
    Ok(CommandResponse::accepted(&coordinator).await)
}

/// Unlock the door.
#[utoipa::path(
    post,
    path = "/api/locks/{id}/unlock",
    tag = "locks",
    operation_id = "unlockLock",
    summary = "Unlock",
    description = "Sends an unlock command through the cloud. If auto-lock is on \
        and passage mode is not active, the bridge relocks after the configured delay \
        once the unlock is confirmed.",
    params(("id" = i64, Path, description = "Lock id")),
    responses(
        (status = 200, description = "Command accepted", body = CommandResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud refused the command", body = ErrorResponse)
    )
)]
pub async fn unlock(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CommandResponse>> {
    let coordinator = state.registry().get(LockId(id)).await?;
    if !coordinator.unlock().await {
        return Err(ApiError::command_failed("unlock"));
    }
    Ok(CommandResponse::accepted(&coordinator).await)
}

/// Poll the cloud now.
#[utoipa::path(
    post,
    path = "/api/locks/{id}/refresh",
    tag = "locks",
    operation_id = "refreshLock",
    summary = "Refresh lock state",
    description = "Polls the cloud immediately instead of waiting for the next poll cycle.",
    params(("id" = i64, Path, description = "Lock id")),
    responses(
        (status = 200, description = "Lock refreshed", body = LockResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud returned an error", body = ErrorResponse),
        (status = 503, description = "Cloud unreachable", body = ErrorResponse)
    )
)]
pub async fn refresh(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LockResponse>> {
    let coordinator = state.registry().get(LockId(id)).await?;
    coordinator.refresh().await?;
    Ok(Json(LockResponse::describe(&coordinator).await))
}

/// Replace the passage-mode schedule.
#[utoipa::path(
    put,
    path = "/api/locks/{id}/passage-mode",
    tag = "locks",
    operation_id = "setPassageMode",
    summary = "Set passage mode",
    description = "Replaces the weekly passage-mode window. Times are minutes since \
        midnight in the bridge's configured timezone.",
    params(("id" = i64, Path, description = "Lock id")),
    request_body = PassageModeSchedule,
    responses(
        (status = 200, description = "Schedule saved", body = CommandResponse),
        (status = 400, description = "Invalid schedule", body = ErrorResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud refused the change", body = ErrorResponse)
    )
)]
pub async fn set_passage_mode(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<PassageModeSchedule>,
) -> ApiResult<Json<CommandResponse>> {
    let window = body.into_window()?;
    let coordinator = state.registry().get(LockId(id)).await?;
    if !coordinator.set_passage_mode(window).await {
        return Err(ApiError::command_failed("passage mode"));
    }
    Ok(CommandResponse::accepted(&coordinator).await)
}

/// Switch auto-lock on or off.
#[utoipa::path(
    put,
    path = "/api/locks/{id}/auto-lock",
    tag = "locks",
    operation_id = "setAutoLock",
    summary = "Set auto-lock",
    description = "Turning auto-lock on applies the bridge's configured relock delay.",
    params(("id" = i64, Path, description = "Lock id")),
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Setting saved", body = CommandResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud refused the change", body = ErrorResponse)
    )
)]
pub async fn set_auto_lock(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<ToggleRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let coordinator = state.registry().get(LockId(id)).await?;
    if !coordinator.set_auto_lock(body.enabled).await {
        return Err(ApiError::command_failed("auto-lock"));
    }
    Ok(CommandResponse::accepted(&coordinator).await)
}

/// Switch the lock sound on or off.
#[utoipa::path(
    put,
    path = "/api/locks/{id}/lock-sound",
    tag = "locks",
    operation_id = "setLockSound",
    summary = "Set lock sound",
    params(("id" = i64, Path, description = "Lock id")),
    request_body = ToggleRequest,
    responses(
        (status = 200, description = "Setting saved", body = CommandResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud refused the change", body = ErrorResponse)
    )
)]
pub async fn set_lock_sound(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<ToggleRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let coordinator = state.registry().get(LockId(id)).await?;
    if !coordinator.set_lock_sound(body.enabled).await {
        return Err(ApiError::command_failed("lock sound"));
    }
    Ok(CommandResponse::accepted(&coordinator).await)
}

/// List a lock's passcodes.
#[utoipa::path(
    get,
    path = "/api/locks/{id}/passcodes",
    tag = "passcodes",
    operation_id = "listPasscodes",
    summary = "List passcodes",
    params(("id" = i64, Path, description = "Lock id")),
    responses(
        (status = 200, description = "Passcodes retrieved", body = PasscodeListResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud returned an error", body = ErrorResponse),
        (status = 503, description = "Cloud unreachable", body = ErrorResponse)
    )
)]
pub async fn list_passcodes(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PasscodeListResponse>> {
    let coordinator = state.registry().get(LockId(id)).await?;
    let now = Utc::now();
    let passcodes = coordinator
        .passcodes()
        .await?
        .into_iter()
        .map(|code| PasscodeResponse::from_passcode(code, now))
        .collect();
    Ok(Json(PasscodeListResponse { passcodes }))
}

/// Add a custom passcode.
#[utoipa::path(
    post,
    path = "/api/locks/{id}/passcodes",
    tag = "passcodes",
    operation_id = "createPasscode",
    summary = "Create passcode",
    description = "Adds a passcode valid between the given instants, pushed to the lock \
        through its gateway.",
    params(("id" = i64, Path, description = "Lock id")),
    request_body = CreatePasscodeRequest,
    responses(
        (status = 201, description = "Passcode created", body = CreatePasscodeResponse),
        (status = 400, description = "Invalid passcode", body = ErrorResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud refused the passcode", body = ErrorResponse)
    )
)]
pub async fn create_passcode(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<CreatePasscodeRequest>,
) -> ApiResult<(StatusCode, Json<CreatePasscodeResponse>)> {
    let passcode = body.into_new_passcode()?;
    let coordinator = state.registry().get(LockId(id)).await?;
    let id = coordinator.create_passcode(&passcode).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatePasscodeResponse { success: true, id }),
    ))
}

/// Delete expired passcodes.
#[utoipa::path(
    post,
    path = "/api/locks/{id}/passcodes/cleanup",
    tag = "passcodes",
    operation_id = "cleanupPasscodes",
    summary = "Remove expired passcodes",
    description = "Deletes every temporary passcode whose end date has passed. \
        Permanent passcodes are never removed.",
    params(("id" = i64, Path, description = "Lock id")),
    responses(
        (status = 200, description = "Cleanup finished", body = CleanupResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud returned an error", body = ErrorResponse),
        (status = 503, description = "Cloud unreachable", body = ErrorResponse)
    )
)]
pub async fn cleanup_passcodes(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CleanupResponse>> {
    let coordinator = state.registry().get(LockId(id)).await?;
    let removed = coordinator.cleanup_expired_passcodes().await?;
    Ok(Json(CleanupResponse { removed }))
}

/// Read the lock's history.
#[utoipa::path(
    get,
    path = "/api/locks/{id}/records",
    tag = "records",
    operation_id = "listRecords",
    summary = "List lock records",
    params(("id" = i64, Path, description = "Lock id"), RecordListParams),
    responses(
        (status = 200, description = "Records retrieved", body = RecordListResponse),
        (status = 400, description = "Invalid query", body = ErrorResponse),
        (status = 404, description = "Lock not registered", body = ErrorResponse),
        (status = 502, description = "Cloud returned an error", body = ErrorResponse),
        (status = 503, description = "Cloud unreachable", body = ErrorResponse)
    )
)]
pub async fn list_records(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(params): Query<RecordListParams>,
) -> ApiResult<Json<RecordListResponse>> {
    let query = RecordQuery::from(params);
    let coordinator = state.registry().get(LockId(id)).await?;
    let records = coordinator
        .records(&query)
        .await?
        .into_iter()
        .map(RecordResponse::from)
        .collect();
    Ok(Json(RecordListResponse {
        records,
        page_no: query.page_no,
        page_size: query.page_size,
    }))
}
