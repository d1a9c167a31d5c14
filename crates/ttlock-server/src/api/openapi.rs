//! OpenAPI specification for the bridge API.
//!
//! Served at `/api/openapi.json` and written to the workspace root by the
//! `gen-openapi` binary.

use axum::Json;
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::locks::{
    CleanupResponse, CommandResponse, CreatePasscodeRequest, CreatePasscodeResponse,
    DoorSensorResponse, LockListResponse, LockPosition, LockResponse, PassageModeSchedule,
    PasscodeListResponse, PasscodeResponse, RecordListResponse, RecordResponse, ToggleRequest,
};
use super::webhook::WebhookResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// OpenAPI document for ttlock-bridge.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ttlock-bridge API",
        version = "0.1.0",
        description = r#"
# ttlock-bridge API

Keeps a live view of TTLock smart locks by merging webhook pushes from the
TTLock cloud with periodic polls, and relocks doors automatically outside
their passage-mode windows.

## Overview

1. **Webhook**: point the TTLock open platform callback at `/api/webhook`
2. **Locks**: read cached state, lock and unlock, refresh on demand
3. **Settings**: passage-mode schedule, auto-lock and lock sound
4. **Passcodes**: list, create and clean up expired keypad passcodes
5. **Records**: page through a lock's history

Lock and unlock report success once the cloud accepts the command. The bolt
position in lock responses changes when the lock confirms the action.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local bridge")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "locks", description = "Lock state, commands and settings"),
        (name = "passcodes", description = "Keypad passcodes"),
        (name = "records", description = "Lock history"),
        (name = "webhook", description = "Push notifications from the TTLock cloud")
    ),
    paths(
        super::health::health_check,
        super::webhook::receive_webhook,
        super::locks::list_locks,
        super::locks::get_lock,
        super::locks::lock,
        super::locks::unlock,
        super::locks::refresh,
        super::locks::set_passage_mode,
        super::locks::set_auto_lock,
        super::locks::set_lock_sound,
        super::locks::list_passcodes,
        super::locks::create_passcode,
        super::locks::cleanup_passcodes,
        super::locks::list_records,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            WebhookResponse,
            LockListResponse,
            LockResponse,
            LockPosition,
            DoorSensorResponse,
            PassageModeSchedule,
            ToggleRequest,
            CommandResponse,
            PasscodeResponse,
            PasscodeListResponse,
            CreatePasscodeRequest,
            CreatePasscodeResponse,
            CleanupResponse,
            RecordResponse,
            RecordListResponse,
        )
    )
)]
pub struct ApiDoc;
