//! Push notification endpoint.
//!
//! The TTLock cloud posts lock records here as a form with a JSON-encoded
//! `records` field. JSON bodies (one record, an array, or an object with
//! `records`) are accepted too. Bad records are dropped one by one and never
//! fail the whole request.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use ttlock_core::IngestReport;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the webhook router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(receive_webhook))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// What happened to the pushed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"processed": 2, "dropped": 0}))]
pub struct WebhookResponse {
    /// Records applied to a registered lock.
    #[schema(example = 2, minimum = 0)]
    pub processed: usize,

    /// Malformed records and records for unregistered locks.
    #[schema(example = 0, minimum = 0)]
    pub dropped: usize,
}

impl From<IngestReport> for WebhookResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            processed: report.processed,
            dropped: report.dropped,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Receive lock records pushed by the TTLock cloud.
#[utoipa::path(
    post,
    path = "/api/webhook",
    tag = "webhook",
    operation_id = "receiveWebhook",
    summary = "Receive lock events",
    description = "Callback URL for the TTLock open platform. Accepts \
        `application/x-www-form-urlencoded` with a JSON-encoded `records` field, \
        or a JSON body. Each record updates the cached state of its lock.",
    responses(
        (status = 200, description = "Payload ingested", body = WebhookResponse),
        (status = 400, description = "Body is neither a form nor JSON", body = ErrorResponse)
    )
)]
pub async fn receive_webhook(
    State(state): State<SharedState>,
    request: Request,
) -> ApiResult<Json<WebhookResponse>> {
    let payload = if is_form(request.headers()) {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &state)
            .await
            .map_err(invalid_payload)?;
        form_payload(fields)
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(invalid_payload)?;
        serde_json::from_slice::<Value>(&body).map_err(invalid_payload)?
    };

    let report = state.registry().ingest(payload).await;
    debug!(processed = report.processed, dropped = report.dropped, "Webhook ingested");

    Ok(Json(report.into()))
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

/// Form fields become a JSON object of strings; `records` stays encoded and
/// is decoded during ingestion.
fn form_payload(fields: HashMap<String, String>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    )
}

fn invalid_payload(err: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest {
        error_code: "INVALID_PAYLOAD".to_string(),
        message: format!("Webhook body could not be read: {err}"),
    }
}
