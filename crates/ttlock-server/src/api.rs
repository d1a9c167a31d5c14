//! HTTP API routes and handlers.
//!
//! - `health` - Service health check
//! - `locks` - Lock state, commands and settings
//! - `webhook` - Push notifications from the TTLock cloud
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod locks;
pub mod openapi;
pub mod webhook;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                          - Health check
/// /api
/// ├── /webhook                     - TTLock cloud callback
/// ├── /locks                       - Lock list
/// │   └── /{id}                    - Lock state
/// │       ├── /lock, /unlock       - Commands
/// │       ├── /refresh             - Poll now
/// │       ├── /passage-mode, /auto-lock, /lock-sound
/// │       ├── /passcodes           - List and create passcodes
/// │       │   └── /cleanup         - Delete expired passcodes
/// │       └── /records             - Lock history
/// └── /openapi.json                - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/webhook", webhook::router())
                .nest("/locks", locks::router()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

#[cfg(test)]
pub(crate) async fn test_server(
    gateway: std::sync::Arc<ttlock_core::gateway::mock::MockGateway>,
) -> axum_test::TestServer {
    use std::sync::Arc;
    use ttlock_core::{CoordinatorSettings, Gateway, LockRegistry};

    let settings = CoordinatorSettings::default();
    let registry = Arc::new(LockRegistry::new(gateway as Arc<dyn Gateway>, settings));
    registry.discover().await.unwrap();

    let state = SharedState::new(registry, settings.timezone);
    axum_test::TestServer::new(create_router(state)).unwrap()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use ttlock_core::gateway::mock::{sample_detail, MockGateway, FEATURES_WITH_SENSOR};
    use ttlock_core::LockId;

    use super::*;

    #[tokio::test]
    async fn test_health_reports_lock_count() {
        let gateway =
            Arc::new(MockGateway::new().with_lock(sample_detail(LockId(3), FEATURES_WITH_SENSOR)));
        let server = test_server(gateway).await;

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["locks"], 1);
    }

    #[tokio::test]
    async fn test_openapi_is_served() {
        let server = test_server(Arc::new(MockGateway::new())).await;

        let body: Value = server.get("/api/openapi.json").await.json();
        assert_eq!(body["info"]["title"], "ttlock-bridge API");
    }
}
