//! Application state shared across handlers.

use std::sync::Arc;

use chrono_tz::Tz;
use ttlock_core::LockRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// State type used by every router.
pub type SharedState = AppState;

struct AppStateInner {
    registry: Arc<LockRegistry>,
    timezone: Tz,
}

impl AppState {
    /// Wrap a registry for the handlers.
    #[must_use]
    pub fn new(registry: Arc<LockRegistry>, timezone: Tz) -> Self {
        Self {
            inner: Arc::new(AppStateInner { registry, timezone }),
        }
    }

    /// The lock registry.
    #[must_use]
    pub fn registry(&self) -> &LockRegistry {
        &self.inner.registry
    }

    /// Timezone the locks live in.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.inner.timezone
    }
}
