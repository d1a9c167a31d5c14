//! Background poll scheduler.
//!
//! Refreshes every registered lock on a fixed cadence. Failed refreshes are
//! logged by the registry and simply retried on the next tick. Until lock
//! discovery has succeeded, each tick also retries it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use ttlock_core::LockRegistry;

/// Start polling every `interval`. The first cycle runs one interval from now,
/// since registration already polled every lock.
pub fn spawn(registry: Arc<LockRegistry>, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Starting lock poller");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_cycle(&registry).await;
        }
    })
}

/// Retry discovery if needed, then refresh every lock once. Returns the
/// number of locks that failed.
pub async fn run_cycle(registry: &LockRegistry) -> usize {
    if registry.needs_discovery().await {
        match registry.discover().await {
            Ok(ids) if !ids.is_empty() => info!(count = ids.len(), "Locks registered"),
            Ok(_) => debug!("Discovery found no new locks"),
            Err(e) => warn!(error = %e, recoverable = e.is_recoverable(), "Lock discovery failed"),
        }
    }

    let failures = registry.refresh_all().await;
    debug!(failed = failures.len(), "Poll cycle finished");
    failures.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttlock_core::gateway::mock::{sample_detail, GatewayCall, MockGateway, FEATURES_WITHOUT_SENSOR};
    use ttlock_core::{CoordinatorSettings, Gateway, LockId};

    async fn registry(gateway: &Arc<MockGateway>) -> Arc<LockRegistry> {
        let registry = Arc::new(LockRegistry::new(
            Arc::clone(gateway) as Arc<dyn Gateway>,
            CoordinatorSettings::default(),
        ));
        registry.discover().await.unwrap();
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_refreshes_on_interval() {
        let gateway = Arc::new(MockGateway::new().with_lock(sample_detail(LockId(1), FEATURES_WITHOUT_SENSOR)));
        let registry = registry(&gateway).await;
        let after_register = gateway.call_count(GatewayCall::LockDetail);

        let handle = spawn(Arc::clone(&registry), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(gateway.call_count(GatewayCall::LockDetail), after_register);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(gateway.call_count(GatewayCall::LockDetail), after_register + 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cycle_retries_failed_discovery() {
        let gateway = Arc::new(MockGateway::new().with_lock(sample_detail(LockId(1), FEATURES_WITHOUT_SENSOR)));
        let registry = LockRegistry::new(
            Arc::clone(&gateway) as Arc<dyn Gateway>,
            CoordinatorSettings::default(),
        );

        // the cloud is unreachable at startup
        gateway.fail_reads(true);
        assert!(registry.discover().await.is_err());
        assert_eq!(run_cycle(&registry).await, 0);
        assert!(registry.lock_ids().await.is_empty());
        assert_eq!(gateway.call_count(GatewayCall::ListLocks), 2);

        gateway.fail_reads(false);
        assert_eq!(run_cycle(&registry).await, 0);
        assert_eq!(registry.lock_ids().await, vec![LockId(1)]);

        // discovery is not repeated once locks are registered
        run_cycle(&registry).await;
        assert_eq!(gateway.call_count(GatewayCall::ListLocks), 3);
    }

    #[tokio::test]
    async fn test_cycle_counts_failures() {
        let gateway = Arc::new(
            MockGateway::new()
                .with_lock(sample_detail(LockId(1), FEATURES_WITHOUT_SENSOR))
                .with_lock(sample_detail(LockId(2), FEATURES_WITHOUT_SENSOR)),
        );
        let registry = registry(&gateway).await;

        assert_eq!(run_cycle(&registry).await, 0);
        gateway.fail_reads(true);
        assert_eq!(run_cycle(&registry).await, 2);
    }
}
