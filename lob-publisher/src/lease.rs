//! Dispatch lease manager
//!
//! A lease is nothing more than `locked_at` plus a timeout. A dispatcher that
//! crashes mid-cycle never releases its rows explicitly; they become eligible
//! again once the lease goes stale.

use chrono::Duration;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::entity::OnChainEntity;
use crate::error::PublisherResult;
use crate::storage::EntityStore;

pub struct LeaseManager<E: OnChainEntity, S: EntityStore<E>> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    lock_timeout: Duration,
    _entity: PhantomData<fn() -> E>,
}

impl<E: OnChainEntity, S: EntityStore<E>> LeaseManager<E, S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            lock_timeout,
            _entity: PhantomData,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Lease up to `limit` eligible entities of one organisation
    pub async fn lease_eligible(&self, organisation_id: &str, limit: usize) -> PublisherResult<Vec<E>> {
        let now = self.clock.now();
        let leased = self
            .store
            .lease_eligible(organisation_id, limit, now, now - self.lock_timeout)
            .await?;

        debug!(organisation_id, kind = E::KIND, leased = leased.len(), "Lease acquired");
        Ok(leased)
    }

    /// Release the lease on the given entities
    pub async fn unlock(&self, entities: &[E]) -> PublisherResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = entities.iter().map(|e| e.id().to_string()).collect();
        self.store.unlock(&ids).await?;

        debug!(kind = E::KIND, unlocked = ids.len(), "Lease released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entity::ReportEntity;
    use crate::storage::MemoryEntityStore;
    use chrono::Utc;
    use lob_core::AccountingPeriod;

    fn create_test_manager() -> (
        Arc<ManualClock>,
        Arc<MemoryEntityStore<ReportEntity>>,
        LeaseManager<ReportEntity, MemoryEntityStore<ReportEntity>>,
    ) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryEntityStore::new());
        let manager = LeaseManager::new(store.clone(), clock.clone(), Duration::hours(3));
        (clock, store, manager)
    }

    #[tokio::test]
    async fn test_leased_rows_are_skipped_until_unlocked() {
        let (_, store, manager) = create_test_manager();
        let report = ReportEntity::new("org-1", "BALANCE_SHEET", AccountingPeriod::new(2024, 1), serde_json::json!({}));
        store.store_only_new(vec![report]).await.unwrap();

        let first = manager.lease_eligible("org-1", 10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(manager.lease_eligible("org-1", 10).await.unwrap().is_empty());

        manager.unlock(&first).await.unwrap();
        assert_eq!(manager.lease_eligible("org-1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_lease_is_reclaimed() {
        let (clock, store, manager) = create_test_manager();
        let report = ReportEntity::new("org-1", "BALANCE_SHEET", AccountingPeriod::new(2024, 1), serde_json::json!({}));
        store.store_only_new(vec![report]).await.unwrap();

        assert_eq!(manager.lease_eligible("org-1", 10).await.unwrap().len(), 1);

        clock.advance(Duration::hours(3) - Duration::seconds(1));
        assert!(manager.lease_eligible("org-1", 10).await.unwrap().is_empty());

        clock.advance(Duration::seconds(1));
        assert_eq!(manager.lease_eligible("org-1", 10).await.unwrap().len(), 1);
    }
}
