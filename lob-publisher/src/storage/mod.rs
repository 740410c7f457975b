//! Publisher storage
//!
//! One store per entity kind. Leasing is a single store operation so the
//! selection and the `locked_at` stamp commit together.

mod memory;

pub use memory::MemoryEntityStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entity::OnChainEntity;
use crate::error::PublisherResult;

#[async_trait]
pub trait EntityStore<E: OnChainEntity>: Send + Sync {
    // ==================== Intake ====================

    /// Persist entities whose id is unseen; return new and pre-existing ones
    async fn store_only_new(&self, incoming: Vec<E>) -> PublisherResult<Vec<E>>;

    async fn get(&self, id: &str) -> PublisherResult<Option<E>>;

    /// Organisations that have at least one stored entity
    async fn organisation_ids(&self) -> PublisherResult<Vec<String>>;

    // ==================== Leasing ====================

    /// Select up to `limit` dispatch-eligible entities whose lease is absent
    /// or no newer than `stale_before`, and stamp them with `now` in the same step
    async fn lease_eligible(
        &self,
        organisation_id: &str,
        limit: usize,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> PublisherResult<Vec<E>>;

    /// Clear the lease of the given entities
    async fn unlock(&self, ids: &[String]) -> PublisherResult<()>;

    // ==================== Publish state ====================

    async fn store_all(&self, entities: &[E]) -> PublisherResult<()>;

    async fn find_dispatched_not_finalized(&self, organisation_id: &str, limit: usize) -> PublisherResult<Vec<E>>;
}
