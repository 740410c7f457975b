//! In-memory entity store for tests and development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::EntityStore;
use crate::entity::OnChainEntity;
use crate::error::PublisherResult;

/// Thread-safe map of entities keyed by id
#[derive(Debug)]
pub struct MemoryEntityStore<E> {
    entities: Arc<RwLock<HashMap<String, E>>>,
}

impl<E> Default for MemoryEntityStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> MemoryEntityStore<E> {
    pub fn new() -> Self {
        Self {
            entities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn clear(&self) {
        self.entities.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

fn sort_for_dispatch<E: OnChainEntity>(entities: &mut [E]) {
    entities.sort_by(|a, b| a.entry_date().cmp(&b.entry_date()).then_with(|| a.id().cmp(b.id())));
}

#[async_trait]
impl<E: OnChainEntity> EntityStore<E> for MemoryEntityStore<E> {
    // ==================== Intake ====================

    async fn store_only_new(&self, incoming: Vec<E>) -> PublisherResult<Vec<E>> {
        let mut entities = self.entities.write().await;
        let mut seen = BTreeSet::new();
        let mut result = Vec::with_capacity(incoming.len());

        for entity in incoming {
            if !seen.insert(entity.id().to_string()) {
                continue;
            }
            match entities.get(entity.id()) {
                Some(existing) => result.push(existing.clone()),
                None => {
                    entities.insert(entity.id().to_string(), entity.clone());
                    result.push(entity);
                }
            }
        }
        Ok(result)
    }

    async fn get(&self, id: &str) -> PublisherResult<Option<E>> {
        Ok(self.entities.read().await.get(id).cloned())
    }

    async fn organisation_ids(&self) -> PublisherResult<Vec<String>> {
        let entities = self.entities.read().await;
        let ids: BTreeSet<String> = entities.values().map(|e| e.organisation_id().to_string()).collect();
        Ok(ids.into_iter().collect())
    }

    // ==================== Leasing ====================

    async fn lease_eligible(
        &self,
        organisation_id: &str,
        limit: usize,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> PublisherResult<Vec<E>> {
        let mut entities = self.entities.write().await;

        let mut candidates: Vec<E> = entities
            .values()
            .filter(|e| e.organisation_id() == organisation_id && e.is_leasable(stale_before))
            .cloned()
            .collect();
        sort_for_dispatch(&mut candidates);
        candidates.truncate(limit);

        for candidate in candidates.iter_mut() {
            candidate.set_locked_at(Some(now));
            entities.insert(candidate.id().to_string(), candidate.clone());
        }
        Ok(candidates)
    }

    async fn unlock(&self, ids: &[String]) -> PublisherResult<()> {
        let mut entities = self.entities.write().await;
        for id in ids {
            if let Some(entity) = entities.get_mut(id) {
                entity.set_locked_at(None);
            }
        }
        Ok(())
    }

    // ==================== Publish state ====================

    async fn store_all(&self, updated: &[E]) -> PublisherResult<()> {
        let mut entities = self.entities.write().await;
        for entity in updated {
            entities.insert(entity.id().to_string(), entity.clone());
        }
        Ok(())
    }

    async fn find_dispatched_not_finalized(&self, organisation_id: &str, limit: usize) -> PublisherResult<Vec<E>> {
        let entities = self.entities.read().await;
        let mut found: Vec<E> = entities
            .values()
            .filter(|e| e.organisation_id() == organisation_id)
            .filter(|e| e.publish_status().is_dispatched_not_finalized())
            .cloned()
            .collect();
        sort_for_dispatch(&mut found);
        found.truncate(limit);
        Ok(found)
    }
}
