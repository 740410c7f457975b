//! Finality poller
//!
//! Walks dispatched-but-not-final entities, pulls their finality score from
//! the chain reader and advances the publish status. A submission that never
//! shows up within the grace period is rolled back so it can be dispatched
//! again.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainServices, ChainTip};
use crate::config::{CardanoNetwork, PublisherConfig};
use crate::entity::OnChainEntity;
use crate::error::PublisherResult;
use crate::storage::EntityStore;

/// Outcome of one finality pass over one organisation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalityReport {
    pub checked: usize,
    pub advanced: usize,
    pub finalized: usize,
    pub rolled_back: usize,
    /// Lookups that failed or timed out
    pub errors: usize,
    pub failed_organisations: Vec<String>,
}

impl FinalityReport {
    fn merge(&mut self, other: &FinalityReport) {
        self.checked += other.checked;
        self.advanced += other.advanced;
        self.finalized += other.finalized;
        self.rolled_back += other.rolled_back;
        self.errors += other.errors;
        self.failed_organisations.extend(other.failed_organisations.iter().cloned());
    }
}

pub struct FinalityPoller<E: OnChainEntity, S: EntityStore<E>> {
    store: Arc<S>,
    services: ChainServices,
    network: CardanoNetwork,
    pull_limit: usize,
    grace_slots: u64,
    call_timeout: Duration,
    _entity: PhantomData<fn() -> E>,
}

impl<E: OnChainEntity, S: EntityStore<E>> FinalityPoller<E, S> {
    pub fn new(store: Arc<S>, services: ChainServices, config: &PublisherConfig) -> Self {
        Self {
            store,
            services,
            network: config.network,
            pull_limit: config.finality_pull_limit,
            grace_slots: config.rollback_grace_slots(),
            call_timeout: config.submit_timeout(),
            _entity: PhantomData,
        }
    }

    /// One pass over every organisation
    ///
    /// Skipped entirely while the chain tip is unavailable or not synced.
    /// Failures are logged and isolated per organisation.
    pub async fn poll_all(&self) -> PublisherResult<FinalityReport> {
        let mut total = FinalityReport::default();

        let tip = match tokio::time::timeout(self.call_timeout, self.services.chain_tip.chain_tip(self.network)).await {
            Ok(Ok(tip)) if tip.synced => tip,
            Ok(Ok(_)) => {
                warn!(kind = E::KIND, network = self.network.as_str(), "Chain tip not synced, skipping finality pass");
                return Ok(total);
            }
            Ok(Err(e)) => {
                warn!(kind = E::KIND, network = self.network.as_str(), "Chain tip unavailable: {}", e);
                return Ok(total);
            }
            Err(_) => {
                warn!(kind = E::KIND, network = self.network.as_str(), "Chain tip lookup timed out");
                return Ok(total);
            }
        };

        for organisation_id in self.store.organisation_ids().await? {
            match self.poll_organisation(&organisation_id, tip).await {
                Ok(report) => total.merge(&report),
                Err(e) => {
                    error!(
                        organisation_id = %organisation_id,
                        kind = E::KIND,
                        retriable = e.is_retriable(),
                        "Finality poll failed: {}",
                        e
                    );
                    total.failed_organisations.push(organisation_id);
                }
            }
        }

        Ok(total)
    }

    pub async fn poll_organisation(&self, organisation_id: &str, tip: ChainTip) -> PublisherResult<FinalityReport> {
        if let Err(e) = self.services.updates.flush(organisation_id).await {
            warn!(organisation_id, kind = E::KIND, "Ledger updates still pending: {}", e);
        }

        let pending = self
            .store
            .find_dispatched_not_finalized(organisation_id, self.pull_limit)
            .await?;
        let mut report = FinalityReport {
            checked: pending.len(),
            ..FinalityReport::default()
        };
        let mut changed = Vec::new();

        for mut entity in pending {
            let Some(tx_hash) = entity.l1().transaction_hash.clone() else {
                continue;
            };

            let lookup = tokio::time::timeout(self.call_timeout, self.services.reader.tx_details(&tx_hash)).await;
            let Ok(lookup) = lookup else {
                warn!(
                    organisation_id,
                    kind = E::KIND,
                    id = entity.id(),
                    timeout_secs = self.call_timeout.as_secs(),
                    "Finality lookup timed out"
                );
                report.errors += 1;
                continue;
            };

            match lookup {
                Ok(Some(details)) => {
                    if entity.l1_mut().apply_finality(details.finality_score) {
                        report.advanced += 1;
                        if entity.publish_status().is_terminal() {
                            report.finalized += 1;
                        }
                        changed.push(entity);
                    }
                }
                Ok(None) => {
                    let age = entity.l1().age_in_slots(tip.absolute_slot).unwrap_or(0);
                    if age > self.grace_slots {
                        info!(
                            organisation_id,
                            kind = E::KIND,
                            id = entity.id(),
                            tx_hash = %tx_hash,
                            age_in_slots = age,
                            "Submission not found on chain, rolling back"
                        );
                        entity.l1_mut().rollback();
                        entity.set_locked_at(None);
                        report.rolled_back += 1;
                        changed.push(entity);
                    } else {
                        debug!(organisation_id, id = entity.id(), age_in_slots = age, "Not yet visible on chain");
                    }
                }
                Err(e) => {
                    warn!(organisation_id, kind = E::KIND, id = entity.id(), "Finality lookup failed: {}", e);
                    report.errors += 1;
                }
            }
        }

        if changed.is_empty() {
            return Ok(report);
        }

        self.store.store_all(&changed).await?;

        let updates = changed.iter().map(|e| e.to_ledger_update()).collect();
        if let Err(e) = self.services.updates.publish(organisation_id, updates).await {
            warn!(organisation_id, kind = E::KIND, "Ledger updates queued for the next pass: {}", e);
        }

        debug!(
            organisation_id,
            kind = E::KIND,
            advanced = report.advanced,
            rolled_back = report.rolled_back,
            "Finality pass complete"
        );
        Ok(report)
    }
}
