//! Blockchain dispatcher
//!
//! One cycle per organisation: lease, let the strategy pick, build one
//! payload, submit it, stamp what was included and release the rest. A failed
//! build or submit leaves the selection leased; the stale-lease rule is the
//! retry mechanism.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::chain::{ChainServices, DispatchStrategy, TransactionBuilder};
use crate::clock::Clock;
use crate::config::{CardanoNetwork, PublisherConfig};
use crate::entity::OnChainEntity;
use crate::error::{PublisherError, PublisherResult};
use crate::lease::LeaseManager;
use crate::storage::EntityStore;

/// Outcome of one organisation's dispatch cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub leased: usize,
    pub selected: usize,
    pub submitted: usize,
    pub unlocked: usize,
    pub tx_hash: Option<String>,
}

/// Outcome of one dispatch tick across all organisations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub organisations: usize,
    pub submitted: usize,
    pub failed_organisations: Vec<String>,
}

pub struct BlockchainDispatcher<E: OnChainEntity, S: EntityStore<E>> {
    store: Arc<S>,
    leases: LeaseManager<E, S>,
    services: ChainServices,
    builder: Arc<dyn TransactionBuilder<E>>,
    strategy: Arc<dyn DispatchStrategy<E>>,
    network: CardanoNetwork,
    pull_limit: usize,
    call_timeout: Duration,
}

impl<E: OnChainEntity, S: EntityStore<E>> BlockchainDispatcher<E, S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        services: ChainServices,
        builder: Arc<dyn TransactionBuilder<E>>,
        strategy: Arc<dyn DispatchStrategy<E>>,
        config: &PublisherConfig,
        pull_limit: usize,
    ) -> Self {
        Self {
            leases: LeaseManager::new(store.clone(), clock, config.lock_timeout()),
            store,
            services,
            builder,
            strategy,
            network: config.network,
            pull_limit,
            call_timeout: config.submit_timeout(),
        }
    }

    pub fn leases(&self) -> &LeaseManager<E, S> {
        &self.leases
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> PublisherResult<T>
    where
        F: Future<Output = PublisherResult<T>> + Send,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| PublisherError::Timeout {
                operation,
                secs: self.call_timeout.as_secs(),
            })?
    }

    /// Run one dispatch cycle for every organisation with stored entities
    ///
    /// Failures are logged and isolated per organisation.
    pub async fn dispatch_all(&self) -> PublisherResult<DispatchSummary> {
        let mut summary = DispatchSummary::default();

        for organisation_id in self.store.organisation_ids().await? {
            summary.organisations += 1;
            match self.dispatch_organisation(&organisation_id).await {
                Ok(report) => summary.submitted += report.submitted,
                Err(e) => {
                    error!(
                        organisation_id = %organisation_id,
                        kind = E::KIND,
                        retriable = e.is_retriable(),
                        "Dispatch failed: {}",
                        e
                    );
                    summary.failed_organisations.push(organisation_id);
                }
            }
        }

        Ok(summary)
    }

    /// Run one dispatch cycle for one organisation
    pub async fn dispatch_organisation(&self, organisation_id: &str) -> PublisherResult<DispatchReport> {
        if let Err(e) = self.services.updates.flush(organisation_id).await {
            warn!(organisation_id, kind = E::KIND, "Ledger updates still pending: {}", e);
        }

        let leased = self.leases.lease_eligible(organisation_id, self.pull_limit).await?;
        let mut report = DispatchReport {
            leased: leased.len(),
            ..DispatchReport::default()
        };
        if leased.is_empty() {
            return Ok(report);
        }

        let selected = self.strategy.select(organisation_id, leased.clone());
        let selected_ids: HashSet<&str> = selected.iter().map(|e| e.id()).collect();
        let skipped: Vec<E> = leased.iter().filter(|e| !selected_ids.contains(e.id())).cloned().collect();
        self.leases.unlock(&skipped).await?;
        report.selected = selected.len();
        report.unlocked = skipped.len();

        if selected.is_empty() {
            return Ok(report);
        }

        let tip = self
            .bounded("chain tip", self.services.chain_tip.chain_tip(self.network))
            .await?;

        let Some(built) = self
            .bounded("build", self.builder.build(organisation_id, &selected))
            .await?
        else {
            debug!(organisation_id, kind = E::KIND, "Nothing to build");
            self.leases.unlock(&selected).await?;
            report.unlocked += selected.len();
            return Ok(report);
        };

        let submission = self
            .bounded("submit", self.services.submitter.submit(&built.payload))
            .await?;

        let included: HashSet<&str> = built.included_ids.iter().map(String::as_str).collect();
        let (mut submitted, remaining): (Vec<E>, Vec<E>) =
            selected.into_iter().partition(|e| included.contains(e.id()));

        for entity in submitted.iter_mut() {
            entity
                .l1_mut()
                .mark_submitted(&submission.tx_hash, submission.absolute_slot, tip.absolute_slot);
        }
        self.store.store_all(&submitted).await?;
        self.leases.unlock(&remaining).await?;

        report.submitted = submitted.len();
        report.unlocked += remaining.len();
        report.tx_hash = Some(submission.tx_hash.clone());

        info!(
            organisation_id,
            kind = E::KIND,
            tx_hash = %submission.tx_hash,
            submitted = report.submitted,
            remaining = remaining.len(),
            "Blockchain transaction submitted"
        );

        let updates = submitted.iter().map(|e| e.to_ledger_update()).collect();
        if let Err(e) = self.services.updates.publish(organisation_id, updates).await {
            warn!(organisation_id, kind = E::KIND, "Ledger updates queued for the next cycle: {}", e);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{
        BuiltPayload, ChainReader, ChainTip, ChainTipReader, ChannelLedgerUpdatePublisher, ImmediateDispatchStrategy,
        L1Submission, LedgerUpdatePublisher, OnChainTxDetails, SubmissionService,
    };
    use crate::clock::SystemClock;
    use crate::entity::{LedgerUpdate, ReportEntity};
    use crate::storage::MemoryEntityStore;
    use async_trait::async_trait;
    use lob_core::{AccountingPeriod, BlockchainPublishStatus};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    struct FixedTip;

    #[async_trait]
    impl ChainTipReader for FixedTip {
        async fn chain_tip(&self, _network: CardanoNetwork) -> PublisherResult<ChainTip> {
            Ok(ChainTip {
                absolute_slot: 1_000,
                synced: true,
            })
        }
    }

    /// Includes at most `max` entities per payload
    struct CappedBuilder {
        max: usize,
    }

    #[async_trait]
    impl TransactionBuilder<ReportEntity> for CappedBuilder {
        async fn build(&self, _org: &str, entities: &[ReportEntity]) -> PublisherResult<Option<BuiltPayload>> {
            let included_ids: Vec<String> = entities.iter().take(self.max).map(|e| e.id.clone()).collect();
            Ok((!included_ids.is_empty()).then(|| BuiltPayload {
                payload: vec![1, 2, 3],
                included_ids,
            }))
        }
    }

    struct Submitter {
        fail: bool,
    }

    #[async_trait]
    impl SubmissionService for Submitter {
        async fn submit(&self, _payload: &[u8]) -> PublisherResult<L1Submission> {
            if self.fail {
                return Err(PublisherError::Submission("connection reset".into()));
            }
            Ok(L1Submission {
                tx_hash: "beef".into(),
                absolute_slot: None,
            })
        }
    }

    struct NotFound;

    #[async_trait]
    impl ChainReader for NotFound {
        async fn tx_details(&self, _tx_hash: &str) -> PublisherResult<Option<OnChainTxDetails>> {
            Ok(None)
        }
    }

    fn create_test_dispatcher(
        fail: bool,
    ) -> (
        Arc<MemoryEntityStore<ReportEntity>>,
        BlockchainDispatcher<ReportEntity, MemoryEntityStore<ReportEntity>>,
        mpsc::Receiver<Vec<LedgerUpdate>>,
    ) {
        let store = Arc::new(MemoryEntityStore::new());
        let (updates, receiver) = ChannelLedgerUpdatePublisher::channel(8);
        let services = ChainServices::new(
            Arc::new(FixedTip),
            Arc::new(Submitter { fail }),
            Arc::new(NotFound),
            Arc::new(updates),
        );
        (store.clone(), create_test_dispatcher_with(store, services), receiver)
    }

    fn create_test_dispatcher_with(
        store: Arc<MemoryEntityStore<ReportEntity>>,
        services: ChainServices,
    ) -> BlockchainDispatcher<ReportEntity, MemoryEntityStore<ReportEntity>> {
        BlockchainDispatcher::new(
            store,
            Arc::new(SystemClock),
            services,
            Arc::new(CappedBuilder { max: 2 }),
            Arc::new(ImmediateDispatchStrategy),
            &PublisherConfig::default(),
            10,
        )
    }

    /// Rejects the first delivery, accepts everything after
    #[derive(Default)]
    struct FailOncePublisher {
        failed: AtomicBool,
        delivered: tokio::sync::Mutex<Vec<LedgerUpdate>>,
    }

    #[async_trait]
    impl LedgerUpdatePublisher for FailOncePublisher {
        async fn publish(&self, _organisation_id: &str, updates: Vec<LedgerUpdate>) -> PublisherResult<()> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(PublisherError::Configuration("broker unavailable".to_string()));
            }
            self.delivered.lock().await.extend(updates);
            Ok(())
        }
    }

    async fn create_test_reports(store: &MemoryEntityStore<ReportEntity>, count: u32) {
        let reports: Vec<ReportEntity> = (1..=count)
            .map(|m| ReportEntity::new("org-1", "BALANCE_SHEET", AccountingPeriod::new(2024, m), serde_json::json!({})))
            .collect();
        store.store_only_new(reports).await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_success_unlocks_remaining() {
        let (store, dispatcher, mut receiver) = create_test_dispatcher(false);
        create_test_reports(&store, 3).await;

        let report = dispatcher.dispatch_organisation("org-1").await.unwrap();
        assert_eq!(report.submitted, 2);
        assert_eq!(report.unlocked, 1);
        assert_eq!(report.tx_hash.as_deref(), Some("beef"));

        let updates = receiver.recv().await.unwrap();
        assert_eq!(updates.len(), 2);

        let next = dispatcher.dispatch_organisation("org-1").await.unwrap();
        assert_eq!(next.leased, 1);
        assert_eq!(next.submitted, 1);

        let stored = store.find_dispatched_not_finalized("org-1", 10).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored
            .iter()
            .all(|r| r.l1.publish_status == BlockchainPublishStatus::Submitted && r.l1.creation_slot == Some(1_000)));
    }

    #[tokio::test]
    async fn test_failed_submission_keeps_lease() {
        let (store, dispatcher, _receiver) = create_test_dispatcher(true);
        create_test_reports(&store, 1).await;

        let err = dispatcher.dispatch_organisation("org-1").await.unwrap_err();
        assert!(err.is_retriable());

        let again = dispatcher.dispatch_organisation("org-1").await.unwrap();
        assert_eq!(again.leased, 0);

        let summary = dispatcher.dispatch_all().await.unwrap();
        assert_eq!(summary.organisations, 1);
        assert!(summary.failed_organisations.is_empty());
    }

    #[tokio::test]
    async fn test_undelivered_updates_go_out_next_cycle() {
        let store: Arc<MemoryEntityStore<ReportEntity>> = Arc::new(MemoryEntityStore::new());
        let publisher = Arc::new(FailOncePublisher::default());
        let services = ChainServices::new(
            Arc::new(FixedTip),
            Arc::new(Submitter { fail: false }),
            Arc::new(NotFound),
            publisher.clone(),
        );
        let dispatcher = create_test_dispatcher_with(store.clone(), services.clone());
        create_test_reports(&store, 2).await;

        let report = dispatcher.dispatch_organisation("org-1").await.unwrap();
        assert_eq!(report.submitted, 2);
        assert!(publisher.delivered.lock().await.is_empty());
        assert_eq!(services.updates.pending_len("org-1").await, 2);

        let next = dispatcher.dispatch_organisation("org-1").await.unwrap();
        assert_eq!(next.leased, 0);
        assert_eq!(services.updates.pending_len("org-1").await, 0);

        let delivered = publisher.delivered.lock().await;
        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|u| matches!(
            u,
            LedgerUpdate::Report(r) if r.publish_status == BlockchainPublishStatus::Submitted
        )));
    }
}
