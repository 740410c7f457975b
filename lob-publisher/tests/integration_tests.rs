//! Integration tests for the publisher
//!
//! Fake chain collaborators stand in for the node, indexer and builder; the
//! stores are the in-memory ones.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use lob_core::organisation::ChartOfAccount;
use lob_core::{
    AccountingPeriod, AccountingStorage, BatchAggregator, BlockchainPublishStatus, BusinessRulesProcessor,
    CoreConfig, Document, FinalityScore, InMemoryOrganisationLookup, IngestionService, LedgerDispatchStatus,
    LedgerService, MemoryStorage, OperationType, Organisation, OrganisationLookup, PipelineMode, Transaction,
    TransactionItem, TransactionProcessingStatus, TransactionType, TtlCache, TxStatusUpdate,
};
use lob_publisher::{
    BlockchainDispatcher, BuiltPayload, CardanoNetwork, ChainReader, ChainServices, ChainTip, ChainTipReader,
    ChannelLedgerUpdatePublisher, Clock, EntityStore, ImmediateDispatchStrategy, L1Submission, LeaseManager,
    LedgerUpdate, ManualClock, MaxBatchDispatchStrategy, MemoryEntityStore, OnChainEntity, OnChainTxDetails,
    PublisherConfig, PublisherError, PublisherResult, PublisherService, ReportEntity, SubmissionService,
    TransactionBuilder, TransactionEntity,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

const ORG: &str = "org-1";

// ============ Fakes ============

/// Node, indexer and submit API in one
struct FakeChain {
    tip_slot: AtomicU64,
    submissions: AtomicU64,
    failing_orgs: RwLock<HashSet<String>>,
    scores: RwLock<HashMap<String, FinalityScore>>,
}

impl FakeChain {
    fn new() -> Self {
        Self {
            tip_slot: AtomicU64::new(5_000),
            submissions: AtomicU64::new(0),
            failing_orgs: RwLock::new(HashSet::new()),
            scores: RwLock::new(HashMap::new()),
        }
    }

    async fn fail_for(&self, organisation_id: &str) {
        self.failing_orgs.write().await.insert(organisation_id.to_string());
    }

    async fn set_score(&self, tx_hash: &str, score: FinalityScore) {
        self.scores.write().await.insert(tx_hash.to_string(), score);
    }
}

#[async_trait]
impl ChainTipReader for FakeChain {
    async fn chain_tip(&self, _network: CardanoNetwork) -> PublisherResult<ChainTip> {
        Ok(ChainTip {
            absolute_slot: self.tip_slot.load(Ordering::SeqCst),
            synced: true,
        })
    }
}

#[async_trait]
impl SubmissionService for FakeChain {
    async fn submit(&self, payload: &[u8]) -> PublisherResult<L1Submission> {
        let body: serde_json::Value = serde_json::from_slice(payload)?;
        let organisation_id = body["org"].as_str().unwrap_or_default();
        if self.failing_orgs.read().await.contains(organisation_id) {
            return Err(PublisherError::Submission(format!("rejected for {}", organisation_id)));
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(L1Submission {
            tx_hash: format!("tx-{}", n),
            absolute_slot: None,
        })
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn tx_details(&self, tx_hash: &str) -> PublisherResult<Option<OnChainTxDetails>> {
        Ok(self
            .scores
            .read()
            .await
            .get(tx_hash)
            .map(|score| OnChainTxDetails { finality_score: *score }))
    }
}

/// Serializes organisation and ids; optionally caps how many it includes
struct JsonBuilder {
    max: Option<usize>,
}

#[async_trait]
impl<E: OnChainEntity> TransactionBuilder<E> for JsonBuilder {
    async fn build(&self, organisation_id: &str, entities: &[E]) -> PublisherResult<Option<BuiltPayload>> {
        let take = self.max.unwrap_or(entities.len());
        let ids: Vec<String> = entities.iter().take(take).map(|e| e.id().to_string()).collect();
        if ids.is_empty() {
            return Ok(None);
        }
        let payload = serde_json::to_vec(&serde_json::json!({ "org": organisation_id, "ids": ids }))?;
        Ok(Some(BuiltPayload {
            payload,
            included_ids: ids,
        }))
    }
}

struct NothingToBuild;

#[async_trait]
impl<E: OnChainEntity> TransactionBuilder<E> for NothingToBuild {
    async fn build(&self, _organisation_id: &str, _entities: &[E]) -> PublisherResult<Option<BuiltPayload>> {
        Ok(None)
    }
}

// ============ Helpers ============

type TestService = PublisherService<MemoryEntityStore<TransactionEntity>, MemoryEntityStore<ReportEntity>>;
type ReportDispatcher = BlockchainDispatcher<ReportEntity, MemoryEntityStore<ReportEntity>>;

fn create_test_services(chain: &Arc<FakeChain>) -> (ChainServices, mpsc::Receiver<Vec<LedgerUpdate>>) {
    let (updates, receiver) = ChannelLedgerUpdatePublisher::channel(64);
    let services = ChainServices::new(chain.clone(), chain.clone(), chain.clone(), Arc::new(updates));
    (services, receiver)
}

async fn create_test_service(
    chain: &Arc<FakeChain>,
    config: PublisherConfig,
) -> (TestService, mpsc::Receiver<Vec<LedgerUpdate>>) {
    let (updates, receiver) = ChannelLedgerUpdatePublisher::channel(64);
    let service = PublisherService::builder()
        .config(config)
        .transaction_store(Arc::new(MemoryEntityStore::new()))
        .report_store(Arc::new(MemoryEntityStore::new()))
        .chain_tip(chain.clone())
        .submitter(chain.clone())
        .chain_reader(chain.clone())
        .ledger_updates(Arc::new(updates))
        .transaction_builder(Arc::new(JsonBuilder { max: None }))
        .report_builder(Arc::new(JsonBuilder { max: None }))
        .report_strategy(Arc::new(MaxBatchDispatchStrategy::new(1)))
        .build()
        .await
        .unwrap();
    (service, receiver)
}

fn create_test_dispatcher(
    store: Arc<MemoryEntityStore<ReportEntity>>,
    clock: Arc<dyn Clock>,
    chain: &Arc<FakeChain>,
    builder: Arc<dyn TransactionBuilder<ReportEntity>>,
) -> ReportDispatcher {
    let (services, _receiver) = create_test_services(chain);
    BlockchainDispatcher::new(
        store,
        clock,
        services,
        builder,
        Arc::new(ImmediateDispatchStrategy),
        &PublisherConfig::default(),
        50,
    )
}

fn create_test_report(organisation_id: &str, year: i32, month: u32) -> ReportEntity {
    ReportEntity::new(
        organisation_id,
        "INCOME_STATEMENT",
        AccountingPeriod::new(year, month),
        serde_json::json!({ "revenue": "1000.00" }),
    )
}

fn create_approved_transaction(number: &str) -> Transaction {
    let line = |op| {
        TransactionItem::new("", op, Decimal::new(250, 0), Decimal::new(250, 0))
            .with_debit("6000")
            .with_credit("2000")
            .with_document(Document::new(format!("INV-{}", number), "CHF"))
    };
    let mut tx = Transaction::new(
        ORG,
        number,
        TransactionType::VendorBill,
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
    )
    .with_item(line(OperationType::Debit))
    .with_item(line(OperationType::Credit));
    tx.ledger_dispatch_approved = true;
    tx
}

fn transaction_updates(updates: Vec<LedgerUpdate>) -> Vec<TxStatusUpdate> {
    updates.into_iter().filter_map(LedgerUpdate::into_transaction_update).collect()
}

// ============ Leasing ============

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leases_are_disjoint() {
    let store: Arc<MemoryEntityStore<ReportEntity>> = Arc::new(MemoryEntityStore::new());
    let reports: Vec<ReportEntity> = (0..120)
        .map(|i| create_test_report(ORG, 2000 + i / 12, (i % 12 + 1) as u32))
        .collect();
    store.store_only_new(reports).await.unwrap();

    let manager = Arc::new(LeaseManager::new(
        store.clone(),
        Arc::new(lob_publisher::SystemClock),
        Duration::hours(3),
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let leased = manager.lease_eligible(ORG, 7).await.unwrap();
                if leased.is_empty() {
                    break;
                }
                mine.extend(leased.into_iter().map(|r| r.id));
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            total += 1;
            assert!(seen.insert(id), "entity leased twice");
        }
    }
    assert_eq!(total, 120);
}

#[tokio::test]
async fn test_crashed_dispatch_is_retried_after_lease_timeout() {
    let chain = Arc::new(FakeChain::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(MemoryEntityStore::new());
    store.store_only_new(vec![create_test_report(ORG, 2024, 1)]).await.unwrap();

    let dispatcher = create_test_dispatcher(store.clone(), clock.clone(), &chain, Arc::new(JsonBuilder { max: None }));

    chain.fail_for(ORG).await;
    assert!(dispatcher.dispatch_organisation(ORG).await.is_err());
    chain.failing_orgs.write().await.clear();

    // still leased by the failed attempt
    assert_eq!(dispatcher.dispatch_organisation(ORG).await.unwrap().leased, 0);

    clock.advance(Duration::hours(3));
    let report = dispatcher.dispatch_organisation(ORG).await.unwrap();
    assert_eq!(report.submitted, 1);
    assert_eq!(report.tx_hash.as_deref(), Some("tx-1"));
}

#[tokio::test]
async fn test_nothing_to_build_releases_lease() {
    let chain = Arc::new(FakeChain::new());
    let store = Arc::new(MemoryEntityStore::new());
    store.store_only_new(vec![create_test_report(ORG, 2024, 1)]).await.unwrap();

    let clock: Arc<dyn Clock> = Arc::new(lob_publisher::SystemClock);
    let dispatcher = create_test_dispatcher(store.clone(), clock, &chain, Arc::new(NothingToBuild));

    let report = dispatcher.dispatch_organisation(ORG).await.unwrap();
    assert_eq!(report.submitted, 0);
    assert_eq!(report.unlocked, 1);

    let stored = store.get(&create_test_report(ORG, 2024, 1).id).await.unwrap().unwrap();
    assert!(stored.locked_at.is_none());
    assert_eq!(stored.l1.publish_status, BlockchainPublishStatus::Stored);
    assert_eq!(chain.submissions.load(Ordering::SeqCst), 0);
}

// ============ Dispatch ============

#[tokio::test]
async fn test_failing_organisation_does_not_block_others() {
    let chain = Arc::new(FakeChain::new());
    let store = Arc::new(MemoryEntityStore::new());
    store
        .store_only_new(vec![create_test_report("org-1", 2024, 1), create_test_report("org-2", 2024, 1)])
        .await
        .unwrap();

    let clock: Arc<dyn Clock> = Arc::new(lob_publisher::SystemClock);
    let dispatcher = create_test_dispatcher(store.clone(), clock, &chain, Arc::new(JsonBuilder { max: None }));
    chain.fail_for("org-2").await;

    let summary = dispatcher.dispatch_all().await.unwrap();
    assert_eq!(summary.organisations, 2);
    assert_eq!(summary.submitted, 1);
    assert_eq!(summary.failed_organisations, vec!["org-2".to_string()]);
}

#[tokio::test]
async fn test_report_strategy_limits_each_cycle() {
    let chain = Arc::new(FakeChain::new());
    let (service, _receiver) = create_test_service(&chain, PublisherConfig::development()).await;

    let accepted = service
        .accept_reports(vec![create_test_report(ORG, 2024, 2), create_test_report(ORG, 2024, 1)])
        .await
        .unwrap();
    assert_eq!(accepted.len(), 2);

    service.run_dispatch_cycle().await;
    let pending = service.report_store().find_dispatched_not_finalized(ORG, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].period.month, 1);

    service.run_dispatch_cycle().await;
    assert_eq!(service.stats().await.reports_submitted, 2);
}

// ============ Intake ============

#[tokio::test]
async fn test_redelivery_returns_stored_state() {
    let chain = Arc::new(FakeChain::new());
    let (service, _receiver) = create_test_service(&chain, PublisherConfig::development()).await;

    let mut unapproved = create_approved_transaction("2");
    unapproved.ledger_dispatch_approved = false;
    let batch = vec![create_approved_transaction("1"), unapproved];

    let first = service.accept_transactions(&batch).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].l1.publish_status, BlockchainPublishStatus::Stored);

    service.run_dispatch_cycle().await;

    let again = service.accept_transactions(&batch).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].l1.publish_status, BlockchainPublishStatus::Submitted);
    assert_eq!(service.transaction_store().len().await, 1);
    assert_eq!(service.stats().await.transactions_accepted, 1);

    let report = create_test_report("org-1", 2024, 1);
    service.accept_reports(vec![report.clone(), report.clone()]).await.unwrap();
    service.accept_reports(vec![report]).await.unwrap();
    assert_eq!(service.stats().await.reports_accepted, 1);
}

#[tokio::test]
async fn test_stopped_service_rejects_intake() {
    let chain = Arc::new(FakeChain::new());
    let (service, _receiver) = create_test_service(&chain, PublisherConfig::development()).await;

    service.stop().await.unwrap();
    assert!(service.accept_transactions(&[create_approved_transaction("1")]).await.is_err());
}

// ============ Finality ============

#[tokio::test]
async fn test_lost_submission_is_rolled_back_and_redispatched() {
    let chain = Arc::new(FakeChain::new());
    let config = PublisherConfig::development();
    let grace = config.rollback_grace_slots();
    let (service, _receiver) = create_test_service(&chain, config).await;

    service.accept_reports(vec![create_test_report(ORG, 2024, 1)]).await.unwrap();
    service.run_dispatch_cycle().await;

    chain.tip_slot.fetch_add(grace + 1, Ordering::SeqCst);
    service.run_finality_cycle().await;

    let id = create_test_report(ORG, 2024, 1).id;
    let stored = service.report_store().get(&id).await.unwrap().unwrap();
    assert_eq!(stored.l1.publish_status, BlockchainPublishStatus::Rollbacked);
    assert_eq!(service.stats().await.rolled_back, 1);

    service.run_dispatch_cycle().await;
    let stored = service.report_store().get(&id).await.unwrap().unwrap();
    assert_eq!(stored.l1.publish_status, BlockchainPublishStatus::Submitted);
    assert_eq!(stored.l1.transaction_hash.as_deref(), Some("tx-2"));
}

// ============ End to end ============

fn create_test_lookup() -> InMemoryOrganisationLookup {
    let mut lookup = InMemoryOrganisationLookup::new()
        .with_organisation(Organisation {
            id: ORG.into(),
            name: "Cardano Foundation".into(),
            currency_id: "ISO_4217:CHF".into(),
            dummy_account: None,
        })
        .with_currency(ORG, "CHF", "ISO_4217:CHF");
    for (code, ref_code) in [("6000", "E6"), ("2000", "L2")] {
        lookup = lookup.with_chart_of_account(
            ORG,
            code,
            ChartOfAccount {
                event_ref_code: ref_code.into(),
                name: format!("Account {}", code),
            },
        );
    }
    lookup.with_account_event(ORG, "E6", "L2", "Expense")
}

#[tokio::test]
async fn test_ledger_follows_publish_state() {
    let storage = Arc::new(MemoryStorage::new());
    let lookup: Arc<dyn OrganisationLookup> = Arc::new(create_test_lookup());
    let batches = Arc::new(BatchAggregator::new(storage.clone()));
    let core_config = CoreConfig::development();
    let ingestion = IngestionService::new(
        storage.clone(),
        Arc::new(BusinessRulesProcessor::with_lookup(lookup)),
        batches.clone(),
        Arc::new(TtlCache::new(core_config.ingestion_cache_ttl())),
        core_config,
    );
    let ledger = LedgerService::new(storage.clone(), batches);

    let mut raw = create_approved_transaction("1");
    raw.ledger_dispatch_approved = false;
    let ingested = ingestion.ingest(ORG, PipelineMode::Ingest, vec![raw]).await.unwrap();
    let approved = ledger.approve_for_dispatch(&ingested[0].id).await.unwrap();
    assert_eq!(approved.processing_status, Some(TransactionProcessingStatus::Publish));

    let chain = Arc::new(FakeChain::new());
    let (service, mut receiver) = create_test_service(&chain, PublisherConfig::development()).await;
    let ready = ledger.ready_for_dispatch(ORG).await.unwrap();
    assert_eq!(service.accept_transactions(&ready).await.unwrap().len(), 1);

    service.run_dispatch_cycle().await;
    let updates = transaction_updates(receiver.recv().await.unwrap());
    assert_eq!(ledger.apply_updates(&updates).await.unwrap(), 1);

    let tx = storage.get_transaction(&approved.id).await.unwrap().unwrap();
    assert_eq!(tx.ledger_dispatch_status, LedgerDispatchStatus::Dispatched);
    assert_eq!(tx.processing_status, Some(TransactionProcessingStatus::Published));

    chain.set_score("tx-1", FinalityScore::Final).await;
    service.run_finality_cycle().await;
    let updates = transaction_updates(receiver.recv().await.unwrap());
    assert_eq!(updates[0].publish_status, BlockchainPublishStatus::Finalized);
    ledger.apply_updates(&updates).await.unwrap();

    // redelivered notification changes nothing
    assert_eq!(ledger.apply_updates(&updates).await.unwrap(), 0);

    let tx = storage.get_transaction(&approved.id).await.unwrap().unwrap();
    assert_eq!(tx.ledger_dispatch_status, LedgerDispatchStatus::Finalized);
    assert_eq!(tx.processing_status, Some(TransactionProcessingStatus::Dispatched));
}

// ============ Background runner ============

#[tokio::test]
async fn test_background_runner_dispatches() {
    let chain = Arc::new(FakeChain::new());
    let (service, _receiver) = create_test_service(&chain, PublisherConfig::development()).await;
    service.accept_transactions(&[create_approved_transaction("1")]).await.unwrap();

    service.start().await.unwrap();
    assert!(service.start().await.is_err());

    let submitted = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if service.stats().await.transactions_submitted > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(submitted.is_ok());

    service.stop().await.unwrap();
    assert_eq!(service.status().await, lob_publisher::ServiceStatus::Stopped);
}
