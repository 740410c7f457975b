//! Publisher service builder

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::chain::{
    ChainReader, ChainServices, ChainTipReader, DispatchStrategy, ImmediateDispatchStrategy, LedgerUpdatePublisher,
    SubmissionService, TransactionBuilder,
};
use crate::clock::{Clock, SystemClock};
use crate::config::PublisherConfig;
use crate::dispatcher::BlockchainDispatcher;
use crate::entity::{ReportEntity, TransactionEntity};
use crate::error::{PublisherError, PublisherResult};
use crate::finality::FinalityPoller;
use crate::storage::EntityStore;

use super::{PublisherService, ServiceStats, ServiceStatus};

fn required<T>(value: Option<T>, what: &str) -> PublisherResult<T> {
    value.ok_or_else(|| PublisherError::Configuration(format!("{} is required", what)))
}

pub struct PublisherServiceBuilder<TS, RS>
where
    TS: EntityStore<TransactionEntity> + 'static,
    RS: EntityStore<ReportEntity> + 'static,
{
    config: Option<PublisherConfig>,
    transaction_store: Option<Arc<TS>>,
    report_store: Option<Arc<RS>>,
    clock: Option<Arc<dyn Clock>>,
    chain_tip: Option<Arc<dyn ChainTipReader>>,
    submitter: Option<Arc<dyn SubmissionService>>,
    chain_reader: Option<Arc<dyn ChainReader>>,
    ledger_updates: Option<Arc<dyn LedgerUpdatePublisher>>,
    transaction_builder: Option<Arc<dyn TransactionBuilder<TransactionEntity>>>,
    report_builder: Option<Arc<dyn TransactionBuilder<ReportEntity>>>,
    transaction_strategy: Option<Arc<dyn DispatchStrategy<TransactionEntity>>>,
    report_strategy: Option<Arc<dyn DispatchStrategy<ReportEntity>>>,
}

impl<TS, RS> PublisherServiceBuilder<TS, RS>
where
    TS: EntityStore<TransactionEntity> + 'static,
    RS: EntityStore<ReportEntity> + 'static,
{
    pub fn new() -> Self {
        Self {
            config: None,
            transaction_store: None,
            report_store: None,
            clock: None,
            chain_tip: None,
            submitter: None,
            chain_reader: None,
            ledger_updates: None,
            transaction_builder: None,
            report_builder: None,
            transaction_strategy: None,
            report_strategy: None,
        }
    }

    pub fn config(mut self, config: PublisherConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn transaction_store(mut self, store: Arc<TS>) -> Self {
        self.transaction_store = Some(store);
        self
    }

    pub fn report_store(mut self, store: Arc<RS>) -> Self {
        self.report_store = Some(store);
        self
    }

    /// Defaults to the system clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn chain_tip(mut self, reader: Arc<dyn ChainTipReader>) -> Self {
        self.chain_tip = Some(reader);
        self
    }

    pub fn submitter(mut self, submitter: Arc<dyn SubmissionService>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn chain_reader(mut self, reader: Arc<dyn ChainReader>) -> Self {
        self.chain_reader = Some(reader);
        self
    }

    pub fn ledger_updates(mut self, publisher: Arc<dyn LedgerUpdatePublisher>) -> Self {
        self.ledger_updates = Some(publisher);
        self
    }

    pub fn transaction_builder(mut self, builder: Arc<dyn TransactionBuilder<TransactionEntity>>) -> Self {
        self.transaction_builder = Some(builder);
        self
    }

    pub fn report_builder(mut self, builder: Arc<dyn TransactionBuilder<ReportEntity>>) -> Self {
        self.report_builder = Some(builder);
        self
    }

    /// Defaults to `ImmediateDispatchStrategy`
    pub fn transaction_strategy(mut self, strategy: Arc<dyn DispatchStrategy<TransactionEntity>>) -> Self {
        self.transaction_strategy = Some(strategy);
        self
    }

    /// Defaults to `ImmediateDispatchStrategy`
    pub fn report_strategy(mut self, strategy: Arc<dyn DispatchStrategy<ReportEntity>>) -> Self {
        self.report_strategy = Some(strategy);
        self
    }

    pub async fn build(self) -> PublisherResult<PublisherService<TS, RS>> {
        let config = self.config.unwrap_or_default();
        let transactions = required(self.transaction_store, "Transaction store")?;
        let reports = required(self.report_store, "Report store")?;
        let services = ChainServices::new(
            required(self.chain_tip, "Chain tip reader")?,
            required(self.submitter, "Submission service")?,
            required(self.chain_reader, "Chain reader")?,
            required(self.ledger_updates, "Ledger update publisher")?,
        );
        let transaction_builder = required(self.transaction_builder, "Transaction builder")?;
        let report_builder = required(self.report_builder, "Report builder")?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let transaction_strategy = self
            .transaction_strategy
            .unwrap_or_else(|| Arc::new(ImmediateDispatchStrategy));
        let report_strategy = self.report_strategy.unwrap_or_else(|| Arc::new(ImmediateDispatchStrategy));

        let tx_dispatcher = Arc::new(BlockchainDispatcher::new(
            transactions.clone(),
            clock.clone(),
            services.clone(),
            transaction_builder,
            transaction_strategy,
            &config,
            config.transaction_pull_limit,
        ));
        let report_dispatcher = Arc::new(BlockchainDispatcher::new(
            reports.clone(),
            clock,
            services.clone(),
            report_builder,
            report_strategy,
            &config,
            config.report_pull_limit,
        ));
        let tx_finality = Arc::new(FinalityPoller::new(transactions.clone(), services.clone(), &config));
        let report_finality = Arc::new(FinalityPoller::new(reports.clone(), services, &config));

        Ok(PublisherService {
            config,
            transactions,
            reports,
            tx_dispatcher,
            report_dispatcher,
            tx_finality,
            report_finality,
            status: Arc::new(RwLock::new(ServiceStatus::Initializing)),
            stats: Arc::new(RwLock::new(ServiceStats::default())),
            runner_handle: Arc::new(RwLock::new(None)),
        })
    }
}

impl<TS, RS> Default for PublisherServiceBuilder<TS, RS>
where
    TS: EntityStore<TransactionEntity> + 'static,
    RS: EntityStore<ReportEntity> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
