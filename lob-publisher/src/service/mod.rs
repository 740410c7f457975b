//! Publisher service layer
//!
//! Ties the stores, dispatchers and finality pollers of both entity kinds
//! together and owns the background runner.
//!
//! ```rust,ignore
//! use lob_publisher::{PublisherConfig, PublisherService};
//!
//! let service = PublisherService::builder()
//!     .config(PublisherConfig::from_env())
//!     .transaction_store(tx_store)
//!     .report_store(report_store)
//!     .chain_tip(tip_reader)
//!     .submitter(submitter)
//!     .chain_reader(reader)
//!     .ledger_updates(updates)
//!     .transaction_builder(tx_builder)
//!     .report_builder(report_builder)
//!     .build()
//!     .await?;
//!
//! service.accept_transactions(&approved).await?;
//! service.start().await?;
//! ```

mod builder;
mod runner;

pub use builder::PublisherServiceBuilder;
pub use runner::{BackgroundRunner, RunnerHandle};

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::PublisherConfig;
use crate::dispatcher::BlockchainDispatcher;
use crate::entity::{OnChainEntity, ReportEntity, TransactionEntity};
use crate::error::{PublisherError, PublisherResult};
use crate::finality::FinalityPoller;
use crate::storage::EntityStore;
use lob_core::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Initializing,
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "INITIALIZING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub started_at: Option<DateTime<Utc>>,
    pub transactions_accepted: u64,
    pub reports_accepted: u64,
    pub dispatch_cycles: u64,
    pub finality_cycles: u64,
    pub transactions_submitted: u64,
    pub reports_submitted: u64,
    pub finality_advanced: u64,
    pub rolled_back: u64,
    /// Organisations whose dispatch or finality pass failed, summed over cycles
    pub failed_organisations: u64,
    pub failed_cycles: u64,
}

pub struct PublisherService<TS, RS>
where
    TS: EntityStore<TransactionEntity> + 'static,
    RS: EntityStore<ReportEntity> + 'static,
{
    config: PublisherConfig,
    transactions: Arc<TS>,
    reports: Arc<RS>,
    tx_dispatcher: Arc<BlockchainDispatcher<TransactionEntity, TS>>,
    report_dispatcher: Arc<BlockchainDispatcher<ReportEntity, RS>>,
    tx_finality: Arc<FinalityPoller<TransactionEntity, TS>>,
    report_finality: Arc<FinalityPoller<ReportEntity, RS>>,
    status: Arc<RwLock<ServiceStatus>>,
    stats: Arc<RwLock<ServiceStats>>,
    runner_handle: Arc<RwLock<Option<RunnerHandle>>>,
}

impl<TS, RS> PublisherService<TS, RS>
where
    TS: EntityStore<TransactionEntity> + 'static,
    RS: EntityStore<ReportEntity> + 'static,
{
    pub fn builder() -> PublisherServiceBuilder<TS, RS> {
        PublisherServiceBuilder::new()
    }

    pub async fn status(&self) -> ServiceStatus {
        *self.status.read().await
    }

    pub async fn stats(&self) -> ServiceStats {
        self.stats.read().await.clone()
    }

    async fn ensure_accepting(&self) -> PublisherResult<()> {
        if self.status().await == ServiceStatus::Stopped {
            return Err(PublisherError::Configuration("Service is stopped".to_string()));
        }
        Ok(())
    }

    // ==================== Intake ====================

    /// Take over approved ledger transactions
    ///
    /// Unapproved or item-less transactions are ignored. Redelivery is safe:
    /// known ids come back as stored, with their current publish state.
    pub async fn accept_transactions(&self, transactions: &[Transaction]) -> PublisherResult<Vec<TransactionEntity>> {
        self.ensure_accepting().await?;

        let incoming: Vec<TransactionEntity> = transactions
            .iter()
            .filter(|tx| tx.ledger_dispatch_approved && tx.is_publishable())
            .map(TransactionEntity::from)
            .collect();
        if incoming.is_empty() {
            return Ok(Vec::new());
        }

        let offered = incoming.len();
        let new = count_unseen(self.transactions.as_ref(), &incoming).await?;
        let stored = self.transactions.store_only_new(incoming).await?;
        self.stats.write().await.transactions_accepted += new;

        debug!(offered, new, stored = stored.len(), "Transactions accepted");
        Ok(stored)
    }

    pub async fn accept_reports(&self, reports: Vec<ReportEntity>) -> PublisherResult<Vec<ReportEntity>> {
        self.ensure_accepting().await?;
        if reports.is_empty() {
            return Ok(Vec::new());
        }

        let new = count_unseen(self.reports.as_ref(), &reports).await?;
        let stored = self.reports.store_only_new(reports).await?;
        self.stats.write().await.reports_accepted += new;
        Ok(stored)
    }

    // ==================== Manual triggers ====================

    /// Run one dispatch cycle for both entity kinds
    pub async fn run_dispatch_cycle(&self) {
        BackgroundRunner::<TS, RS>::dispatch_tick(&self.tx_dispatcher, &self.report_dispatcher, &self.stats).await;
    }

    /// Run one finality pass for both entity kinds
    pub async fn run_finality_cycle(&self) {
        BackgroundRunner::<TS, RS>::finality_tick(&self.tx_finality, &self.report_finality, &self.stats).await;
    }

    // ==================== Lifecycle ====================

    pub async fn start(&self) -> PublisherResult<()> {
        info!(network = self.config.network.as_str(), "Starting publisher service...");

        {
            let mut runner_handle = self.runner_handle.write().await;
            if runner_handle.is_some() {
                return Err(PublisherError::Configuration("Service already started".to_string()));
            }

            let runner = BackgroundRunner::new(
                self.tx_dispatcher.clone(),
                self.report_dispatcher.clone(),
                self.tx_finality.clone(),
                self.report_finality.clone(),
                self.stats.clone(),
                Duration::from_secs(self.config.dispatch_interval_secs.max(1)),
                Duration::from_secs(self.config.finality_interval_secs.max(1)),
            );
            *runner_handle = Some(runner.start().await);
        }

        *self.status.write().await = ServiceStatus::Running;
        self.stats.write().await.started_at = Some(Utc::now());

        info!("Publisher service started");
        Ok(())
    }

    pub async fn stop(&self) -> PublisherResult<()> {
        info!("Stopping publisher service...");

        if let Some(handle) = self.runner_handle.write().await.take() {
            handle.stop().await;
        }
        *self.status.write().await = ServiceStatus::Stopped;

        info!("Publisher service stopped");
        Ok(())
    }

    pub async fn pause(&self) -> PublisherResult<()> {
        if let Some(handle) = self.runner_handle.read().await.as_ref() {
            handle.pause().await;
        }
        *self.status.write().await = ServiceStatus::Paused;
        Ok(())
    }

    pub async fn resume(&self) -> PublisherResult<()> {
        if let Some(handle) = self.runner_handle.read().await.as_ref() {
            handle.resume().await;
        }
        *self.status.write().await = ServiceStatus::Running;
        Ok(())
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn transaction_store(&self) -> &Arc<TS> {
        &self.transactions
    }

    pub fn report_store(&self) -> &Arc<RS> {
        &self.reports
    }

    pub fn transaction_dispatcher(&self) -> &Arc<BlockchainDispatcher<TransactionEntity, TS>> {
        &self.tx_dispatcher
    }

    pub fn report_dispatcher(&self) -> &Arc<BlockchainDispatcher<ReportEntity, RS>> {
        &self.report_dispatcher
    }

    pub fn transaction_finality(&self) -> &Arc<FinalityPoller<TransactionEntity, TS>> {
        &self.tx_finality
    }

    pub fn report_finality(&self) -> &Arc<FinalityPoller<ReportEntity, RS>> {
        &self.report_finality
    }
}

/// Distinct ids in `incoming` that the store does not hold yet
async fn count_unseen<E, S>(store: &S, incoming: &[E]) -> PublisherResult<u64>
where
    E: OnChainEntity,
    S: EntityStore<E>,
{
    let mut seen = HashSet::new();
    let mut unseen = 0;
    for entity in incoming {
        if seen.insert(entity.id()) && store.get(entity.id()).await?.is_none() {
            unseen += 1;
        }
    }
    Ok(unseen)
}
