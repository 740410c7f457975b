//! Background runner
//!
//! Drives the dispatchers and finality pollers on fixed intervals until
//! stopped. Each tick processes both entity kinds; failures are logged and
//! never end the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::dispatcher::BlockchainDispatcher;
use crate::entity::{ReportEntity, TransactionEntity};
use crate::finality::FinalityPoller;
use crate::storage::EntityStore;

use super::ServiceStats;

pub struct BackgroundRunner<TS, RS>
where
    TS: EntityStore<TransactionEntity> + 'static,
    RS: EntityStore<ReportEntity> + 'static,
{
    tx_dispatcher: Arc<BlockchainDispatcher<TransactionEntity, TS>>,
    report_dispatcher: Arc<BlockchainDispatcher<ReportEntity, RS>>,
    tx_finality: Arc<FinalityPoller<TransactionEntity, TS>>,
    report_finality: Arc<FinalityPoller<ReportEntity, RS>>,
    stats: Arc<RwLock<ServiceStats>>,
    dispatch_interval: Duration,
    finality_interval: Duration,
}

impl<TS, RS> BackgroundRunner<TS, RS>
where
    TS: EntityStore<TransactionEntity> + 'static,
    RS: EntityStore<ReportEntity> + 'static,
{
    pub fn new(
        tx_dispatcher: Arc<BlockchainDispatcher<TransactionEntity, TS>>,
        report_dispatcher: Arc<BlockchainDispatcher<ReportEntity, RS>>,
        tx_finality: Arc<FinalityPoller<TransactionEntity, TS>>,
        report_finality: Arc<FinalityPoller<ReportEntity, RS>>,
        stats: Arc<RwLock<ServiceStats>>,
        dispatch_interval: Duration,
        finality_interval: Duration,
    ) -> Self {
        Self {
            tx_dispatcher,
            report_dispatcher,
            tx_finality,
            report_finality,
            stats,
            dispatch_interval,
            finality_interval,
        }
    }

    pub async fn start(self) -> RunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let running = Arc::new(RwLock::new(true));
        let running_clone = running.clone();

        tokio::spawn(async move {
            let mut dispatch_timer = interval(self.dispatch_interval);
            let mut finality_timer = interval(self.finality_interval);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Background runner received shutdown signal");
                        break;
                    }
                    _ = dispatch_timer.tick() => {
                        if *running_clone.read().await {
                            Self::dispatch_tick(&self.tx_dispatcher, &self.report_dispatcher, &self.stats).await;
                        }
                    }
                    _ = finality_timer.tick() => {
                        if *running_clone.read().await {
                            Self::finality_tick(&self.tx_finality, &self.report_finality, &self.stats).await;
                        }
                    }
                }
            }

            info!("Background runner stopped");
        });

        RunnerHandle { shutdown_tx, running }
    }

    pub(crate) async fn dispatch_tick(
        tx_dispatcher: &BlockchainDispatcher<TransactionEntity, TS>,
        report_dispatcher: &BlockchainDispatcher<ReportEntity, RS>,
        stats: &RwLock<ServiceStats>,
    ) {
        debug!("Running dispatch tick");
        let transactions = tx_dispatcher.dispatch_all().await;
        let reports = report_dispatcher.dispatch_all().await;

        let mut stats = stats.write().await;
        stats.dispatch_cycles += 1;
        match transactions {
            Ok(summary) => {
                stats.transactions_submitted += summary.submitted as u64;
                stats.failed_organisations += summary.failed_organisations.len() as u64;
            }
            Err(e) => {
                error!("Error dispatching transactions: {}", e);
                stats.failed_cycles += 1;
            }
        }
        match reports {
            Ok(summary) => {
                stats.reports_submitted += summary.submitted as u64;
                stats.failed_organisations += summary.failed_organisations.len() as u64;
            }
            Err(e) => {
                error!("Error dispatching reports: {}", e);
                stats.failed_cycles += 1;
            }
        }
    }

    pub(crate) async fn finality_tick(
        tx_finality: &FinalityPoller<TransactionEntity, TS>,
        report_finality: &FinalityPoller<ReportEntity, RS>,
        stats: &RwLock<ServiceStats>,
    ) {
        debug!("Running finality tick");
        let results = [
            ("transactions", tx_finality.poll_all().await),
            ("reports", report_finality.poll_all().await),
        ];

        let mut stats = stats.write().await;
        stats.finality_cycles += 1;
        for (kind, result) in results {
            match result {
                Ok(report) => {
                    stats.finality_advanced += report.advanced as u64;
                    stats.rolled_back += report.rolled_back as u64;
                    stats.failed_organisations += report.failed_organisations.len() as u64;
                }
                Err(e) => {
                    error!("Error polling finality for {}: {}", kind, e);
                    stats.failed_cycles += 1;
                }
            }
        }
    }
}

/// Control handle for a started runner
pub struct RunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl RunnerHandle {
    pub async fn stop(self) {
        *self.running.write().await = false;
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Ticks keep firing but do nothing until resumed
    pub async fn pause(&self) {
        *self.running.write().await = false;
    }

    pub async fn resume(&self) {
        *self.running.write().await = true;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
