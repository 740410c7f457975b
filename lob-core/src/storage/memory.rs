//! In-memory storage
//!
//! Thread-safe storage guarded by `RwLock`s, used for tests and development.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::AccountingStorage;
use crate::error::LobResult;
use crate::types::{
    ReconciliationRun, Transaction, TransactionBatch, TransactionProcessingStatus,
    TransactionReconciliation,
};

#[derive(Debug)]
pub struct MemoryStorage {
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
    batches: Arc<RwLock<HashMap<String, TransactionBatch>>>,
    reconciliation_runs: Arc<RwLock<HashMap<String, ReconciliationRun>>>,
    // latest result per transaction id
    reconciliations: Arc<RwLock<HashMap<String, TransactionReconciliation>>>,
    // index
    tx_to_batches: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
            batches: Arc::new(RwLock::new(HashMap::new())),
            reconciliation_runs: Arc::new(RwLock::new(HashMap::new())),
            reconciliations: Arc::new(RwLock::new(HashMap::new())),
            tx_to_batches: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data
    pub async fn clear(&self) {
        self.transactions.write().await.clear();
        self.batches.write().await.clear();
        self.reconciliation_runs.write().await.clear();
        self.reconciliations.write().await.clear();
        self.tx_to_batches.write().await.clear();
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

#[async_trait]
impl AccountingStorage for MemoryStorage {
    // ==================== Transactions ====================

    async fn save_transaction(&self, tx: &Transaction) -> LobResult<()> {
        self.transactions.write().await.insert(tx.id.clone(), tx.clone());
        Ok(())
    }

    async fn save_transactions(&self, txs: &[Transaction]) -> LobResult<()> {
        let mut transactions = self.transactions.write().await;
        for tx in txs {
            transactions.insert(tx.id.clone(), tx.clone());
        }
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> LobResult<Option<Transaction>> {
        Ok(self.transactions.read().await.get(id).cloned())
    }

    async fn get_transactions(&self, ids: &[String]) -> LobResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(ids.iter().filter_map(|id| transactions.get(id).cloned()).collect())
    }

    async fn find_transactions_by_entry_date(
        &self,
        organisation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LobResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut found: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.organisation.id == organisation_id)
            .filter(|tx| tx.entry_date >= from && tx.entry_date <= to)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn find_ready_for_dispatch(&self, organisation_id: &str) -> LobResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut found: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.organisation.id == organisation_id)
            .filter(|tx| tx.processing_status == Some(TransactionProcessingStatus::Publish))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }

    // ==================== Batches ====================

    async fn save_batch(&self, batch: &TransactionBatch) -> LobResult<()> {
        {
            let mut index = self.tx_to_batches.write().await;
            for tx_id in &batch.transaction_ids {
                index.entry(tx_id.clone()).or_default().insert(batch.id.clone());
            }
        }
        self.batches.write().await.insert(batch.id.clone(), batch.clone());
        Ok(())
    }

    async fn get_batch(&self, id: &str) -> LobResult<Option<TransactionBatch>> {
        Ok(self.batches.read().await.get(id).cloned())
    }

    async fn find_batches_by_transaction(&self, tx_id: &str) -> LobResult<Vec<TransactionBatch>> {
        let index = self.tx_to_batches.read().await;
        let Some(batch_ids) = index.get(tx_id) else {
            return Ok(Vec::new());
        };
        let batches = self.batches.read().await;
        Ok(batch_ids.iter().filter_map(|id| batches.get(id).cloned()).collect())
    }

    // ==================== Reconciliation ====================

    async fn store_reconciliation_run(
        &self,
        run: &ReconciliationRun,
        results: &[TransactionReconciliation],
    ) -> LobResult<()> {
        let mut runs = self.reconciliation_runs.write().await;
        let mut reconciliations = self.reconciliations.write().await;
        runs.insert(run.id.clone(), run.clone());
        for result in results {
            reconciliations.insert(result.transaction_id.clone(), result.clone());
        }
        Ok(())
    }

    async fn get_reconciliation_run(&self, id: &str) -> LobResult<Option<ReconciliationRun>> {
        Ok(self.reconciliation_runs.read().await.get(id).cloned())
    }

    async fn find_reconciliations(
        &self,
        organisation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LobResult<Vec<TransactionReconciliation>> {
        let reconciliations = self.reconciliations.read().await;
        let mut found: Vec<TransactionReconciliation> = reconciliations
            .values()
            .filter(|r| r.organisation_id == organisation_id)
            .filter(|r| r.entry_date >= from && r.entry_date <= to)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then_with(|| a.transaction_id.cmp(&b.transaction_id)));
        Ok(found)
    }
}
