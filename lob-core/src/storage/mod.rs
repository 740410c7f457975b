//! Accounting core storage
//!
//! Persistence technology is out of scope here; everything goes through
//! `AccountingStorage`. `MemoryStorage` backs tests and development.

mod memory;

pub use memory::MemoryStorage;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::LobResult;
use crate::types::{ReconciliationRun, Transaction, TransactionBatch, TransactionReconciliation};

#[async_trait]
pub trait AccountingStorage: Send + Sync {
    // ==================== Transactions ====================

    async fn save_transaction(&self, tx: &Transaction) -> LobResult<()>;

    async fn save_transactions(&self, txs: &[Transaction]) -> LobResult<()>;

    async fn get_transaction(&self, id: &str) -> LobResult<Option<Transaction>>;

    /// Transactions for the given ids; unknown ids are skipped
    async fn get_transactions(&self, ids: &[String]) -> LobResult<Vec<Transaction>>;

    /// Transactions of an organisation with entry date in `[from, to]`
    async fn find_transactions_by_entry_date(
        &self,
        organisation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LobResult<Vec<Transaction>>;

    /// Approved for dispatch and not yet on chain
    async fn find_ready_for_dispatch(&self, organisation_id: &str) -> LobResult<Vec<Transaction>>;

    // ==================== Batches ====================

    async fn save_batch(&self, batch: &TransactionBatch) -> LobResult<()>;

    async fn get_batch(&self, id: &str) -> LobResult<Option<TransactionBatch>>;

    async fn find_batches_by_transaction(&self, tx_id: &str) -> LobResult<Vec<TransactionBatch>>;

    // ==================== Reconciliation ====================

    /// Persist a run together with all of its per-transaction results
    async fn store_reconciliation_run(
        &self,
        run: &ReconciliationRun,
        results: &[TransactionReconciliation],
    ) -> LobResult<()>;

    async fn get_reconciliation_run(&self, id: &str) -> LobResult<Option<ReconciliationRun>>;

    /// Latest per-transaction results of an organisation with entry date in `[from, to]`
    async fn find_reconciliations(
        &self,
        organisation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LobResult<Vec<TransactionReconciliation>>;
}
