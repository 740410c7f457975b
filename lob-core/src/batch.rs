//! Batch aggregation
//!
//! Tracks the transactions of one ingestion run and keeps their per-status
//! counts current. Statistics are always recomputed from the members, never
//! incremented, so every mutation path converges on the same numbers.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{LobError, LobResult};
use crate::storage::AccountingStorage;
use crate::types::{
    BatchStatistics, BatchStatus, FilteringParameters, Transaction, TransactionBatch,
    TransactionProcessingStatus,
};

/// Batch status implied by the member transactions
pub fn calculate_status(total: usize, members: &[Transaction]) -> BatchStatus {
    if total == 0 && members.is_empty() {
        return BatchStatus::Created;
    }
    let processed: Vec<TransactionProcessingStatus> =
        members.iter().filter_map(|tx| tx.processing_status).collect();
    if processed.len() < total.max(members.len()) {
        return BatchStatus::Processing;
    }
    if processed.iter().all(|s| *s == TransactionProcessingStatus::Dispatched) {
        return BatchStatus::Finalized;
    }
    if processed.iter().all(|s| !s.is_pre_approval()) {
        return BatchStatus::Complete;
    }
    BatchStatus::Finished
}

pub struct BatchAggregator<S: AccountingStorage> {
    storage: Arc<S>,
}

impl<S: AccountingStorage> BatchAggregator<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Create an empty batch for an extraction
    pub async fn create_batch(
        &self,
        filtering_parameters: FilteringParameters,
        expected_total: usize,
    ) -> LobResult<TransactionBatch> {
        let mut batch = TransactionBatch::new(filtering_parameters);
        batch.expected_total = expected_total;
        batch.statistics.total = expected_total;
        self.storage.save_batch(&batch).await?;

        info!(
            batch_id = %batch.id,
            organisation_id = %batch.organisation_id(),
            expected_total,
            "Batch created"
        );
        Ok(batch)
    }

    async fn load(&self, batch_id: &str) -> LobResult<TransactionBatch> {
        self.storage
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| LobError::BatchNotFound(batch_id.to_string()))
    }

    /// Attach a chunk of processed transactions and recompute
    pub async fn attach(&self, batch_id: &str, transactions: &[Transaction]) -> LobResult<TransactionBatch> {
        let mut batch = self.load(batch_id).await?;
        if batch.status.is_terminal() {
            return Err(LobError::InvalidBatchState(format!(
                "batch {} is {:?}",
                batch_id, batch.status
            )));
        }
        for tx in transactions {
            batch.transaction_ids.insert(tx.id.clone());
        }
        self.refresh(&mut batch).await?;
        Ok(batch)
    }

    /// Recompute statistics and status from the current members
    pub async fn recompute(&self, batch_id: &str) -> LobResult<TransactionBatch> {
        let mut batch = self.load(batch_id).await?;
        if batch.status.is_terminal() {
            debug!(batch_id, status = ?batch.status, "Skipping recompute of terminal batch");
            return Ok(batch);
        }
        self.refresh(&mut batch).await?;
        Ok(batch)
    }

    /// Recompute every batch that contains the transaction
    pub async fn recompute_for_transaction(&self, tx_id: &str) -> LobResult<()> {
        for batch in self.storage.find_batches_by_transaction(tx_id).await? {
            self.recompute(&batch.id).await?;
        }
        Ok(())
    }

    async fn refresh(&self, batch: &mut TransactionBatch) -> LobResult<()> {
        let ids: Vec<String> = batch.transaction_ids.iter().cloned().collect();
        let members = self.storage.get_transactions(&ids).await?;
        let total = batch.expected_total.max(batch.transaction_ids.len());

        batch.statistics = BatchStatistics::from_members(total, &members);
        let status = calculate_status(total, &members);
        if status != batch.status {
            info!(
                batch_id = %batch.id,
                from = ?batch.status,
                to = ?status,
                processed = batch.statistics.processed,
                total,
                "Batch status changed"
            );
            batch.status = status;
        }
        batch.updated_at = Utc::now();
        self.storage.save_batch(batch).await
    }

    /// Mark a batch as failed
    pub async fn fail(&self, batch_id: &str, reason: &str) -> LobResult<TransactionBatch> {
        let mut batch = self.load(batch_id).await?;
        batch.status = BatchStatus::Failed;
        batch.failure_reason = Some(reason.to_string());
        batch.updated_at = Utc::now();
        self.storage.save_batch(&batch).await?;
        info!(batch_id, reason, "Batch failed");
        Ok(batch)
    }

    /// Current statistics of a batch
    pub async fn statistics(&self, batch_id: &str) -> LobResult<BatchStatistics> {
        Ok(self.load(batch_id).await?.statistics)
    }

    pub async fn get_batch(&self, batch_id: &str) -> LobResult<TransactionBatch> {
        self.load(batch_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::TransactionType;
    use chrono::NaiveDate;

    fn create_test_params() -> FilteringParameters {
        FilteringParameters::new(
            "org-1",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    fn create_test_transaction(n: usize, status: Option<TransactionProcessingStatus>) -> Transaction {
        let mut tx = Transaction::new(
            "org-1",
            &format!("TX-{}", n),
            TransactionType::CardCharge,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        tx.processing_status = status;
        tx
    }

    #[test]
    fn test_calculate_status() {
        use TransactionProcessingStatus::*;
        assert_eq!(calculate_status(0, &[]), BatchStatus::Created);
        assert_eq!(calculate_status(2, &[create_test_transaction(1, Some(Approve))]), BatchStatus::Processing);
        assert_eq!(calculate_status(1, &[create_test_transaction(1, Some(Approve))]), BatchStatus::Finished);
        assert_eq!(
            calculate_status(2, &[create_test_transaction(1, Some(Publish)), create_test_transaction(2, Some(Dispatched))]),
            BatchStatus::Complete
        );
        assert_eq!(calculate_status(1, &[create_test_transaction(1, Some(Dispatched))]), BatchStatus::Finalized);
        assert_eq!(calculate_status(1, &[create_test_transaction(1, None)]), BatchStatus::Processing);
    }

    #[tokio::test]
    async fn test_ready_to_approve_matches_derived_count() {
        use TransactionProcessingStatus::*;
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = BatchAggregator::new(storage.clone());
        let batch = aggregator.create_batch(create_test_params(), 10).await.unwrap();

        let statuses = [
            Some(Invalid),
            Some(Invalid),
            Some(Invalid),
            Some(Pending),
            Some(Pending),
            Some(Published),
            Some(Approve),
            None,
            None,
            None,
        ];
        let members: Vec<Transaction> = statuses
            .iter()
            .enumerate()
            .map(|(n, s)| create_test_transaction(n, *s))
            .collect();
        storage.save_transactions(&members).await.unwrap();

        let batch = aggregator.attach(&batch.id, &members).await.unwrap();
        let stats = batch.statistics;

        assert_eq!(stats.total, 10);
        assert_eq!(stats.processed, 7);
        assert_eq!((stats.invalid, stats.pending, stats.published, stats.approved), (3, 2, 1, 0));
        assert_eq!(
            stats.derived_ready_to_approve(),
            stats.processed - stats.invalid - stats.pending - stats.published - stats.approved
        );
        assert_eq!(stats.derived_ready_to_approve(), 1);
        assert!(stats.is_consistent());
        assert_eq!(batch.status, BatchStatus::Processing);
    }

    #[tokio::test]
    async fn test_terminal_batch_is_not_recomputed() {
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = BatchAggregator::new(storage.clone());
        let batch = aggregator.create_batch(create_test_params(), 1).await.unwrap();
        aggregator.fail(&batch.id, "extraction lost").await.unwrap();

        let tx = create_test_transaction(1, Some(TransactionProcessingStatus::Approve));
        storage.save_transaction(&tx).await.unwrap();

        assert!(aggregator.attach(&batch.id, &[tx]).await.is_err());
        let batch = aggregator.recompute(&batch.id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);
        assert_eq!(batch.statistics.processed, 0);
    }
}
