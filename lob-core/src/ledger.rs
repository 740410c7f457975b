//! Approval and ledger feedback
//!
//! Approval is the boundary between the pipeline (which owns validation
//! state) and the publisher (which owns publish state). Updates coming back
//! from the publisher only touch the dispatch status.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::batch::BatchAggregator;
use crate::error::{ApprovalRejectionCode, LobError, LobResult};
use crate::storage::AccountingStorage;
use crate::types::{LedgerDispatchStatus, Transaction, TransactionProcessingStatus, TxStatusUpdate};

pub struct LedgerService<S: AccountingStorage> {
    storage: Arc<S>,
    batches: Arc<BatchAggregator<S>>,
}

impl<S: AccountingStorage + 'static> LedgerService<S> {
    pub fn new(storage: Arc<S>, batches: Arc<BatchAggregator<S>>) -> Self {
        Self { storage, batches }
    }

    /// Approve a clean transaction for on-chain dispatch
    pub async fn approve_for_dispatch(&self, tx_id: &str) -> LobResult<Transaction> {
        let mut tx = self
            .storage
            .get_transaction(tx_id)
            .await?
            .ok_or_else(|| LobError::rejected(ApprovalRejectionCode::TxNotFound, tx_id))?;

        let rejection = if tx.ledger_dispatch_approved {
            Some(ApprovalRejectionCode::TxAlreadyApproved)
        } else if !tx.is_publishable() {
            Some(ApprovalRejectionCode::TxHasNoItems)
        } else if tx.has_violations() {
            Some(ApprovalRejectionCode::TxHasViolations)
        } else if tx.processing_status != Some(TransactionProcessingStatus::Approve) {
            Some(ApprovalRejectionCode::TxNotReadyForApproval)
        } else {
            None
        };
        if let Some(code) = rejection {
            warn!(tx_id, code = %code, "Approval rejected");
            return Err(LobError::rejected(code, tx_id));
        }

        tx.ledger_dispatch_approved = true;
        tx.ledger_dispatch_status = LedgerDispatchStatus::MarkDispatch;
        tx.refresh_processing_status();
        self.storage.save_transaction(&tx).await?;
        self.batches.recompute_for_transaction(&tx.id).await?;

        info!(tx_id, organisation_id = %tx.organisation_id(), "Transaction approved for dispatch");
        Ok(tx)
    }

    /// Approved transactions waiting to be handed to the publisher
    pub async fn ready_for_dispatch(&self, organisation_id: &str) -> LobResult<Vec<Transaction>> {
        self.storage.find_ready_for_dispatch(organisation_id).await
    }

    /// Apply ledger-updated notifications; returns how many transactions changed
    pub async fn apply_updates(&self, updates: &[TxStatusUpdate]) -> LobResult<usize> {
        let mut changed = 0;

        for update in updates {
            let Some(mut tx) = self.storage.get_transaction(&update.transaction_id).await? else {
                warn!(tx_id = %update.transaction_id, "Ledger update for unknown transaction");
                continue;
            };

            let status = update.publish_status.to_ledger_dispatch_status();
            if tx.ledger_dispatch_status == status {
                continue;
            }
            tx.ledger_dispatch_status = status;
            tx.refresh_processing_status();
            self.storage.save_transaction(&tx).await?;
            self.batches.recompute_for_transaction(&tx.id).await?;
            changed += 1;
        }

        if changed > 0 {
            info!(received = updates.len(), changed, "Ledger updates applied");
        }
        Ok(changed)
    }

    /// Consume notifications from a channel until it closes
    ///
    /// Delivery is at-least-once, so applying the same update twice is a no-op.
    pub fn spawn_update_consumer(self: Arc<Self>, mut rx: mpsc::Receiver<Vec<TxStatusUpdate>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(updates) = rx.recv().await {
                if let Err(e) = self.apply_updates(&updates).await {
                    error!("Failed to apply ledger updates: {}", e);
                }
            }
            info!("Ledger update consumer stopped");
        })
    }
}
