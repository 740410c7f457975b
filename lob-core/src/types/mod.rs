//! Domain types of the accounting core

pub mod batch;
pub mod common;
pub mod reconcile;
pub mod status;
pub mod transaction;
pub mod violation;

pub use batch::{BatchStatistics, BatchStatus, FilteringParameters, TransactionBatch};
pub use common::{digest_hex, AccountingPeriod, OrganisationId};
pub use reconcile::{
    ReconcilationCode, ReconciliationFilterStatus, ReconciliationOutcome, ReconciliationRejection,
    ReconciliationRun, RejectionViewCode, TransactionReconciliation,
};
pub use status::{
    BlockchainPublishStatus, FinalityScore, LedgerDispatchStatus, TransactionProcessingStatus,
};
pub use transaction::{
    Account, AccountEvent, Counterparty, Currency, Document, ItemStatus, OperationType,
    OrganisationRef, ReferenceCode, Transaction, TransactionItem, TransactionType, Vat,
};
pub use violation::{Violation, ViolationCode, ViolationSource};

/// Ledger-updated notification for one transaction
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TxStatusUpdate {
    pub transaction_id: String,
    pub organisation_id: OrganisationId,
    pub publish_status: BlockchainPublishStatus,
    pub finality_score: Option<FinalityScore>,
    pub transaction_hash: Option<String>,
}
