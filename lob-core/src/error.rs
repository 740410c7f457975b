//! Accounting core error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable reasons an approval request is rejected at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalRejectionCode {
    TxNotFound,
    TxHasNoItems,
    TxHasViolations,
    TxNotReadyForApproval,
    TxAlreadyApproved,
}

impl ApprovalRejectionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TxNotFound => "TX_NOT_FOUND",
            Self::TxHasNoItems => "TX_HAS_NO_ITEMS",
            Self::TxHasViolations => "TX_HAS_VIOLATIONS",
            Self::TxNotReadyForApproval => "TX_NOT_READY_FOR_APPROVAL",
            Self::TxAlreadyApproved => "TX_ALREADY_APPROVED",
        }
    }
}

impl fmt::Display for ApprovalRejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accounting core errors
#[derive(Error, Debug)]
pub enum LobError {
    #[error("[{code}] approval rejected for transaction {tx_id}")]
    ApprovalRejected {
        code: ApprovalRejectionCode,
        tx_id: String,
    },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Invalid batch state: {0}")]
    InvalidBatchState(String),

    #[error("Ingestion hand-off expired or missing for batch {0}")]
    IngestionCacheMiss(String),

    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LobError {
    /// Shorthand for a coded approval rejection
    pub fn rejected(code: ApprovalRejectionCode, tx_id: impl Into<String>) -> Self {
        Self::ApprovalRejected {
            code,
            tx_id: tx_id.into(),
        }
    }

    /// The rejection code, if this is an approval rejection
    pub fn rejection_code(&self) -> Option<ApprovalRejectionCode> {
        match self {
            Self::ApprovalRejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LobError {
    fn from(err: serde_json::Error) -> Self {
        LobError::Serialization(err.to_string())
    }
}

/// Result type for accounting core operations
pub type LobResult<T> = Result<T, LobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display_carries_code() {
        let err = LobError::rejected(ApprovalRejectionCode::TxHasNoItems, "tx-1");
        assert_eq!(
            err.to_string(),
            "[TX_HAS_NO_ITEMS] approval rejected for transaction tx-1"
        );
        assert_eq!(err.rejection_code(), Some(ApprovalRejectionCode::TxHasNoItems));
        assert_eq!(LobError::BatchNotFound("b".into()).rejection_code(), None);
    }
}
