//! Reconciliation types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::OrganisationId;

/// Internal rejection codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcilationCode {
    /// Ledger has it, ERP does not
    TxNotInErp,
    /// ERP has it, ledger does not
    TxNotInLob,
    /// ERP content changed since it was ingested
    SourceReconcilationFail,
    /// Content matches but the ledger has not finished dispatching it
    SinkReconcilationFail,
}

/// Caller-facing refinement of `ReconcilationCode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionViewCode {
    MissingInErp,
    InProcessing,
    NewInErp,
    NewVersionNotPublished,
    NewVersion,
}

impl RejectionViewCode {
    /// Internal code a view code maps back to
    pub fn internal_code(&self) -> ReconcilationCode {
        match self {
            Self::MissingInErp => ReconcilationCode::TxNotInErp,
            Self::InProcessing => ReconcilationCode::SinkReconcilationFail,
            Self::NewInErp => ReconcilationCode::TxNotInLob,
            Self::NewVersionNotPublished | Self::NewVersion => ReconcilationCode::SourceReconcilationFail,
        }
    }
}

/// Filter modes for reconciliation queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationFilterStatus {
    /// No open rejection as of the latest run
    Reconciled,
    /// At least one open rejection
    Unreconciled,
    /// Never reconciled
    Unprocessed,
}

/// Result of classifying one transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind", content = "code")]
pub enum ReconciliationOutcome {
    Reconciled,
    Rejected(ReconcilationCode),
}

/// Rejection of one transaction in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRejection {
    pub transaction_id: String,
    pub internal_number: String,
    pub code: ReconcilationCode,
    /// Whether the ledger ever approved this transaction for dispatch
    pub ledger_dispatch_approved: bool,
    pub timestamp: DateTime<Utc>,
}

impl ReconciliationRejection {
    /// Whether the rejection shows up in the unreconciled view
    ///
    /// A ledger-only transaction that was never approved is not worth chasing
    /// in the ERP; it stays recorded but is not reported.
    pub fn is_reported(&self) -> bool {
        self.code != ReconcilationCode::TxNotInErp || self.ledger_dispatch_approved
    }

    /// Display-time refinement of the internal code
    pub fn view_code(&self) -> RejectionViewCode {
        match self.code {
            ReconcilationCode::TxNotInErp => RejectionViewCode::MissingInErp,
            ReconcilationCode::TxNotInLob => RejectionViewCode::NewInErp,
            ReconcilationCode::SinkReconcilationFail => RejectionViewCode::InProcessing,
            ReconcilationCode::SourceReconcilationFail if self.ledger_dispatch_approved => {
                RejectionViewCode::NewVersion
            }
            ReconcilationCode::SourceReconcilationFail => RejectionViewCode::NewVersionNotPublished,
        }
    }
}

/// Latest reconciliation state of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReconciliation {
    pub transaction_id: String,
    pub internal_number: String,
    pub organisation_id: OrganisationId,
    pub entry_date: NaiveDate,
    pub run_id: String,
    pub outcome: ReconciliationOutcome,
    pub ledger_dispatch_approved: bool,
    pub reconciled_at: DateTime<Utc>,
}

impl TransactionReconciliation {
    pub fn rejection(&self) -> Option<ReconciliationRejection> {
        match self.outcome {
            ReconciliationOutcome::Reconciled => None,
            ReconciliationOutcome::Rejected(code) => Some(ReconciliationRejection {
                transaction_id: self.transaction_id.clone(),
                internal_number: self.internal_number.clone(),
                code,
                ledger_dispatch_approved: self.ledger_dispatch_approved,
                timestamp: self.reconciled_at,
            }),
        }
    }
}

/// One full recompute over a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: String,
    pub organisation_id: OrganisationId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub processed: usize,
    pub reconciled: usize,
    pub rejections_by_code: BTreeMap<ReconcilationCode, usize>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_rejection(code: ReconcilationCode, approved: bool) -> ReconciliationRejection {
        ReconciliationRejection {
            transaction_id: "tx".into(),
            internal_number: "1".into(),
            code,
            ledger_dispatch_approved: approved,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_source_fail_view_split() {
        let published = create_test_rejection(ReconcilationCode::SourceReconcilationFail, true);
        let unpublished = create_test_rejection(ReconcilationCode::SourceReconcilationFail, false);

        assert_eq!(published.view_code(), RejectionViewCode::NewVersion);
        assert_eq!(unpublished.view_code(), RejectionViewCode::NewVersionNotPublished);
        assert_eq!(published.view_code().internal_code(), unpublished.view_code().internal_code());
    }

    #[test]
    fn test_view_codes_round_trip_to_internal() {
        for code in [
            ReconcilationCode::TxNotInErp,
            ReconcilationCode::TxNotInLob,
            ReconcilationCode::SinkReconcilationFail,
        ] {
            assert_eq!(create_test_rejection(code, false).view_code().internal_code(), code);
        }
    }

    #[test]
    fn test_unapproved_missing_in_erp_is_not_reported() {
        assert!(!create_test_rejection(ReconcilationCode::TxNotInErp, false).is_reported());
        assert!(create_test_rejection(ReconcilationCode::TxNotInErp, true).is_reported());
        assert!(create_test_rejection(ReconcilationCode::TxNotInLob, false).is_reported());
        assert!(create_test_rejection(ReconcilationCode::SinkReconcilationFail, false).is_reported());
    }
}
