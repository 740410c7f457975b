//! Reconciliation between ERP and ledger
//!
//! Every run is a full recompute over a window: the union of ERP-reported and
//! ledger-stored transaction ids is partitioned into reconciled and four
//! rejection classes, then persisted in a single storage call.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::error::{LobError, LobResult};
use crate::storage::AccountingStorage;
use crate::types::{
    ReconcilationCode, ReconciliationFilterStatus, ReconciliationOutcome, ReconciliationRejection,
    ReconciliationRun, RejectionViewCode, Transaction, TransactionProcessingStatus,
    TransactionReconciliation,
};

/// ERP-side state of one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErpRecord {
    pub transaction_id: String,
    pub internal_number: String,
    pub entry_date: NaiveDate,
    pub version: String,
}

impl From<&Transaction> for ErpRecord {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            internal_number: tx.internal_number.clone(),
            entry_date: tx.entry_date,
            version: tx.compute_erp_version(),
        }
    }
}

/// Ledger-side state of one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub transaction_id: String,
    pub internal_number: String,
    pub entry_date: NaiveDate,
    pub erp_version: Option<String>,
    pub ledger_dispatch_approved: bool,
    pub processing_status: Option<TransactionProcessingStatus>,
}

impl From<&Transaction> for LedgerRecord {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            internal_number: tx.internal_number.clone(),
            entry_date: tx.entry_date,
            erp_version: tx.erp_version.clone(),
            ledger_dispatch_approved: tx.ledger_dispatch_approved,
            processing_status: tx.processing_status,
        }
    }
}

/// Classify one id given what each side knows about it
pub fn classify(erp: Option<&ErpRecord>, ledger: Option<&LedgerRecord>) -> Option<ReconciliationOutcome> {
    let outcome = match (erp, ledger) {
        (None, None) => return None,
        (Some(_), None) => ReconciliationOutcome::Rejected(ReconcilationCode::TxNotInLob),
        (None, Some(_)) => ReconciliationOutcome::Rejected(ReconcilationCode::TxNotInErp),
        (Some(erp), Some(ledger)) if ledger.erp_version.as_deref() != Some(erp.version.as_str()) => {
            ReconciliationOutcome::Rejected(ReconcilationCode::SourceReconcilationFail)
        }
        (Some(_), Some(ledger)) if ledger.processing_status != Some(TransactionProcessingStatus::Dispatched) => {
            ReconciliationOutcome::Rejected(ReconcilationCode::SinkReconcilationFail)
        }
        (Some(_), Some(_)) => ReconciliationOutcome::Reconciled,
    };
    Some(outcome)
}

/// Classify the union of both sides; each id appears exactly once
pub fn classify_all(
    organisation_id: &str,
    run_id: &str,
    erp: &[ErpRecord],
    ledger: &[LedgerRecord],
) -> Vec<TransactionReconciliation> {
    let erp_by_id: HashMap<&str, &ErpRecord> = erp.iter().map(|r| (r.transaction_id.as_str(), r)).collect();
    let ledger_by_id: HashMap<&str, &LedgerRecord> =
        ledger.iter().map(|r| (r.transaction_id.as_str(), r)).collect();
    let ids: BTreeSet<&str> = erp_by_id.keys().chain(ledger_by_id.keys()).copied().collect();
    let now = Utc::now();

    ids.into_iter()
        .filter_map(|id| {
            let erp = erp_by_id.get(id).copied();
            let ledger = ledger_by_id.get(id).copied();
            let outcome = classify(erp, ledger)?;
            let (internal_number, entry_date) = match (ledger, erp) {
                (Some(l), _) => (l.internal_number.clone(), l.entry_date),
                (None, Some(e)) => (e.internal_number.clone(), e.entry_date),
                (None, None) => return None,
            };
            Some(TransactionReconciliation {
                transaction_id: id.to_string(),
                internal_number,
                organisation_id: organisation_id.to_string(),
                entry_date,
                run_id: run_id.to_string(),
                outcome,
                ledger_dispatch_approved: ledger.is_some_and(|l| l.ledger_dispatch_approved),
                reconciled_at: now,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledTransactionView {
    pub transaction_id: String,
    pub internal_number: String,
    pub entry_date: NaiveDate,
}

/// Answer to a reconciliation query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub filter: ReconciliationFilterStatus,
    /// Transactions matching a RECONCILED or UNPROCESSED filter
    pub transactions: Vec<ReconciledTransactionView>,
    /// Open rejections, for the UNRECONCILED filter
    pub rejections: Vec<ReconciliationRejection>,
    /// Open rejections in the window per caller-facing code
    pub counts_by_code: BTreeMap<RejectionViewCode, usize>,
}

pub struct ReconciliationService<S: AccountingStorage> {
    storage: Arc<S>,
}

impl<S: AccountingStorage> ReconciliationService<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Full recompute for one organisation and window
    pub async fn reconcile(
        &self,
        organisation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        erp_transactions: &[Transaction],
    ) -> LobResult<ReconciliationRun> {
        if from > to {
            return Err(LobError::Reconciliation(format!("empty window {} > {}", from, to)));
        }

        let erp: Vec<ErpRecord> = erp_transactions
            .iter()
            .filter(|tx| tx.organisation_id() == organisation_id)
            .filter(|tx| tx.entry_date >= from && tx.entry_date <= to)
            .map(ErpRecord::from)
            .collect();
        let ledger: Vec<LedgerRecord> = self
            .storage
            .find_transactions_by_entry_date(organisation_id, from, to)
            .await?
            .iter()
            .map(LedgerRecord::from)
            .collect();

        let run_id = uuid::Uuid::new_v4().to_string();
        let results = classify_all(organisation_id, &run_id, &erp, &ledger);

        let mut rejections_by_code = BTreeMap::new();
        for result in &results {
            if let ReconciliationOutcome::Rejected(code) = result.outcome {
                *rejections_by_code.entry(code).or_insert(0) += 1;
            }
        }
        let run = ReconciliationRun {
            id: run_id,
            organisation_id: organisation_id.to_string(),
            from,
            to,
            processed: results.len(),
            reconciled: results
                .iter()
                .filter(|r| r.outcome == ReconciliationOutcome::Reconciled)
                .count(),
            rejections_by_code,
            created_at: Utc::now(),
        };

        self.storage.store_reconciliation_run(&run, &results).await?;

        info!(
            organisation_id,
            run_id = %run.id,
            processed = run.processed,
            reconciled = run.reconciled,
            "Reconciliation run finished"
        );
        Ok(run)
    }

    /// Rejections and per-code counts for a window
    ///
    /// Every rejection of the latest run is stored; the unreconciled view and
    /// the counts leave out ledger-only transactions that were never approved.
    pub async fn query(
        &self,
        filter: ReconciliationFilterStatus,
        organisation_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LobResult<ReconciliationReport> {
        let results = self.storage.find_reconciliations(organisation_id, from, to).await?;

        let open: Vec<ReconciliationRejection> = results
            .iter()
            .filter_map(|r| r.rejection())
            .filter(ReconciliationRejection::is_reported)
            .collect();
        let mut counts_by_code = BTreeMap::new();
        for rejection in &open {
            *counts_by_code.entry(rejection.view_code()).or_insert(0) += 1;
        }

        let (transactions, rejections) = match filter {
            ReconciliationFilterStatus::Reconciled => (
                results
                    .iter()
                    .filter(|r| r.outcome == ReconciliationOutcome::Reconciled)
                    .map(|r| ReconciledTransactionView {
                        transaction_id: r.transaction_id.clone(),
                        internal_number: r.internal_number.clone(),
                        entry_date: r.entry_date,
                    })
                    .collect(),
                Vec::new(),
            ),
            ReconciliationFilterStatus::Unreconciled => (Vec::new(), open),
            ReconciliationFilterStatus::Unprocessed => {
                let seen: BTreeSet<&str> = results.iter().map(|r| r.transaction_id.as_str()).collect();
                let unprocessed = self
                    .storage
                    .find_transactions_by_entry_date(organisation_id, from, to)
                    .await?
                    .into_iter()
                    .filter(|tx| !seen.contains(tx.id.as_str()))
                    .map(|tx| ReconciledTransactionView {
                        transaction_id: tx.id,
                        internal_number: tx.internal_number,
                        entry_date: tx.entry_date,
                    })
                    .collect();
                (unprocessed, Vec::new())
            }
        };

        Ok(ReconciliationReport {
            filter,
            transactions,
            rejections,
            counts_by_code,
        })
    }
}
