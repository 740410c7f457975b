//! On-chain entities
//!
//! Transactions and reports are published through the same lease, dispatch
//! and finality machinery. Both carry an `L1SubmissionData` and a lease
//! timestamp; `OnChainEntity` is the seam the generic engine works against.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lob_core::{
    digest_hex, AccountingPeriod, BlockchainPublishStatus, FinalityScore, OrganisationId, Transaction,
    TransactionItem, TransactionType, TxStatusUpdate,
};

/// Publish state of one entity on L1
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct L1SubmissionData {
    pub transaction_hash: Option<String>,
    /// Slot of the block that included the submission, when known
    pub absolute_slot: Option<u64>,
    /// Chain tip slot read before the payload was built
    pub creation_slot: Option<u64>,
    pub publish_status: BlockchainPublishStatus,
    pub finality_score: Option<FinalityScore>,
}

impl L1SubmissionData {
    pub fn mark_submitted(&mut self, transaction_hash: &str, absolute_slot: Option<u64>, creation_slot: u64) {
        self.transaction_hash = Some(transaction_hash.to_string());
        self.absolute_slot = absolute_slot;
        self.creation_slot = Some(creation_slot);
        self.publish_status = BlockchainPublishStatus::Submitted;
        self.finality_score = None;
    }

    /// Move the score forward; never lowers it. Returns whether anything changed.
    pub fn apply_finality(&mut self, observed: FinalityScore) -> bool {
        if self.publish_status == BlockchainPublishStatus::Finalized {
            return false;
        }
        let score = FinalityScore::advance(self.finality_score, observed);
        let status = score.to_publish_status();
        if self.finality_score == Some(score) && self.publish_status == status {
            return false;
        }
        self.finality_score = Some(score);
        self.publish_status = status;
        true
    }

    /// Forget the submission so the entity can be dispatched again
    pub fn rollback(&mut self) {
        *self = Self {
            publish_status: BlockchainPublishStatus::Rollbacked,
            ..Self::default()
        };
    }

    /// Slots elapsed since the payload was built
    pub fn age_in_slots(&self, tip_slot: u64) -> Option<u64> {
        self.creation_slot.map(|created| tip_slot.saturating_sub(created))
    }
}

/// Ledger-updated notification for one report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatusUpdate {
    pub report_id: String,
    pub organisation_id: OrganisationId,
    pub publish_status: BlockchainPublishStatus,
    pub finality_score: Option<FinalityScore>,
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerUpdate {
    Transaction(TxStatusUpdate),
    Report(ReportStatusUpdate),
}

impl LedgerUpdate {
    pub fn organisation_id(&self) -> &str {
        match self {
            Self::Transaction(u) => &u.organisation_id,
            Self::Report(u) => &u.organisation_id,
        }
    }

    /// The ledger only tracks transactions; report updates have no counterpart there
    pub fn into_transaction_update(self) -> Option<TxStatusUpdate> {
        match self {
            Self::Transaction(u) => Some(u),
            Self::Report(_) => None,
        }
    }
}

pub trait OnChainEntity: Clone + Send + Sync + 'static {
    /// Short name used in logs
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn organisation_id(&self) -> &str;

    /// Dispatch order within an organisation
    fn entry_date(&self) -> NaiveDate;

    fn l1(&self) -> &L1SubmissionData;

    fn l1_mut(&mut self) -> &mut L1SubmissionData;

    fn locked_at(&self) -> Option<DateTime<Utc>>;

    fn set_locked_at(&mut self, locked_at: Option<DateTime<Utc>>);

    fn to_ledger_update(&self) -> LedgerUpdate;

    fn publish_status(&self) -> BlockchainPublishStatus {
        self.l1().publish_status
    }

    /// Eligible and either unleased or leased no later than `stale_before`
    fn is_leasable(&self, stale_before: DateTime<Utc>) -> bool {
        self.publish_status().is_dispatch_eligible() && self.locked_at().map_or(true, |at| at <= stale_before)
    }
}

/// Approved ledger transaction as the publisher stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEntity {
    pub id: String,
    pub organisation_id: OrganisationId,
    pub internal_number: String,
    pub transaction_type: TransactionType,
    pub entry_date: NaiveDate,
    pub accounting_period: AccountingPeriod,
    pub items: Vec<TransactionItem>,
    pub l1: L1SubmissionData,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionEntity {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.clone(),
            organisation_id: tx.organisation_id().to_string(),
            internal_number: tx.internal_number.clone(),
            transaction_type: tx.transaction_type,
            entry_date: tx.entry_date,
            accounting_period: tx.accounting_period,
            items: tx.active_items().cloned().collect(),
            l1: L1SubmissionData::default(),
            locked_at: None,
            created_at: Utc::now(),
        }
    }
}

impl OnChainEntity for TransactionEntity {
    const KIND: &'static str = "transaction";

    fn id(&self) -> &str {
        &self.id
    }

    fn organisation_id(&self) -> &str {
        &self.organisation_id
    }

    fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    fn l1(&self) -> &L1SubmissionData {
        &self.l1
    }

    fn l1_mut(&mut self) -> &mut L1SubmissionData {
        &mut self.l1
    }

    fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.locked_at
    }

    fn set_locked_at(&mut self, locked_at: Option<DateTime<Utc>>) {
        self.locked_at = locked_at;
    }

    fn to_ledger_update(&self) -> LedgerUpdate {
        LedgerUpdate::Transaction(TxStatusUpdate {
            transaction_id: self.id.clone(),
            organisation_id: self.organisation_id.clone(),
            publish_status: self.l1.publish_status,
            finality_score: self.l1.finality_score,
            transaction_hash: self.l1.transaction_hash.clone(),
        })
    }
}

/// Financial report published for one organisation and period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntity {
    pub id: String,
    pub organisation_id: OrganisationId,
    pub report_type: String,
    pub period: AccountingPeriod,
    /// Report body, opaque to the publisher
    pub payload: serde_json::Value,
    pub l1: L1SubmissionData,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReportEntity {
    pub fn new(organisation_id: &str, report_type: &str, period: AccountingPeriod, payload: serde_json::Value) -> Self {
        Self {
            id: digest_hex(&[organisation_id, report_type, period.to_string().as_str()]),
            organisation_id: organisation_id.to_string(),
            report_type: report_type.to_string(),
            period,
            payload,
            l1: L1SubmissionData::default(),
            locked_at: None,
            created_at: Utc::now(),
        }
    }
}

impl OnChainEntity for ReportEntity {
    const KIND: &'static str = "report";

    fn id(&self) -> &str {
        &self.id
    }

    fn organisation_id(&self) -> &str {
        &self.organisation_id
    }

    fn entry_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.period.year, self.period.month, 1).unwrap_or_default()
    }

    fn l1(&self) -> &L1SubmissionData {
        &self.l1
    }

    fn l1_mut(&mut self) -> &mut L1SubmissionData {
        &mut self.l1
    }

    fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.locked_at
    }

    fn set_locked_at(&mut self, locked_at: Option<DateTime<Utc>>) {
        self.locked_at = locked_at;
    }

    fn to_ledger_update(&self) -> LedgerUpdate {
        LedgerUpdate::Report(ReportStatusUpdate {
            report_id: self.id.clone(),
            organisation_id: self.organisation_id.clone(),
            publish_status: self.l1.publish_status,
            finality_score: self.l1.finality_score,
            transaction_hash: self.l1.transaction_hash.clone(),
        })
    }
}
