//! Ingestion batch types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::common::OrganisationId;
use super::status::TransactionProcessingStatus;
use super::transaction::{Transaction, TransactionType};

/// Batch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Created,
    Processing,
    Finished,
    Complete,
    Finalized,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Failed)
    }
}

/// Parameters the ERP extraction for a batch was run with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteringParameters {
    pub organisation_id: OrganisationId,
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub transaction_types: BTreeSet<TransactionType>,
    #[serde(default)]
    pub transaction_numbers: BTreeSet<String>,
}

impl FilteringParameters {
    pub fn new(organisation_id: &str, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            organisation_id: organisation_id.to_string(),
            from,
            to,
            transaction_types: BTreeSet::new(),
            transaction_numbers: BTreeSet::new(),
        }
    }

    /// Whether a raw transaction falls inside the requested extraction
    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.organisation.id == self.organisation_id
            && tx.entry_date >= self.from
            && tx.entry_date <= self.to
            && (self.transaction_types.is_empty() || self.transaction_types.contains(&tx.transaction_type))
            && (self.transaction_numbers.is_empty() || self.transaction_numbers.contains(&tx.internal_number))
    }
}

/// Per-status counts of the member transactions of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchStatistics {
    /// Expected batch size
    pub total: usize,
    /// Members that have been through a pipeline
    pub processed: usize,
    /// Stored count of APPROVE members; must equal `derived_ready_to_approve`
    pub ready_to_approve: usize,
    pub pending: usize,
    /// Approved for dispatch (PUBLISH)
    pub approved: usize,
    /// PUBLISHED or DISPATCHED
    pub published: usize,
    pub invalid: usize,
}

impl BatchStatistics {
    /// Count member transactions by processing status
    pub fn from_members<'a>(total: usize, members: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut stats = Self {
            total,
            ..Self::default()
        };
        for tx in members {
            let Some(status) = tx.processing_status else {
                continue;
            };
            stats.processed += 1;
            match status {
                TransactionProcessingStatus::Approve => stats.ready_to_approve += 1,
                TransactionProcessingStatus::Pending => stats.pending += 1,
                TransactionProcessingStatus::Invalid => stats.invalid += 1,
                TransactionProcessingStatus::Publish => stats.approved += 1,
                TransactionProcessingStatus::Published | TransactionProcessingStatus::Dispatched => {
                    stats.published += 1
                }
            }
        }
        stats
    }

    /// Ready-to-approve count exposed to callers
    pub fn derived_ready_to_approve(&self) -> usize {
        self.processed
            .saturating_sub(self.invalid)
            .saturating_sub(self.pending)
            .saturating_sub(self.published)
            .saturating_sub(self.approved)
    }

    pub fn is_consistent(&self) -> bool {
        self.ready_to_approve == self.derived_ready_to_approve()
    }
}

/// A set of transactions created by one ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionBatch {
    pub id: String,
    pub filtering_parameters: FilteringParameters,
    /// Number of transactions the extraction reported
    pub expected_total: usize,
    pub transaction_ids: BTreeSet<String>,
    pub statistics: BatchStatistics,
    pub status: BatchStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionBatch {
    pub fn new(filtering_parameters: FilteringParameters) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filtering_parameters,
            expected_total: 0,
            transaction_ids: BTreeSet::new(),
            statistics: BatchStatistics::default(),
            status: BatchStatus::Created,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn organisation_id(&self) -> &str {
        &self.filtering_parameters.organisation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_ready_to_approve_saturates() {
        let stats = BatchStatistics {
            total: 2,
            processed: 1,
            invalid: 3,
            ..BatchStatistics::default()
        };
        assert_eq!(stats.derived_ready_to_approve(), 0);
    }

    #[test]
    fn test_filtering_parameters_match() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let mut params = FilteringParameters::new("org-1", from, to);

        let tx = Transaction::new(
            "org-1",
            "INV-1",
            TransactionType::CustomerInvoice,
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        );
        assert!(params.matches(&tx));

        params.transaction_types.insert(TransactionType::Journal);
        assert!(!params.matches(&tx));
    }
}
