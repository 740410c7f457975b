//! Status vocabulary shared by the pipeline, the batches and the publisher

use serde::{Deserialize, Serialize};

/// Per-transaction processing lifecycle
///
/// `Approve -> Publish -> Published -> Dispatched` is the happy path.
/// `Pending` and `Invalid` are reachable from any pre-approval point and
/// stay until the underlying violation is corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionProcessingStatus {
    /// Clean, awaiting approval
    Approve,
    /// Recoverable violation on the ledger side
    Pending,
    /// Violation caused by ERP-side data
    Invalid,
    /// Approved and queued for on-chain dispatch
    Publish,
    /// Submitted to the chain
    Published,
    /// Confirmed or finalized on chain
    Dispatched,
}

impl TransactionProcessingStatus {
    /// Statuses that can still be changed by a pipeline run
    pub fn is_pre_approval(&self) -> bool {
        matches!(self, Self::Approve | Self::Pending | Self::Invalid)
    }

    pub fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionProcessingStatus::*;
        match (self, target) {
            (Approve | Pending | Invalid, Approve | Pending | Invalid) => true,
            (Approve, Publish) => true,
            (Publish, Published) => true,
            (Publish | Published, Dispatched) => true,
            // rollback on chain sends a submitted transaction back to the queue
            (Published, Publish) => true,
            _ => false,
        }
    }
}

/// Dispatch status as tracked on the ledger side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerDispatchStatus {
    #[default]
    NotDispatched,
    MarkDispatch,
    Dispatched,
    Completed,
    Finalized,
    Retrying,
    Failed,
}

impl LedgerDispatchStatus {
    /// Whether the transaction already left the ledger for the chain
    pub fn is_on_chain(&self) -> bool {
        matches!(self, Self::Dispatched | Self::Completed | Self::Finalized)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Completed | Self::Finalized)
    }
}

/// Publish status as tracked by the blockchain publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockchainPublishStatus {
    /// Accepted by the publisher, waiting for dispatch
    #[default]
    Stored,
    /// Previously submitted but never seen on chain, eligible again
    Rollbacked,
    Submitted,
    VisibleOnChain,
    Completed,
    Finalized,
}

impl BlockchainPublishStatus {
    /// Statuses a dispatch cycle may lease
    pub const DISPATCH_ELIGIBLE: [BlockchainPublishStatus; 2] = [Self::Stored, Self::Rollbacked];

    /// On-chain visible (or submitted) but below finality
    pub const NOT_FINALIZED_BUT_DISPATCHED: [BlockchainPublishStatus; 3] =
        [Self::Submitted, Self::VisibleOnChain, Self::Completed];

    pub fn is_dispatch_eligible(&self) -> bool {
        Self::DISPATCH_ELIGIBLE.contains(self)
    }

    pub fn is_dispatched_not_finalized(&self) -> bool {
        Self::NOT_FINALIZED_BUT_DISPATCHED.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized)
    }

    /// Ledger-side view of this publish status
    pub fn to_ledger_dispatch_status(&self) -> LedgerDispatchStatus {
        match self {
            Self::Stored | Self::Rollbacked => LedgerDispatchStatus::MarkDispatch,
            Self::Submitted | Self::VisibleOnChain => LedgerDispatchStatus::Dispatched,
            Self::Completed => LedgerDispatchStatus::Completed,
            Self::Finalized => LedgerDispatchStatus::Finalized,
        }
    }
}

/// Confidence that an on-chain transaction will not be reverted
///
/// Ordered: comparisons follow declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalityScore {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
    UltraHigh,
    Final,
}

impl FinalityScore {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final)
    }

    /// Publish status implied by this score
    pub fn to_publish_status(&self) -> BlockchainPublishStatus {
        match self {
            Self::VeryLow | Self::Low | Self::Medium => BlockchainPublishStatus::VisibleOnChain,
            Self::High | Self::VeryHigh => BlockchainPublishStatus::Completed,
            Self::UltraHigh | Self::Final => BlockchainPublishStatus::Finalized,
        }
    }

    /// Monotonic merge: never moves backwards
    pub fn advance(current: Option<Self>, observed: Self) -> Self {
        match current {
            Some(c) if c > observed => c,
            _ => observed,
        }
    }
}
