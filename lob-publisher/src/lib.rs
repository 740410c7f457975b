//! Ledger-on-Blockchain Publisher
//!
//! Takes approved ledger transactions and financial reports and gets them
//! onto the chain, then follows them until they are final.
//!
//! # Architecture
//!
//! - **Entities**: transactions and reports share one publish-state model
//!   (`L1SubmissionData`) behind the `OnChainEntity` trait
//! - **Lease Manager**: `locked_at` plus a timeout; the only concurrency
//!   control between dispatch cycles
//! - **Dispatcher**: lease, select, build, submit, stamp and notify
//! - **Finality Poller**: advances finality scores monotonically and rolls
//!   back submissions that never reach the chain
//! - **Service**: builder-assembled facade with a background runner
//!
//! # Publish Status Flow
//!
//! ```text
//! STORED -> SUBMITTED -> VISIBLE_ON_CHAIN -> COMPLETED -> FINALIZED
//!              |
//!              +-> ROLLBACKED -> SUBMITTED ...
//! ```
//!
//! Chain access (tip, payload building, submission, lookups) is supplied by
//! the embedding application through the traits in [`chain`].

pub mod chain;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod finality;
pub mod lease;
pub mod service;
pub mod storage;

pub use chain::{
    BuiltPayload, ChainReader, ChainServices, ChainTip, ChainTipReader, ChannelLedgerUpdatePublisher,
    DispatchStrategy, ImmediateDispatchStrategy, L1Submission, LedgerUpdateOutbox, LedgerUpdatePublisher,
    MaxBatchDispatchStrategy, OnChainTxDetails, SubmissionService, TransactionBuilder,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CardanoNetwork, PublisherConfig};
pub use dispatcher::{BlockchainDispatcher, DispatchReport, DispatchSummary};
pub use entity::{L1SubmissionData, LedgerUpdate, OnChainEntity, ReportEntity, ReportStatusUpdate, TransactionEntity};
pub use error::{PublisherError, PublisherResult};
pub use finality::{FinalityPoller, FinalityReport};
pub use lease::LeaseManager;
pub use service::{PublisherService, PublisherServiceBuilder, RunnerHandle, ServiceStats, ServiceStatus};
pub use storage::{EntityStore, MemoryEntityStore};
