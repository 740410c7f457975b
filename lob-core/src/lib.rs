//! Ledger-on-Blockchain Accounting Core
//!
//! This crate turns raw ERP accounting transactions into ledger-ready
//! transactions and keeps the ledger consistent with the ERP afterwards.
//!
//! # Architecture
//!
//! - **Pipeline**: ordered business-rule task items that cleanse, validate and
//!   convert a transaction, attaching violations instead of failing
//! - **Ingestion**: idempotent intake of ERP extractions, in one shot or as a
//!   two-step batch hand-off
//! - **Batches**: per-run statistics and status derived from member transactions
//! - **Ledger**: approval for dispatch and consumption of publisher feedback
//! - **Reconciliation**: full-window comparison of ERP and ledger state
//!
//! # Status Flow
//!
//! ```text
//! (intake) -> INVALID | PENDING | APPROVE -> PUBLISH -> PUBLISHED -> DISPATCHED
//! ```
//!
//! Processing status is never set directly; it is derived from violations,
//! approval and the dispatch status reported back by the publisher.

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod ledger;
pub mod organisation;
pub mod pipeline;
pub mod reconcile;
pub mod storage;
pub mod types;

pub use batch::{calculate_status, BatchAggregator};
pub use cache::{HandoffCache, TtlCache};
pub use config::CoreConfig;
pub use error::{ApprovalRejectionCode, LobError, LobResult};
pub use ingestion::IngestionService;
pub use ledger::LedgerService;
pub use organisation::{InMemoryOrganisationLookup, Organisation, OrganisationLookup};
pub use pipeline::{BusinessRulesProcessor, Pipeline, PipelineMode, PipelinePhase, TaskItem};
pub use reconcile::{ReconciliationReport, ReconciliationService};
pub use storage::{AccountingStorage, MemoryStorage};
pub use types::*;
