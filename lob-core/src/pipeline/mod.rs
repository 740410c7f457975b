//! Business-rule pipeline
//!
//! A pipeline is an ordered list of phases, each an ordered list of task
//! items. Every item runs against one transaction at a time and nothing
//! short-circuits, so one pass surfaces every applicable violation.
//!
//! Two pipelines are composed at startup:
//!
//! ```text
//! ingest:    sanity -> pre-cleansing -> pre-validation -> conversion
//!            -> post-cleansing -> post-validation -> sanity
//! reprocess: conversion -> post-cleansing
//! ```

pub mod items;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::organisation::OrganisationLookup;
use crate::types::Transaction;
use items::*;

/// One idempotent check or transform over a transaction
pub trait TaskItem: Send + Sync {
    /// Stable name, recorded on the violations this item produces
    fn name(&self) -> &'static str;

    fn apply(&self, tx: &mut Transaction);
}

/// Which pipeline a caller asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineMode {
    /// Initial ingestion
    Ingest,
    /// Re-run of an already ingested transaction
    Reprocess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    SanityCheck,
    PreCleansing,
    PreValidation,
    Conversion,
    PostCleansing,
    PostValidation,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SanityCheck => "sanity-check",
            Self::PreCleansing => "pre-cleansing",
            Self::PreValidation => "pre-validation",
            Self::Conversion => "conversion",
            Self::PostCleansing => "post-cleansing",
            Self::PostValidation => "post-validation",
        };
        f.write_str(name)
    }
}

/// Named ordered sequence of phases
pub struct Pipeline {
    name: &'static str,
    phases: Vec<(PipelinePhase, Vec<Arc<dyn TaskItem>>)>,
}

impl Pipeline {
    pub fn builder(name: &'static str) -> PipelineBuilder {
        PipelineBuilder {
            name,
            phases: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn phases(&self) -> impl Iterator<Item = PipelinePhase> + '_ {
        self.phases.iter().map(|(phase, _)| *phase)
    }

    /// Task-item names in execution order, without repeats
    pub fn module_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for item in self.phases.iter().flat_map(|(_, items)| items) {
            if !names.contains(&item.name()) {
                names.push(item.name());
            }
        }
        names
    }

    /// Run every task item in order against one transaction
    ///
    /// Violations previously produced by this pipeline's own items are cleared
    /// first, so a violation whose trigger disappeared does not survive.
    pub fn run(&self, tx: &mut Transaction) {
        tx.clear_violations_from(&self.module_names());

        for (phase, items) in &self.phases {
            for item in items {
                item.apply(tx);
            }
            debug!(
                pipeline = self.name,
                phase = %phase,
                tx_id = %tx.id,
                violations = tx.violations.len(),
                "Pipeline phase finished"
            );
        }

        tx.refresh_processing_status();
    }
}

pub struct PipelineBuilder {
    name: &'static str,
    phases: Vec<(PipelinePhase, Vec<Arc<dyn TaskItem>>)>,
}

impl PipelineBuilder {
    pub fn phase(mut self, phase: PipelinePhase, items: Vec<Arc<dyn TaskItem>>) -> Self {
        self.phases.push((phase, items));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            name: self.name,
            phases: self.phases,
        }
    }
}

/// Holds the ingest and reprocess pipelines and picks one per call
pub struct BusinessRulesProcessor {
    ingest: Pipeline,
    reprocess: Pipeline,
}

impl BusinessRulesProcessor {
    pub fn new(ingest: Pipeline, reprocess: Pipeline) -> Self {
        Self { ingest, reprocess }
    }

    /// Standard pipelines backed by the given master data
    pub fn with_lookup(lookup: Arc<dyn OrganisationLookup>) -> Self {
        let sanity: Vec<Arc<dyn TaskItem>> = vec![Arc::new(SanityCheckFields), Arc::new(TransactionTypeUnknown)];
        let conversion: Vec<Arc<dyn TaskItem>> = vec![
            Arc::new(OrganisationConversion::new(lookup.clone())),
            Arc::new(DocumentConversion::new(lookup.clone())),
            Arc::new(CostCenterConversion::new(lookup.clone())),
            Arc::new(ProjectConversion::new(lookup.clone())),
            Arc::new(AccountEventCodesConversion::new(lookup.clone())),
        ];
        let post_cleansing: Vec<Arc<dyn TaskItem>> = vec![
            Arc::new(DiscardSameAccount),
            Arc::new(TxItemsAmountsSumming),
            Arc::new(TxTotalAmountSumm::new(lookup.clone())),
        ];

        let ingest = Pipeline::builder("ingest")
            .phase(PipelinePhase::SanityCheck, sanity.clone())
            .phase(
                PipelinePhase::PreCleansing,
                vec![Arc::new(DiscardZeroBalance), Arc::new(FxRevaluationCopyLcyToFcy)],
            )
            .phase(
                PipelinePhase::PreValidation,
                vec![
                    Arc::new(AmountsFcyCheck),
                    Arc::new(AmountsLcyCheck),
                    Arc::new(AmountsLcyBalanceZerosOut),
                    Arc::new(AmountsFcyBalanceZerosOut),
                    Arc::new(JournalAccountCreditEnrichment::new(lookup.clone())),
                ],
            )
            .phase(PipelinePhase::Conversion, conversion.clone())
            .phase(PipelinePhase::PostCleansing, post_cleansing.clone())
            .phase(
                PipelinePhase::PostValidation,
                vec![
                    Arc::new(AccountCodeDebitCheck),
                    Arc::new(AccountCodeCreditCheck),
                    Arc::new(DocumentMustBePresent),
                    Arc::new(NetOffDetection::new(lookup)),
                    Arc::new(CheckIfAllTxItemsAreErased),
                ],
            )
            .phase(PipelinePhase::SanityCheck, sanity)
            .build();

        let reprocess = Pipeline::builder("reprocess")
            .phase(PipelinePhase::Conversion, conversion)
            .phase(PipelinePhase::PostCleansing, post_cleansing)
            .build();

        Self::new(ingest, reprocess)
    }

    pub fn pipeline(&self, mode: PipelineMode) -> &Pipeline {
        match mode {
            PipelineMode::Ingest => &self.ingest,
            PipelineMode::Reprocess => &self.reprocess,
        }
    }

    pub fn run(&self, mode: PipelineMode, tx: &mut Transaction) {
        self.pipeline(mode).run(tx);
    }

    /// Run the selected pipeline over a set of transactions
    pub fn run_all(&self, mode: PipelineMode, mut transactions: Vec<Transaction>) -> Vec<Transaction> {
        let pipeline = self.pipeline(mode);
        for tx in transactions.iter_mut() {
            pipeline.run(tx);
        }
        transactions
    }
}
