//! Ingestion entry point
//!
//! Raw ERP transactions are run through the pipeline and stored. Re-delivery
//! of an unchanged transaction is a no-op, and a transaction already approved
//! for dispatch is never altered by a newer ERP version.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::batch::BatchAggregator;
use crate::cache::HandoffCache;
use crate::config::CoreConfig;
use crate::error::{LobError, LobResult};
use crate::pipeline::{BusinessRulesProcessor, PipelineMode};
use crate::storage::AccountingStorage;
use crate::types::{FilteringParameters, Transaction, TransactionBatch, Violation, ViolationCode};

const MODULE: &str = "Ingestion";

pub struct IngestionService<S: AccountingStorage> {
    storage: Arc<S>,
    processor: Arc<BusinessRulesProcessor>,
    batches: Arc<BatchAggregator<S>>,
    cache: Arc<dyn HandoffCache<Vec<Transaction>>>,
    config: CoreConfig,
}

impl<S: AccountingStorage> IngestionService<S> {
    pub fn new(
        storage: Arc<S>,
        processor: Arc<BusinessRulesProcessor>,
        batches: Arc<BatchAggregator<S>>,
        cache: Arc<dyn HandoffCache<Vec<Transaction>>>,
        config: CoreConfig,
    ) -> Self {
        Self {
            storage,
            processor,
            batches,
            cache,
            config,
        }
    }

    /// Run raw transactions through the selected pipeline and store them
    ///
    /// Returns the processed set with violations attached, in input order.
    pub async fn ingest(
        &self,
        organisation_id: &str,
        mode: PipelineMode,
        raw: Vec<Transaction>,
    ) -> LobResult<Vec<Transaction>> {
        let mut processed = Vec::with_capacity(raw.len());

        for incoming in raw {
            if incoming.organisation_id() != organisation_id {
                warn!(
                    organisation_id,
                    tx_id = %incoming.id,
                    tx_organisation_id = %incoming.organisation_id(),
                    "Skipping transaction of another organisation"
                );
                continue;
            }

            let existing = self.storage.get_transaction(&incoming.id).await?;
            let tx = match mode {
                PipelineMode::Ingest => self.ingest_one(incoming, existing).await?,
                PipelineMode::Reprocess => self.reprocess_one(incoming, existing).await?,
            };
            self.batches.recompute_for_transaction(&tx.id).await?;
            processed.push(tx);
        }

        info!(
            organisation_id,
            mode = ?mode,
            count = processed.len(),
            with_violations = processed.iter().filter(|tx| tx.has_violations()).count(),
            "Ingestion finished"
        );
        Ok(processed)
    }

    async fn ingest_one(&self, mut incoming: Transaction, existing: Option<Transaction>) -> LobResult<Transaction> {
        let version = incoming.compute_erp_version();

        match existing {
            Some(mut stored) if stored.ledger_dispatch_approved => {
                if stored.erp_version.as_deref() != Some(version.as_str()) {
                    warn!(tx_id = %stored.id, "ERP changed a transaction already approved for dispatch");
                    stored.add_violation(
                        Violation::for_transaction(ViolationCode::TxCannotBeAltered, MODULE)
                            .with_detail("erpVersion", version),
                    );
                    stored.refresh_processing_status();
                    self.storage.save_transaction(&stored).await?;
                }
                Ok(stored)
            }
            Some(stored)
                if stored.erp_version.as_deref() == Some(version.as_str()) && !stored.has_erp_violations() =>
            {
                debug!(tx_id = %stored.id, "Transaction unchanged, skipping pipeline");
                Ok(stored)
            }
            existing => {
                if let Some(stored) = existing {
                    incoming.created_at = stored.created_at;
                }
                incoming.erp_version = Some(version);
                self.processor.run(PipelineMode::Ingest, &mut incoming);
                self.storage.save_transaction(&incoming).await?;
                Ok(incoming)
            }
        }
    }

    async fn reprocess_one(&self, incoming: Transaction, existing: Option<Transaction>) -> LobResult<Transaction> {
        match existing {
            Some(stored) if stored.ledger_dispatch_approved => Ok(stored),
            Some(mut stored) => {
                self.processor.run(PipelineMode::Reprocess, &mut stored);
                self.storage.save_transaction(&stored).await?;
                Ok(stored)
            }
            None => {
                debug!(tx_id = %incoming.id, "Reprocess of unknown transaction, running full ingestion");
                self.ingest_one(incoming, None).await
            }
        }
    }

    /// First ingestion step: create the batch and park the extraction
    pub async fn initiate_ingestion(
        &self,
        filtering_parameters: FilteringParameters,
        extraction: Vec<Transaction>,
    ) -> LobResult<TransactionBatch> {
        let matching: Vec<Transaction> = extraction
            .into_iter()
            .filter(|tx| filtering_parameters.matches(tx))
            .collect();

        let batch = self
            .batches
            .create_batch(filtering_parameters, matching.len())
            .await?;
        self.cache.put(&batch.id, matching).await;
        Ok(batch)
    }

    /// Second ingestion step: process the parked extraction chunk by chunk
    pub async fn continue_ingestion(&self, batch_id: &str) -> LobResult<TransactionBatch> {
        let batch = self.batches.get_batch(batch_id).await?;

        let Some(extraction) = self.cache.take(batch_id).await else {
            self.batches.fail(batch_id, "extraction expired before processing").await?;
            return Err(LobError::IngestionCacheMiss(batch_id.to_string()));
        };

        let organisation_id = batch.organisation_id().to_string();
        let chunk_size = self.config.ingestion_chunk_size.max(1);

        for chunk in extraction.chunks(chunk_size) {
            let processed = match self.ingest(&organisation_id, PipelineMode::Ingest, chunk.to_vec()).await {
                Ok(processed) => processed,
                Err(e) => {
                    self.batches.fail(batch_id, &e.to_string()).await?;
                    return Err(e);
                }
            };
            self.batches.attach(batch_id, &processed).await?;
            debug!(batch_id, chunk = processed.len(), "Chunk attached");
        }

        self.batches.get_batch(batch_id).await
    }
}
