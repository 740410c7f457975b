//! Chain collaborators
//!
//! The publisher never talks to a node directly. Chain tip, payload building,
//! submission and finality lookups are traits implemented elsewhere; the
//! dispatch strategy and the ledger-update sink are pluggable as well.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::config::CardanoNetwork;
use crate::entity::{LedgerUpdate, OnChainEntity};
use crate::error::{PublisherError, PublisherResult};
use lob_core::FinalityScore;

/// Current chain tip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub absolute_slot: u64,
    /// Whether the backing indexer has caught up with the network
    pub synced: bool,
}

#[async_trait]
pub trait ChainTipReader: Send + Sync {
    async fn chain_tip(&self, network: CardanoNetwork) -> PublisherResult<ChainTip>;
}

/// Serialized payload and the entities it actually covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPayload {
    pub payload: Vec<u8>,
    pub included_ids: Vec<String>,
}

#[async_trait]
pub trait TransactionBuilder<E: OnChainEntity>: Send + Sync {
    /// `None` when nothing is left to build after domain filtering
    async fn build(&self, organisation_id: &str, entities: &[E]) -> PublisherResult<Option<BuiltPayload>>;
}

/// Outcome of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1Submission {
    pub tx_hash: String,
    /// Present only when the service waited for inclusion
    pub absolute_slot: Option<u64>,
}

#[async_trait]
pub trait SubmissionService: Send + Sync {
    async fn submit(&self, payload: &[u8]) -> PublisherResult<L1Submission>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChainTxDetails {
    pub finality_score: FinalityScore,
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `None` while the transaction is not visible on chain
    async fn tx_details(&self, tx_hash: &str) -> PublisherResult<Option<OnChainTxDetails>>;
}

/// Picks the subset of leased entities to submit this round
pub trait DispatchStrategy<E: OnChainEntity>: Send + Sync {
    fn select(&self, organisation_id: &str, leased: Vec<E>) -> Vec<E>;
}

/// Submits everything that was leased
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateDispatchStrategy;

impl<E: OnChainEntity> DispatchStrategy<E> for ImmediateDispatchStrategy {
    fn select(&self, _organisation_id: &str, leased: Vec<E>) -> Vec<E> {
        leased
    }
}

/// Submits at most `max` entities, oldest entry date first
#[derive(Debug, Clone, Copy)]
pub struct MaxBatchDispatchStrategy {
    pub max: usize,
}

impl MaxBatchDispatchStrategy {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl<E: OnChainEntity> DispatchStrategy<E> for MaxBatchDispatchStrategy {
    fn select(&self, _organisation_id: &str, mut leased: Vec<E>) -> Vec<E> {
        leased.sort_by(|a, b| a.entry_date().cmp(&b.entry_date()).then_with(|| a.id().cmp(b.id())));
        leased.truncate(self.max);
        leased
    }
}

/// Downstream "ledger updated" notifications, at least once
#[async_trait]
pub trait LedgerUpdatePublisher: Send + Sync {
    async fn publish(&self, organisation_id: &str, updates: Vec<LedgerUpdate>) -> PublisherResult<()>;
}

/// Forwards notifications into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelLedgerUpdatePublisher {
    sender: mpsc::Sender<Vec<LedgerUpdate>>,
}

impl ChannelLedgerUpdatePublisher {
    pub fn new(sender: mpsc::Sender<Vec<LedgerUpdate>>) -> Self {
        Self { sender }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Vec<LedgerUpdate>>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl LedgerUpdatePublisher for ChannelLedgerUpdatePublisher {
    async fn publish(&self, organisation_id: &str, updates: Vec<LedgerUpdate>) -> PublisherResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.sender.send(updates).await.map_err(|e| {
            warn!(organisation_id, dropped = e.0.len(), "Ledger update receiver is gone");
            PublisherError::Configuration("ledger update channel closed".to_string())
        })
    }
}

/// Per-organisation queue in front of a `LedgerUpdatePublisher`
///
/// Updates that could not be delivered stay queued and go out, in order,
/// ahead of the next batch for the same organisation.
pub struct LedgerUpdateOutbox {
    publisher: Arc<dyn LedgerUpdatePublisher>,
    pending: Mutex<HashMap<String, Vec<LedgerUpdate>>>,
}

impl LedgerUpdateOutbox {
    pub fn new(publisher: Arc<dyn LedgerUpdatePublisher>) -> Self {
        Self {
            publisher,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Queue `updates` behind anything still pending and try to deliver the lot
    ///
    /// Returns how many updates were delivered. On failure everything stays
    /// queued for the next attempt.
    pub async fn publish(&self, organisation_id: &str, updates: Vec<LedgerUpdate>) -> PublisherResult<usize> {
        let mut pending = self.pending.lock().await;
        let queue = pending.entry(organisation_id.to_string()).or_default();
        queue.extend(updates);
        if queue.is_empty() {
            pending.remove(organisation_id);
            return Ok(0);
        }

        let batch = queue.clone();
        let queued = batch.len();
        match self.publisher.publish(organisation_id, batch).await {
            Ok(()) => {
                pending.remove(organisation_id);
                debug!(organisation_id, delivered = queued, "Ledger updates delivered");
                Ok(queued)
            }
            Err(e) => {
                warn!(organisation_id, queued, "Ledger updates kept for redelivery: {}", e);
                Err(e)
            }
        }
    }

    /// Retry whatever is still queued for the organisation
    pub async fn flush(&self, organisation_id: &str) -> PublisherResult<usize> {
        self.publish(organisation_id, Vec::new()).await
    }

    pub async fn pending_len(&self, organisation_id: &str) -> usize {
        self.pending.lock().await.get(organisation_id).map_or(0, Vec::len)
    }
}

/// Collaborators shared by the dispatchers and finality pollers
///
/// Clones share one outbox, so the notifications of both stages reach the
/// ledger in the order they were produced.
#[derive(Clone)]
pub struct ChainServices {
    pub chain_tip: Arc<dyn ChainTipReader>,
    pub submitter: Arc<dyn SubmissionService>,
    pub reader: Arc<dyn ChainReader>,
    pub updates: Arc<LedgerUpdateOutbox>,
}

impl ChainServices {
    pub fn new(
        chain_tip: Arc<dyn ChainTipReader>,
        submitter: Arc<dyn SubmissionService>,
        reader: Arc<dyn ChainReader>,
        publisher: Arc<dyn LedgerUpdatePublisher>,
    ) -> Self {
        Self {
            chain_tip,
            submitter,
            reader,
            updates: Arc::new(LedgerUpdateOutbox::new(publisher)),
        }
    }
}
