//! Bulk indexing coordinator.
//!
//! Producers push documents onto one bounded queue; a single dispatch loop
//! drains it into a batch per document kind and hands full (or stale)
//! batches to flush tasks that call [`DocumentStore::bulk_index`]. Each
//! queued item carries a completion [`Ticket`] that is released after its
//! batch has been answered, successfully or not.

use super::completion::Ticket;
use crate::storage::{BulkItemOutcome, DocumentStore, GENES_INDEX, VARIANTS_INDEX};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Variant,
    Gene,
}

impl DocumentKind {
    pub fn index(&self) -> &'static str {
        match self {
            DocumentKind::Variant => VARIANTS_INDEX,
            DocumentKind::Gene => GENES_INDEX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Queue capacity; producers wait once it is full.
    pub queue_capacity: usize,
    /// Documents per bulk request.
    pub flush_size: usize,
    /// Flush a non-empty batch at least this often.
    pub flush_interval: Duration,
}

impl BulkConfig {
    /// Concurrent flush tasks.
    pub fn workers(&self) -> usize {
        (self.queue_capacity / 100).max(1)
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            flush_size: 1_000,
            flush_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkStats {
    pub added: u64,
    pub flushed: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct KindCounters {
    added: AtomicU64,
    flushed: AtomicU64,
    failed: AtomicU64,
}

impl KindCounters {
    fn snapshot(&self) -> BulkStats {
        BulkStats {
            added: self.added.load(Ordering::SeqCst),
            flushed: self.flushed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    variant: KindCounters,
    gene: KindCounters,
}

impl Counters {
    fn of(&self, kind: DocumentKind) -> &KindCounters {
        match kind {
            DocumentKind::Variant => &self.variant,
            DocumentKind::Gene => &self.gene,
        }
    }
}

struct QueueItem {
    kind: DocumentKind,
    document: Value,
    ticket: Ticket,
}

/// Handle to the dispatch loop. Cloning shares the same queue; the loop
/// flushes what is left and stops once every handle is dropped.
#[derive(Clone)]
pub struct BulkIndexer {
    sender: mpsc::Sender<QueueItem>,
    counters: Arc<Counters>,
}

impl BulkIndexer {
    pub fn spawn(store: Arc<dyn DocumentStore>, config: BulkConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        tokio::spawn(dispatch(receiver, store, config, Arc::clone(&counters)));

        Self { sender, counters }
    }

    /// Serialize `document` and queue it, waiting for room if the queue is
    /// full. The ticket is released once the store has answered for it.
    pub async fn enqueue<T: Serialize>(
        &self,
        kind: DocumentKind,
        document: &T,
        ticket: Ticket,
    ) -> Result<()> {
        let document = serde_json::to_value(document)?;
        let counters = self.counters.of(kind);
        counters.added.fetch_add(1, Ordering::SeqCst);

        let item = QueueItem {
            kind,
            document,
            ticket,
        };
        if self.sender.send(item).await.is_err() {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Internal("bulk indexer queue is closed".to_string()));
        }
        Ok(())
    }

    pub fn stats(&self, kind: DocumentKind) -> BulkStats {
        self.counters.of(kind).snapshot()
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<QueueItem>,
    store: Arc<dyn DocumentStore>,
    config: BulkConfig,
    counters: Arc<Counters>,
) {
    let workers = config.workers();
    let gate = Arc::new(Semaphore::new(workers));
    let mut batches: HashMap<DocumentKind, Vec<QueueItem>> = HashMap::new();

    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    info!(
        "bulk indexer started (capacity {}, flush size {}, workers {})",
        config.queue_capacity, config.flush_size, workers
    );

    loop {
        tokio::select! {
            item = receiver.recv() => {
                let Some(item) = item else { break };
                let kind = item.kind;
                let batch = batches.entry(kind).or_default();
                batch.push(item);
                if batch.len() >= config.flush_size {
                    let batch = std::mem::take(batch);
                    flush(&gate, &store, &counters, kind, batch).await;
                }
            }
            _ = ticker.tick() => {
                for (kind, batch) in batches.iter_mut() {
                    if !batch.is_empty() {
                        let batch = std::mem::take(batch);
                        flush(&gate, &store, &counters, *kind, batch).await;
                    }
                }
            }
        }
    }

    for (kind, batch) in batches.drain() {
        if !batch.is_empty() {
            flush(&gate, &store, &counters, kind, batch).await;
        }
    }

    // Wait for in-flight flushes before reporting shutdown.
    let _ = gate.acquire_many(workers as u32).await;
    info!("bulk indexer stopped");
}

async fn flush(
    gate: &Arc<Semaphore>,
    store: &Arc<dyn DocumentStore>,
    counters: &Arc<Counters>,
    kind: DocumentKind,
    batch: Vec<QueueItem>,
) {
    let permit = match Arc::clone(gate).acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            error!("bulk worker gate closed, dropping {} documents: {}", batch.len(), e);
            counters
                .of(kind)
                .failed
                .fetch_add(batch.len() as u64, Ordering::SeqCst);
            return;
        }
    };

    let store = Arc::clone(store);
    let counters = Arc::clone(counters);
    tokio::spawn(async move {
        let _permit = permit;
        index_batch(store.as_ref(), counters.of(kind), kind, batch).await;
    });
}

async fn index_batch(
    store: &dyn DocumentStore,
    counters: &KindCounters,
    kind: DocumentKind,
    batch: Vec<QueueItem>,
) {
    let size = batch.len() as u64;
    let (documents, tickets): (Vec<Value>, Vec<Ticket>) = batch
        .into_iter()
        .map(|item| (item.document, item.ticket))
        .unzip();

    match store.bulk_index(kind.index(), documents).await {
        Ok(outcomes) => {
            let mut failed = 0u64;
            for outcome in &outcomes {
                if let BulkItemOutcome::Failed(reason) = outcome {
                    failed += 1;
                    debug!("{} document rejected: {}", kind.index(), reason);
                }
            }
            let flushed = outcomes.len() as u64 - failed;
            counters.flushed.fetch_add(flushed, Ordering::SeqCst);
            counters.failed.fetch_add(size - flushed, Ordering::SeqCst);

            if failed > 0 {
                warn!("{} of {} {} documents failed to index", failed, size, kind.index());
            } else {
                debug!("flushed {} {} documents", flushed, kind.index());
            }
        }
        Err(e) => {
            counters.failed.fetch_add(size, Ordering::SeqCst);
            error!("bulk request of {} {} documents failed: {}", size, kind.index(), e);
        }
    }

    // Release completion only after the stats reflect this batch.
    drop(tickets);
}
