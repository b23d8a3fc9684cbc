//! Bounded pool of transactions seen on the network.
//!
//! Tracks, per transaction hash, the transaction itself (once downloaded)
//! and its shared [`TransactionConfidence`]. The pool is an LRU cache of
//! fixed capacity: when a transaction is evicted it is simply forgotten,
//! and its confidence data is lost with it.

use crate::confidence::TransactionConfidence;
use crate::hash::Sha256dHash;
use crate::transaction::Transaction;
use crate::PeerAddress;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Default number of transactions tracked.
pub const DEFAULT_POOL_CAPACITY: usize = 1000;

struct Entry {
    tx: Option<Transaction>,
    confidence: Arc<TransactionConfidence>,
}

/// Bounded, LRU-evicted memory of transactions seen on the wire.
pub struct TxMemoryPool {
    entries: Mutex<LruCache<Sha256dHash, Entry>>,
}

impl TxMemoryPool {
    /// Create a pool holding at most `capacity` transactions.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Whether `hash` is currently tracked. Does not affect LRU order.
    pub fn was_seen(&self, hash: &Sha256dHash) -> bool {
        self.entries.lock().peek(hash).is_some()
    }

    /// Record that `by` announced `hash` via an `inv`. Creates the entry if
    /// needed and returns the shared confidence.
    pub fn seen_announcement(
        &self,
        hash: Sha256dHash,
        by: PeerAddress,
    ) -> Arc<TransactionConfidence> {
        let confidence = {
            let mut entries = self.entries.lock();
            match entries.get(&hash) {
                Some(entry) => entry.confidence.clone(),
                None => {
                    let confidence = Arc::new(TransactionConfidence::new());
                    let evicted = entries.push(
                        hash,
                        Entry {
                            tx: None,
                            confidence: confidence.clone(),
                        },
                    );
                    if let Some((old, _)) = evicted {
                        debug!(tx = %old, "Forgot transaction (pool capacity)");
                    }
                    confidence
                }
            }
        };
        confidence.mark_broadcast_by(by);
        confidence
    }

    /// Record that `by` sent us the full transaction. Stores the
    /// transaction, binds the pooled confidence into it, and returns that
    /// confidence.
    pub fn seen_transaction(
        &self,
        tx: &Transaction,
        by: PeerAddress,
    ) -> Arc<TransactionConfidence> {
        let hash = tx.hash();
        let confidence = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&hash) {
                Some(entry) => {
                    if entry.tx.is_none() {
                        entry.tx = Some(tx.clone());
                    }
                    entry.confidence.clone()
                }
                None => {
                    let confidence = tx.confidence();
                    let evicted = entries.push(
                        hash,
                        Entry {
                            tx: Some(tx.clone()),
                            confidence: confidence.clone(),
                        },
                    );
                    if let Some((old, _)) = evicted {
                        debug!(tx = %old, "Forgot transaction (pool capacity)");
                    }
                    confidence
                }
            }
        };
        tx.bind_confidence(confidence.clone());
        confidence.mark_broadcast_by(by);
        confidence
    }

    /// The downloaded transaction for `hash`, if any.
    pub fn get(&self, hash: &Sha256dHash) -> Option<Transaction> {
        self.entries.lock().get(hash).and_then(|e| e.tx.clone())
    }

    /// The shared confidence for `hash`, if tracked.
    pub fn confidence(&self, hash: &Sha256dHash) -> Option<Arc<TransactionConfidence>> {
        self.entries.lock().get(hash).map(|e| e.confidence.clone())
    }

    /// Number of tracked transactions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for TxMemoryPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}
