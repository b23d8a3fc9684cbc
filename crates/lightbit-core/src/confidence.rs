//! Per-transaction observational confidence.
//!
//! A `TransactionConfidence` records how sure we are that a transaction will
//! make it into the best chain: which peers announced it, how deep it is
//! buried, how much work has been done on top of it, and whether it was
//! overridden by a double spend.

use crate::block::BlockHeader;
use crate::error::ConfidenceError;
use crate::hash::Sha256dHash;
use crate::PeerAddress;
use num_bigint::BigUint;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// How a transaction relates to the best chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    /// Nothing is known about the transaction yet.
    Unknown,
    /// Announced by peers but not seen in any block.
    NotSeenInChain,
    /// In a block, but not a best-chain block.
    NotInBestChain,
    /// In a best-chain block; depth and work accumulate.
    Building,
    /// A conflicting transaction took its inputs.
    Dead,
}

/// Observer of confidence changes.
pub trait ConfidenceListener: Send + Sync {
    /// Invoked after the observable state actually changed, outside the
    /// confidence lock.
    fn confidence_changed(&self, confidence: &TransactionConfidence);
}

struct State {
    level: ConfidenceLevel,
    broadcast_by: HashSet<PeerAddress>,
    appeared_at_height: i32,
    depth: u32,
    work_done: BigUint,
    overriding_tx: Option<Sha256dHash>,
    listeners: Vec<Arc<dyn ConfidenceListener>>,
}

/// Thread-safe confidence record for one transaction.
pub struct TransactionConfidence {
    state: Mutex<State>,
}

impl TransactionConfidence {
    /// Create a confidence record in the `Unknown` level.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                level: ConfidenceLevel::Unknown,
                broadcast_by: HashSet::new(),
                appeared_at_height: -1,
                depth: 0,
                work_done: BigUint::from(0u8),
                overriding_tx: None,
                listeners: Vec::new(),
            }),
        }
    }

    /// Current level.
    pub fn level(&self) -> ConfidenceLevel {
        self.state.lock().level
    }

    /// Force the level. Fires listeners iff the level actually changed.
    pub fn set_level(&self, level: ConfidenceLevel) {
        let listeners = {
            let mut state = self.state.lock();
            if state.level == level {
                return;
            }
            state.level = level;
            state.listeners.clone()
        };
        self.fire(&listeners);
    }

    /// Record that `peer` announced this transaction. An `Unknown`
    /// transaction moves to `NotSeenInChain`.
    pub fn mark_broadcast_by(&self, peer: PeerAddress) {
        let listeners = {
            let mut state = self.state.lock();
            let mut changed = state.broadcast_by.insert(peer);
            if state.level == ConfidenceLevel::Unknown {
                state.level = ConfidenceLevel::NotSeenInChain;
                changed = true;
            }
            if !changed {
                return;
            }
            state.listeners.clone()
        };
        self.fire(&listeners);
    }

    /// Number of distinct peers that announced the transaction.
    pub fn num_broadcast_peers(&self) -> usize {
        self.state.lock().broadcast_by.len()
    }

    /// Snapshot of the announcing peers.
    pub fn broadcast_by(&self) -> Vec<PeerAddress> {
        self.state.lock().broadcast_by.iter().copied().collect()
    }

    /// Record inclusion in a best-chain block at `height`; moves the level
    /// to `Building`.
    pub fn set_appeared_at_chain_height(&self, height: i32) -> Result<(), ConfidenceError> {
        if height < 0 {
            return Err(ConfidenceError::NegativeHeight(height));
        }
        let listeners = {
            let mut state = self.state.lock();
            let changed =
                state.appeared_at_height != height || state.level != ConfidenceLevel::Building;
            state.appeared_at_height = height;
            state.level = ConfidenceLevel::Building;
            if !changed {
                return Ok(());
            }
            state.listeners.clone()
        };
        self.fire(&listeners);
        Ok(())
    }

    /// Height of the block the transaction appeared in. Only valid while
    /// `Building`.
    pub fn appeared_at_chain_height(&self) -> Result<i32, ConfidenceError> {
        let state = self.state.lock();
        if state.level != ConfidenceLevel::Building {
            return Err(ConfidenceError::WrongLevel {
                required: ConfidenceLevel::Building,
                actual: state.level,
            });
        }
        Ok(state.appeared_at_height)
    }

    /// Record that `tx` double spent this transaction's inputs; moves the
    /// level to `Dead`.
    pub fn set_overriding_transaction(&self, tx: Sha256dHash) {
        let listeners = {
            let mut state = self.state.lock();
            let changed =
                state.overriding_tx != Some(tx) || state.level != ConfidenceLevel::Dead;
            state.overriding_tx = Some(tx);
            state.level = ConfidenceLevel::Dead;
            if !changed {
                return;
            }
            state.listeners.clone()
        };
        self.fire(&listeners);
    }

    /// The transaction that overrode this one. Only valid while `Dead`.
    pub fn overriding_transaction(&self) -> Result<Sha256dHash, ConfidenceError> {
        let state = self.state.lock();
        if state.level != ConfidenceLevel::Dead {
            return Err(ConfidenceError::WrongLevel {
                required: ConfidenceLevel::Dead,
                actual: state.level,
            });
        }
        state.overriding_tx.ok_or(ConfidenceError::WrongLevel {
            required: ConfidenceLevel::Dead,
            actual: state.level,
        })
    }

    /// Record that `header` was built on top of the transaction's block.
    /// Increments depth and accumulates the block's work; a no-op unless the
    /// level is `Building`.
    pub fn notify_work_done(&self, header: &BlockHeader) {
        let listeners = {
            let mut state = self.state.lock();
            if state.level != ConfidenceLevel::Building {
                return;
            }
            state.depth += 1;
            state.work_done += header.work();
            state.listeners.clone()
        };
        self.fire(&listeners);
    }

    /// Number of blocks burying the transaction, one when it is in the top
    /// block. Only valid while `Building`.
    pub fn depth_in_blocks(&self) -> Result<u32, ConfidenceError> {
        let state = self.state.lock();
        if state.level != ConfidenceLevel::Building {
            return Err(ConfidenceError::WrongLevel {
                required: ConfidenceLevel::Building,
                actual: state.level,
            });
        }
        Ok(state.depth)
    }

    /// Cumulative work of the burying blocks. Only valid while `Building`.
    pub fn work_done(&self) -> Result<BigUint, ConfidenceError> {
        let state = self.state.lock();
        if state.level != ConfidenceLevel::Building {
            return Err(ConfidenceError::WrongLevel {
                required: ConfidenceLevel::Building,
                actual: state.level,
            });
        }
        Ok(state.work_done.clone())
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn ConfidenceListener>) {
        self.state.lock().listeners.push(listener);
    }

    /// Remove a previously registered listener. Returns whether it was found.
    pub fn remove_listener(&self, listener: &Arc<dyn ConfidenceListener>) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        state.listeners.len() != before
    }

    /// Clone the value without its listeners.
    pub fn duplicate(&self) -> TransactionConfidence {
        let state = self.state.lock();
        TransactionConfidence {
            state: Mutex::new(State {
                level: state.level,
                broadcast_by: state.broadcast_by.clone(),
                appeared_at_height: state.appeared_at_height,
                depth: state.depth,
                work_done: state.work_done.clone(),
                overriding_tx: state.overriding_tx,
                listeners: Vec::new(),
            }),
        }
    }

    fn fire(&self, listeners: &[Arc<dyn ConfidenceListener>]) {
        for listener in listeners {
            listener.confidence_changed(self);
        }
    }
}

impl Default for TransactionConfidence {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        if !state.broadcast_by.is_empty() {
            write!(f, "Seen by {} peers. ", state.broadcast_by.len())?;
        }
        match state.level {
            ConfidenceLevel::Unknown => write!(f, "Unknown confidence level."),
            ConfidenceLevel::NotSeenInChain => write!(f, "Not seen in any block yet."),
            ConfidenceLevel::NotInBestChain => write!(f, "Seen in a side chain only."),
            ConfidenceLevel::Building => write!(
                f,
                "Appeared in best chain at height {}, depth {} blocks.",
                state.appeared_at_height, state.depth
            ),
            ConfidenceLevel::Dead => write!(f, "Dead: overridden by a double spend."),
        }
    }
}

impl fmt::Debug for TransactionConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionConfidence({self})")
    }
}
