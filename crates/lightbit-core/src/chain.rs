//! Contracts consumed from the block-chain and block-store collaborators.

use crate::block::{Block, StoredBlock};
use crate::error::{BlockStoreError, VerificationError};
use crate::params::NetworkParams;
use parking_lot::RwLock;

/// Persistence for chain heads. Storage internals are opaque to this crate.
pub trait BlockStore: Send + Sync {
    /// The head of the best known chain.
    fn chain_head(&self) -> Result<StoredBlock, BlockStoreError>;

    /// Replace the head of the best known chain.
    fn set_chain_head(&self, head: StoredBlock) -> Result<(), BlockStoreError>;
}

/// Validation and re-org logic. Implementations decide whether a block
/// connects and extend the best chain accordingly.
pub trait BlockChain: Send + Sync {
    /// Try to accept a block. Returns `false` when the block does not
    /// connect to the chain yet (an orphan), `true` when accepted.
    fn add(&self, block: Block) -> Result<bool, VerificationError>;

    /// The head of the best known chain.
    fn chain_head(&self) -> Result<StoredBlock, BlockStoreError>;
}

/// A chain-head-only in-memory store, enough to drive download and tests.
pub struct MemoryBlockStore {
    head: RwLock<StoredBlock>,
}

impl MemoryBlockStore {
    /// Create a store whose head is the genesis block of `params`.
    pub fn new(params: &NetworkParams) -> Self {
        let genesis = &params.genesis.header;
        Self {
            head: RwLock::new(StoredBlock::new(genesis.clone(), genesis.work(), 0)),
        }
    }
}

impl BlockStore for MemoryBlockStore {
    fn chain_head(&self) -> Result<StoredBlock, BlockStoreError> {
        Ok(self.head.read().clone())
    }

    fn set_chain_head(&self, head: StoredBlock) -> Result<(), BlockStoreError> {
        *self.head.write() = head;
        Ok(())
    }
}
