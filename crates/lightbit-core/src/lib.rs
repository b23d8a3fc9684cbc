//! # lightbit-core
//!
//! Core data types for the lightbit Bitcoin client library.
//!
//! This crate provides:
//! - Hash primitives (double-SHA-256, HASH160)
//! - Consensus wire encoding primitives (varint, varstr, varbytes)
//! - Transactions and legacy signature hashing
//! - Blocks, headers and chain-work arithmetic
//! - The `BlockChain` / `BlockStore` contracts consumed by the network layer
//! - Per-transaction confidence tracking
//! - A bounded, LRU-evicted transaction memory pool

mod address;
mod chain;
mod confidence;
mod crypto;
mod error;
mod mempool;
mod params;

pub mod block;
pub mod encode;
pub mod hash;
pub mod transaction;

pub use address::PeerAddress;
pub use block::{Block, BlockHeader, StoredBlock};
pub use chain::{BlockChain, BlockStore, MemoryBlockStore};
pub use confidence::{ConfidenceLevel, ConfidenceListener, TransactionConfidence};
pub use crypto::ecdsa_verify;
pub use error::{BlockStoreError, ConfidenceError, EncodeError, EncodeResult, VerificationError};
pub use hash::{hash160, ripemd160, sha256, sha256d, Sha256dHash};
pub use mempool::TxMemoryPool;
pub use params::{Network, NetworkParams};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};

/// Value of one coin in base units.
pub const COIN: u64 = 100_000_000;

/// `services` bit advertising that a node carries a full copy of the chain.
pub const NODE_NETWORK: u64 = 1;
