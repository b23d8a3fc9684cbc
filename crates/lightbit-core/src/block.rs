//! Blocks, headers and chain work.

use crate::encode::{read_hash, read_u32, read_varint, write_hash, write_varint};
use crate::error::{EncodeError, EncodeResult};
use crate::hash::{sha256d, Sha256dHash};
use crate::transaction::Transaction;
use bytes::{BufMut, Bytes};
use num_bigint::BigUint;

/// An 80-byte block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Format version.
    pub version: u32,
    /// Hash of the preceding block.
    pub prev_block: Sha256dHash,
    /// Merkle root over the block's transactions.
    pub merkle_root: Sha256dHash,
    /// Timestamp (seconds since the epoch).
    pub time: u32,
    /// Difficulty target in compact form.
    pub bits: u32,
    /// Proof-of-work counter.
    pub nonce: u32,
}

impl BlockHeader {
    /// Parse from consensus encoding.
    pub fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        Ok(Self {
            version: read_u32(buf)?,
            prev_block: read_hash(buf)?,
            merkle_root: read_hash(buf)?,
            time: read_u32(buf)?,
            bits: read_u32(buf)?,
            nonce: read_u32(buf)?,
        })
    }

    /// Write the consensus encoding.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.version);
        write_hash(buf, &self.prev_block);
        write_hash(buf, &self.merkle_root);
        buf.put_u32_le(self.time);
        buf.put_u32_le(self.bits);
        buf.put_u32_le(self.nonce);
    }

    /// The block hash (double SHA-256 of the 80 header bytes).
    pub fn hash(&self) -> Sha256dHash {
        let mut buf = Vec::with_capacity(80);
        self.encode(&mut buf);
        sha256d(&buf)
    }

    /// Difficulty target expanded from compact form.
    pub fn target(&self) -> BigUint {
        let exponent = (self.bits >> 24) as usize;
        let mantissa = BigUint::from(self.bits & 0x007F_FFFF);
        if exponent <= 3 {
            mantissa >> (8 * (3 - exponent))
        } else {
            mantissa << (8 * (exponent - 3))
        }
    }

    /// Expected number of hashes to find this block: `2^256 / (target + 1)`.
    pub fn work(&self) -> BigUint {
        (BigUint::from(1u8) << 256u32) / (self.target() + 1u8)
    }
}

/// A block: header plus transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The header.
    pub header: BlockHeader,
    /// Transactions in wire order; the first is the coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Parse from consensus encoding.
    pub fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        let header = BlockHeader::parse(buf)?;
        let tx_count = read_varint(buf)?;
        let mut transactions = Vec::with_capacity(tx_count.min(1024) as usize);
        for _ in 0..tx_count {
            transactions.push(Transaction::parse(buf)?);
        }
        Ok(Self {
            header,
            transactions,
        })
    }

    /// Write the consensus encoding.
    pub fn encode(&self, buf: &mut impl BufMut) {
        self.header.encode(buf);
        write_varint(buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode(buf);
        }
    }

    /// The block hash.
    pub fn hash(&self) -> Sha256dHash {
        self.header.hash()
    }

    /// Compute the merkle root over the block's transactions.
    ///
    /// Levels with an odd node count duplicate the last node.
    pub fn compute_merkle_root(&self) -> EncodeResult<Sha256dHash> {
        if self.transactions.is_empty() {
            return Err(EncodeError::Invalid("block has no transactions".into()));
        }
        let mut level: Vec<Sha256dHash> = self.transactions.iter().map(|tx| tx.hash()).collect();
        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { pair[0] };
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(left.as_bytes());
                buf.extend_from_slice(right.as_bytes());
                next.push(sha256d(&buf));
            }
            level = next;
        }
        Ok(level[0])
    }
}

/// A header annotated with its position in the chain, as handed out by a
/// `BlockStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    /// The block header.
    pub header: BlockHeader,
    /// Total work of the chain up to and including this block.
    pub chain_work: BigUint,
    /// Height of this block; the genesis block is height zero.
    pub height: u32,
}

impl StoredBlock {
    /// Create a stored block.
    pub fn new(header: BlockHeader, chain_work: BigUint, height: u32) -> Self {
        Self {
            header,
            chain_work,
            height,
        }
    }

    /// Stored form of `header` when it extends this block.
    pub fn build_on_top(&self, header: BlockHeader) -> StoredBlock {
        let chain_work = &self.chain_work + header.work();
        StoredBlock::new(header, chain_work, self.height + 1)
    }
}
