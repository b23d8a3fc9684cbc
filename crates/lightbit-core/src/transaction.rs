//! Transactions and legacy signature hashing.

use crate::confidence::TransactionConfidence;
use crate::encode::{
    read_bytes, read_hash, read_u32, read_u64, read_varbytes, read_varint, write_hash,
    write_varbytes, write_varint,
};
use crate::error::{EncodeError, EncodeResult};
use crate::hash::{sha256d, Sha256dHash};
use bytes::{BufMut, Bytes};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Signature covers all inputs and outputs.
pub const SIGHASH_ALL: u8 = 1;
/// Signature covers inputs only.
pub const SIGHASH_NONE: u8 = 2;
/// Signature covers the output with the same index as the input.
pub const SIGHASH_SINGLE: u8 = 3;
/// Modifier: signature covers only its own input.
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Sequence value meaning "final".
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Reference to an output of an earlier transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Hash of the transaction holding the output.
    pub hash: Sha256dHash,
    /// Output index within that transaction.
    pub index: u32,
}

impl OutPoint {
    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        Self {
            hash: Sha256dHash::ZERO,
            index: 0xFFFF_FFFF,
        }
    }

    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        Ok(Self {
            hash: read_hash(buf)?,
            index: read_u32(buf)?,
        })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        write_hash(buf, &self.hash);
        buf.put_u32_le(self.index);
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// The output being spent.
    pub prevout: OutPoint,
    /// Unlocking script.
    pub script_sig: Vec<u8>,
    /// Sequence number.
    pub sequence: u32,
}

impl TxIn {
    /// Create an input spending `prevout` with the given unlocking script.
    pub fn new(prevout: OutPoint, script_sig: Vec<u8>) -> Self {
        Self {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
        }
    }

    /// True for the coinbase input of a generation transaction.
    pub fn is_coinbase(&self) -> bool {
        self.prevout.hash.is_zero() && self.prevout.index == 0xFFFF_FFFF
    }

    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        Ok(Self {
            prevout: OutPoint::parse(buf)?,
            script_sig: read_varbytes(buf)?,
            sequence: read_u32(buf)?,
        })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        self.prevout.encode(buf);
        write_varbytes(buf, &self.script_sig);
        buf.put_u32_le(self.sequence);
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in base units.
    pub value: u64,
    /// Locking script.
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// Create an output locking `value` base units with the given script.
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        Ok(Self {
            value: read_u64(buf)?,
            script_pubkey: read_varbytes(buf)?,
        })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.value);
        write_varbytes(buf, &self.script_pubkey);
    }
}

/// A Bitcoin transaction.
///
/// Confidence data is attached lazily; two transactions compare equal iff
/// their consensus serializations are equal.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    /// Format version.
    pub version: u32,
    /// Inputs.
    pub inputs: Vec<TxIn>,
    /// Outputs.
    pub outputs: Vec<TxOut>,
    /// Earliest time or block the transaction may enter a block.
    pub lock_time: u32,
    confidence: OnceLock<Arc<TransactionConfidence>>,
}

impl Transaction {
    /// Create an empty version-1 transaction.
    pub fn new() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
            confidence: OnceLock::new(),
        }
    }

    /// Append an input.
    pub fn add_input(&mut self, input: TxIn) {
        self.inputs.push(input);
    }

    /// Append an output.
    pub fn add_output(&mut self, output: TxOut) {
        self.outputs.push(output);
    }

    /// True iff the transaction's only input is a coinbase input.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Parse from consensus encoding.
    pub fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        let version = read_u32(buf)?;
        let input_count = read_varint(buf)?;
        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            inputs.push(TxIn::parse(buf)?);
        }
        let output_count = read_varint(buf)?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            outputs.push(TxOut::parse(buf)?);
        }
        let lock_time = read_u32(buf)?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
            confidence: OnceLock::new(),
        })
    }

    /// Write the consensus encoding.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.version);
        write_varint(buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode(buf);
        }
        write_varint(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(buf);
        }
        buf.put_u32_le(self.lock_time);
    }

    /// Consensus serialization as a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// The transaction hash (double SHA-256 of the serialization).
    pub fn hash(&self) -> Sha256dHash {
        sha256d(&self.to_bytes())
    }

    /// Observational confidence for this transaction, created on first use.
    pub fn confidence(&self) -> Arc<TransactionConfidence> {
        self.confidence
            .get_or_init(|| Arc::new(TransactionConfidence::new()))
            .clone()
    }

    /// Attach a shared confidence object, e.g. from the memory pool. Returns
    /// the attached instance, or the existing one if already initialized.
    pub fn bind_confidence(&self, confidence: Arc<TransactionConfidence>) -> Arc<TransactionConfidence> {
        let _ = self.confidence.set(confidence);
        self.confidence()
    }

    /// Hash covering this transaction for a signature over input
    /// `input_index`, under `sighash` and `connected_script`.
    ///
    /// Every input's script is cleared, the spending input carries the
    /// connected script, and the 4-byte sighash type is appended before
    /// double hashing.
    pub fn hash_for_signature(
        &self,
        input_index: usize,
        connected_script: &[u8],
        sighash: u8,
    ) -> EncodeResult<Sha256dHash> {
        if input_index >= self.inputs.len() {
            return Err(EncodeError::Invalid(format!(
                "input index {input_index} out of range ({} inputs)",
                self.inputs.len()
            )));
        }
        let mut copy = self.clone();
        for input in &mut copy.inputs {
            input.script_sig.clear();
        }
        copy.inputs[input_index].script_sig = connected_script.to_vec();

        let mut buf = copy.to_bytes();
        buf.put_u32_le(sighash as u32);
        Ok(sha256d(&buf))
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.lock_time == other.lock_time
    }
}

impl Eq for Transaction {}

impl std::hash::Hash for Transaction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash().as_bytes().hash(state);
    }
}
