//! Hash primitives and the 32-byte double-SHA-256 hash type.

use crate::error::{EncodeError, EncodeResult};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::fmt;

/// A double-SHA-256 hash, stored in wire order.
///
/// `Display` renders the conventional reversed hex form (the form seen in
/// block explorers); [`Sha256dHash::from_hex`] parses that same form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Sha256dHash([u8; 32]);

impl Sha256dHash {
    /// The all-zero hash, used as "no hash" on the wire.
    pub const ZERO: Sha256dHash = Sha256dHash([0u8; 32]);

    /// Wrap raw wire-order bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Wrap a 32-byte slice.
    pub fn from_slice(slice: &[u8]) -> EncodeResult<Self> {
        if slice.len() != 32 {
            return Err(EncodeError::Invalid(format!(
                "hash must be 32 bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Parse the reversed-hex display form.
    pub fn from_hex(s: &str) -> EncodeResult<Self> {
        let mut bytes: Vec<u8> =
            hex::decode(s).map_err(|e| EncodeError::Invalid(format!("bad hash hex: {e}")))?;
        bytes.reverse();
        Self::from_slice(&bytes)
    }

    /// Wire-order bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Consume into wire-order bytes.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// True for the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Sha256dHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl fmt::Debug for Sha256dHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl AsRef<[u8]> for Sha256dHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, as used for block hashes, tx hashes and message checksums.
pub fn sha256d(data: &[u8]) -> Sha256dHash {
    Sha256dHash(Sha256::digest(Sha256::digest(data)).into())
}

/// RIPEMD-160.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// RIPEMD-160 of SHA-256, as used for addresses and `OP_HASH160`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}
