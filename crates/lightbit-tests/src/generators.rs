//! Proptest strategies for core types.
//!
//! Kept in a non-test module so every test file shares one set of
//! generators.

use lightbit_core::{PeerAddress, Sha256dHash};
use std::net::Ipv4Addr;

/// Inclusive bound of script numbers representable in 4 bytes.
pub const MAX_4BYTE_NUM: i64 = 0x7FFF_FFFF;

/// All values below are plain constructors usable without proptest; the
/// `proptest`-based strategies live in the test files via these helpers.

/// A deterministic 32-byte hash from a seed byte.
pub fn hash_from_seed(seed: u8) -> Sha256dHash {
    Sha256dHash::from_bytes([seed; 32])
}

/// A loopback-free test address from a seed byte.
pub fn address_from_seed(seed: u8) -> PeerAddress {
    PeerAddress::new(Ipv4Addr::new(10, 0, 0, seed), 8333)
}
