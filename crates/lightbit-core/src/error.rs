//! Core error types.

use crate::confidence::ConfidenceLevel;
use thiserror::Error;

/// Errors from the wire encoding primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Ran off the end of the input.
    #[error("unexpected end of data: need {need} bytes, {have} available")]
    UnexpectedEnd { need: usize, have: usize },

    /// Structurally invalid encoding.
    #[error("invalid encoding: {0}")]
    Invalid(String),
}

/// Result type for encoding operations.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Raised by a `BlockChain` implementation when a block fails validation.
/// Propagated unchanged through the peer layer.
#[derive(Error, Debug, Clone)]
#[error("verification failed: {0}")]
pub struct VerificationError(pub String);

/// Raised by a `BlockStore` implementation. Fatal to the peer pool.
#[derive(Error, Debug, Clone)]
#[error("block store failure: {0}")]
pub struct BlockStoreError(pub String);

/// Misuse of `TransactionConfidence` accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfidenceError {
    /// A level-gated field was read while the confidence was in another level.
    #[error("confidence is {actual:?}, operation requires {required:?}")]
    WrongLevel {
        required: ConfidenceLevel,
        actual: ConfidenceLevel,
    },

    /// Chain heights are never negative.
    #[error("chain height cannot be negative: {0}")]
    NegativeHeight(i32),
}
