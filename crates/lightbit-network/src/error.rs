//! Network error types.

use lightbit_core::{BlockStoreError, EncodeError, VerificationError};
use thiserror::Error;

/// Wire-level protocol violations and connection failures.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Framing magic did not match the configured network.
    #[error("bad network magic: expected {expected}, got {got}")]
    BadMagic { expected: String, got: String },

    /// Payload checksum mismatch.
    #[error("message checksum mismatch for '{command}'")]
    BadChecksum { command: String },

    /// Declared payload length over the limit.
    #[error("message payload too large: {size} bytes, max {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// A typed payload failed to parse.
    #[error("malformed '{command}' payload: {source}")]
    MalformedPayload {
        command: String,
        source: EncodeError,
    },

    /// The handshake did not follow the version/verack sequence.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The peer does not advertise the chain-carrying services bit.
    #[error("Peer does not have a copy of the block chain")]
    PeerLacksChain,

    /// The remote side closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// An operation did not finish within the configured timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    /// TCP-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for wire operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// The single exit channel for errors escaping a peer session.
#[derive(Error, Debug)]
pub enum PeerError {
    /// Wire-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Socket failure outside the codec.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The block store failed; fatal to the peer pool.
    #[error(transparent)]
    BlockStore(#[from] BlockStoreError),

    /// The block chain rejected a block; propagated unchanged.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// An operation required a connection that is not established.
    #[error("peer is not connected")]
    NotConnected,

    /// The session was cancelled or died before a pending request resolved.
    #[error("peer died before the request completed")]
    Cancelled,
}

/// Failure of a peer discovery source; retried on the next pool tick.
#[derive(Error, Debug)]
#[error("peer discovery failed: {0}")]
pub struct DiscoveryError(pub String);
