//! # lightbit-network
//!
//! P2P networking layer for the lightbit Bitcoin client.
//!
//! This crate provides:
//! - Wire message types and their typed parsers
//! - Length-prefixed, magic-framed, optionally checksummed framing
//! - TCP connections with the four-message version handshake
//! - Per-peer sessions driving block download and transaction relay
//! - A bounded pool of peer sessions with discovery and failover

mod codec;
mod connection;
mod discovery;
mod error;
mod message;
mod peer;
mod pool;

pub use codec::BitcoinCodec;
pub use connection::{Connection, ConnectionConfig};
pub use discovery::{DnsDiscovery, PeerDiscovery, SeedPeers, MAINNET_DNS_SEEDS};
pub use error::{DiscoveryError, PeerError, ProtocolError, ProtocolResult};
pub use message::{
    AddrEntry, AlertMessage, AlertPayload, GetBlocksMessage, HeadersMessage, InvType,
    InventoryItem, InventoryMessage, Message, NetAddress, PingMessage, VersionMessage,
};
pub use peer::{GetDataFuture, Peer, PeerEventListener, PeerState};
pub use pool::{PeerPool, PoolConfig, PoolEvent, DEFAULT_MAX_PEERS, DEFAULT_TICK_INTERVAL};

/// Protocol version we speak and announce.
pub const PROTOCOL_VERSION: u32 = 31800;

/// Peers at or above this version send and expect message checksums.
pub const CHECKSUMMING_PROTOCOL_VERSION: u32 = 209;

/// Peers at or above this version put timestamps on `addr` entries.
pub const ADDR_TIME_PROTOCOL_VERSION: u32 = 31402;

/// Largest payload the codec accepts.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// User agent announced in our `version` message.
pub const USER_AGENT: &str = "/lightbit:0.1.0/";
