//! Network parameters for mainnet and testnet.

use crate::block::{Block, BlockHeader};
use crate::hash::Sha256dHash;
use crate::transaction::{OutPoint, Transaction, TxIn, TxOut};
use crate::COIN;

/// Which chain to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

/// Parameters distinguishing one chain from another.
#[derive(Debug, Clone)]
pub struct NetworkParams {
    /// Chain identity.
    pub network: Network,
    /// Message-framing magic bytes, in wire order.
    pub magic: [u8; 4],
    /// Default P2P port.
    pub default_port: u16,
    /// The genesis block of this chain.
    pub genesis: Block,
}

impl NetworkParams {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            magic: [0xF9, 0xBE, 0xB4, 0xD9],
            default_port: 8333,
            genesis: genesis_block(1231006505, 0x1D00_FFFF, 2083236893),
        }
    }

    /// Testnet parameters.
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            magic: [0x0B, 0x11, 0x09, 0x07],
            default_port: 18333,
            genesis: genesis_block(1296688602, 0x1D00_FFFF, 414098458),
        }
    }

    /// Hash of the genesis block.
    pub fn genesis_hash(&self) -> Sha256dHash {
        self.genesis.hash()
    }
}

/// Build the well-known genesis block. Mainnet and testnet share the same
/// coinbase and differ only in timestamp and nonce.
fn genesis_block(time: u32, bits: u32, nonce: u32) -> Block {
    const COINBASE_SIG: &str = "04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73";
    const COINBASE_PUBKEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

    let mut coinbase = Transaction::new();
    coinbase.add_input(TxIn::new(
        OutPoint::null(),
        hex::decode(COINBASE_SIG).expect("static coinbase script"),
    ));
    let mut script_pubkey = vec![0x41];
    script_pubkey.extend_from_slice(&hex::decode(COINBASE_PUBKEY).expect("static coinbase key"));
    script_pubkey.push(0xAC); // OP_CHECKSIG
    coinbase.add_output(TxOut::new(50 * COIN, script_pubkey));

    let merkle_root = coinbase.hash();
    Block {
        header: BlockHeader {
            version: 1,
            prev_block: Sha256dHash::ZERO,
            merkle_root,
            time,
            bits,
            nonce,
        },
        transactions: vec![coinbase],
    }
}
