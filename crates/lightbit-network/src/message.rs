//! P2P protocol messages and their typed parsers.

use bytes::{Buf, BufMut, Bytes};
use lightbit_core::encode::{
    read_bytes, read_hash, read_u32, read_u64, read_varbytes, read_varint, read_varstr,
    write_hash, write_varbytes, write_varint, write_varstr,
};
use lightbit_core::{Block, BlockHeader, EncodeError, EncodeResult, PeerAddress, Transaction};
use std::net::Ipv4Addr;
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::ADDR_TIME_PROTOCOL_VERSION;

/// Most `addr` entries accepted in one message.
const MAX_ADDRESSES: u64 = 1000;
/// Most inventory items accepted in one message.
const MAX_INVENTORY_ITEMS: u64 = 50_000;
/// Most headers accepted in one message.
const MAX_HEADERS: u64 = 2000;

/// A parsed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Ping(PingMessage),
    Addr(Vec<AddrEntry>),
    Inv(InventoryMessage),
    GetData(InventoryMessage),
    GetBlocks(GetBlocksMessage),
    GetHeaders(GetBlocksMessage),
    Tx(Transaction),
    Block(Block),
    Headers(HeadersMessage),
    Alert(AlertMessage),
    /// A command we do not understand; logged and skipped.
    Unknown { command: String },
}

impl Message {
    /// The wire command string.
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Addr(_) => "addr",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::GetBlocks(_) => "getblocks",
            Message::GetHeaders(_) => "getheaders",
            Message::Tx(_) => "tx",
            Message::Block(_) => "block",
            Message::Headers(_) => "headers",
            Message::Alert(_) => "alert",
            Message::Unknown { command } => command,
        }
    }

    /// Serialize the payload. `peer_version` governs version-dependent
    /// fields such as `addr` timestamps.
    pub fn encode_payload(&self, peer_version: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Message::Version(version) => version.encode(&mut buf),
            Message::Verack => {}
            Message::Ping(ping) => ping.encode(&mut buf),
            Message::Addr(entries) => {
                write_varint(&mut buf, entries.len() as u64);
                for entry in entries {
                    entry.encode(&mut buf, peer_version);
                }
            }
            Message::Inv(inventory) | Message::GetData(inventory) => inventory.encode(&mut buf),
            Message::GetBlocks(locator) | Message::GetHeaders(locator) => locator.encode(&mut buf),
            Message::Tx(tx) => tx.encode(&mut buf),
            Message::Block(block) => block.encode(&mut buf),
            Message::Headers(headers) => headers.encode(&mut buf),
            Message::Alert(alert) => alert.encode(&mut buf),
            Message::Unknown { .. } => {}
        }
        buf
    }

    /// Dispatch the typed parser for `command`. Unknown commands come back
    /// as [`Message::Unknown`].
    pub fn parse_payload(
        command: &str,
        payload: Bytes,
        peer_version: u32,
    ) -> ProtocolResult<Message> {
        let mut buf = payload;
        let result: EncodeResult<Message> = match command {
            "version" => VersionMessage::parse(&mut buf).map(Message::Version),
            "verack" => Ok(Message::Verack),
            "ping" => PingMessage::parse(&mut buf).map(Message::Ping),
            "addr" => parse_addr(&mut buf, peer_version).map(Message::Addr),
            "inv" => InventoryMessage::parse(&mut buf).map(Message::Inv),
            "getdata" => InventoryMessage::parse(&mut buf).map(Message::GetData),
            "getblocks" => GetBlocksMessage::parse(&mut buf).map(Message::GetBlocks),
            "getheaders" => GetBlocksMessage::parse(&mut buf).map(Message::GetHeaders),
            "tx" => Transaction::parse(&mut buf).map(Message::Tx),
            "block" => Block::parse(&mut buf).map(Message::Block),
            "headers" => HeadersMessage::parse(&mut buf).map(Message::Headers),
            "alert" => AlertMessage::parse(&mut buf).map(Message::Alert),
            other => {
                debug!(command = other, "Skipping unknown message");
                Ok(Message::Unknown {
                    command: other.to_string(),
                })
            }
        };
        result.map_err(|source| ProtocolError::MalformedPayload {
            command: command.to_string(),
            source,
        })
    }
}

/// A `services` + IP + port triple as embedded in `version` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
    pub services: u64,
    pub address: PeerAddress,
}

impl NetAddress {
    pub fn new(services: u64, address: PeerAddress) -> Self {
        Self { services, address }
    }

    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        let services = read_u64(buf)?;
        let ip = read_ip(buf)?;
        let port = read_port_be(buf)?;
        Ok(Self {
            services,
            address: PeerAddress::new(ip.unwrap_or(Ipv4Addr::UNSPECIFIED), port),
        })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.services);
        write_ip(buf, self.address.ip);
        buf.put_u16(self.address.port);
    }
}

/// IPs are 16 bytes on the wire; we speak IPv4 only, as v4-mapped v6.
fn read_ip(buf: &mut Bytes) -> EncodeResult<Option<Ipv4Addr>> {
    let raw = read_bytes(buf, 16)?;
    if raw[..10] == [0u8; 10] && raw[10] == 0xFF && raw[11] == 0xFF {
        Ok(Some(Ipv4Addr::new(raw[12], raw[13], raw[14], raw[15])))
    } else {
        Ok(None)
    }
}

fn write_ip(buf: &mut impl BufMut, ip: Ipv4Addr) {
    buf.put_slice(&[0u8; 10]);
    buf.put_slice(&[0xFF, 0xFF]);
    buf.put_slice(&ip.octets());
}

/// Ports are the one big-endian field in the protocol.
fn read_port_be(buf: &mut Bytes) -> EncodeResult<u16> {
    if buf.remaining() < 2 {
        return Err(EncodeError::UnexpectedEnd {
            need: 2,
            have: buf.remaining(),
        });
    }
    Ok(buf.get_u16())
}

/// The `version` announcement opening the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    /// Protocol version the peer speaks.
    pub version: u32,
    /// Service bits.
    pub services: u64,
    /// Peer clock, seconds since the epoch.
    pub timestamp: u64,
    /// Address of the node the message is sent to.
    pub recv_addr: NetAddress,
    /// Address of the sender.
    pub from_addr: NetAddress,
    /// Random nonce identifying this connection.
    pub nonce: u64,
    /// Free-form client identifier.
    pub user_agent: String,
    /// Height of the sender's best chain.
    pub start_height: u32,
}

impl VersionMessage {
    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        let version = read_u32(buf)?;
        let services = read_u64(buf)?;
        let timestamp = read_u64(buf)?;
        let recv_addr = NetAddress::parse(buf)?;
        let from_addr = NetAddress::parse(buf)?;
        // Ancient peers stop here; take the rest only if present.
        let nonce = if buf.remaining() >= 8 { read_u64(buf)? } else { 0 };
        let user_agent = if buf.has_remaining() {
            read_varstr(buf)?
        } else {
            String::new()
        };
        let start_height = if buf.remaining() >= 4 { read_u32(buf)? } else { 0 };
        Ok(Self {
            version,
            services,
            timestamp,
            recv_addr,
            from_addr,
            nonce,
            user_agent,
            start_height,
        })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.version);
        buf.put_u64_le(self.services);
        buf.put_u64_le(self.timestamp);
        self.recv_addr.encode(buf);
        self.from_addr.encode(buf);
        buf.put_u64_le(self.nonce);
        write_varstr(buf, &self.user_agent);
        buf.put_u32_le(self.start_height);
    }
}

/// `ping` payload; a nonce only for BIP-31-era peers. No response is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingMessage {
    pub nonce: Option<u64>,
}

impl PingMessage {
    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        let nonce = if buf.remaining() >= 8 {
            Some(read_u64(buf)?)
        } else {
            None
        };
        Ok(Self { nonce })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        if let Some(nonce) = self.nonce {
            buf.put_u64_le(nonce);
        }
    }
}

/// One `addr` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrEntry {
    /// Last-seen time; zero for pre-31402 peers.
    pub time: u32,
    /// Service bits.
    pub services: u64,
    /// The endpoint.
    pub address: PeerAddress,
}

impl AddrEntry {
    fn encode(&self, buf: &mut impl BufMut, peer_version: u32) {
        if peer_version >= ADDR_TIME_PROTOCOL_VERSION {
            buf.put_u32_le(self.time);
        }
        buf.put_u64_le(self.services);
        write_ip(buf, self.address.ip);
        buf.put_u16(self.address.port);
    }
}

fn parse_addr(buf: &mut Bytes, peer_version: u32) -> EncodeResult<Vec<AddrEntry>> {
    let count = read_varint(buf)?;
    if count > MAX_ADDRESSES {
        return Err(EncodeError::Invalid(format!(
            "addr announces {count} entries, max {MAX_ADDRESSES}"
        )));
    }
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let time = if peer_version >= ADDR_TIME_PROTOCOL_VERSION {
            read_u32(buf)?
        } else {
            0
        };
        let services = read_u64(buf)?;
        let ip = read_ip(buf)?;
        let port = read_port_be(buf)?;
        match ip {
            Some(ip) => entries.push(AddrEntry {
                time,
                services,
                address: PeerAddress::new(ip, port),
            }),
            // IPv4 only; other families are skipped, not fatal.
            None => debug!("Skipping non-IPv4 addr entry"),
        }
    }
    Ok(entries)
}

/// Inventory item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvType {
    Transaction,
    Block,
}

impl InvType {
    fn from_wire(value: u32) -> EncodeResult<Self> {
        match value {
            1 => Ok(InvType::Transaction),
            2 => Ok(InvType::Block),
            other => Err(EncodeError::Invalid(format!(
                "unknown inventory type {other}"
            ))),
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            InvType::Transaction => 1,
            InvType::Block => 2,
        }
    }
}

/// A `(type, hash)` pair advertised in `inv` and requested via `getdata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InventoryItem {
    pub kind: InvType,
    pub hash: lightbit_core::Sha256dHash,
}

impl InventoryItem {
    pub fn new(kind: InvType, hash: lightbit_core::Sha256dHash) -> Self {
        Self { kind, hash }
    }
}

/// Payload shared by `inv` and `getdata`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InventoryMessage {
    pub items: Vec<InventoryItem>,
}

impl InventoryMessage {
    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        let count = read_varint(buf)?;
        if count > MAX_INVENTORY_ITEMS {
            return Err(EncodeError::Invalid(format!(
                "inventory announces {count} items, max {MAX_INVENTORY_ITEMS}"
            )));
        }
        let mut items = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let kind = InvType::from_wire(read_u32(buf)?)?;
            let hash = read_hash(buf)?;
            items.push(InventoryItem { kind, hash });
        }
        Ok(Self { items })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        write_varint(buf, self.items.len() as u64);
        for item in &self.items {
            buf.put_u32_le(item.kind.to_wire());
            write_hash(buf, &item.hash);
        }
    }
}

/// Payload shared by `getblocks` and `getheaders`: a block locator and a
/// stop hash (all-zero for "as many as you have").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocksMessage {
    pub version: u32,
    pub locator: Vec<lightbit_core::Sha256dHash>,
    pub stop_hash: lightbit_core::Sha256dHash,
}

impl GetBlocksMessage {
    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        let version = read_u32(buf)?;
        let count = read_varint(buf)?;
        if count > 500 {
            return Err(EncodeError::Invalid(format!(
                "block locator with {count} entries"
            )));
        }
        let mut locator = Vec::with_capacity(count as usize);
        for _ in 0..count {
            locator.push(read_hash(buf)?);
        }
        let stop_hash = read_hash(buf)?;
        Ok(Self {
            version,
            locator,
            stop_hash,
        })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.version);
        write_varint(buf, self.locator.len() as u64);
        for hash in &self.locator {
            write_hash(buf, hash);
        }
        write_hash(buf, &self.stop_hash);
    }
}

/// `headers` payload: bare headers, each trailed by a zero tx count.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeadersMessage {
    pub headers: Vec<BlockHeader>,
}

impl HeadersMessage {
    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        let count = read_varint(buf)?;
        if count > MAX_HEADERS {
            return Err(EncodeError::Invalid(format!(
                "headers announces {count} entries, max {MAX_HEADERS}"
            )));
        }
        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            headers.push(BlockHeader::parse(buf)?);
            // Trailing transaction count, zero by convention.
            read_varint(buf)?;
        }
        Ok(Self { headers })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        write_varint(buf, self.headers.len() as u64);
        for header in &self.headers {
            header.encode(buf);
            write_varint(buf, 0);
        }
    }
}

/// A signed network alert. The signature is carried but not verified here;
/// alerts are propagated to listeners as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    /// Serialized alert payload.
    pub content: Vec<u8>,
    /// ECDSA signature over `content`.
    pub signature: Vec<u8>,
}

impl AlertMessage {
    fn parse(buf: &mut Bytes) -> EncodeResult<Self> {
        Ok(Self {
            content: read_varbytes(buf)?,
            signature: read_varbytes(buf)?,
        })
    }

    fn encode(&self, buf: &mut impl BufMut) {
        write_varbytes(buf, &self.content);
        write_varbytes(buf, &self.signature);
    }

    /// Parse the inner payload fields.
    pub fn payload(&self) -> EncodeResult<AlertPayload> {
        let mut buf = Bytes::from(self.content.clone());
        let version = read_u32(&mut buf)?;
        let relay_until = read_u64(&mut buf)?;
        let expiration = read_u64(&mut buf)?;
        let id = read_u32(&mut buf)?;
        let cancel = read_u32(&mut buf)?;
        let cancel_count = read_varint(&mut buf)?;
        let mut set_cancel = Vec::with_capacity(cancel_count.min(64) as usize);
        for _ in 0..cancel_count {
            set_cancel.push(read_u32(&mut buf)?);
        }
        let min_ver = read_u32(&mut buf)?;
        let max_ver = read_u32(&mut buf)?;
        let sub_ver_count = read_varint(&mut buf)?;
        let mut set_sub_ver = Vec::with_capacity(sub_ver_count.min(64) as usize);
        for _ in 0..sub_ver_count {
            set_sub_ver.push(read_varstr(&mut buf)?);
        }
        let priority = read_u32(&mut buf)?;
        let comment = read_varstr(&mut buf)?;
        let status_bar = read_varstr(&mut buf)?;
        let reserved = read_varstr(&mut buf)?;
        Ok(AlertPayload {
            version,
            relay_until,
            expiration,
            id,
            cancel,
            set_cancel,
            min_ver,
            max_ver,
            set_sub_ver,
            priority,
            comment,
            status_bar,
            reserved,
        })
    }
}

/// Decoded fields of an alert's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPayload {
    pub version: u32,
    pub relay_until: u64,
    pub expiration: u64,
    pub id: u32,
    pub cancel: u32,
    pub set_cancel: Vec<u32>,
    pub min_ver: u32,
    pub max_ver: u32,
    pub set_sub_ver: Vec<String>,
    pub priority: u32,
    pub comment: String,
    pub status_bar: String,
    pub reserved: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PROTOCOL_VERSION;
    use lightbit_core::sha256d;

    fn roundtrip(message: Message, peer_version: u32) {
        let payload = message.encode_payload(peer_version);
        let parsed =
            Message::parse_payload(message.command(), Bytes::from(payload), peer_version).unwrap();
        assert_eq!(parsed, message);
    }

    fn sample_version() -> VersionMessage {
        VersionMessage {
            version: PROTOCOL_VERSION,
            services: 1,
            timestamp: 1_313_000_000,
            recv_addr: NetAddress::new(1, PeerAddress::new(Ipv4Addr::new(1, 2, 3, 4), 8333)),
            from_addr: NetAddress::new(1, PeerAddress::new(Ipv4Addr::new(5, 6, 7, 8), 8333)),
            nonce: 0xDEAD_BEEF,
            user_agent: "/lightbit:0.1.0/".to_string(),
            start_height: 98_765,
        }
    }

    #[test]
    fn test_version_roundtrip() {
        roundtrip(Message::Version(sample_version()), PROTOCOL_VERSION);
    }

    #[test]
    fn test_version_tolerates_ancient_payloads() {
        // A peer that stops after the addresses still parses.
        let mut payload = Message::Version(sample_version()).encode_payload(PROTOCOL_VERSION);
        payload.truncate(4 + 8 + 8 + 26 + 26);
        let parsed =
            Message::parse_payload("version", Bytes::from(payload), PROTOCOL_VERSION).unwrap();
        match parsed {
            Message::Version(v) => {
                assert_eq!(v.nonce, 0);
                assert_eq!(v.user_agent, "");
                assert_eq!(v.start_height, 0);
            }
            other => panic!("expected version, got {other:?}"),
        }
    }

    #[test]
    fn test_inventory_roundtrip() {
        let inventory = InventoryMessage {
            items: vec![
                InventoryItem::new(InvType::Transaction, sha256d(b"tx")),
                InventoryItem::new(InvType::Block, sha256d(b"block")),
            ],
        };
        roundtrip(Message::Inv(inventory.clone()), PROTOCOL_VERSION);
        roundtrip(Message::GetData(inventory), PROTOCOL_VERSION);
    }

    #[test]
    fn test_inventory_rejects_unknown_type() {
        let mut payload = Vec::new();
        write_varint(&mut payload, 1);
        payload.extend_from_slice(&9u32.to_le_bytes());
        payload.extend_from_slice(&[0u8; 32]);
        assert!(Message::parse_payload("inv", Bytes::from(payload), PROTOCOL_VERSION).is_err());
    }

    #[test]
    fn test_getblocks_roundtrip() {
        let message = GetBlocksMessage {
            version: PROTOCOL_VERSION,
            locator: vec![sha256d(b"head"), sha256d(b"genesis")],
            stop_hash: lightbit_core::Sha256dHash::ZERO,
        };
        roundtrip(Message::GetBlocks(message.clone()), PROTOCOL_VERSION);
        roundtrip(Message::GetHeaders(message), PROTOCOL_VERSION);
    }

    #[test]
    fn test_addr_timestamps_depend_on_version() {
        let entries = vec![AddrEntry {
            time: 1_313_000_000,
            services: 1,
            address: PeerAddress::new(Ipv4Addr::new(9, 9, 9, 9), 8333),
        }];
        roundtrip(Message::Addr(entries.clone()), PROTOCOL_VERSION);

        // Before 31402 the timestamp is absent from the wire.
        let with_time = Message::Addr(entries.clone()).encode_payload(PROTOCOL_VERSION);
        let without_time = Message::Addr(entries).encode_payload(209);
        assert_eq!(with_time.len(), without_time.len() + 4);

        let parsed = Message::parse_payload("addr", Bytes::from(without_time), 209).unwrap();
        match parsed {
            Message::Addr(parsed_entries) => assert_eq!(parsed_entries[0].time, 0),
            other => panic!("expected addr, got {other:?}"),
        }
    }

    #[test]
    fn test_addr_skips_ipv6() {
        let mut payload = Vec::new();
        write_varint(&mut payload, 1);
        payload.extend_from_slice(&1_313_000_000u32.to_le_bytes());
        payload.extend_from_slice(&1u64.to_le_bytes());
        payload.extend_from_slice(&[0x20; 16]); // not v4-mapped
        payload.extend_from_slice(&8333u16.to_be_bytes());
        let parsed =
            Message::parse_payload("addr", Bytes::from(payload), PROTOCOL_VERSION).unwrap();
        assert_eq!(parsed, Message::Addr(Vec::new()));
    }

    #[test]
    fn test_ping_with_and_without_nonce() {
        roundtrip(Message::Ping(PingMessage { nonce: None }), PROTOCOL_VERSION);
        roundtrip(
            Message::Ping(PingMessage { nonce: Some(7) }),
            PROTOCOL_VERSION,
        );
    }

    #[test]
    fn test_tx_and_block_roundtrip() {
        use lightbit_core::transaction::{OutPoint, TxIn, TxOut};

        let mut tx = Transaction::new();
        tx.add_input(TxIn::new(
            OutPoint {
                hash: sha256d(b"prev"),
                index: 3,
            },
            vec![0x51, 0x52],
        ));
        tx.add_output(TxOut::new(1234, vec![0x76, 0xA9]));
        roundtrip(Message::Tx(tx.clone()), PROTOCOL_VERSION);

        let block = Block {
            header: BlockHeader {
                version: 1,
                prev_block: sha256d(b"prev"),
                merkle_root: tx.hash(),
                time: 1_313_000_000,
                bits: 0x1D00_FFFF,
                nonce: 7,
            },
            transactions: vec![tx],
        };
        roundtrip(Message::Block(block), PROTOCOL_VERSION);
    }

    #[test]
    fn test_headers_roundtrip() {
        let header = BlockHeader {
            version: 1,
            prev_block: sha256d(b"prev"),
            merkle_root: sha256d(b"merkle"),
            time: 1_313_000_000,
            bits: 0x1D00_FFFF,
            nonce: 42,
        };
        roundtrip(
            Message::Headers(HeadersMessage {
                headers: vec![header.clone(), header],
            }),
            PROTOCOL_VERSION,
        );
    }

    #[test]
    fn test_alert_roundtrip_and_payload() {
        let mut content = Vec::new();
        content.extend_from_slice(&1u32.to_le_bytes()); // version
        content.extend_from_slice(&10u64.to_le_bytes()); // relay until
        content.extend_from_slice(&20u64.to_le_bytes()); // expiration
        content.extend_from_slice(&7u32.to_le_bytes()); // id
        content.extend_from_slice(&0u32.to_le_bytes()); // cancel
        write_varint(&mut content, 0); // set_cancel
        content.extend_from_slice(&0u32.to_le_bytes()); // min ver
        content.extend_from_slice(&99999u32.to_le_bytes()); // max ver
        write_varint(&mut content, 0); // sub vers
        content.extend_from_slice(&100u32.to_le_bytes()); // priority
        write_varstr(&mut content, "");
        write_varstr(&mut content, "URGENT: upgrade required");
        write_varstr(&mut content, "");

        let alert = AlertMessage {
            content,
            signature: vec![0x30, 0x01, 0x00],
        };
        roundtrip(Message::Alert(alert.clone()), PROTOCOL_VERSION);

        let payload = alert.payload().unwrap();
        assert_eq!(payload.id, 7);
        assert_eq!(payload.status_bar, "URGENT: upgrade required");
        assert_eq!(payload.priority, 100);
    }

    #[test]
    fn test_unknown_command_is_skipped() {
        let parsed = Message::parse_payload(
            "mempool",
            Bytes::from_static(&[1, 2, 3]),
            PROTOCOL_VERSION,
        )
        .unwrap();
        assert_eq!(
            parsed,
            Message::Unknown {
                command: "mempool".to_string()
            }
        );
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let err =
            Message::parse_payload("inv", Bytes::from_static(&[5]), PROTOCOL_VERSION).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { .. }));
    }
}
