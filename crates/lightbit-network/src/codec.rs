//! Message framing for the Bitcoin P2P protocol.
//!
//! ```text
//! +----------+-------------+----------+------------+
//! |  Magic   |   Command   |  Length  | [Checksum] |
//! | 4 bytes  |  12 bytes   | 4 bytes  |  4 bytes   |
//! +----------+-------------+----------+------------+
//! |                  Payload                       |
//! |               (Length bytes)                   |
//! +------------------------------------------------+
//! ```
//!
//! - Magic: network identifier (mainnet/testnet), wire order
//! - Command: NUL-padded ASCII
//! - Length: payload length, little-endian
//! - Checksum: first 4 bytes of double-SHA-256 over the payload, present
//!   only while checksumming is enabled
//!
//! Checksumming is off for the initial `version`/`verack` exchange and
//! enabled afterwards once the negotiated protocol version reaches 209.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use lightbit_core::{sha256d, NetworkParams};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::ProtocolError;
use crate::message::Message;
use crate::{MAX_MESSAGE_SIZE, PROTOCOL_VERSION};

/// Command field width.
const COMMAND_SIZE: usize = 12;
/// Header size without the checksum: magic (4) + command (12) + length (4).
const BASE_HEADER_SIZE: usize = 20;
/// Checksum width.
const CHECKSUM_SIZE: usize = 4;

/// Framing codec for one connection.
#[derive(Debug, Clone)]
pub struct BitcoinCodec {
    /// Network magic bytes.
    magic: [u8; 4],
    /// Whether frames carry a payload checksum.
    checksumming: bool,
    /// The remote peer's protocol version, for version-dependent payloads.
    peer_version: u32,
}

impl BitcoinCodec {
    /// Create a codec for `params` with checksumming enabled.
    pub fn new(params: &NetworkParams) -> Self {
        Self {
            magic: params.magic,
            checksumming: true,
            peer_version: PROTOCOL_VERSION,
        }
    }

    /// Whether frames carry a checksum.
    pub fn checksumming(&self) -> bool {
        self.checksumming
    }

    /// Enable or disable checksums.
    pub fn set_checksumming(&mut self, on: bool) {
        self.checksumming = on;
    }

    /// Record the remote peer's advertised protocol version.
    pub fn set_peer_version(&mut self, version: u32) {
        self.peer_version = version;
    }

    fn checksum(payload: &[u8]) -> [u8; 4] {
        let hash = sha256d(payload);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&hash.as_bytes()[..4]);
        checksum
    }

    fn header_size(&self) -> usize {
        if self.checksumming {
            BASE_HEADER_SIZE + CHECKSUM_SIZE
        } else {
            BASE_HEADER_SIZE
        }
    }
}

impl Decoder for BitcoinCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header_size = self.header_size();
        if src.len() < header_size {
            return Ok(None);
        }

        // Parse the header without consuming.
        if src[0..4] != self.magic {
            return Err(ProtocolError::BadMagic {
                expected: hex::encode(self.magic),
                got: hex::encode(&src[0..4]),
            });
        }

        let command_bytes = &src[4..4 + COMMAND_SIZE];
        let command_len = command_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMMAND_SIZE);
        let command = String::from_utf8_lossy(&command_bytes[..command_len]).into_owned();

        let length = u32::from_le_bytes([src[16], src[17], src[18], src[19]]) as usize;
        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: length,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let total = header_size + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let checksum = if self.checksumming {
            let mut checksum = [0u8; 4];
            checksum.copy_from_slice(&src[20..24]);
            Some(checksum)
        } else {
            None
        };

        src.advance(header_size);
        let payload: Bytes = src.split_to(length).freeze();

        if let Some(expected) = checksum {
            if Self::checksum(&payload) != expected {
                return Err(ProtocolError::BadChecksum { command });
            }
        }

        trace!(command = %command, len = length, "Decoded frame");
        Message::parse_payload(&command, payload, self.peer_version).map(Some)
    }
}

impl Encoder<Message> for BitcoinCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let command = item.command();
        debug_assert!(command.len() <= COMMAND_SIZE && command.is_ascii());

        let payload = item.encode_payload(self.peer_version);
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        dst.reserve(self.header_size() + payload.len());
        dst.put_slice(&self.magic);
        let mut command_field = [0u8; COMMAND_SIZE];
        command_field[..command.len()].copy_from_slice(command.as_bytes());
        dst.put_slice(&command_field);
        dst.put_u32_le(payload.len() as u32);
        if self.checksumming {
            dst.put_slice(&Self::checksum(&payload));
        }
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PingMessage;

    fn codec() -> BitcoinCodec {
        BitcoinCodec::new(&NetworkParams::mainnet())
    }

    #[test]
    fn test_roundtrip_with_checksum() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::Ping(PingMessage { nonce: Some(3) }), &mut buf)
            .unwrap();
        // magic + command + length + checksum + 8-byte nonce
        assert_eq!(buf.len(), 24 + 8);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Message::Ping(PingMessage { nonce: Some(3) }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_without_checksum() {
        let mut codec = codec();
        codec.set_checksumming(false);
        let mut buf = BytesMut::new();
        codec.encode(Message::Verack, &mut buf).unwrap();
        assert_eq!(buf.len(), 20);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Message::Verack);
    }

    #[test]
    fn test_partial_frame_asks_for_more() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::Ping(PingMessage { nonce: Some(3) }), &mut buf)
            .unwrap();
        let full = buf.clone();

        let mut partial = BytesMut::from(&full[..10]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut partial = BytesMut::from(&full[..26]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        codec.encode(Message::Verack, &mut buf).unwrap();
        buf[0] ^= 0xFF;
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_flipped_payload_bit_fails_checksum() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::Ping(PingMessage { nonce: Some(3) }), &mut buf)
            .unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0x01;
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_oversize_length_rejected() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        buf.put_slice(&NetworkParams::mainnet().magic);
        buf.put_slice(&[0u8; 12]);
        buf.put_u32_le((MAX_MESSAGE_SIZE + 1) as u32);
        buf.put_slice(&[0u8; 4]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_command_decodes_to_unknown() {
        let mut codec = codec();
        let mut buf = BytesMut::new();
        buf.put_slice(&NetworkParams::mainnet().magic);
        let mut command_field = [0u8; 12];
        command_field[..7].copy_from_slice(b"mempool");
        buf.put_slice(&command_field);
        buf.put_u32_le(0);
        buf.put_slice(&BitcoinCodec::checksum(&[]));
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            decoded,
            Message::Unknown {
                command: "mempool".to_string()
            }
        );
    }
}
