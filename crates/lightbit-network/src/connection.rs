//! TCP connections and the version handshake.

use bytes::BytesMut;
use lightbit_core::{NetworkParams, PeerAddress, NODE_NETWORK};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::{debug, info};

use futures::{SinkExt, StreamExt};

use crate::codec::BitcoinCodec;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, NetAddress, VersionMessage};
use crate::{CHECKSUMMING_PROTOCOL_VERSION, PROTOCOL_VERSION, USER_AGENT};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout applied to connect and to each handshake read and write.
    pub timeout: Duration,
    /// User agent announced in our `version`.
    pub user_agent: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// One TCP session with a remote peer, past its version handshake.
pub struct Connection {
    address: PeerAddress,
    peer_version: VersionMessage,
    checksumming: bool,
    reader: Mutex<FramedRead<OwnedReadHalf, BitcoinCodec>>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, BitcoinCodec>>,
    shut_down: AtomicBool,
}

impl Connection {
    /// Connect to `address` and perform the four-message handshake: our
    /// `version`, their `version`, our `verack`, their `verack`, all
    /// without checksums. Afterwards the codec switches to checksumming iff
    /// the peer's version is at least 209, and the connection is shut down
    /// unless the peer advertises a copy of the block chain.
    pub async fn connect(
        params: &NetworkParams,
        address: PeerAddress,
        best_height: u32,
        config: &ConnectionConfig,
    ) -> ProtocolResult<Connection> {
        let mut stream = timeout(config.timeout, TcpStream::connect(address.to_socket_addr()))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("connecting to {address}")))??;
        debug!(addr = %address, "Connected, starting handshake");

        // The handshake runs raw on the stream, without checksums.
        let mut codec = BitcoinCodec::new(params);
        codec.set_checksumming(false);
        let mut buf = BytesMut::with_capacity(1024);

        let our_version = build_version(address, best_height, &config.user_agent);
        write_raw(&mut stream, &mut codec, Message::Version(our_version), config.timeout).await?;

        let peer_version = match read_raw(&mut stream, &mut codec, &mut buf, config.timeout).await?
        {
            Message::Version(version) => version,
            other => {
                return Err(ProtocolError::HandshakeFailed(format!(
                    "expected version, got '{}'",
                    other.command()
                )))
            }
        };

        write_raw(&mut stream, &mut codec, Message::Verack, config.timeout).await?;

        match read_raw(&mut stream, &mut codec, &mut buf, config.timeout).await? {
            Message::Verack => {}
            other => {
                return Err(ProtocolError::HandshakeFailed(format!(
                    "expected verack, got '{}'",
                    other.command()
                )))
            }
        }

        if peer_version.services & NODE_NETWORK == 0 {
            let _ = stream.shutdown().await;
            return Err(ProtocolError::PeerLacksChain);
        }

        // Handshake done; negotiate the framing for everything that follows.
        let checksumming = peer_version.version >= CHECKSUMMING_PROTOCOL_VERSION;
        codec.set_checksumming(checksumming);
        codec.set_peer_version(peer_version.version);

        info!(
            addr = %address,
            version = peer_version.version,
            agent = %peer_version.user_agent,
            height = peer_version.start_height,
            checksumming,
            "Handshake complete"
        );

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, codec.clone());
        // Keep any bytes the peer pipelined behind its verack.
        reader.read_buffer_mut().extend_from_slice(&buf);
        let writer = FramedWrite::new(write_half, codec);

        Ok(Connection {
            address,
            peer_version,
            checksumming,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Read the next message. Blocks until a full frame arrives.
    pub async fn read_message(&self) -> ProtocolResult<Message> {
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            Some(result) => result,
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Write one message. Concurrent writers are serialized by the send
    /// mutex, so frames never interleave on the wire.
    pub async fn write_message(&self, message: Message) -> ProtocolResult<()> {
        let mut writer = self.writer.lock().await;
        writer.send(message).await
    }

    /// Half-close the socket. Idempotent and safe from any task.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.get_mut().shutdown().await {
            debug!(addr = %self.address, error = %e, "Shutdown after socket error");
        }
    }

    /// The remote endpoint.
    pub fn address(&self) -> PeerAddress {
        self.address
    }

    /// The peer's `version` announcement.
    pub fn peer_version(&self) -> &VersionMessage {
        &self.peer_version
    }

    /// Whether post-handshake frames carry checksums.
    pub fn checksumming(&self) -> bool {
        self.checksumming
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Connection({}, version {})",
            self.address, self.peer_version.version
        )
    }
}

fn build_version(peer: PeerAddress, best_height: u32, user_agent: &str) -> VersionMessage {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    VersionMessage {
        version: PROTOCOL_VERSION,
        services: 0,
        timestamp,
        recv_addr: NetAddress::new(NODE_NETWORK, peer),
        from_addr: NetAddress::new(0, PeerAddress::new(Ipv4Addr::UNSPECIFIED, 0)),
        nonce: rand::random(),
        user_agent: user_agent.to_string(),
        start_height: best_height,
    }
}

async fn write_raw(
    stream: &mut TcpStream,
    codec: &mut BitcoinCodec,
    message: Message,
    limit: Duration,
) -> ProtocolResult<()> {
    let command = message.command().to_string();
    let mut frame = BytesMut::new();
    codec.encode(message, &mut frame)?;
    timeout(limit, stream.write_all(&frame))
        .await
        .map_err(|_| ProtocolError::Timeout(format!("sending '{command}'")))??;
    Ok(())
}

async fn read_raw(
    stream: &mut TcpStream,
    codec: &mut BitcoinCodec,
    buf: &mut BytesMut,
    limit: Duration,
) -> ProtocolResult<Message> {
    loop {
        if let Some(message) = codec.decode(buf)? {
            return Ok(message);
        }
        let read = timeout(limit, stream.read_buf(buf))
            .await
            .map_err(|_| ProtocolError::Timeout("waiting for handshake message".into()))??;
        if read == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
    }
}
