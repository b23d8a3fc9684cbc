//! Test harness: a scriptable mock peer speaking the real wire protocol.

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use lightbit_core::{
    Block, BlockChain, BlockStoreError, NetworkParams, PeerAddress, StoredBlock,
    VerificationError,
};
use lightbit_network::{
    BitcoinCodec, Message, NetAddress, VersionMessage, CHECKSUMMING_PROTOCOL_VERSION,
};
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::debug;

/// Install a compact tracing subscriber once for the whole test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// How long the harness waits for expected traffic before giving up.
pub const HARNESS_TIMEOUT: Duration = Duration::from_secs(5);

/// One accepted, handshaken connection on a [`MockPeer`].
pub struct MockSession {
    /// Messages received from the client after the handshake.
    incoming: mpsc::UnboundedReceiver<Message>,
    outgoing: mpsc::UnboundedSender<Message>,
    kill: Option<oneshot::Sender<()>>,
    /// The client's `version` announcement.
    pub client_version: VersionMessage,
}

impl MockSession {
    /// Queue a message for the client.
    pub fn send(&self, message: Message) {
        let _ = self.outgoing.send(message);
    }

    /// Drop the socket, simulating a peer death.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }

    /// Receive the next message from the client.
    pub async fn next_message(&mut self) -> Message {
        timeout(HARNESS_TIMEOUT, self.incoming.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client hung up")
    }

    /// Receive messages until one with `command` arrives.
    pub async fn expect(&mut self, command: &str) -> Message {
        loop {
            let message = self.next_message().await;
            if message.command() == command {
                return message;
            }
            debug!(got = message.command(), want = command, "Skipping message");
        }
    }
}

/// A remote peer under test control. Accepts any number of connections,
/// performs the version handshake on each, and exposes the resulting
/// sessions for scripting.
pub struct MockPeer {
    /// The endpoint clients should dial.
    pub address: PeerAddress,
    sessions: mpsc::UnboundedReceiver<MockSession>,
}

impl MockPeer {
    /// Start a mock peer announcing the given protocol version, service
    /// bits and chain height.
    pub async fn start(
        params: NetworkParams,
        version: u32,
        services: u64,
        start_height: u32,
    ) -> MockPeer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let address = PeerAddress::new(Ipv4Addr::LOCALHOST, port);
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let params = params.clone();
                let session_tx = session_tx.clone();
                tokio::spawn(async move {
                    match serve_session(stream, params, address, version, services, start_height)
                        .await
                    {
                        Ok(session) => {
                            let _ = session_tx.send(session);
                        }
                        Err(e) => debug!(error = %e, "Mock handshake failed"),
                    }
                });
            }
        });

        MockPeer { address, sessions }
    }

    /// Wait for the next client to finish its handshake.
    pub async fn next_session(&mut self) -> MockSession {
        timeout(HARNESS_TIMEOUT, self.sessions.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("listener stopped")
    }
}

async fn serve_session(
    mut stream: TcpStream,
    params: NetworkParams,
    address: PeerAddress,
    version: u32,
    services: u64,
    start_height: u32,
) -> Result<MockSession, String> {
    let mut codec = BitcoinCodec::new(&params);
    codec.set_checksumming(false);
    let mut buf = BytesMut::new();

    // Client speaks first.
    let client_version = match read_raw(&mut stream, &mut codec, &mut buf).await? {
        Message::Version(v) => v,
        other => return Err(format!("expected version, got '{}'", other.command())),
    };

    let our_version = VersionMessage {
        version,
        services,
        timestamp: 0,
        recv_addr: NetAddress::new(0, address),
        from_addr: NetAddress::new(services, address),
        nonce: 1,
        user_agent: "/mockpeer:0.0/".to_string(),
        start_height,
    };
    write_raw(&mut stream, &mut codec, Message::Version(our_version)).await?;

    match read_raw(&mut stream, &mut codec, &mut buf).await? {
        Message::Verack => {}
        other => return Err(format!("expected verack, got '{}'", other.command())),
    }
    write_raw(&mut stream, &mut codec, Message::Verack).await?;

    codec.set_checksumming(version >= CHECKSUMMING_PROTOCOL_VERSION);
    codec.set_peer_version(client_version.version);

    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, codec.clone());
    reader.read_buffer_mut().extend_from_slice(&buf);
    let mut writer = FramedWrite::new(write_half, codec);

    let (incoming_tx, incoming) = mpsc::unbounded_channel();
    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
    let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut kill_rx => {
                    let _ = writer.get_mut().shutdown().await;
                    break;
                }
                outgoing = outgoing_rx.recv() => match outgoing {
                    Some(message) => {
                        if writer.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                inbound = reader.next() => match inbound {
                    Some(Ok(message)) => {
                        let _ = incoming_tx.send(message);
                    }
                    _ => break,
                },
            }
        }
    });

    Ok(MockSession {
        incoming,
        outgoing,
        kill: Some(kill_tx),
        client_version,
    })
}

async fn read_raw(
    stream: &mut TcpStream,
    codec: &mut BitcoinCodec,
    buf: &mut BytesMut,
) -> Result<Message, String> {
    loop {
        if let Some(message) = codec.decode(buf).map_err(|e| e.to_string())? {
            return Ok(message);
        }
        let read = timeout(HARNESS_TIMEOUT, stream.read_buf(buf))
            .await
            .map_err(|_| "handshake read timed out".to_string())?
            .map_err(|e| e.to_string())?;
        if read == 0 {
            return Err("client hung up during handshake".to_string());
        }
    }
}

async fn write_raw(
    stream: &mut TcpStream,
    codec: &mut BitcoinCodec,
    message: Message,
) -> Result<(), String> {
    let mut frame = BytesMut::new();
    codec.encode(message, &mut frame).map_err(|e| e.to_string())?;
    stream.write_all(&frame).await.map_err(|e| e.to_string())
}

/// A `BlockChain` that accepts everything and counts what it saw.
pub struct CountingChain {
    store: Arc<dyn lightbit_core::BlockStore>,
    accepted: AtomicUsize,
    hashes: Mutex<Vec<lightbit_core::Sha256dHash>>,
}

impl CountingChain {
    pub fn new(store: Arc<dyn lightbit_core::BlockStore>) -> Self {
        Self {
            store,
            accepted: AtomicUsize::new(0),
            hashes: Mutex::new(Vec::new()),
        }
    }

    /// Number of blocks accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Hashes of the accepted blocks, in arrival order.
    pub fn hashes(&self) -> Vec<lightbit_core::Sha256dHash> {
        self.hashes.lock().clone()
    }
}

impl BlockChain for CountingChain {
    fn add(&self, block: Block) -> Result<bool, VerificationError> {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        self.hashes.lock().push(block.hash());
        // Advance the store head so download bookkeeping moves forward.
        if let Ok(head) = self.store.chain_head() {
            let _ = self.store.set_chain_head(head.build_on_top(block.header));
        }
        Ok(true)
    }

    fn chain_head(&self) -> Result<StoredBlock, BlockStoreError> {
        self.store.chain_head()
    }
}
