//! Per-peer sessions.
//!
//! A `Peer` owns one [`Connection`] and runs a blocking read loop over it,
//! dispatching inbound messages. While elected as the download peer it
//! drives block-chain download against the external `BlockChain`.

use lightbit_core::{
    Block, BlockChain, BlockHeader, BlockStore, NetworkParams, PeerAddress, Sha256dHash,
    Transaction, TxMemoryPool,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::PeerError;
use crate::message::{
    AddrEntry, AlertMessage, GetBlocksMessage, InvType, InventoryItem, InventoryMessage, Message,
};
use crate::PROTOCOL_VERSION;

/// Lifecycle of a peer session. `Downloading` is `Running` while elected as
/// the download peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Initial,
    Connecting,
    Handshaking,
    Running,
    Downloading,
    Disconnected,
}

/// Observer of per-peer events. All methods default to no-ops.
pub trait PeerEventListener: Send + Sync {
    /// A block arrived and was handed to the chain. `blocks_left` is the
    /// estimated remainder of the download.
    fn blocks_downloaded(&self, _peer: &Peer, _block: &Block, _blocks_left: u32) {}

    /// Chain download began against this peer.
    fn chain_download_started(&self, _peer: &Peer, _blocks_left: u32) {}

    /// A transaction was received from the network.
    fn transaction_received(&self, _peer: &Peer, _tx: &Transaction) {}

    /// The peer told us about addresses of other nodes.
    fn addresses_received(&self, _peer: &Peer, _entries: &[AddrEntry]) {}

    /// The peer sent bare block headers.
    fn headers_received(&self, _peer: &Peer, _headers: &[BlockHeader]) {}

    /// The peer relayed a signed network alert.
    fn alert_received(&self, _peer: &Peer, _alert: &AlertMessage) {}
}

/// Single-fire holder for the answer to a `getdata` request. Resolved from
/// the network-reader task; dropped unresolved when the peer dies, which
/// wakes the waiter with an error.
pub struct GetDataFuture {
    item: InventoryItem,
    rx: oneshot::Receiver<Message>,
}

impl GetDataFuture {
    /// The requested item.
    pub fn item(&self) -> InventoryItem {
        self.item
    }

    /// Block until the peer answers the request.
    pub async fn await_result(self) -> Result<Message, PeerError> {
        self.rx.await.map_err(|_| PeerError::Cancelled)
    }
}

/// A session with one remote peer.
pub struct Peer {
    params: NetworkParams,
    address: PeerAddress,
    connection_config: ConnectionConfig,
    block_chain: Arc<dyn BlockChain>,
    block_store: Arc<dyn BlockStore>,
    memory_pool: Arc<TxMemoryPool>,
    connection: Mutex<Option<Arc<Connection>>>,
    state: Mutex<PeerState>,
    listeners: Mutex<Vec<Arc<dyn PeerEventListener>>>,
    /// In-flight `getdata` requests, resolved by the read loop.
    pending_getdata: Mutex<HashMap<InventoryItem, Vec<oneshot::Sender<Message>>>>,
    /// Transactions we announced and stand ready to serve.
    announced: Mutex<HashMap<Sha256dHash, Transaction>>,
    /// Estimated blocks remaining in a chain download.
    blocks_left: AtomicU32,
    /// Head hash of the last `getblocks`, to suppress duplicates.
    last_get_blocks: Mutex<Option<Sha256dHash>>,
}

impl Peer {
    /// Create an unconnected peer session.
    pub fn new(
        params: NetworkParams,
        address: PeerAddress,
        block_chain: Arc<dyn BlockChain>,
        block_store: Arc<dyn BlockStore>,
        memory_pool: Arc<TxMemoryPool>,
        connection_config: ConnectionConfig,
    ) -> Self {
        Self {
            params,
            address,
            connection_config,
            block_chain,
            block_store,
            memory_pool,
            connection: Mutex::new(None),
            state: Mutex::new(PeerState::Initial),
            listeners: Mutex::new(Vec::new()),
            pending_getdata: Mutex::new(HashMap::new()),
            announced: Mutex::new(HashMap::new()),
            blocks_left: AtomicU32::new(0),
            last_get_blocks: Mutex::new(None),
        }
    }

    /// The remote endpoint.
    pub fn address(&self) -> PeerAddress {
        self.address
    }

    /// Current session state.
    pub fn state(&self) -> PeerState {
        *self.state.lock()
    }

    /// Register an event listener.
    pub fn add_listener(&self, listener: Arc<dyn PeerEventListener>) {
        self.listeners.lock().push(listener);
    }

    /// Establish the TCP connection and run the handshake, announcing our
    /// current chain height.
    pub async fn connect(&self) -> Result<(), PeerError> {
        *self.state.lock() = PeerState::Connecting;
        let best_height = self.block_store.chain_head()?.height;
        *self.state.lock() = PeerState::Handshaking;
        let connection = Connection::connect(
            &self.params,
            self.address,
            best_height,
            &self.connection_config,
        )
        .await?;
        *self.connection.lock() = Some(Arc::new(connection));
        Ok(())
    }

    fn connection(&self) -> Result<Arc<Connection>, PeerError> {
        self.connection.lock().clone().ok_or(PeerError::NotConnected)
    }

    /// Run the read loop until the connection dies or `cancel` trips.
    /// All exits pass through [`Peer::disconnect`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PeerError> {
        let connection = match self.connection() {
            Ok(connection) => connection,
            Err(e) => {
                self.disconnect().await;
                return Err(e);
            }
        };
        {
            let mut state = self.state.lock();
            if *state != PeerState::Downloading {
                *state = PeerState::Running;
            }
        }

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(peer = %self.address, "Cancelled");
                    break Ok(());
                }
                message = connection.read_message() => match message {
                    Ok(message) => {
                        if let Err(e) = self.process_message(&connection, message).await {
                            break Err(e);
                        }
                    }
                    Err(e) => break Err(PeerError::Protocol(e)),
                }
            }
        };

        self.disconnect().await;
        result
    }

    /// Tear the session down: close the socket and wake all pending
    /// `getdata` waiters. Idempotent and safe from any task.
    pub async fn disconnect(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = &connection {
            connection.shutdown().await;
        }
        *self.state.lock() = PeerState::Disconnected;
        // Dropping the senders wakes every waiter with an error.
        self.pending_getdata.lock().clear();
    }

    /// Whether this session is the elected download peer.
    pub fn is_downloading(&self) -> bool {
        *self.state.lock() == PeerState::Downloading
    }

    /// Estimated blocks left in the running download.
    pub fn blocks_left(&self) -> u32 {
        self.blocks_left.load(Ordering::SeqCst)
    }

    /// Begin downloading the block chain from this peer, starting at the
    /// store's current chain head.
    pub async fn start_blockchain_download(&self) -> Result<(), PeerError> {
        let connection = self.connection()?;
        *self.state.lock() = PeerState::Downloading;

        let our_height = self.block_store.chain_head()?.height;
        let their_height = connection.peer_version().start_height;
        let blocks_left = their_height.saturating_sub(our_height);
        self.blocks_left.store(blocks_left, Ordering::SeqCst);

        info!(peer = %self.address, blocks_left, "Starting block chain download");
        for listener in self.listeners.lock().iter() {
            listener.chain_download_started(self, blocks_left);
        }
        self.send_get_blocks(&connection).await
    }

    /// Announce `tx` with an `inv`; the full transaction is served when the
    /// peer asks for it with `getdata`.
    pub async fn broadcast_transaction(&self, tx: &Transaction) -> Result<(), PeerError> {
        let connection = self.connection()?;
        let hash = tx.hash();
        self.announced.lock().insert(hash, tx.clone());
        debug!(peer = %self.address, tx = %hash, "Announcing transaction");
        connection
            .write_message(Message::Inv(InventoryMessage {
                items: vec![InventoryItem::new(InvType::Transaction, hash)],
            }))
            .await?;
        Ok(())
    }

    /// Request a single block, returning a future resolved by the read
    /// loop when the peer answers.
    pub async fn get_block(&self, hash: Sha256dHash) -> Result<GetDataFuture, PeerError> {
        let connection = self.connection()?;
        let item = InventoryItem::new(InvType::Block, hash);
        let (tx, rx) = oneshot::channel();
        self.pending_getdata
            .lock()
            .entry(item)
            .or_default()
            .push(tx);
        connection
            .write_message(Message::GetData(InventoryMessage { items: vec![item] }))
            .await?;
        Ok(GetDataFuture { item, rx })
    }

    async fn process_message(
        &self,
        connection: &Arc<Connection>,
        message: Message,
    ) -> Result<(), PeerError> {
        match message {
            Message::Inv(inventory) => self.process_inv(connection, inventory).await?,
            Message::Block(block) => self.process_block(connection, block).await?,
            Message::Tx(tx) => self.process_transaction(tx),
            Message::GetData(request) => self.process_getdata(connection, request).await?,
            Message::Headers(headers) => {
                for listener in self.listeners.lock().iter() {
                    listener.headers_received(self, &headers.headers);
                }
            }
            Message::Addr(entries) => {
                debug!(peer = %self.address, count = entries.len(), "Received addresses");
                for listener in self.listeners.lock().iter() {
                    listener.addresses_received(self, &entries);
                }
            }
            Message::Alert(alert) => {
                match alert.payload() {
                    Ok(payload) => {
                        info!(peer = %self.address, status = %payload.status_bar, "Received alert")
                    }
                    Err(e) => debug!(peer = %self.address, error = %e, "Unparseable alert"),
                }
                for listener in self.listeners.lock().iter() {
                    listener.alert_received(self, &alert);
                }
            }
            // No response required; BIP-31 pong postdates this protocol.
            Message::Ping(_) => {}
            Message::Version(_) | Message::Verack => {
                debug!(peer = %self.address, "Duplicate handshake message ignored")
            }
            Message::GetBlocks(_) | Message::GetHeaders(_) => {
                // We carry no chain to serve.
                debug!(peer = %self.address, "Ignoring chain request")
            }
            Message::Unknown { command } => {
                debug!(peer = %self.address, command = %command, "Skipping unknown message")
            }
        }
        Ok(())
    }

    async fn process_inv(
        &self,
        connection: &Arc<Connection>,
        inventory: InventoryMessage,
    ) -> Result<(), PeerError> {
        let downloading = self.is_downloading();
        let mut request = Vec::new();
        for item in inventory.items {
            match item.kind {
                InvType::Transaction => {
                    let fresh = !self.memory_pool.was_seen(&item.hash);
                    self.memory_pool.seen_announcement(item.hash, self.address);
                    if fresh {
                        request.push(item);
                    }
                }
                // Block announcements feed the download pipeline only on
                // the elected download peer.
                InvType::Block => {
                    if downloading {
                        request.push(item);
                    }
                }
            }
        }
        if !request.is_empty() {
            debug!(peer = %self.address, count = request.len(), "Requesting inventory");
            connection
                .write_message(Message::GetData(InventoryMessage { items: request }))
                .await?;
        }
        Ok(())
    }

    async fn process_block(
        &self,
        connection: &Arc<Connection>,
        block: Block,
    ) -> Result<(), PeerError> {
        let hash = block.hash();
        // A block requested via get_block() goes to its waiters, not to
        // the chain.
        let waiters = self
            .pending_getdata
            .lock()
            .remove(&InventoryItem::new(InvType::Block, hash));
        if let Some(waiters) = waiters {
            for waiter in waiters {
                let _ = waiter.send(Message::Block(block.clone()));
            }
            return Ok(());
        }

        match self.block_chain.add(block.clone())? {
            true => {
                let previous = self
                    .blocks_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        Some(n.saturating_sub(1))
                    })
                    .unwrap_or(0);
                let blocks_left = previous.saturating_sub(1);
                for listener in self.listeners.lock().iter() {
                    listener.blocks_downloaded(self, &block, blocks_left);
                }
            }
            false => {
                // The chain cannot connect it yet; ask for the blocks in
                // between our head and this one.
                debug!(peer = %self.address, block = %hash, "Unconnected block, refreshing getblocks");
                self.send_get_blocks(connection).await?;
            }
        }
        Ok(())
    }

    fn process_transaction(&self, tx: Transaction) {
        let hash = tx.hash();
        debug!(peer = %self.address, tx = %hash, "Received transaction");
        self.memory_pool.seen_transaction(&tx, self.address);
        let waiters = self
            .pending_getdata
            .lock()
            .remove(&InventoryItem::new(InvType::Transaction, hash));
        if let Some(waiters) = waiters {
            for waiter in waiters {
                let _ = waiter.send(Message::Tx(tx.clone()));
            }
        }
        for listener in self.listeners.lock().iter() {
            listener.transaction_received(self, &tx);
        }
    }

    async fn process_getdata(
        &self,
        connection: &Arc<Connection>,
        request: InventoryMessage,
    ) -> Result<(), PeerError> {
        for item in request.items {
            if item.kind != InvType::Transaction {
                continue;
            }
            let tx = self.announced.lock().get(&item.hash).cloned();
            if let Some(tx) = tx {
                debug!(peer = %self.address, tx = %item.hash, "Serving announced transaction");
                connection.write_message(Message::Tx(tx)).await?;
            }
        }
        Ok(())
    }

    async fn send_get_blocks(&self, connection: &Arc<Connection>) -> Result<(), PeerError> {
        let head = self.block_store.chain_head()?;
        let head_hash = head.header.hash();
        {
            let mut last = self.last_get_blocks.lock();
            if *last == Some(head_hash) {
                debug!(peer = %self.address, "getblocks from this head already outstanding");
                return Ok(());
            }
            *last = Some(head_hash);
        }
        let locator = vec![head_hash, self.params.genesis_hash()];
        connection
            .write_message(Message::GetBlocks(GetBlocksMessage {
                version: PROTOCOL_VERSION,
                locator,
                stop_hash: Sha256dHash::ZERO,
            }))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Peer({}, {:?})", self.address, self.state())
    }
}
