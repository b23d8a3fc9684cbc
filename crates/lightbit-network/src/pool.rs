//! The peer pool.
//!
//! Maintains up to `max_peers` concurrent peer sessions, fed from a FIFO of
//! candidate addresses that discovery sources refill. A periodic
//! single-entry maintenance tick admits new sessions through a counting
//! semaphore; every admitted worker shares the pool's cancellation token
//! and ends its life through `handle_peer_death`, whatever went wrong.

use lightbit_core::{BlockChain, BlockStore, NetworkParams, PeerAddress, Transaction, TxMemoryPool};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionConfig;
use crate::discovery::PeerDiscovery;
use crate::error::PeerError;
use crate::peer::{Peer, PeerEventListener};

/// Default number of concurrent peer sessions.
pub const DEFAULT_MAX_PEERS: usize = 4;

/// Default maintenance tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrent peer sessions.
    pub max_peers: usize,
    /// Maintenance tick interval.
    pub tick_interval: Duration,
    /// Per-connection configuration.
    pub connection: ConnectionConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
            tick_interval: DEFAULT_TICK_INTERVAL,
            connection: ConnectionConfig::default(),
        }
    }
}

/// Pool lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// A peer finished its handshake. Carries the live-peer count.
    PeerConnected { peer_count: usize },
    /// A peer session ended. Carries the live-peer count.
    PeerDisconnected { peer_count: usize },
}

struct PoolState {
    peers: Vec<Arc<Peer>>,
    download_peer: Option<Arc<Peer>>,
    running: bool,
    download_listener: Option<Arc<dyn PeerEventListener>>,
}

/// A bounded pool of peer sessions driving chain download and tx relay.
pub struct PeerPool {
    params: NetworkParams,
    config: PoolConfig,
    block_chain: Arc<dyn BlockChain>,
    block_store: Arc<dyn BlockStore>,
    memory_pool: Arc<TxMemoryPool>,
    state: Mutex<PoolState>,
    inactives: Mutex<VecDeque<PeerAddress>>,
    discoverers: Mutex<Vec<Arc<dyn PeerDiscovery>>>,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
    tick_guard: tokio::sync::Mutex<()>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PoolEvent>>>,
}

impl PeerPool {
    /// Create a pool with the default configuration.
    pub fn new(
        params: NetworkParams,
        block_chain: Arc<dyn BlockChain>,
        block_store: Arc<dyn BlockStore>,
    ) -> Self {
        Self::with_config(params, block_chain, block_store, PoolConfig::default())
    }

    /// Create a pool with an explicit configuration.
    pub fn with_config(
        params: NetworkParams,
        block_chain: Arc<dyn BlockChain>,
        block_store: Arc<dyn BlockStore>,
        config: PoolConfig,
    ) -> Self {
        Self {
            params,
            workers: Arc::new(Semaphore::new(config.max_peers)),
            config,
            block_chain,
            block_store,
            memory_pool: Arc::new(TxMemoryPool::default()),
            state: Mutex::new(PoolState {
                peers: Vec::new(),
                download_peer: None,
                running: false,
                download_listener: None,
            }),
            inactives: Mutex::new(VecDeque::new()),
            discoverers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            tick_guard: tokio::sync::Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The shared transaction memory pool.
    pub fn memory_pool(&self) -> Arc<TxMemoryPool> {
        self.memory_pool.clone()
    }

    /// Register a discovery source. Sources are tried in registration
    /// order whenever the candidate queue runs dry.
    pub fn add_discovery(&self, discovery: Arc<dyn PeerDiscovery>) {
        self.discoverers.lock().push(discovery);
    }

    /// Enqueue a candidate address directly.
    pub fn add_address(&self, address: PeerAddress) {
        self.inactives.lock().push_back(address);
    }

    /// Subscribe to pool lifecycle events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PoolEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Whether the pool is running.
    pub fn running(&self) -> bool {
        self.state.lock().running
    }

    /// Number of live peer sessions.
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    /// The currently elected download peer, if any.
    pub fn download_peer(&self) -> Option<Arc<Peer>> {
        self.state.lock().download_peer.clone()
    }

    /// Start the maintenance timer. Each tick runs under a non-blocking
    /// single-entry guard: if the previous tick is still busy, the new one
    /// is dropped rather than run concurrently.
    pub fn start(self: Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.running {
                return;
            }
            state.running = true;
        }
        info!(max_peers = self.config.max_peers, "Peer pool starting");
        let pool = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(pool.config.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = pool.cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let pool = pool.clone();
                        tokio::spawn(async move {
                            match pool.tick_guard.try_lock() {
                                Ok(_guard) => PeerPool::tick(&pool).await,
                                Err(_) => debug!("Previous maintenance tick still running, dropping this one"),
                            }
                        });
                    }
                }
            }
        });
    }

    /// Signal shutdown: trip the shared cancellation token and stop the
    /// timer. Does not wait for workers to exit.
    pub fn stop(&self) {
        self.state.lock().running = false;
        self.cancel.cancel();
        info!("Peer pool stopped");
    }

    /// Record the download listener and elect a download peer as soon as
    /// one is available.
    pub async fn start_blockchain_download(&self, listener: Arc<dyn PeerEventListener>) {
        let elected = {
            let mut state = self.state.lock();
            state.download_listener = Some(listener.clone());
            if state.download_peer.is_none() {
                state.download_peer = state.peers.first().cloned();
                state.download_peer.clone()
            } else {
                None
            }
        };
        if let Some(peer) = elected {
            self.begin_download(&peer, Some(listener)).await;
        }
    }

    /// Announce `tx` to every live peer. Per-peer failures are swallowed;
    /// returns `true` iff at least one peer accepted the announcement.
    pub async fn broadcast_transaction(&self, tx: &Transaction) -> bool {
        let peers: Vec<Arc<Peer>> = self.state.lock().peers.clone();
        let mut accepted = false;
        for peer in peers {
            match peer.broadcast_transaction(tx).await {
                Ok(()) => accepted = true,
                Err(e) => {
                    warn!(peer = %peer.address(), error = %e, "Failed to announce transaction")
                }
            }
        }
        accepted
    }

    /// One maintenance pass: top up the candidate queue from discovery if
    /// needed, then try to admit one new peer session.
    async fn tick(pool: &Arc<PeerPool>) {
        if !pool.running() {
            return;
        }
        if pool.workers.available_permits() == 0 {
            return;
        }

        if pool.inactives.lock().is_empty() {
            pool.discover().await;
        }

        let Some(address) = pool.inactives.lock().pop_front() else {
            return;
        };
        match pool.workers.clone().try_acquire_owned() {
            Ok(permit) => {
                let worker = pool.clone();
                tokio::spawn(async move { worker.run_peer(address, permit).await });
            }
            // Lost the race for a worker; try this address again later.
            Err(_) => pool.inactives.lock().push_back(address),
        }
    }

    /// Iterate discovery sources in order until one yields addresses.
    async fn discover(&self) {
        let discoverers: Vec<Arc<dyn PeerDiscovery>> = self.discoverers.lock().clone();
        for discoverer in discoverers {
            let source = discoverer.clone();
            match tokio::task::spawn_blocking(move || source.peers()).await {
                Ok(Ok(addresses)) if !addresses.is_empty() => {
                    debug!(count = addresses.len(), "Discovered peer addresses");
                    let mut inactives = self.inactives.lock();
                    for address in addresses {
                        if !inactives.contains(&address) {
                            inactives.push_back(address);
                        }
                    }
                    return;
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => warn!(error = %e, "Peer discovery failed, trying next source"),
                Err(e) => warn!(error = %e, "Peer discovery task failed"),
            }
        }
    }

    /// Drive one peer session from connect to death. Every exit path ends
    /// in `handle_peer_death`, and the worker permit is released on return.
    async fn run_peer(self: Arc<Self>, address: PeerAddress, permit: OwnedSemaphorePermit) {
        let peer = Arc::new(Peer::new(
            self.params.clone(),
            address,
            self.block_chain.clone(),
            self.block_store.clone(),
            self.memory_pool.clone(),
            self.config.connection.clone(),
        ));
        info!(peer = %address, "Connecting to peer");

        let result: Result<(), PeerError> = async {
            peer.connect().await?;
            self.handle_new_peer(&peer).await;
            peer.run(self.cancel.clone()).await
        }
        .await;

        match result {
            Ok(()) => debug!(peer = %address, "Peer session finished"),
            Err(PeerError::BlockStore(e)) => {
                error!(peer = %address, error = %e, "Block store failure, stopping pool");
                self.stop();
            }
            Err(e) => info!(peer = %address, error = %e, "Peer died"),
        }

        peer.disconnect().await;
        self.handle_peer_death(&peer).await;
        drop(permit);
    }

    async fn handle_new_peer(&self, peer: &Arc<Peer>) {
        let (elected, listener, count) = {
            let mut state = self.state.lock();
            state.peers.push(peer.clone());
            let elect = state.download_peer.is_none() && state.download_listener.is_some();
            if elect {
                state.download_peer = Some(peer.clone());
            }
            let count = state.peers.len();
            self.emit(PoolEvent::PeerConnected { peer_count: count });
            (elect, state.download_listener.clone(), count)
        };
        info!(peer = %peer.address(), peers = count, "New peer");
        if elected {
            self.begin_download(peer, listener).await;
        }
    }

    async fn handle_peer_death(&self, peer: &Arc<Peer>) {
        if !self.running() {
            return;
        }
        let (replacement, listener) = {
            let mut state = self.state.lock();
            state.peers.retain(|p| !Arc::ptr_eq(p, peer));
            let mut replacement = None;
            let was_download_peer = state
                .download_peer
                .as_ref()
                .map(|p| Arc::ptr_eq(p, peer))
                .unwrap_or(false);
            if was_download_peer {
                state.download_peer = state.peers.first().cloned();
                replacement = state.download_peer.clone();
            }
            self.emit(PoolEvent::PeerDisconnected {
                peer_count: state.peers.len(),
            });
            (replacement, state.download_listener.clone())
        };

        // The address goes back in the queue for a later retry.
        self.inactives.lock().push_back(peer.address());

        if let Some(replacement) = replacement {
            info!(peer = %replacement.address(), "Electing replacement download peer");
            self.begin_download(&replacement, listener).await;
        }
    }

    async fn begin_download(&self, peer: &Arc<Peer>, listener: Option<Arc<dyn PeerEventListener>>) {
        if let Some(listener) = listener {
            peer.add_listener(listener);
        }
        if let Err(e) = peer.start_blockchain_download().await {
            match e {
                PeerError::BlockStore(err) => {
                    error!(error = %err, "Block store failure, stopping pool");
                    self.stop();
                }
                other => {
                    warn!(peer = %peer.address(), error = %other, "Could not start chain download")
                }
            }
        }
    }

    fn emit(&self, event: PoolEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event).is_ok());
    }
}
