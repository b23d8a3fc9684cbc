//! Peer-pool scenarios: election, failover and relay.

use crate::harness::{init_tracing, CountingChain, MockPeer};
use lightbit_core::{
    MemoryBlockStore, NetworkParams, OutPoint, PeerAddress, Sha256dHash, Transaction, TxIn, TxOut,
    NODE_NETWORK,
};
use lightbit_network::{
    DiscoveryError, Peer, PeerDiscovery, PeerEventListener, PeerPool, PoolConfig, PoolEvent,
    SeedPeers,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

struct DownloadCounter(AtomicUsize);

impl PeerEventListener for DownloadCounter {
    fn chain_download_started(&self, _peer: &Peer, _blocks_left: u32) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct FailingDiscovery;

impl PeerDiscovery for FailingDiscovery {
    fn peers(&self) -> Result<Vec<PeerAddress>, DiscoveryError> {
        Err(DiscoveryError("seed host unreachable".to_string()))
    }
}

fn fast_config() -> PoolConfig {
    PoolConfig {
        tick_interval: Duration::from_millis(50),
        ..PoolConfig::default()
    }
}

fn make_pool(params: &NetworkParams, config: PoolConfig) -> (Arc<PeerPool>, Arc<CountingChain>) {
    init_tracing();
    let store = Arc::new(MemoryBlockStore::new(params));
    let chain = Arc::new(CountingChain::new(store.clone()));
    let pool = Arc::new(PeerPool::with_config(
        params.clone(),
        chain.clone(),
        store,
        config,
    ));
    (pool, chain)
}

async fn next_event(events: &mut UnboundedReceiver<PoolEvent>) -> PoolEvent {
    timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a pool event")
        .expect("pool event stream closed")
}

fn sample_tx() -> Transaction {
    let mut tx = Transaction::new();
    tx.add_input(TxIn::new(
        OutPoint {
            hash: Sha256dHash::from_bytes([0x44; 32]),
            index: 0,
        },
        vec![0x01],
    ));
    tx.add_output(TxOut::new(1000, vec![0x51]));
    tx
}

#[tokio::test]
async fn test_download_peer_failover() {
    let params = NetworkParams::mainnet();
    let (pool, _chain) = make_pool(&params, fast_config());

    let mut mock_a = MockPeer::start(params.clone(), 60002, NODE_NETWORK, 10).await;
    let mut mock_b = MockPeer::start(params.clone(), 60002, NODE_NETWORK, 10).await;

    let mut events = pool.subscribe();
    pool.start_blockchain_download(Arc::new(DownloadCounter(AtomicUsize::new(0))))
        .await;
    pool.add_address(mock_a.address);
    pool.add_address(mock_b.address);
    pool.clone().start();

    // A connects first and is elected; the download starts against it.
    let mut session_a = mock_a.next_session().await;
    session_a.expect("getblocks").await;
    assert_eq!(
        next_event(&mut events).await,
        PoolEvent::PeerConnected { peer_count: 1 }
    );

    let mut session_b = mock_b.next_session().await;
    assert_eq!(
        next_event(&mut events).await,
        PoolEvent::PeerConnected { peer_count: 2 }
    );
    assert_eq!(pool.download_peer().unwrap().address(), mock_a.address);

    // Kill A's socket: its death is observed once, and B is elected and
    // issued a fresh getblocks.
    session_a.kill();
    assert_eq!(
        next_event(&mut events).await,
        PoolEvent::PeerDisconnected { peer_count: 1 }
    );
    session_b.expect("getblocks").await;
    assert_eq!(pool.download_peer().unwrap().address(), mock_b.address);

    pool.stop();
}

#[tokio::test]
async fn test_discovery_tries_next_source_on_failure() {
    let params = NetworkParams::mainnet();
    let (pool, _chain) = make_pool(&params, fast_config());

    let mut mock = MockPeer::start(params.clone(), 60002, NODE_NETWORK, 0).await;
    pool.add_discovery(Arc::new(FailingDiscovery));
    pool.add_discovery(Arc::new(SeedPeers::new(vec![mock.address])));

    let mut events = pool.subscribe();
    pool.clone().start();

    // The failing source is skipped and the seed list connects us.
    let _session = mock.next_session().await;
    assert_eq!(
        next_event(&mut events).await,
        PoolEvent::PeerConnected { peer_count: 1 }
    );
    pool.stop();
}

#[tokio::test]
async fn test_broadcast_transaction_needs_a_live_peer() {
    let params = NetworkParams::mainnet();
    let (pool, _chain) = make_pool(&params, fast_config());

    // No peers yet: nothing accepts the announcement.
    assert!(!pool.broadcast_transaction(&sample_tx()).await);

    let mut mock = MockPeer::start(params.clone(), 60002, NODE_NETWORK, 0).await;
    let mut events = pool.subscribe();
    pool.add_address(mock.address);
    pool.clone().start();

    let mut session = mock.next_session().await;
    assert_eq!(
        next_event(&mut events).await,
        PoolEvent::PeerConnected { peer_count: 1 }
    );

    let tx = sample_tx();
    assert!(pool.broadcast_transaction(&tx).await);
    let inv = session.expect("inv").await;
    assert_eq!(inv.command(), "inv");

    pool.stop();
}
