//! Peer-session scenarios against a scripted mock peer.

use crate::harness::{init_tracing, CountingChain, MockPeer, MockSession};
use lightbit_core::{
    Block, BlockHeader, BlockStore, ConfidenceLevel, MemoryBlockStore, NetworkParams, OutPoint,
    Sha256dHash, Transaction, TxIn, TxMemoryPool, TxOut, NODE_NETWORK,
};
use lightbit_network::{
    ConnectionConfig, GetBlocksMessage, InvType, InventoryItem, InventoryMessage, Message, Peer,
    PeerError, PeerEventListener, PROTOCOL_VERSION,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Fixture {
    params: NetworkParams,
    store: Arc<MemoryBlockStore>,
    chain: Arc<CountingChain>,
    memory_pool: Arc<TxMemoryPool>,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        let params = NetworkParams::mainnet();
        let store = Arc::new(MemoryBlockStore::new(&params));
        let chain = Arc::new(CountingChain::new(store.clone()));
        Self {
            params,
            store,
            chain,
            memory_pool: Arc::new(TxMemoryPool::default()),
        }
    }

    /// Connect a peer session to a fresh mock and spawn its read loop.
    async fn running_peer(
        &self,
        peer_height: u32,
    ) -> (
        Arc<Peer>,
        MockSession,
        CancellationToken,
        JoinHandle<Result<(), PeerError>>,
    ) {
        let mut mock = MockPeer::start(self.params.clone(), 60002, NODE_NETWORK, peer_height).await;
        let peer = Arc::new(Peer::new(
            self.params.clone(),
            mock.address,
            self.chain.clone(),
            self.store.clone(),
            self.memory_pool.clone(),
            ConnectionConfig::default(),
        ));
        peer.connect().await.expect("connect");
        let session = mock.next_session().await;

        let cancel = CancellationToken::new();
        let run_peer = peer.clone();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { run_peer.run(run_cancel).await });
        (peer, session, cancel, handle)
    }
}

fn sample_tx(seed: u8) -> Transaction {
    let mut tx = Transaction::new();
    tx.add_input(TxIn::new(
        OutPoint {
            hash: Sha256dHash::from_bytes([seed; 32]),
            index: 0,
        },
        vec![seed],
    ));
    tx.add_output(TxOut::new(seed as u64 * 1000, vec![0x51]));
    tx
}

fn block_on_top(prev: &BlockHeader, seed: u8) -> Block {
    let tx = sample_tx(seed);
    Block {
        header: BlockHeader {
            version: 1,
            prev_block: prev.hash(),
            merkle_root: tx.hash(),
            time: 1_313_000_000 + seed as u32,
            bits: 0x1D00_FFFF,
            nonce: seed as u32,
        },
        transactions: vec![tx],
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[derive(Default)]
struct DownloadRecorder {
    started: Mutex<Vec<u32>>,
    downloaded: Mutex<Vec<(Sha256dHash, u32)>>,
}

impl PeerEventListener for DownloadRecorder {
    fn chain_download_started(&self, _peer: &Peer, blocks_left: u32) {
        self.started.lock().push(blocks_left);
    }

    fn blocks_downloaded(&self, _peer: &Peer, block: &Block, blocks_left: u32) {
        self.downloaded.lock().push((block.hash(), blocks_left));
    }
}

#[tokio::test]
async fn test_client_version_announces_our_height() {
    let fixture = Fixture::new();
    let (_peer, session, cancel, handle) = fixture.running_peer(50).await;

    assert_eq!(session.client_version.version, PROTOCOL_VERSION);
    assert_eq!(session.client_version.start_height, 0);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_inv_triggers_getdata_and_confidence_tracking() {
    let fixture = Fixture::new();
    let (_peer, mut session, cancel, handle) = fixture.running_peer(0).await;

    let tx = sample_tx(7);
    let hash = tx.hash();
    session.send(Message::Inv(InventoryMessage {
        items: vec![InventoryItem::new(InvType::Transaction, hash)],
    }));

    // The session asks for the unseen transaction...
    let request = session.expect("getdata").await;
    assert_eq!(
        request,
        Message::GetData(InventoryMessage {
            items: vec![InventoryItem::new(InvType::Transaction, hash)],
        })
    );

    // ...and the delivered transaction lands in the memory pool with the
    // announcing peer recorded.
    session.send(Message::Tx(tx.clone()));
    wait_until(|| fixture.memory_pool.get(&hash).is_some()).await;
    let confidence = fixture.memory_pool.confidence(&hash).unwrap();
    assert_eq!(confidence.level(), ConfidenceLevel::NotSeenInChain);
    assert_eq!(confidence.num_broadcast_peers(), 1);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_chain_download_flow() {
    let fixture = Fixture::new();
    let (peer, mut session, cancel, handle) = fixture.running_peer(2).await;

    let recorder = Arc::new(DownloadRecorder::default());
    peer.add_listener(recorder.clone());
    peer.start_blockchain_download().await.unwrap();
    assert_eq!(recorder.started.lock().as_slice(), &[2]);

    // The download starts from our head with a [head, genesis] locator.
    let request = session.expect("getblocks").await;
    let genesis_hash = fixture.params.genesis_hash();
    assert_eq!(
        request,
        Message::GetBlocks(GetBlocksMessage {
            version: PROTOCOL_VERSION,
            locator: vec![genesis_hash, genesis_hash],
            stop_hash: Sha256dHash::ZERO,
        })
    );

    // Announce a block; the download peer requests and accepts it.
    let block1 = block_on_top(&fixture.params.genesis.header, 1);
    session.send(Message::Inv(InventoryMessage {
        items: vec![InventoryItem::new(InvType::Block, block1.hash())],
    }));
    session.expect("getdata").await;
    session.send(Message::Block(block1.clone()));

    wait_until(|| fixture.chain.accepted() == 1).await;
    assert_eq!(fixture.chain.hashes(), vec![block1.hash()]);
    wait_until(|| !recorder.downloaded.lock().is_empty()).await;
    assert_eq!(recorder.downloaded.lock().as_slice(), &[(block1.hash(), 1)]);
    assert_eq!(fixture.store.chain_head().unwrap().height, 1);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_broadcast_transaction_served_on_getdata() {
    let fixture = Fixture::new();
    let (peer, mut session, cancel, handle) = fixture.running_peer(0).await;

    let tx = sample_tx(9);
    let hash = tx.hash();
    peer.broadcast_transaction(&tx).await.unwrap();

    // First the announcement...
    let inv = session.expect("inv").await;
    assert_eq!(
        inv,
        Message::Inv(InventoryMessage {
            items: vec![InventoryItem::new(InvType::Transaction, hash)],
        })
    );

    // ...then the payload, served on request.
    session.send(Message::GetData(InventoryMessage {
        items: vec![InventoryItem::new(InvType::Transaction, hash)],
    }));
    let served = session.expect("tx").await;
    assert_eq!(served, Message::Tx(tx));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_get_block_future_resolves() {
    let fixture = Fixture::new();
    let (peer, mut session, cancel, handle) = fixture.running_peer(0).await;

    let block = block_on_top(&fixture.params.genesis.header, 3);
    let future = peer.get_block(block.hash()).await.unwrap();
    session.expect("getdata").await;
    session.send(Message::Block(block.clone()));

    let result = future.await_result().await.unwrap();
    assert_eq!(result, Message::Block(block));
    // Directly requested blocks bypass the chain.
    assert_eq!(fixture.chain.accepted(), 0);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_writers_never_interleave_frames() {
    let fixture = Fixture::new();
    let mut mock = MockPeer::start(fixture.params.clone(), 60002, NODE_NETWORK, 0).await;
    let connection = Arc::new(
        lightbit_network::Connection::connect(
            &fixture.params,
            mock.address,
            0,
            &ConnectionConfig::default(),
        )
        .await
        .unwrap(),
    );
    let mut session = mock.next_session().await;

    // Hammer the send side from many tasks at once; if frames interleaved
    // on the wire, the mock's codec would fail to decode.
    let mut writers = Vec::new();
    for nonce in 0u64..20 {
        let connection = connection.clone();
        writers.push(tokio::spawn(async move {
            connection
                .write_message(Message::Ping(lightbit_network::PingMessage {
                    nonce: Some(nonce),
                }))
                .await
        }));
    }
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    let mut nonces = Vec::new();
    for _ in 0..20 {
        match session.next_message().await {
            Message::Ping(ping) => nonces.push(ping.nonce.unwrap()),
            other => panic!("expected ping, got {other:?}"),
        }
    }
    nonces.sort_unstable();
    assert_eq!(nonces, (0u64..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_peer_death_wakes_pending_requests() {
    let fixture = Fixture::new();
    let (peer, mut session, _cancel, handle) = fixture.running_peer(0).await;

    let future = peer.get_block(Sha256dHash::from_bytes([0xAB; 32])).await.unwrap();
    session.expect("getdata").await;
    session.kill();

    // The read loop exits through disconnect, which wakes the waiter.
    let run_result = handle.await.unwrap();
    assert!(run_result.is_err());
    assert!(matches!(
        future.await_result().await,
        Err(PeerError::Cancelled)
    ));
}
