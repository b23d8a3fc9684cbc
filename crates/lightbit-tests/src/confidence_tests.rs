//! Properties of the transaction-confidence state machine.

use crate::generators::strategies::arb_peer_address;
use lightbit_core::{
    BlockHeader, ConfidenceLevel, ConfidenceListener, Sha256dHash, TransactionConfidence,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingListener(AtomicUsize);

impl ConfidenceListener for CountingListener {
    fn confidence_changed(&self, _confidence: &TransactionConfidence) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn header() -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_block: Sha256dHash::ZERO,
        merkle_root: Sha256dHash::ZERO,
        time: 0,
        bits: 0x1D00_FFFF,
        nonce: 0,
    }
}

proptest! {
    #[test]
    fn prop_broadcast_peers_counts_distinct(peers in prop::collection::vec(arb_peer_address(), 0..40)) {
        let confidence = TransactionConfidence::new();
        for peer in &peers {
            confidence.mark_broadcast_by(*peer);
        }
        let distinct: HashSet<_> = peers.iter().collect();
        prop_assert_eq!(confidence.num_broadcast_peers(), distinct.len());
        if !peers.is_empty() {
            prop_assert_eq!(confidence.level(), ConfidenceLevel::NotSeenInChain);
        }
    }

    #[test]
    fn prop_listener_fires_once_per_real_change(peers in prop::collection::vec(arb_peer_address(), 0..40)) {
        let confidence = TransactionConfidence::new();
        let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
        confidence.add_listener(listener.clone());

        for peer in &peers {
            confidence.mark_broadcast_by(*peer);
        }
        let distinct: HashSet<_> = peers.iter().collect();
        // One event per new peer; the Unknown -> NotSeenInChain transition
        // rides along with the first announcement.
        prop_assert_eq!(listener.0.load(Ordering::SeqCst), distinct.len());
    }

    #[test]
    fn prop_work_done_grows_monotonically(extra_blocks in 1usize..12) {
        let confidence = TransactionConfidence::new();
        confidence.set_appeared_at_chain_height(10).unwrap();

        let mut last_depth = confidence.depth_in_blocks().unwrap();
        let mut last_work = confidence.work_done().unwrap();
        for _ in 0..extra_blocks {
            confidence.notify_work_done(&header());
            let depth = confidence.depth_in_blocks().unwrap();
            let work = confidence.work_done().unwrap();
            prop_assert_eq!(depth, last_depth + 1);
            prop_assert!(work > last_work);
            last_depth = depth;
            last_work = work;
        }
    }
}

#[test]
fn test_depth_reaches_one_in_top_block() {
    // The wallet pattern: a tx appears at height N, then the containing
    // block reports its work; depth is then exactly one.
    let confidence = TransactionConfidence::new();
    confidence.set_appeared_at_chain_height(100).unwrap();
    confidence.notify_work_done(&header());
    assert_eq!(confidence.depth_in_blocks().unwrap(), 1);
}
