// Copyright (c) 2026 Emberchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

mod common;

use common::{build_blockchain, chain_settings, signed_entry, wait_until};
use emberchain::core::consensus::pow::PowConsensus;
use emberchain::core::consensus::{Consensus, ConsensusError};
use emberchain::core::economics::incentive::DelayedReward;
use emberchain::core::runtime::blockchain::{Blockchain, ChainEvent};
use emberchain::core::security::keystore::Wallet;
use emberchain::core::state::storage::FileStorage;
use emberchain::core::types::{
    now_ms, Block, BlockData, ChainSettings, Entry, GENESIS_PREVIOUS_HASH, INCENTIVE_SENDER,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use emberchain::monitoring::metrics::Metrics;

#[tokio::test]
async fn fresh_genesis() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blockchain = build_blockchain(dir.path(), "genesis-node", 2, 2);
    let mut events = blockchain.subscribe();

    blockchain.start().await.expect("start");

    assert_eq!(blockchain.height().expect("height"), 1);
    let genesis = blockchain.block_by_index(0).expect("query").expect("block");
    assert_eq!(genesis.index, 0);
    assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
    assert!(genesis.hash.starts_with("00"));
    assert!(matches!(events.try_recv(), Ok(ChainEvent::GenesisCreated)));
}

#[tokio::test]
async fn restart_loads_the_persisted_chain() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = build_blockchain(dir.path(), "restart-node", 0, 2);
    first.start().await.expect("start");
    let genesis_hash = first.tip().expect("tip").expect("genesis").hash;
    drop(first);

    let second = build_blockchain(dir.path(), "restart-node", 0, 2);
    let mut events = second.subscribe();
    second.start().await.expect("restart");

    assert_eq!(second.height().expect("height"), 1);
    assert_eq!(second.tip().expect("tip").expect("genesis").hash, genesis_hash);
    assert!(matches!(events.try_recv(), Ok(ChainEvent::ChainLoaded)));
}

#[tokio::test]
async fn reaching_the_pool_threshold_mines_a_block() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blockchain = build_blockchain(dir.path(), "miner", 1, 2);
    blockchain.start().await.expect("start");
    let mut events = blockchain.subscribe();

    let wallet = Wallet::generate();
    let first = signed_entry(&wallet, "recipient", 10);
    blockchain.submit_entry(first).await.expect("submit");

    // One short of the threshold: no lifecycle may begin.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(blockchain.height().expect("height"), 1);

    let second = signed_entry(&wallet, "recipient", 20);
    blockchain.submit_entry(second).await.expect("submit");

    // Drain the event stream until the lifecycle closes; the order is part
    // of the contract.
    let mut lifecycle = Vec::new();
    while !lifecycle.ends_with(&["ended"]) {
        let ev = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("lifecycle did not finish")
            .expect("event stream closed");
        match ev {
            ChainEvent::EntryAdded(_) => lifecycle.push("entryAdded"),
            ChainEvent::BlockCreationStarted => lifecycle.push("started"),
            ChainEvent::BlockCreated(_) => lifecycle.push("created"),
            ChainEvent::BlockCreationEnded(Some(_)) => lifecycle.push("ended"),
            _ => {}
        }
    }
    assert_eq!(
        lifecycle,
        vec!["entryAdded", "entryAdded", "started", "created", "ended"]
    );

    let chain = blockchain.chain_snapshot().expect("snapshot");
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].previous_hash, chain[0].hash);
    assert_eq!(chain[1].entries().len(), 2);
    assert!(chain[1].hash.starts_with('0'));
    assert!(blockchain.pending_entries().expect("pool").is_empty());
}

#[tokio::test]
async fn reward_is_credited_six_confirmations_behind_the_tip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blockchain = build_blockchain(dir.path(), "reward-node", 0, 100);
    blockchain.start().await.expect("start");

    let wallet = Wallet::generate();
    for i in 0..7u64 {
        let data = vec![signed_entry(&wallet, "recipient", i + 1)];
        let committed = blockchain.add_block(data).await.expect("add");
        assert!(committed.is_some());
    }
    assert_eq!(blockchain.height().expect("height"), 8);

    // The commit at height 7 pays the owner of the block at height 1.
    let rewarded = blockchain.block_by_index(1).expect("query").expect("block");
    let pool = blockchain.pending_entries().expect("pool");
    let reward = pool
        .iter()
        .find(|e| e.from == INCENTIVE_SENDER)
        .expect("reward entry in pool");
    assert_eq!(reward.to, rewarded.owner_address);
    assert_eq!(reward.amount, 50);
    assert_eq!(reward.compute_hash().expect("hash"), reward.hash);
    assert!(reward.signature.is_none());

    // It is mined into a later block through the ordinary path. (That
    // commit, at height 8, credits a fresh reward for the block at 2.)
    let reward_id = reward.entry_id.clone();
    blockchain
        .add_block(blockchain.pending_entries().expect("pool"))
        .await
        .expect("add");
    assert!(blockchain
        .pending_entries()
        .expect("pool")
        .iter()
        .all(|e| e.entry_id != reward_id));
    let tip = blockchain.tip().expect("tip").expect("block");
    assert!(tip.entries().iter().any(|e| e.entry_id == reward_id));
}

#[test]
fn mining_cancellation_lands_within_one_yield() {
    // Difficulty 8 keeps the search running far beyond the test horizon.
    let consensus = Arc::new(PowConsensus::new("cancel-node", "cancel-owner", 8));
    let worker = {
        let consensus = Arc::clone(&consensus);
        std::thread::spawn(move || consensus.create_block(1, Vec::new(), "00".repeat(32)))
    };

    std::thread::sleep(Duration::from_millis(100));
    let cancelled_at = Instant::now();
    consensus.cancel_mining();

    let mined = worker.join().expect("join");
    assert!(mined.is_none());
    assert!(cancelled_at.elapsed() < Duration::from_secs(3));
}

/// Consensus stub whose mining parks until the gate opens, so tests can
/// interleave peer commits with a mining run deterministically.
///
/// With `honor_cancel` unset it mines through cancellation requests, which
/// forces the orchestrator's post-mining re-check to do the discarding.
struct GatedConsensus {
    gate: Mutex<Option<mpsc::Receiver<()>>>,
    cancel: AtomicBool,
    honor_cancel: bool,
}

impl GatedConsensus {
    fn new(honor_cancel: bool) -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                gate: Mutex::new(Some(rx)),
                cancel: AtomicBool::new(false),
                honor_cancel,
            }),
            tx,
        )
    }
}

/// Difficulty-0 block with a freshly computed hash.
fn stub_block(index: u64, previous_hash: String, creator: &str, entries: Vec<Entry>) -> Block {
    let mut block = Block {
        index,
        timestamp: now_ms(),
        previous_hash,
        block_creator: creator.to_string(),
        owner_address: format!("{creator}-owner"),
        data: BlockData::Entries(entries),
        nonce: 0,
        difficulty: 0,
        hash: String::new(),
    };
    block.hash = block.compute_hash().expect("hash");
    block
}

impl Consensus for GatedConsensus {
    fn create_genesis(&self, settings: &ChainSettings) -> Result<Block, ConsensusError> {
        PowConsensus::new("gated", "gated-owner", settings.difficulty).create_genesis(settings)
    }

    fn create_block(&self, index: u64, data: Vec<Entry>, previous_hash: String) -> Option<Block> {
        let gate = self.gate.lock().expect("gate").take();
        if let Some(gate) = gate {
            loop {
                if self.honor_cancel && self.cancel.load(Ordering::Relaxed) {
                    return None;
                }
                match gate.recv_timeout(Duration::from_millis(10)) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                }
            }
        }
        Some(stub_block(index, previous_hash, "gated", data))
    }

    fn validate_block_hash(&self, block: &Block) -> bool {
        block
            .compute_hash()
            .map(|h| h == block.hash)
            .unwrap_or(false)
    }

    fn validate_block_consensus(&self, block: &Block) -> bool {
        self.validate_block_hash(block) && block.meets_declared_difficulty()
    }

    fn cancel_mining(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

fn gated_blockchain(
    dir: &std::path::Path,
    honor_cancel: bool,
) -> (Arc<Blockchain>, mpsc::Sender<()>) {
    let path = dir.join("gated-chain.db");
    let settings = chain_settings(0, 2, &path);
    let (consensus, gate) = GatedConsensus::new(honor_cancel);
    let blockchain = Blockchain::new(
        settings,
        consensus,
        Arc::new(DelayedReward::new(50)),
        Arc::new(FileStorage::new(&path)),
        Arc::new(Metrics::new().expect("metrics")),
    );
    (blockchain, gate)
}

#[tokio::test]
async fn a_peer_block_accepted_during_mining_supersedes_the_mined_block() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (blockchain, gate) = gated_blockchain(dir.path(), false);
    blockchain.start().await.expect("start");
    let genesis = blockchain.tip().expect("tip").expect("genesis");
    let mut events = blockchain.subscribe();

    let wallet = Wallet::generate();
    let miner = {
        let bc = Arc::clone(&blockchain);
        let data = vec![signed_entry(&wallet, "recipient", 1)];
        tokio::spawn(async move { bc.add_block(data).await })
    };

    // Wait until the lifecycle has provably begun.
    assert!(
        wait_until(Duration::from_secs(5), move || {
            matches!(events.try_recv(), Ok(ChainEvent::BlockCreationStarted))
        })
        .await
    );

    // A second lifecycle may not start while one is in flight: the guard
    // rejects it synchronously.
    let probe = futures_util::FutureExt::now_or_never(blockchain.add_block(Vec::new()));
    assert!(matches!(probe, Some(Ok(None))));

    // A peer block lands while mining is parked on the gate.
    let peer_block = stub_block(1, genesis.hash.clone(), "remote", Vec::new());
    assert!(blockchain
        .add_peer_block(peer_block.clone())
        .await
        .expect("peer block"));

    // Release the miner: its block extends a stale tip and must be dropped.
    let _ = gate.send(());
    let mined = miner.await.expect("join").expect("add_block");
    assert!(mined.is_none());

    assert_eq!(blockchain.height().expect("height"), 2);
    let tip = blockchain.tip().expect("tip").expect("block");
    assert_eq!(tip.hash, peer_block.hash);
    assert_eq!(tip.block_creator, "remote");
}

#[tokio::test]
async fn peer_events_cancel_in_flight_mining() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (blockchain, _gate) = gated_blockchain(dir.path(), true);
    blockchain.start().await.expect("start");
    let genesis = blockchain.tip().expect("tip").expect("genesis");
    let mut events = blockchain.subscribe();

    // Swallow the gate sender so the stub parks until cancellation below.
    let wallet = Wallet::generate();
    let miner = {
        let bc = Arc::clone(&blockchain);
        let data = vec![signed_entry(&wallet, "recipient", 1)];
        tokio::spawn(async move { bc.add_block(data).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let peer_block = stub_block(1, genesis.hash.clone(), "remote", Vec::new());
    assert!(blockchain.add_peer_block(peer_block).await.expect("peer"));

    let mined = miner.await.expect("join").expect("add_block");
    assert!(mined.is_none());

    let mut saw_peer_accept = false;
    let mut saw_ended_empty = false;
    while let Ok(ev) = events.try_recv() {
        match ev {
            ChainEvent::PeerBlockAccepted(_) => saw_peer_accept = true,
            ChainEvent::BlockCreationEnded(None) => saw_ended_empty = true,
            _ => {}
        }
    }
    assert!(saw_peer_accept);
    assert!(saw_ended_empty);
}
