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
#![warn(missing_docs)]

//! Blockchain orchestrator.
//!
//! Owns the chain and the entry pool behind one mutex, serializes the three
//! chain-mutation sources (local mining, peer block arrival, peer chain
//! replacement) through an explicit commit phase, and publishes lifecycle
//! events on a broadcast channel.
//!
//! Commits set the phase under the lock, run storage I/O with the lock
//! released, then re-take the lock to append. The non-idle phase keeps the
//! other committers out in the meantime, so chain and pool stay
//! single-writer without holding the mutex across file I/O.

use crate::core::consensus::{Consensus, ConsensusError};
use crate::core::economics::incentive::Incentive;
use crate::core::pool::entry_pool::{EntryPool, PoolError, SubmitOutcome};
use crate::core::state::storage::{Storage, StorageError};
use crate::core::types::{
    now_ms, Block, ChainFault, ChainFaultKind, ChainReport, ChainSettings, Entry, EntryLocation,
    EntryView, TIMESTAMP_DRIFT_MS,
};
use crate::monitoring::metrics::Metrics;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Lifecycle events published by the [`Blockchain`].
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// A persisted chain was loaded at start.
    ChainLoaded,
    /// No persisted chain existed; the genesis block was created.
    GenesisCreated,
    /// An entry was accepted into the pool.
    EntryAdded(Arc<Entry>),
    /// A block-creation lifecycle began.
    BlockCreationStarted,
    /// A locally mined block was committed.
    BlockCreated(Arc<Block>),
    /// The incentive service credited a reward entry.
    IncentiveProcessed(Arc<Entry>),
    /// The block-creation lifecycle ended, with the committed block or
    /// `None` (cancelled, superseded, or persistence failure).
    BlockCreationEnded(Option<Arc<Block>>),
    /// A block received from a peer was committed.
    PeerBlockAccepted(Arc<Block>),
    /// A longer peer chain replaced the local one; carries the new height.
    PeerChainAccepted(u64),
}

/// Orchestrator errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Operation requires at least a genesis block.
    #[error("chain is empty")]
    EmptyChain,
    /// Peer block failed validation against the tip.
    #[error("invalid block")]
    InvalidBlock,
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("consensus: {0}")]
    Consensus(#[from] ConsensusError),
    #[error("pool: {0}")]
    Pool(#[from] PoolError),
    #[error("lock poisoned")]
    Lock,
}

/// Which chain mutation is currently committing. The phase outlives the
/// mutex guard during storage I/O, which is what makes the three commit
/// paths mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CommitPhase {
    Idle,
    CommittingOwn,
    CommittingPeerBlock,
    ReplacingChain,
}

struct ChainInner {
    chain: Vec<Block>,
    pool: EntryPool,
    phase: CommitPhase,
    /// A `create_block` call is in flight.
    mining: bool,
    /// A peer commit landed while mining ran; the mined block is stale.
    mining_interrupted: bool,
}

/// Owner of the chain, the pool, and the pluggable services.
pub struct Blockchain {
    settings: ChainSettings,
    inner: Mutex<ChainInner>,
    consensus: Arc<dyn Consensus>,
    incentive: Arc<dyn Incentive>,
    storage: Arc<dyn Storage>,
    events: broadcast::Sender<ChainEvent>,
    metrics: Arc<Metrics>,
    me: Weak<Self>,
}

impl Blockchain {
    /// Assemble the orchestrator around its injected services.
    pub fn new(
        settings: ChainSettings,
        consensus: Arc<dyn Consensus>,
        incentive: Arc<dyn Incentive>,
        storage: Arc<dyn Storage>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new_cyclic(|me| Self {
            settings,
            inner: Mutex::new(ChainInner {
                chain: Vec::new(),
                pool: EntryPool::new(),
                phase: CommitPhase::Idle,
                mining: false,
                mining_interrupted: false,
            }),
            consensus,
            incentive,
            storage,
            events,
            metrics,
            me: me.clone(),
        })
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// Chain parameters this node runs with.
    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    fn emit(&self, event: ChainEvent) {
        let _ = self.events.send(event);
    }

    fn locked(&self) -> Result<MutexGuard<'_, ChainInner>, ChainError> {
        self.inner.lock().map_err(|_| ChainError::Lock)
    }

    /// Load the persisted chain, or create and persist the genesis block.
    pub async fn start(&self) -> Result<(), ChainError> {
        match self.storage.load_chain() {
            Ok(chain) => {
                let height = chain.len();
                {
                    let mut g = self.locked()?;
                    g.chain = chain;
                }
                self.metrics.chain_height.set(height as i64);
                info!(height, "chain loaded from storage");
                self.emit(ChainEvent::ChainLoaded);
            }
            Err(e) => {
                debug!(reason = %e, "no usable persisted chain, creating genesis");
                let genesis = self.consensus.create_genesis(&self.settings)?;
                self.storage.append_block(&genesis)?;
                {
                    let mut g = self.locked()?;
                    g.chain.push(genesis);
                }
                self.metrics.chain_height.set(1);
                info!(network = %self.settings.blockchain_name, "genesis block created");
                self.emit(ChainEvent::GenesisCreated);
            }
        }
        self.spawn_cancel_watcher();
        Ok(())
    }

    /// Cancels in-flight mining whenever a peer block or peer chain lands.
    fn spawn_cancel_watcher(&self) {
        let consensus = Arc::clone(&self.consensus);
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ChainEvent::PeerBlockAccepted(_)) | Ok(ChainEvent::PeerChainAccepted(_)) => {
                        consensus.cancel_mining();
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Validate and buffer an entry, then re-check the mining trigger.
    pub async fn submit_entry(&self, entry: Entry) -> Result<SubmitOutcome, ChainError> {
        let outcome = {
            let mut g = self.locked()?;
            g.pool.submit(entry, now_ms())?
        };
        if let SubmitOutcome::Accepted(stored) = &outcome {
            self.metrics.entries_total.inc();
            self.emit(ChainEvent::EntryAdded(Arc::new(stored.clone())));
            self.maybe_mine();
        }
        Ok(outcome)
    }

    /// Spawn a mining run when the pool is at threshold and no lifecycle or
    /// commit is in flight.
    fn maybe_mine(&self) {
        let snapshot = {
            let Ok(g) = self.inner.lock() else { return };
            if g.mining
                || g.phase != CommitPhase::Idle
                || !g.pool.threshold_reached(self.settings.min_entries_per_block)
            {
                return;
            }
            g.pool.pending()
        };
        let Some(me) = self.me.upgrade() else { return };
        tokio::spawn(async move {
            if let Err(e) = me.add_block(snapshot).await {
                warn!(error = %e, "mining run failed");
            }
        });
    }

    /// Mine and commit a block carrying `data`.
    ///
    /// Returns `Ok(None)` when another lifecycle is already running, mining
    /// was cancelled, a peer commit superseded the mined block, or
    /// persistence failed. The lifecycle always ends with
    /// [`ChainEvent::BlockCreationEnded`].
    pub async fn add_block(&self, data: Vec<Entry>) -> Result<Option<Arc<Block>>, ChainError> {
        let (index, previous_hash) = {
            let mut g = self.locked()?;
            if g.mining {
                return Ok(None);
            }
            let tip = g.chain.last().ok_or(ChainError::EmptyChain)?;
            let at = (tip.index + 1, tip.hash.clone());
            g.mining = true;
            g.mining_interrupted = false;
            at
        };
        self.emit(ChainEvent::BlockCreationStarted);

        let consensus = Arc::clone(&self.consensus);
        let mined = tokio::task::spawn_blocking(move || {
            consensus.create_block(index, data, previous_hash)
        })
        .await
        .ok()
        .flatten();

        let mut committed: Option<Arc<Block>> = None;
        match mined {
            Some(block) => {
                let clear_to_commit = {
                    let mut g = self.locked()?;
                    // Re-check after mining: a peer block or chain accepted
                    // meanwhile makes the mined block stale.
                    let ok = g.phase == CommitPhase::Idle
                        && !g.mining_interrupted
                        && g.chain
                            .last()
                            .map(|tip| {
                                block.index == tip.index + 1 && block.previous_hash == tip.hash
                            })
                            .unwrap_or(false);
                    if ok {
                        g.phase = CommitPhase::CommittingOwn;
                    }
                    ok
                };

                if !clear_to_commit {
                    debug!(index, "peer activity superseded mined block, discarding");
                } else {
                    match self.storage.append_block(&block) {
                        Ok(()) => {
                            let arc = Arc::new(block);
                            let reward = {
                                let mut g = self.locked()?;
                                g.pool.prune(&arc);
                                g.chain.push((*arc).clone());
                                g.phase = CommitPhase::Idle;
                                let reward = self.incentive.compute_reward(&g.chain, &arc);
                                let reward = reward
                                    .and_then(|r| g.pool.submit(r, now_ms()).ok());
                                self.metrics.chain_height.set(g.chain.len() as i64);
                                reward
                            };
                            self.metrics.blocks_mined_total.inc();
                            info!(index = arc.index, hash = %arc.hash, "block mined");
                            self.emit(ChainEvent::BlockCreated(Arc::clone(&arc)));
                            if let Some(SubmitOutcome::Accepted(entry)) = reward {
                                self.metrics.entries_total.inc();
                                let entry = Arc::new(entry);
                                self.emit(ChainEvent::EntryAdded(Arc::clone(&entry)));
                                self.emit(ChainEvent::IncentiveProcessed(entry));
                            }
                            committed = Some(arc);
                        }
                        Err(e) => {
                            warn!(error = %e, index, "failed to persist mined block, discarding");
                            let mut g = self.locked()?;
                            g.phase = CommitPhase::Idle;
                        }
                    }
                }
            }
            None => {
                self.metrics.mining_cancelled_total.inc();
            }
        }

        {
            let mut g = self.locked()?;
            g.mining = false;
            g.mining_interrupted = false;
        }
        self.emit(ChainEvent::BlockCreationEnded(committed.clone()));
        self.maybe_mine();
        Ok(committed)
    }

    /// Validate a peer block against the tip and commit it.
    ///
    /// Returns `Ok(false)` when another commit is in flight — the block is
    /// dropped and the sender will retry through the gossip cadence.
    pub async fn add_peer_block(&self, block: Block) -> Result<bool, ChainError> {
        {
            let mut g = self.locked()?;
            if g.phase != CommitPhase::Idle {
                debug!(index = block.index, "commit in flight, dropping peer block");
                return Ok(false);
            }
            if !self.extends_tip(g.chain.last(), &block) {
                return Err(ChainError::InvalidBlock);
            }
            g.phase = CommitPhase::CommittingPeerBlock;
        }

        if let Err(e) = self.storage.append_block(&block) {
            let mut g = self.locked()?;
            g.phase = CommitPhase::Idle;
            return Err(e.into());
        }

        let arc = Arc::new(block);
        {
            let mut g = self.locked()?;
            g.pool.prune(&arc);
            g.chain.push((*arc).clone());
            if g.mining {
                g.mining_interrupted = true;
            }
            g.phase = CommitPhase::Idle;
            self.metrics.chain_height.set(g.chain.len() as i64);
        }
        self.metrics.peer_blocks_accepted_total.inc();
        info!(index = arc.index, hash = %arc.hash, "peer block accepted");
        self.emit(ChainEvent::PeerBlockAccepted(arc));
        self.maybe_mine();
        Ok(true)
    }

    /// Adopt a strictly longer, fully valid peer chain.
    ///
    /// Returns `Ok(false)` when the chain is not longer, fails validation,
    /// or another commit is in flight.
    pub async fn replace_chain(&self, new_chain: Vec<Block>) -> Result<bool, ChainError> {
        {
            let mut g = self.locked()?;
            if g.phase != CommitPhase::Idle {
                debug!("commit in flight, dropping peer chain");
                return Ok(false);
            }
            if new_chain.len() <= g.chain.len() {
                debug!(
                    offered = new_chain.len(),
                    local = g.chain.len(),
                    "peer chain not longer, rejecting"
                );
                return Ok(false);
            }
            let report = Self::validate_chain_slice(&new_chain);
            if !report.is_valid {
                warn!(errors = report.errors.len(), "peer chain invalid, rejecting");
                return Ok(false);
            }
            if new_chain
                .iter()
                .skip(1)
                .any(|b| !self.consensus.validate_block_consensus(b))
            {
                warn!("peer chain fails consensus rules, rejecting");
                return Ok(false);
            }
            g.phase = CommitPhase::ReplacingChain;
        }

        if let Err(e) = self.storage.rewrite_chain(&new_chain) {
            let mut g = self.locked()?;
            g.phase = CommitPhase::Idle;
            return Err(e.into());
        }

        let height;
        {
            let mut g = self.locked()?;
            g.chain = new_chain;
            let inner = &mut *g;
            inner.pool.prune_chain(&inner.chain);
            if g.mining {
                g.mining_interrupted = true;
            }
            height = g.chain.len() as u64;
            g.phase = CommitPhase::Idle;
        }
        self.metrics.chain_height.set(height as i64);
        self.metrics.chain_replacements_total.inc();
        info!(height, "replaced local chain with longer peer chain");
        self.emit(ChainEvent::PeerChainAccepted(height));
        self.maybe_mine();
        Ok(true)
    }

    fn extends_tip(&self, tip: Option<&Block>, block: &Block) -> bool {
        let Some(tip) = tip else { return false };
        block.index == tip.index + 1
            && block.previous_hash == tip.hash
            && block.timestamp + TIMESTAMP_DRIFT_MS > tip.timestamp
            && self.consensus.validate_block_consensus(block)
    }

    /// Whether `block` is a valid successor of the current tip.
    pub fn validate_block(&self, block: &Block) -> Result<bool, ChainError> {
        let g = self.locked()?;
        Ok(self.extends_tip(g.chain.last(), block))
    }

    /// Structured validation report for the local chain.
    pub fn validate_chain(&self) -> Result<ChainReport, ChainError> {
        let g = self.locked()?;
        Ok(Self::validate_chain_slice(&g.chain))
    }

    /// Independently re-check every block of `chain` (from height 1 up)
    /// against linkage, index, hash, and timestamp rules.
    pub fn validate_chain_slice(chain: &[Block]) -> ChainReport {
        let mut report = ChainReport {
            is_valid: true,
            block_count: chain.len(),
            are_hashes_valid: true,
            are_previous_hashes_valid: true,
            are_indexes_valid: true,
            are_timestamps_valid: true,
            errors: Vec::new(),
        };

        for (i, block) in chain.iter().enumerate().skip(1) {
            let prev = &chain[i - 1];

            match block.compute_hash() {
                Ok(h) if h == block.hash => {}
                _ => {
                    report.are_hashes_valid = false;
                    report.errors.push(ChainFault {
                        error_type: ChainFaultKind::HashMismatch,
                        block_number: block.index,
                        message: format!("block {} hash does not match its contents", block.index),
                    });
                }
            }
            if block.previous_hash != prev.hash {
                report.are_previous_hashes_valid = false;
                report.errors.push(ChainFault {
                    error_type: ChainFaultKind::BrokenLink,
                    block_number: block.index,
                    message: format!("block {} does not link to its predecessor", block.index),
                });
            }
            if block.index != i as u64 {
                report.are_indexes_valid = false;
                report.errors.push(ChainFault {
                    error_type: ChainFaultKind::IndexMismatch,
                    block_number: block.index,
                    message: format!("block at position {i} declares index {}", block.index),
                });
            }
            if block.timestamp + TIMESTAMP_DRIFT_MS <= prev.timestamp {
                report.are_timestamps_valid = false;
                report.errors.push(ChainFault {
                    error_type: ChainFaultKind::TimestampOutOfRange,
                    block_number: block.index,
                    message: format!(
                        "block {} timestamp drifts behind its predecessor beyond tolerance",
                        block.index
                    ),
                });
            }
        }

        report.is_valid = report.are_hashes_valid
            && report.are_previous_hashes_valid
            && report.are_indexes_valid
            && report.are_timestamps_valid;
        report
    }

    // ---- read-only queries ------------------------------------------------

    /// Current chain length.
    pub fn height(&self) -> Result<u64, ChainError> {
        Ok(self.locked()?.chain.len() as u64)
    }

    /// Highest block, if any.
    pub fn tip(&self) -> Result<Option<Block>, ChainError> {
        Ok(self.locked()?.chain.last().cloned())
    }

    /// Full chain snapshot (full-chain gossip responses, exports).
    pub fn chain_snapshot(&self) -> Result<Vec<Block>, ChainError> {
        Ok(self.locked()?.chain.clone())
    }

    /// Block at `index`.
    pub fn block_by_index(&self, index: u64) -> Result<Option<Block>, ChainError> {
        Ok(self.locked()?.chain.get(index as usize).cloned())
    }

    /// Block with the given hash.
    pub fn block_by_hash(&self, hash: &str) -> Result<Option<Block>, ChainError> {
        Ok(self
            .locked()?
            .chain
            .iter()
            .find(|b| b.hash == hash)
            .cloned())
    }

    /// The `count` highest blocks, ascending.
    pub fn latest_blocks(&self, count: usize) -> Result<Vec<Block>, ChainError> {
        let g = self.locked()?;
        let skip = g.chain.len().saturating_sub(count);
        Ok(g.chain[skip..].to_vec())
    }

    /// Blocks in `[start, start + limit)`.
    pub fn block_range(&self, start: u64, limit: usize) -> Result<Vec<Block>, ChainError> {
        let g = self.locked()?;
        Ok(g.chain
            .iter()
            .skip(start as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Pending pool snapshot.
    pub fn pending_entries(&self) -> Result<Vec<Entry>, ChainError> {
        Ok(self.locked()?.pool.pending())
    }

    /// Confirmed and pending entries sent by `address`.
    pub fn entries_sent_by(&self, address: &str) -> Result<Vec<EntryView>, ChainError> {
        self.scan_entries(|e| e.from == address)
    }

    /// Confirmed and pending entries received by `address`.
    pub fn entries_received_by(&self, address: &str) -> Result<Vec<EntryView>, ChainError> {
        self.scan_entries(|e| e.to == address)
    }

    fn scan_entries(&self, keep: impl Fn(&Entry) -> bool) -> Result<Vec<EntryView>, ChainError> {
        let g = self.locked()?;
        let mut out = Vec::new();
        for block in &g.chain {
            for entry in block.entries() {
                if keep(entry) {
                    out.push(EntryView {
                        entry: entry.clone(),
                        location: EntryLocation::Confirmed(block.index),
                        validity: None,
                    });
                }
            }
        }
        for entry in g.pool.pending() {
            if keep(&entry) {
                out.push(EntryView {
                    entry,
                    location: EntryLocation::Pending,
                    validity: None,
                });
            }
        }
        Ok(out)
    }

    /// Entry by id, pending or confirmed.
    pub fn entry_by_id(&self, entry_id: &str) -> Result<Option<EntryView>, ChainError> {
        let g = self.locked()?;
        if let Some(entry) = g.pool.get(entry_id) {
            return Ok(Some(EntryView {
                entry: entry.clone(),
                location: EntryLocation::Pending,
                validity: None,
            }));
        }
        for block in &g.chain {
            if let Some(entry) = block.entries().iter().find(|e| e.entry_id == entry_id) {
                return Ok(Some(EntryView {
                    entry: entry.clone(),
                    location: EntryLocation::Confirmed(block.index),
                    validity: None,
                }));
            }
        }
        Ok(None)
    }

    /// On-demand hash/signature check of a stored entry. The clock window
    /// is an admission rule, not re-checked here.
    pub fn validate_entry(&self, entry_id: &str) -> Result<Option<bool>, ChainError> {
        let view = self.entry_by_id(entry_id)?;
        Ok(view.map(|v| EntryPool::validate_content(&v.entry).is_ok()))
    }
}
