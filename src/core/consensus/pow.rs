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

//! Proof-of-work consensus: hash-prefix puzzle with cooperative cancellation.

use crate::core::consensus::{Consensus, ConsensusError};
use crate::core::types::{
    now_ms, sha256_hex, Block, BlockData, ChainSettings, Entry, GENESIS_PREVIOUS_HASH, GENESIS_TAG,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Nonce attempts between cancellation checks.
pub const MINE_YIELD_INTERVAL: u64 = 1_000;

/// Result of a mining run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MineOutcome {
    /// A nonce satisfying the difficulty prefix was found; the block's
    /// `nonce` and `hash` are set.
    Completed,
    /// The stop flag was observed before success.
    Cancelled,
}

/// Brute-force the nonce until the hash carries `block.difficulty` leading
/// zeros, checking `cancel` every [`MINE_YIELD_INTERVAL`] attempts.
pub fn mine(block: &mut Block, cancel: &AtomicBool) -> Result<MineOutcome, ConsensusError> {
    // The preimage prefix is invariant across attempts; only the nonce varies.
    let data_json = serde_json::to_string(&block.data).map_err(|_| ConsensusError::Codec)?;
    let prefix = format!(
        "{}{}{}{}{}{}",
        block.index,
        block.previous_hash,
        block.timestamp,
        block.block_creator,
        block.owner_address,
        data_json
    );
    let target = "0".repeat(block.difficulty as usize);

    let mut nonce: u64 = 0;
    loop {
        let hash = sha256_hex(format!("{prefix}{nonce}").as_bytes());
        if hash.starts_with(&target) {
            block.nonce = nonce;
            block.hash = hash;
            return Ok(MineOutcome::Completed);
        }
        nonce = nonce.wrapping_add(1);
        if nonce % MINE_YIELD_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Ok(MineOutcome::Cancelled);
        }
    }
}

/// Proof-of-work variant of the [`Consensus`] service.
pub struct PowConsensus {
    node_id: String,
    owner_address: String,
    difficulty: u32,
    /// Stop flag of the block currently being mined.
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl PowConsensus {
    /// Create a PoW consensus stamping mined blocks with this node's
    /// identity and reward address.
    pub fn new(
        node_id: impl Into<String>,
        owner_address: impl Into<String>,
        difficulty: u32,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            owner_address: owner_address.into(),
            difficulty,
            current: Mutex::new(None),
        }
    }

    fn set_current(&self, flag: Option<Arc<AtomicBool>>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = flag;
        }
    }
}

impl Consensus for PowConsensus {
    fn create_genesis(&self, settings: &ChainSettings) -> Result<Block, ConsensusError> {
        let mut block = Block {
            index: 0,
            timestamp: settings.genesis_timestamp,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            block_creator: GENESIS_TAG.to_string(),
            owner_address: GENESIS_TAG.to_string(),
            data: BlockData::Note(settings.genesis_entries.clone()),
            nonce: 0,
            difficulty: settings.difficulty,
            hash: String::new(),
        };
        // Never-set flag: genesis mining runs to completion.
        let outcome = mine(&mut block, &AtomicBool::new(false))?;
        debug_assert_eq!(outcome, MineOutcome::Completed);
        Ok(block)
    }

    fn create_block(&self, index: u64, data: Vec<Entry>, previous_hash: String) -> Option<Block> {
        let mut block = Block {
            index,
            timestamp: now_ms(),
            previous_hash,
            block_creator: self.node_id.clone(),
            owner_address: self.owner_address.clone(),
            data: BlockData::Entries(data),
            nonce: 0,
            difficulty: self.difficulty,
            hash: String::new(),
        };

        let cancel = Arc::new(AtomicBool::new(false));
        self.set_current(Some(Arc::clone(&cancel)));
        let outcome = mine(&mut block, &cancel);
        self.set_current(None);

        match outcome {
            Ok(MineOutcome::Completed) => Some(block),
            Ok(MineOutcome::Cancelled) => {
                debug!(index, "mining cancelled");
                None
            }
            Err(_) => None,
        }
    }

    fn validate_block_hash(&self, block: &Block) -> bool {
        block
            .compute_hash()
            .map(|h| h == block.hash)
            .unwrap_or(false)
    }

    fn validate_block_consensus(&self, block: &Block) -> bool {
        // Declared difficulty below the network floor is a spoof attempt;
        // the prefix check alone would accept it.
        self.validate_block_hash(block)
            && block.difficulty >= self.difficulty
            && block.meets_declared_difficulty()
    }

    fn cancel_mining(&self) {
        if let Ok(guard) = self.current.lock() {
            if let Some(flag) = guard.as_ref() {
                flag.store(true, Ordering::Relaxed);
            }
        }
    }
}
