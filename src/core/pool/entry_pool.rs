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

//! Entry pool: dedup, validate, and buffer pending entries.
//!
//! Insertion order is preserved so block construction is deterministic.

use crate::core::security::keystore::{verify_entry_signature, KeystoreError};
use crate::core::types::{Block, Entry, TIMESTAMP_DRIFT_MS};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Entry rejection reasons.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Recomputed hash differs from the stored one.
    #[error("entry hash mismatch")]
    HashMismatch,
    /// `from` is not a decodable compressed public key.
    #[error("invalid sender key")]
    InvalidSenderKey,
    /// Non-sentinel entry without a signature.
    #[error("missing signature")]
    MissingSignature,
    /// Signature does not verify against the sender key.
    #[error("bad signature")]
    BadSignature,
    /// `initiationTimestamp` outside the acceptance window.
    #[error("timestamp outside acceptance window")]
    StaleTimestamp,
    /// Canonical serialization failed.
    #[error("codec")]
    Codec,
}

/// Outcome of a pool submission.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Newly inserted; carries the stored entry (with its assigned id).
    Accepted(Entry),
    /// Same `entryId` already buffered; the pool is unchanged.
    Duplicate,
}

/// Buffer of validated entries awaiting inclusion in a block.
#[derive(Debug, Default)]
pub struct EntryPool {
    entries: Vec<Entry>,
    ids: BTreeSet<String>,
}

impl EntryPool {
    /// Empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and buffer an entry. Assigns an `entryId` when absent.
    pub fn submit(&mut self, mut entry: Entry, now_ms: u64) -> Result<SubmitOutcome, PoolError> {
        if entry.entry_id.is_empty() {
            entry.entry_id = Uuid::new_v4().to_string();
        }
        if self.ids.contains(&entry.entry_id) {
            return Ok(SubmitOutcome::Duplicate);
        }
        Self::validate(&entry, now_ms)?;
        self.ids.insert(entry.entry_id.clone());
        self.entries.push(entry.clone());
        Ok(SubmitOutcome::Accepted(entry))
    }

    /// Hash and signature validation, independent of the clock.
    pub fn validate_content(entry: &Entry) -> Result<(), PoolError> {
        let expected = entry.compute_hash().map_err(|_| PoolError::Codec)?;
        if expected != entry.hash {
            return Err(PoolError::HashMismatch);
        }

        if !entry.has_sentinel_sender() {
            let payload = entry.signing_preimage().map_err(|_| PoolError::Codec)?;
            let signature = entry
                .signature
                .as_deref()
                .ok_or(PoolError::MissingSignature)?;
            verify_entry_signature(&entry.from, &payload, signature).map_err(|e| match e {
                KeystoreError::InvalidKey => PoolError::InvalidSenderKey,
                _ => PoolError::BadSignature,
            })?;
        }
        Ok(())
    }

    /// Full admission check: content plus the ±60 s clock window.
    pub fn validate(entry: &Entry, now_ms: u64) -> Result<(), PoolError> {
        Self::validate_content(entry)?;
        if now_ms.abs_diff(entry.initiation_timestamp) > TIMESTAMP_DRIFT_MS {
            return Err(PoolError::StaleTimestamp);
        }
        Ok(())
    }

    /// Snapshot of the buffered entries, in insertion order.
    pub fn pending(&self) -> Vec<Entry> {
        self.entries.clone()
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this id is buffered.
    pub fn contains(&self, entry_id: &str) -> bool {
        self.ids.contains(entry_id)
    }

    /// Buffered entry by id.
    pub fn get(&self, entry_id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    /// Whether the mining threshold is reached.
    pub fn threshold_reached(&self, min_entries_per_block: usize) -> bool {
        self.entries.len() >= min_entries_per_block
    }

    /// Drop every buffered entry included in `block`. Genesis carries no
    /// entries and is skipped.
    pub fn prune(&mut self, block: &Block) {
        if block.is_genesis() {
            return;
        }
        let before = self.entries.len();
        for included in block.entries() {
            self.ids.remove(&included.entry_id);
        }
        self.entries.retain(|e| self.ids.contains(&e.entry_id));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(block = block.index, removed, "pruned pool on commit");
        }
    }

    /// Prune against every block of a newly adopted chain.
    pub fn prune_chain(&mut self, chain: &[Block]) {
        for block in chain {
            self.prune(block);
        }
    }
}
