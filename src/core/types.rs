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

//! Core ledger types and canonical hashing.
//!
//! Hash preimages are wire-compatible by construction: entries hash the
//! compact JSON of a fixed-order field subset, blocks hash the string
//! concatenation of their canonical field forms. Field order is part of the
//! wire format and fixed by the serde struct declarations below.

use ring::digest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Sender id of initial-offering system entries.
pub const ICO_SENDER: &str = "ICO";
/// Sender id of mining-reward system entries.
pub const INCENTIVE_SENDER: &str = "INCENTIVE";
/// `previousHash` of the block at height 0.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// Creator and owner tag stamped into the genesis block.
pub const GENESIS_TAG: &str = "Genesis Block";
/// Maximum tolerated backward clock drift between adjacent blocks, and the
/// half-width of the entry acceptance window, in milliseconds.
pub const TIMESTAMP_DRIFT_MS: u64 = 60_000;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
}

/// Milliseconds since UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, bytes).as_ref())
}

/// A signed message queued for inclusion in a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Locally assigned unique identifier.
    pub entry_id: String,
    /// Sender identity: compressed secp256k1 public key (hex), or a sentinel.
    pub from: String,
    /// Recipient identity, same format.
    pub to: String,
    /// Transferred amount.
    pub amount: u64,
    /// Free-form tag, e.g. `"crypto"`.
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Submission wall-clock time in ms since epoch.
    pub initiation_timestamp: u64,
    /// Opaque payload.
    pub data: Value,
    /// SHA-256 over the six unsigned fields, lowercase hex.
    pub hash: String,
    /// DER-encoded ECDSA signature (hex); `None` for sentinel senders.
    pub signature: Option<String>,
}

/// Entry hash preimage. Key order is part of the wire format.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryHashPayload<'a> {
    from: &'a str,
    to: &'a str,
    amount: u64,
    #[serde(rename = "type")]
    entry_type: &'a str,
    initiation_timestamp: u64,
    data: &'a Value,
}

/// Entry signing preimage: the hash payload plus the hash itself, last.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntrySignPayload<'a> {
    from: &'a str,
    to: &'a str,
    amount: u64,
    #[serde(rename = "type")]
    entry_type: &'a str,
    initiation_timestamp: u64,
    data: &'a Value,
    hash: &'a str,
}

impl Entry {
    /// JSON string hashed to produce `hash`.
    pub fn hash_preimage(&self) -> Result<String, CodecError> {
        serde_json::to_string(&EntryHashPayload {
            from: &self.from,
            to: &self.to,
            amount: self.amount,
            entry_type: &self.entry_type,
            initiation_timestamp: self.initiation_timestamp,
            data: &self.data,
        })
        .map_err(|_| CodecError::Serialize)
    }

    /// JSON string covered by `signature`.
    pub fn signing_preimage(&self) -> Result<String, CodecError> {
        serde_json::to_string(&EntrySignPayload {
            from: &self.from,
            to: &self.to,
            amount: self.amount,
            entry_type: &self.entry_type,
            initiation_timestamp: self.initiation_timestamp,
            data: &self.data,
            hash: &self.hash,
        })
        .map_err(|_| CodecError::Serialize)
    }

    /// Recompute the entry hash from the unsigned fields.
    pub fn compute_hash(&self) -> Result<String, CodecError> {
        Ok(sha256_hex(self.hash_preimage()?.as_bytes()))
    }

    /// Whether `from` is a signature-exempt system sender.
    pub fn has_sentinel_sender(&self) -> bool {
        self.from == ICO_SENDER || self.from == INCENTIVE_SENDER
    }
}

/// Block payload: the genesis marker text or a list of entries.
///
/// Untagged so the serialized form is a bare string or a bare array,
/// matching the hash preimage JSON expected across the network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockData {
    /// Genesis marker, e.g. `"Genesis Block"`.
    Note(String),
    /// Ordinary block payload.
    Entries(Vec<Entry>),
}

impl BlockData {
    /// Entries carried by this payload (empty for the genesis marker).
    pub fn entries(&self) -> &[Entry] {
        match self {
            BlockData::Note(_) => &[],
            BlockData::Entries(v) => v,
        }
    }
}

/// One record in the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// 0-based height.
    pub index: u64,
    /// Creation wall-clock time in ms since epoch.
    pub timestamp: u64,
    /// Hash of the predecessor, or `"0"` at genesis.
    pub previous_hash: String,
    /// Id of the node that mined this block.
    pub block_creator: String,
    /// Compressed public key of the reward recipient.
    pub owner_address: String,
    /// Payload.
    pub data: BlockData,
    /// Proof-of-work nonce.
    pub nonce: u64,
    /// Required count of leading `'0'` hex characters in `hash`.
    pub difficulty: u32,
    /// SHA-256 over the concatenated canonical fields, lowercase hex.
    pub hash: String,
}

impl Block {
    /// The string whose SHA-256 is this block's hash:
    /// `index ‖ previousHash ‖ timestamp ‖ blockCreator ‖ ownerAddress ‖ JSON(data) ‖ nonce`.
    pub fn hash_preimage(&self) -> Result<String, CodecError> {
        let data_json = serde_json::to_string(&self.data).map_err(|_| CodecError::Serialize)?;
        Ok(format!(
            "{}{}{}{}{}{}{}",
            self.index,
            self.previous_hash,
            self.timestamp,
            self.block_creator,
            self.owner_address,
            data_json,
            self.nonce
        ))
    }

    /// Recompute the block hash from the current field values.
    pub fn compute_hash(&self) -> Result<String, CodecError> {
        Ok(sha256_hex(self.hash_preimage()?.as_bytes()))
    }

    /// Whether `hash` carries the leading-zero prefix this block declares.
    pub fn meets_declared_difficulty(&self) -> bool {
        let want = self.difficulty as usize;
        self.hash.len() >= want && self.hash.bytes().take(want).all(|b| b == b'0')
    }

    /// Entries carried by this block (empty for genesis).
    pub fn entries(&self) -> &[Entry] {
        self.data.entries()
    }

    /// Whether this is the block at height 0.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

/// Where a queried entry currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryLocation {
    /// Buffered in the pool, not yet mined.
    Pending,
    /// Included in the block at this height.
    Confirmed(u64),
}

/// Query result wrapper around an entry. Stored entries are never mutated;
/// derived facts travel here instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    /// The entry as stored.
    pub entry: Entry,
    /// Pool or chain position.
    pub location: EntryLocation,
    /// Hash/signature validity if it was checked, `None` if unknown.
    pub validity: Option<bool>,
}

/// Category of a chain validation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainFaultKind {
    /// Recomputed hash differs from the stored one.
    HashMismatch,
    /// `previousHash` does not match the predecessor's hash.
    BrokenLink,
    /// Stored index differs from the position in the chain.
    IndexMismatch,
    /// Timestamp drifts backwards beyond tolerance.
    TimestampOutOfRange,
}

/// One chain validation failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainFault {
    /// Failure category.
    pub error_type: ChainFaultKind,
    /// Height of the offending block.
    pub block_number: u64,
    /// Human-readable detail.
    pub message: String,
}

/// Structured result of a full-chain validation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    /// Conjunction of the per-category flags.
    pub is_valid: bool,
    /// Number of blocks examined.
    pub block_count: usize,
    /// All hashes self-consistent.
    pub are_hashes_valid: bool,
    /// All `previousHash` links intact.
    pub are_previous_hashes_valid: bool,
    /// All indexes equal their positions.
    pub are_indexes_valid: bool,
    /// All timestamps within drift tolerance.
    pub are_timestamps_valid: bool,
    /// Individual failures, in block order.
    pub errors: Vec<ChainFault>,
}

/// Chain parameters shared by every node of a network.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSettings {
    /// Network name.
    pub blockchain_name: String,
    /// Required leading-hex-zero count in PoW hashes.
    pub difficulty: u32,
    /// Reward amount credited by the incentive service.
    pub fixed_reward: u64,
    /// Pool size that triggers mining.
    pub min_entries_per_block: usize,
    /// File backing chain persistence.
    pub storage_path: String,
    /// Genesis block timestamp; identical across peers.
    pub genesis_timestamp: u64,
    /// Genesis block payload text; identical across peers.
    pub genesis_entries: String,
}

/// PeerService settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct P2pSettings {
    /// TCP listen port (`0` binds an ephemeral port).
    pub port: u16,
    /// `ws://host:port` URLs dialed once at start.
    pub seed_peers: Vec<String>,
    /// Whether the mesh starts with the node.
    pub auto_start: bool,
}

/// Node identity, exchanged in handshakes and stamped into mined blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdentity {
    /// Globally unique node id.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Advertised IP.
    pub ip: String,
    /// Advertised base URL.
    pub url: String,
    /// Advertised peer port.
    pub p2p_port: u16,
    /// Advertised HTTP query port.
    pub web_service_port: u16,
    /// Compressed public key credited for blocks this node mines.
    pub owner_address: String,
}

/// Configuration root.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Chain parameters.
    pub chain: ChainSettings,
    /// Mesh parameters.
    pub p2p: P2pSettings,
    /// This node's identity.
    pub identity: NodeIdentity,
}
