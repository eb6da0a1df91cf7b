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
#![allow(dead_code)]

//! Shared test fixtures.

use emberchain::core::consensus::pow::PowConsensus;
use emberchain::core::economics::incentive::DelayedReward;
use emberchain::core::runtime::blockchain::Blockchain;
use emberchain::core::security::keystore::Wallet;
use emberchain::core::state::storage::FileStorage;
use emberchain::core::types::{now_ms, ChainSettings, Entry, NodeIdentity, P2pSettings};
use emberchain::monitoring::metrics::Metrics;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Chain settings every test network shares.
pub fn chain_settings(difficulty: u32, min_entries: usize, storage_path: &Path) -> ChainSettings {
    ChainSettings {
        blockchain_name: "emberchain-test".to_string(),
        difficulty,
        fixed_reward: 50,
        min_entries_per_block: min_entries,
        storage_path: storage_path.to_string_lossy().into_owned(),
        genesis_timestamp: 1_700_000_000_000,
        genesis_entries: "Genesis Block".to_string(),
    }
}

/// Blockchain with PoW consensus and file storage under `dir`.
pub fn build_blockchain(
    dir: &Path,
    name: &str,
    difficulty: u32,
    min_entries: usize,
) -> Arc<Blockchain> {
    let path = dir.join(format!("{name}-chain.db"));
    let settings = chain_settings(difficulty, min_entries, &path);
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    let storage = Arc::new(FileStorage::new(&path));
    let consensus = Arc::new(PowConsensus::new(
        name.to_string(),
        format!("{name}-owner"),
        difficulty,
    ));
    let incentive = Arc::new(DelayedReward::new(settings.fixed_reward));
    Blockchain::new(settings, consensus, incentive, storage, metrics)
}

/// Identity for a test node.
pub fn identity(name: &str, owner: &str) -> NodeIdentity {
    NodeIdentity {
        id: name.to_string(),
        label: name.to_string(),
        ip: "127.0.0.1".to_string(),
        url: "ws://127.0.0.1:0".to_string(),
        p2p_port: 0,
        web_service_port: 0,
        owner_address: owner.to_string(),
    }
}

/// Mesh settings with an ephemeral port.
pub fn p2p_settings(seed_peers: Vec<String>) -> P2pSettings {
    P2pSettings {
        port: 0,
        seed_peers,
        auto_start: true,
    }
}

/// A hashed and signed entry with a caller-chosen timestamp.
pub fn signed_entry_at(wallet: &Wallet, to: &str, amount: u64, timestamp: u64) -> Entry {
    let mut entry = Entry {
        entry_id: uuid::Uuid::new_v4().to_string(),
        from: wallet.public_key_hex(),
        to: to.to_string(),
        amount,
        entry_type: "crypto".to_string(),
        initiation_timestamp: timestamp,
        data: json!("test payment"),
        hash: String::new(),
        signature: None,
    };
    entry.hash = entry.compute_hash().expect("hash");
    entry.signature = Some(wallet.sign_entry(&entry).expect("sign"));
    entry
}

/// A hashed and signed entry timestamped now.
pub fn signed_entry(wallet: &Wallet, to: &str, amount: u64) -> Entry {
    signed_entry_at(wallet, to, amount, now_ms())
}

/// Poll `cond` every 25 ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    cond()
}
