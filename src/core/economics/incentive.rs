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

//! Delayed mining reward.
//!
//! A block's reward is only credited once the block sits
//! [`CONFIRMATION_DEPTH`] confirmations behind the tip: on every commit at
//! height H ≥ [`MIN_REWARD_HEIGHT`], the owner of the block at H − 6 earns a
//! sentinel entry that re-enters the chain through the ordinary mining path.

use crate::core::types::{now_ms, Block, Entry, INCENTIVE_SENDER};
use serde_json::Value;
use uuid::Uuid;

/// Confirmations a block must accumulate before its reward is credited.
pub const CONFIRMATION_DEPTH: u64 = 6;
/// Lowest commit height that triggers a reward.
pub const MIN_REWARD_HEIGHT: u64 = 7;

/// Pluggable reward policy.
///
/// A pure function of the committed chain; the orchestrator feeds the
/// returned entry back into its own pool.
pub trait Incentive: Send + Sync {
    /// Reward entry earned by the commit of `committed`, if any.
    fn compute_reward(&self, chain: &[Block], committed: &Block) -> Option<Entry>;
}

/// Fixed reward credited with a 6-block confirmation lag.
pub struct DelayedReward {
    fixed_reward: u64,
}

impl DelayedReward {
    /// Reward policy paying `fixed_reward` per confirmed block.
    pub fn new(fixed_reward: u64) -> Self {
        Self { fixed_reward }
    }
}

impl Incentive for DelayedReward {
    fn compute_reward(&self, chain: &[Block], committed: &Block) -> Option<Entry> {
        if committed.index < MIN_REWARD_HEIGHT {
            return None;
        }
        let rewarded = chain.get((committed.index - CONFIRMATION_DEPTH) as usize)?;

        let mut entry = Entry {
            entry_id: Uuid::new_v4().to_string(),
            from: INCENTIVE_SENDER.to_string(),
            to: rewarded.owner_address.clone(),
            amount: self.fixed_reward,
            entry_type: "crypto".to_string(),
            initiation_timestamp: now_ms(),
            data: Value::String(format!("reward for block {}", rewarded.index)),
            hash: String::new(),
            signature: None,
        };
        entry.hash = entry.compute_hash().ok()?;
        Some(entry)
    }
}
