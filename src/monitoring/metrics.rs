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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Current chain height (tip index + 1).
    pub chain_height: IntGauge,
    /// Connected peers gauge.
    pub p2p_peers: IntGauge,

    /// Entries accepted into the pool.
    pub entries_total: IntCounter,
    /// Blocks mined and committed locally.
    pub blocks_mined_total: IntCounter,
    /// Peer blocks accepted.
    pub peer_blocks_accepted_total: IntCounter,
    /// Full-chain replacements applied.
    pub chain_replacements_total: IntCounter,
    /// Mining runs cancelled by peer activity.
    pub mining_cancelled_total: IntCounter,

    /// Gossip messages dropped as duplicates.
    pub gossip_duplicate_dropped_total: IntCounter,
    /// Undecodable gossip messages.
    pub gossip_invalid_msg_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let chain_height = IntGauge::new("emberchain_chain_height", "Current chain height")
            .map_err(|_| MetricsError::Prom)?;
        let p2p_peers = IntGauge::new("emberchain_p2p_peers", "Connected peers")
            .map_err(|_| MetricsError::Prom)?;

        let entries_total =
            IntCounter::new("emberchain_entries_total", "Entries accepted into the pool")
                .map_err(|_| MetricsError::Prom)?;
        let blocks_mined_total =
            IntCounter::new("emberchain_blocks_mined_total", "Blocks mined locally")
                .map_err(|_| MetricsError::Prom)?;
        let peer_blocks_accepted_total = IntCounter::new(
            "emberchain_peer_blocks_accepted_total",
            "Peer blocks accepted",
        )
        .map_err(|_| MetricsError::Prom)?;
        let chain_replacements_total = IntCounter::new(
            "emberchain_chain_replacements_total",
            "Full-chain replacements applied",
        )
        .map_err(|_| MetricsError::Prom)?;
        let mining_cancelled_total = IntCounter::new(
            "emberchain_mining_cancelled_total",
            "Mining runs cancelled by peer activity",
        )
        .map_err(|_| MetricsError::Prom)?;

        let gossip_duplicate_dropped_total = IntCounter::new(
            "emberchain_gossip_duplicate_dropped_total",
            "Gossip messages dropped as duplicates",
        )
        .map_err(|_| MetricsError::Prom)?;
        let gossip_invalid_msg_total = IntCounter::new(
            "emberchain_gossip_invalid_msg_total",
            "Undecodable gossip messages",
        )
        .map_err(|_| MetricsError::Prom)?;

        for collector in [
            Box::new(chain_height.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(p2p_peers.clone()),
            Box::new(entries_total.clone()),
            Box::new(blocks_mined_total.clone()),
            Box::new(peer_blocks_accepted_total.clone()),
            Box::new(chain_replacements_total.clone()),
            Box::new(mining_cancelled_total.clone()),
            Box::new(gossip_duplicate_dropped_total.clone()),
            Box::new(gossip_invalid_msg_total.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|_| MetricsError::Prom)?;
        }

        Ok(Self {
            registry,
            chain_height,
            p2p_peers,
            entries_total,
            blocks_mined_total,
            peer_blocks_accepted_total,
            chain_replacements_total,
            mining_cancelled_total,
            gossip_duplicate_dropped_total,
            gossip_invalid_msg_total,
        })
    }
}
