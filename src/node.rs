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

//! Node composition root.
//!
//! Wires blockchain lifecycle events to peer broadcasts: locally accepted
//! entries go out as `newEntry`, locally mined blocks as `newBlock`.

use crate::core::runtime::blockchain::{Blockchain, ChainError, ChainEvent};
use crate::core::types::{NodeIdentity, P2pSettings};
use crate::networking::peer::{PeerError, PeerService};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// Node errors.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("chain: {0}")]
    Chain(#[from] ChainError),
    #[error("peer: {0}")]
    Peer(#[from] PeerError),
}

/// One process participating in the mesh.
pub struct Node {
    identity: NodeIdentity,
    blockchain: Arc<Blockchain>,
    peers: PeerService,
}

impl Node {
    /// Compose a node from its blockchain and peer service.
    pub fn new(identity: NodeIdentity, blockchain: Arc<Blockchain>, peers: PeerService) -> Self {
        Self {
            identity,
            blockchain,
            peers,
        }
    }

    /// Start the chain (load or genesis), wire gossip, and, when asked,
    /// bring up the mesh. Returns the bound peer address if one was opened.
    pub async fn start(&self, p2p: &P2pSettings) -> Result<Option<SocketAddr>, NodeError> {
        self.blockchain.start().await?;
        self.spawn_gossip_wiring();
        if p2p.auto_start {
            let addr = self.peers.start(p2p).await?;
            return Ok(Some(addr));
        }
        Ok(None)
    }

    fn spawn_gossip_wiring(&self) {
        let mut rx = self.blockchain.subscribe();
        let peers = self.peers.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ChainEvent::EntryAdded(entry)) => peers.broadcast_entry(&entry).await,
                    Ok(ChainEvent::BlockCreated(block)) => peers.broadcast_block(&block).await,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "gossip wiring lagged behind chain events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// This node's identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// The owned blockchain.
    pub fn blockchain(&self) -> &Arc<Blockchain> {
        &self.blockchain
    }

    /// The owned peer service.
    pub fn peers(&self) -> &PeerService {
        &self.peers
    }
}
