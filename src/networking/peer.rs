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

//! WebSocket peer mesh: handshake, gossip with dedup, full-chain sync.
//!
//! Every connection gets a reader loop and a writer task fed by a bounded
//! channel; the handshake installs the peer-table entry, socket close or
//! error removes it. Gossip is flood-fill: forwarded to every peer except
//! the message's sender, with a 30 s message-id dedup window.

use crate::core::pool::entry_pool::SubmitOutcome;
use crate::core::runtime::blockchain::Blockchain;
use crate::core::types::{Block, Entry, NodeIdentity, P2pSettings};
use crate::monitoring::metrics::Metrics;
use crate::networking::gossip::GossipDedup;
use crate::networking::messages::{new_message_id, PeerMessage};
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};
use tracing::{debug, info, warn};

/// Outbound frames buffered per peer before back-pressure drops the send.
const PEER_SEND_BUFFER: usize = 256;

/// PeerService errors.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Listen socket could not be bound.
    #[error("bind")]
    Bind,
    #[error("io")]
    Io,
}

struct PeerHandle {
    tx: mpsc::Sender<Message>,
    identity: NodeIdentity,
}

struct PeerShared {
    identity: NodeIdentity,
    blockchain: Arc<Blockchain>,
    peers: Mutex<BTreeMap<String, PeerHandle>>,
    seen: Mutex<GossipDedup>,
    metrics: Arc<Metrics>,
}

/// WebSocket mesh service.
#[derive(Clone)]
pub struct PeerService {
    shared: Arc<PeerShared>,
}

impl PeerService {
    /// Mesh service gossiping on behalf of `identity`.
    pub fn new(identity: NodeIdentity, blockchain: Arc<Blockchain>, metrics: Arc<Metrics>) -> Self {
        Self {
            shared: Arc::new(PeerShared {
                identity,
                blockchain,
                peers: Mutex::new(BTreeMap::new()),
                seen: Mutex::new(GossipDedup::default()),
                metrics,
            }),
        }
    }

    /// Start listening and dial the seed peers once.
    ///
    /// Returns the bound address (port `0` binds an ephemeral port).
    pub async fn start(&self, settings: &P2pSettings) -> Result<SocketAddr, PeerError> {
        let listener = TcpListener::bind(("0.0.0.0", settings.port))
            .await
            .map_err(|_| PeerError::Bind)?;
        let addr = listener.local_addr().map_err(|_| PeerError::Io)?;
        info!(%addr, "peer service listening");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        let shared = Arc::clone(&shared);
                        tokio::spawn(async move {
                            match accept_async(stream).await {
                                Ok(ws) => run_connection(shared, ws, false).await,
                                Err(e) => {
                                    debug!(%remote, error = %e, "websocket upgrade failed")
                                }
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        });

        for seed in &settings.seed_peers {
            self.dial(seed).await;
        }
        Ok(addr)
    }

    /// Dial one `ws://host:port` peer. Failures are logged, not retried.
    pub async fn dial(&self, url: &str) {
        match connect_async(url).await {
            Ok((ws, _)) => {
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    run_connection(shared, ws, true).await;
                });
            }
            Err(e) => warn!(url, error = %e, "failed to dial seed peer"),
        }
    }

    /// Originate a `newEntry` gossip message.
    pub async fn broadcast_entry(&self, entry: &Entry) {
        let msg = PeerMessage::NewEntry {
            message_id: new_message_id(),
            sender_config: self.shared.identity.clone(),
            data: entry.clone(),
        };
        self.shared.mark_seen(msg.message_id());
        self.shared.broadcast(&msg).await;
    }

    /// Originate a `newBlock` gossip message.
    pub async fn broadcast_block(&self, block: &Block) {
        let msg = PeerMessage::NewBlock {
            message_id: new_message_id(),
            sender_config: self.shared.identity.clone(),
            data: block.clone(),
        };
        self.shared.mark_seen(msg.message_id());
        self.shared.broadcast(&msg).await;
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.shared
            .peers
            .lock()
            .map(|p| p.len())
            .unwrap_or(0)
    }

    /// This node's identity as sent in handshakes.
    pub fn identity(&self) -> &NodeIdentity {
        &self.shared.identity
    }
}

impl PeerShared {
    /// Record `message_id`; returns whether it was already in the window.
    fn mark_seen(&self, message_id: &str) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.seen_or_insert(message_id, Instant::now()),
            Err(_) => false,
        }
    }

    /// Install the peer-table entry; returns whether the peer was known.
    fn register_peer(&self, identity: NodeIdentity, tx: mpsc::Sender<Message>) -> bool {
        let Ok(mut peers) = self.peers.lock() else {
            return false;
        };
        let known = peers
            .insert(identity.id.clone(), PeerHandle { tx, identity })
            .is_some();
        self.metrics.p2p_peers.set(peers.len() as i64);
        known
    }

    fn remove_peer(&self, id: &str) {
        if let Ok(mut peers) = self.peers.lock() {
            if peers.remove(id).is_some() {
                self.metrics.p2p_peers.set(peers.len() as i64);
                info!(peer = id, "peer disconnected");
            }
        }
    }

    fn handshake(&self) -> PeerMessage {
        PeerMessage::Handshake {
            message_id: new_message_id(),
            sender_config: self.identity.clone(),
        }
    }

    /// Send to every peer except the one the message names as its sender.
    async fn broadcast(&self, msg: &PeerMessage) {
        let Ok(text) = msg.encode() else { return };
        let exclude = msg.sender().id.as_str();
        let targets: Vec<mpsc::Sender<Message>> = {
            let Ok(peers) = self.peers.lock() else { return };
            peers
                .iter()
                .filter(|(id, _)| id.as_str() != exclude)
                .map(|(_, h)| h.tx.clone())
                .collect()
        };
        for tx in targets {
            let _ = tx.send(Message::Text(text.clone())).await;
        }
    }

    /// Unicast over one connection's writer channel.
    async fn unicast(&self, conn_tx: &mpsc::Sender<Message>, msg: &PeerMessage) {
        if let Ok(text) = msg.encode() {
            let _ = conn_tx.send(Message::Text(text)).await;
        }
    }

    async fn handle_text(
        &self,
        text: &str,
        conn_tx: &mpsc::Sender<Message>,
        remote_id: &mut Option<String>,
    ) {
        let msg = match PeerMessage::decode(text) {
            Ok(m) => m,
            Err(_) => {
                self.metrics.gossip_invalid_msg_total.inc();
                debug!("undecodable peer message dropped");
                return;
            }
        };

        if let PeerMessage::Handshake { sender_config, .. } = &msg {
            let known = self.register_peer(sender_config.clone(), conn_tx.clone());
            *remote_id = Some(sender_config.id.clone());
            info!(peer = %sender_config.id, label = %sender_config.label, "handshake");
            if !known {
                self.unicast(conn_tx, &self.handshake()).await;
            }
            return;
        }

        if self.mark_seen(msg.message_id()) {
            self.metrics.gossip_duplicate_dropped_total.inc();
            return;
        }

        match &msg {
            PeerMessage::Handshake { .. } => {}

            PeerMessage::NewEntry { data, .. } => {
                match self.blockchain.submit_entry(data.clone()).await {
                    Ok(SubmitOutcome::Accepted(_)) => self.broadcast(&msg).await,
                    Ok(SubmitOutcome::Duplicate) => {}
                    // Malformed entries stop here; peers that got them
                    // directly will judge for themselves.
                    Err(e) => debug!(error = %e, "peer entry rejected"),
                }
            }

            PeerMessage::NewBlock { data, .. } => {
                let tip_index = self
                    .blockchain
                    .tip()
                    .ok()
                    .flatten()
                    .map(|t| t.index)
                    .unwrap_or(0);

                if data.index > tip_index + 1 {
                    // The sender is ahead of us; ask it for its whole chain.
                    debug!(
                        received = data.index,
                        tip = tip_index,
                        "peer block ahead of tip, requesting full chain"
                    );
                    let request = PeerMessage::RequestFullChain {
                        message_id: new_message_id(),
                        sender_config: self.identity.clone(),
                    };
                    self.unicast(conn_tx, &request).await;
                } else {
                    match self.blockchain.validate_block(data) {
                        Ok(true) => match self.blockchain.add_peer_block(data.clone()).await {
                            Ok(true) => {}
                            Ok(false) => debug!(index = data.index, "peer block deferred"),
                            Err(e) => debug!(error = %e, "peer block not appended"),
                        },
                        _ => {
                            // Often just a stale view; downstream peers
                            // validate independently, so the mesh stays
                            // connected if we keep forwarding.
                            debug!(index = data.index, "peer block invalid locally");
                        }
                    }
                }
                self.broadcast(&msg).await;
            }

            PeerMessage::RequestFullChain { sender_config, .. } => {
                match self.blockchain.chain_snapshot() {
                    Ok(chain) => {
                        debug!(peer = %sender_config.id, blocks = chain.len(), "serving full chain");
                        let reply = PeerMessage::FullChain {
                            message_id: new_message_id(),
                            sender_config: self.identity.clone(),
                            data: chain,
                        };
                        self.unicast(conn_tx, &reply).await;
                    }
                    Err(e) => warn!(error = %e, "cannot snapshot chain for peer"),
                }
            }

            PeerMessage::FullChain { data, .. } => {
                match self.blockchain.replace_chain(data.clone()).await {
                    Ok(true) => info!(height = data.len(), "adopted peer chain"),
                    Ok(false) => debug!("peer chain rejected"),
                    Err(e) => debug!(error = %e, "peer chain not applied"),
                }
            }
        }
    }
}

/// Drive one WebSocket connection until it closes.
async fn run_connection<S>(shared: Arc<PeerShared>, ws: WebSocketStream<S>, initiator: bool)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Message>(PEER_SEND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    if initiator {
        shared.unicast(&tx, &shared.handshake()).await;
    }

    let mut remote_id: Option<String> = None;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                shared.handle_text(&text, &tx, &mut remote_id).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "peer socket error");
                break;
            }
        }
    }

    if let Some(id) = remote_id {
        shared.remove_peer(&id);
    }
    writer.abort();
}
