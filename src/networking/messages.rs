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

//! Peer wire schema: JSON text frames with a common envelope.
//!
//! Every message carries `type`, `messageId` (the gossip dedup key), and
//! the sender's identity as `senderConfig`. Only `senderConfig.id` is
//! trust-bearing; the remaining identity fields are descriptive.

use crate::core::types::{Block, CodecError, Entry, NodeIdentity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A peer mesh message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PeerMessage {
    /// Exchanged on connect; installs the peer-table entry. Not gossiped.
    Handshake {
        /// Globally unique message id.
        message_id: String,
        /// Sender identity.
        sender_config: NodeIdentity,
    },
    /// A pending entry offered for inclusion.
    NewEntry {
        /// Globally unique message id (gossip dedup key).
        message_id: String,
        /// Sender identity.
        sender_config: NodeIdentity,
        /// The entry.
        data: Entry,
    },
    /// A freshly committed block.
    NewBlock {
        /// Globally unique message id (gossip dedup key).
        message_id: String,
        /// Sender identity.
        sender_config: NodeIdentity,
        /// The block.
        data: Block,
    },
    /// Ask the receiver to unicast its full chain back.
    RequestFullChain {
        /// Globally unique message id.
        message_id: String,
        /// Sender identity.
        sender_config: NodeIdentity,
    },
    /// Full serialized chain, unicast in response to a request.
    FullChain {
        /// Globally unique message id.
        message_id: String,
        /// Sender identity.
        sender_config: NodeIdentity,
        /// The chain, height 0 up.
        data: Vec<Block>,
    },
}

impl PeerMessage {
    /// The envelope's message id.
    pub fn message_id(&self) -> &str {
        match self {
            PeerMessage::Handshake { message_id, .. }
            | PeerMessage::NewEntry { message_id, .. }
            | PeerMessage::NewBlock { message_id, .. }
            | PeerMessage::RequestFullChain { message_id, .. }
            | PeerMessage::FullChain { message_id, .. } => message_id,
        }
    }

    /// The envelope's sender identity.
    pub fn sender(&self) -> &NodeIdentity {
        match self {
            PeerMessage::Handshake { sender_config, .. }
            | PeerMessage::NewEntry { sender_config, .. }
            | PeerMessage::NewBlock { sender_config, .. }
            | PeerMessage::RequestFullChain { sender_config, .. }
            | PeerMessage::FullChain { sender_config, .. } => sender_config,
        }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|_| CodecError::Serialize)
    }

    /// Parse a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(|_| CodecError::Deserialize)
    }
}

/// Fresh globally unique message id.
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}
