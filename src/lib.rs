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

//! Emberchain - modular toolkit for permissionless replicated ledgers.
//!
//! This repository provides:
//! - A proof-of-work block chain with cooperative mining cancellation
//! - A WebSocket gossip mesh with dedup and full-chain reconciliation
//! - Pluggable consensus, incentive, and storage services coordinated
//!   through a reactive event bus
//! - secp256k1-signed entries buffered in a validating pool
//! - Monitoring via Prometheus metrics and structured logging

/// Core ledger (types, consensus, pool, storage, orchestration).
pub mod core;
/// Observability (metrics).
pub mod monitoring;
/// P2P networking stack (WebSocket mesh, gossip dedup).
pub mod networking;
/// Node composition root.
pub mod node;
