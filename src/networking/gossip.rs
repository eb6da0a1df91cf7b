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

//! Sliding-window gossip dedup.
//!
//! A time-indexed set: membership set plus a min-heap of (expiry, id),
//! drained on every lookup. Memory stays bounded by the message rate times
//! the window, and each operation is O(log n).

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::time::{Duration, Instant};

/// How long a message id is remembered.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// Sliding-window set of recently seen gossip message ids.
#[derive(Debug)]
pub struct GossipDedup {
    window: Duration,
    expiries: BinaryHeap<Reverse<(Instant, String)>>,
    seen: BTreeSet<String>,
}

impl GossipDedup {
    /// Dedup window remembering ids for `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            expiries: BinaryHeap::new(),
            seen: BTreeSet::new(),
        }
    }

    /// Record `id` at `now`; returns whether it was already in the window.
    pub fn seen_or_insert(&mut self, id: &str, now: Instant) -> bool {
        self.drain_expired(now);
        if self.seen.contains(id) {
            return true;
        }
        self.seen.insert(id.to_string());
        self.expiries.push(Reverse((now + self.window, id.to_string())));
        false
    }

    fn drain_expired(&mut self, now: Instant) {
        while self
            .expiries
            .peek()
            .map(|Reverse((expiry, _))| *expiry <= now)
            .unwrap_or(false)
        {
            if let Some(Reverse((_, id))) = self.expiries.pop() {
                self.seen.remove(&id);
            }
        }
    }

    /// Ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for GossipDedup {
    fn default() -> Self {
        Self::new(DEDUP_WINDOW)
    }
}
