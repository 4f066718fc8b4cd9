// Copyright 2016 PingCAP, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! The worker-pool layer: raft workers, their paired apply workers, the node-scoped
//! store worker, and the balancer that migrates peers between them. Module layout
//! mirrors `raftstore::store` (`store.rs` at the top, `worker/{apply,...}.rs`
//! beneath it), flattened by one level since this core has no split-check/
//! compaction/snapshot workers to house alongside apply.

pub mod apply_worker;
pub mod balancer;
pub mod msg;
pub mod raft_worker;
pub mod store_worker;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::peer::{Latch, PeerState};
use crate::store::msg::ApplyProposal;

/// The one lock shared across every raft worker: the cross-worker queued-snapshot
/// set. Snapshot generation/ingestion itself is out of scope for this core, so the
/// set stays empty in practice, but each raft worker pass still takes the lock and
/// performs the purge a full implementation would, rather than skipping it because
/// the set happens to be empty.
#[derive(Default)]
pub struct StoreMeta {
    pending_snapshot_regions: Mutex<HashSet<u64>>,
}

impl StoreMeta {
    pub fn new() -> StoreMeta {
        StoreMeta::default()
    }

    /// Drops every region in `queued` from the pending set. `queued` is the set of
    /// regions that had a snapshot queued during the pass that just ran.
    pub fn purge_queued_snapshots(&self, queued: &HashSet<u64>) {
        let mut pending = self.pending_snapshot_regions.lock().unwrap();
        pending.retain(|region_id| !queued.contains(region_id));
    }
}

/// A unit handed from a raft worker to its paired apply worker.
/// The channel between them carries `Option<ApplyBatch>`; `None` is the poison value
/// a raft worker pushes once on shutdown so its apply worker knows to
/// exit after finishing whatever was already queued.
pub struct ApplyBatch {
    pub proposals: Vec<ApplyProposal>,
    pub barriers: Vec<Latch>,
    pub peers: HashMap<u64, Arc<PeerState>>,
}

impl ApplyBatch {
    pub fn new() -> ApplyBatch {
        ApplyBatch {
            proposals: Vec::new(),
            barriers: Vec::new(),
            peers: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty() && self.barriers.is_empty()
    }
}

impl Default for ApplyBatch {
    fn default() -> ApplyBatch {
        ApplyBatch::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_drops_only_queued_regions() {
        let meta = StoreMeta::new();
        {
            let mut pending = meta.pending_snapshot_regions.lock().unwrap();
            pending.insert(1);
            pending.insert(2);
        }
        let mut queued = HashSet::new();
        queued.insert(1);
        meta.purge_queued_snapshots(&queued);

        let pending = meta.pending_snapshot_regions.lock().unwrap();
        assert!(!pending.contains(&1));
        assert!(pending.contains(&2));
    }
}
