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

//! The raft worker main loop: drain the inbox, dispatch to per-region state,
//! persist, and hand committed work to the paired apply worker. Grounded on
//! `raftstore::store::store.rs`'s event-loop shape (tick/select over a channel,
//! draining a bounded batch per pass) crossed with `worker::apply::Runner`'s
//! drain-then-commit structure, since this core's "raft worker" plays both roles
//! split across `Store::on_raft_ready` and the apply `Runner` in the original.
//!
//! The consensus algorithm itself is an out-of-scope black box: this worker does
//! not implement raft's election/replication protocol. A `Propose` is treated as
//! committed in the same pass it arrives (a trivial single-writer "ready"), which
//! is enough to exercise every named invariant (drain bound, persistence order,
//! backpressure, FIFO) without reimplementing raft itself.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};

use crate::engine::{Cf, KvEngine, RaftEngine};
use crate::metrics;
use crate::router::Router;
use crate::slow_log;
use crate::store::msg::{AdminMsg, ApplyProposal, ApplyResult, PeerMsg};
use crate::store::{ApplyBatch, StoreMeta};
use crate::util::time::{duration_to_sec, SlowTimer};

/// Encodes a committed mutation as raft-log bytes. Deliberately simple (tag + cf +
/// length-prefixed key/value): this core treats the raft log as an opaque byte
/// store, it never needs to decode its own entries back out.
fn encode_mutation(m: &crate::store::msg::Mutation) -> Vec<u8> {
    use crate::store::msg::Mutation;
    let mut out = Vec::new();
    match m {
        Mutation::Put { cf, key, value } => {
            out.push(0);
            out.push(*cf as u8);
            out.extend_from_slice(&(key.len() as u32).to_be_bytes());
            out.extend_from_slice(key);
            out.extend_from_slice(value);
        }
        Mutation::Delete { cf, key } => {
            out.push(1);
            out.push(*cf as u8);
            out.extend_from_slice(&(key.len() as u32).to_be_bytes());
            out.extend_from_slice(key);
        }
    }
    out
}

/// Renders a mutation's key (escaped, never the value) for a log line.
fn mutation_summary(m: &crate::store::msg::Mutation) -> String {
    use crate::store::msg::Mutation;
    match m {
        Mutation::Put { key, .. } => format!("put {}", crate::util::escape(key)),
        Mutation::Delete { key, .. } => format!("delete {}", crate::util::escape(key)),
    }
}

fn raft_log_key(region_id: u64, index: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&region_id.to_be_bytes());
    out.extend_from_slice(&index.to_be_bytes());
    out
}

fn compact_log_key(region_id: u64) -> Vec<u8> {
    let mut out = b"compact_".to_vec();
    out.extend_from_slice(&region_id.to_be_bytes());
    out
}

/// Per-worker counters the balancer reads every tick: plain atomics, no locks.
pub struct WorkerStats {
    pub inbox: Sender<PeerMsg>,
    pub msg_cnt: Arc<AtomicU64>,
    /// Last region touched in a pass; 0 means "none yet" (region ids are never 0).
    pub move_peer_candidate: Arc<AtomicU64>,
}

pub struct RaftWorker {
    label: String,
    inbox: Receiver<PeerMsg>,
    close_rx: Receiver<()>,
    apply_tx: Sender<Option<ApplyBatch>>,
    apply_result_rx: Receiver<ApplyResult>,
    router: Arc<Router>,
    kv_store: Arc<dyn KvEngine>,
    raft_store: Arc<dyn RaftEngine>,
    store_meta: Arc<StoreMeta>,
    msg_cnt: Arc<AtomicU64>,
    move_peer_candidate: Arc<AtomicU64>,
    next_index: u64,
    /// Highest applied index per region, as reported back by the apply worker.
    applied_indices: HashMap<u64, u64>,
}

impl RaftWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: String,
        inbox: Receiver<PeerMsg>,
        close_rx: Receiver<()>,
        apply_tx: Sender<Option<ApplyBatch>>,
        apply_result_rx: Receiver<ApplyResult>,
        router: Arc<Router>,
        kv_store: Arc<dyn KvEngine>,
        raft_store: Arc<dyn RaftEngine>,
        store_meta: Arc<StoreMeta>,
        msg_cnt: Arc<AtomicU64>,
        move_peer_candidate: Arc<AtomicU64>,
    ) -> RaftWorker {
        RaftWorker {
            label,
            inbox,
            close_rx,
            apply_tx,
            apply_result_rx,
            router,
            kv_store,
            raft_store,
            store_meta,
            msg_cnt,
            move_peer_candidate,
            next_index: 1,
            applied_indices: HashMap::new(),
        }
    }

    /// Runs passes until the close channel fires or the inbox disconnects.
    pub fn run(&mut self) {
        loop {
            crossbeam_channel::select! {
                recv(self.close_rx) -> _ => {
                    let _ = self.apply_tx.send(None);
                    debug!("{} closing", self.label);
                    return;
                }
                recv(self.inbox) -> msg => {
                    match msg {
                        Ok(first) => self.run_pass(first),
                        Err(_) => {
                            let _ = self.apply_tx.send(None);
                            return;
                        }
                    }
                }
                recv(self.apply_result_rx) -> result => {
                    if let Ok(ApplyResult { region_id, applied_index }) = result {
                        self.applied_indices.insert(region_id, applied_index);
                        debug!("{} region {} applied through index {}", self.label, region_id, applied_index);
                    }
                }
            }
        }
    }

    /// One iteration of the main loop.
    fn run_pass(&mut self, first: PeerMsg) {
        let timer = SlowTimer::new();

        // Drain a bounded snapshot of what's pending right now. Anything that
        // arrives after this snapshot waits for the next pass.
        let mut batch = Vec::with_capacity(self.inbox.len() + 1);
        batch.push(first);
        let pending = self.inbox.len();
        for _ in 0..pending {
            match self.inbox.try_recv() {
                Ok(m) => batch.push(m),
                Err(_) => break,
            }
        }

        self.msg_cnt.fetch_add(batch.len() as u64, Ordering::SeqCst);
        metrics::WORKER_MSG_DRAIN
            .with_label_values(&[&self.label])
            .inc_by(batch.len() as u64);

        let mut apply_batch = ApplyBatch::new();
        let mut kv_wb = crate::write_batch::WriteBatch::new();
        let mut raft_wb = crate::write_batch::WriteBatch::new();
        let mut has_ready = false;

        for msg in batch.drain(..) {
            if let PeerMsg::Barrier(latch) = msg {
                apply_batch.barriers.push(latch);
                continue;
            }

            let region_id = msg.region_id().expect("non-barrier messages carry a region id");
            let peer = match apply_batch.peers.get(&region_id).cloned() {
                Some(p) => p,
                None => match self.router.get(region_id) {
                    Some(p) => {
                        apply_batch.peers.insert(region_id, p.clone());
                        p
                    }
                    None => {
                        warn!("{} no peer for region {}, dropping message", self.label, region_id);
                        continue;
                    }
                },
            };
            let _ = peer; // resolved for routing parity; no local FSM to mutate here.
            self.move_peer_candidate.store(region_id, Ordering::SeqCst);

            match msg {
                PeerMsg::Tick { .. } => debug!("{} region {} tick", self.label, region_id),
                PeerMsg::Propose(p) => {
                    has_ready = true;
                    let index = self.next_index;
                    self.next_index += 1;
                    debug!(
                        "{} region {} proposal {} at index {}",
                        self.label,
                        region_id,
                        mutation_summary(&p.mutation),
                        index
                    );
                    raft_wb.set_cf(Cf::Default, &raft_log_key(region_id, index), &encode_mutation(&p.mutation));
                    apply_batch.proposals.push(ApplyProposal {
                        region_id,
                        index,
                        mutation: p.mutation,
                        callback: p.callback,
                    });
                }
                PeerMsg::Raft(_) => {
                    debug!("{} region {} peer message (raft protocol out of scope)", self.label, region_id);
                }
                PeerMsg::SnapshotStatus { to_peer_id, status, .. } => {
                    debug!(
                        "{} region {} snapshot status to peer {}: {:?}",
                        self.label, region_id, to_peer_id, status
                    );
                }
                PeerMsg::ComputeResult { hash, .. } => {
                    debug!("{} region {} compute result ({} byte hash)", self.label, region_id, hash.len());
                }
                PeerMsg::Admin(AdminMsg::CompactLog { compact_index, .. }) => {
                    has_ready = true;
                    kv_wb.set_cf(Cf::Default, &compact_log_key(region_id), &compact_index.to_be_bytes());
                }
                PeerMsg::Admin(admin) => {
                    debug!("{} region {} admin {:?}", self.label, region_id, admin);
                }
                PeerMsg::Barrier(_) => unreachable!("handled above"),
            }
        }

        if has_ready {
            // KV store first, then raft store — a crash between the two can only
            // lose or duplicate raft-log bookkeeping, never leave an unreplayable
            // apply.
            let kv_start = std::time::Instant::now();
            kv_wb.must_write_to_kv(self.kv_store.as_ref());
            metrics::KV_COMMIT_DURATION.observe(duration_to_sec(kv_start.elapsed()));

            let raft_start = std::time::Instant::now();
            raft_wb.must_write_to_raft(self.raft_store.as_ref());
            metrics::RAFT_COMMIT_DURATION.observe(duration_to_sec(raft_start.elapsed()));
        }

        metrics::APPLY_BATCH_SIZE
            .with_label_values(&[&self.label])
            .observe(apply_batch.proposals.len() as f64);

        // Snapshot generation is out of scope, so no region is ever added to the
        // queued set here; the purge still runs every pass under the shared lock,
        // the same as it would once a real snapshot generator fed it.
        let queued_snapshot_regions: HashSet<u64> = HashSet::new();
        self.store_meta.purge_queued_snapshots(&queued_snapshot_regions);

        slow_log!(timer, "{} pass took {:?}", self.label, timer.elapsed());

        // The capacity-1 send blocks until the apply worker accepts the previous
        // pass — the backpressure invariant that keeps the raft worker from
        // running ahead of the apply worker.
        let _ = self.apply_tx.send(Some(apply_batch));
    }
}
