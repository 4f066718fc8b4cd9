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

//! The apply worker: executes committed entries against the KV store through a
//! reusable write batch and signals migration barriers once its batch has drained.
//! Directly descended from `worker::apply::Runner`/`ApplyContext`: one write batch
//! reused across a batch of work, flushed once at the end, callbacks invoked only
//! after the flush commits.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use log::debug;

use crate::engine::KvEngine;
use crate::slow_log;
use crate::store::msg::{ApplyResult, Mutation, ProposalResponse};
use crate::store::ApplyBatch;
use crate::util::time::SlowTimer;
use crate::write_batch::WriteBatch;

/// Size/key-count hints accumulated per apply batch, mirroring the shape of
/// `worker::apply::Runner`'s own `ApplyMetrics`.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct ApplyMetrics {
    pub size_diff_hint: i64,
    pub delete_keys_hint: u64,
    pub written_bytes: u64,
    pub written_keys: u64,
}

pub struct ApplyWorker {
    label: String,
    inbox: Receiver<Option<ApplyBatch>>,
    kv_store: Arc<dyn KvEngine>,
    result_tx: Sender<ApplyResult>,
}

impl ApplyWorker {
    pub fn new(
        label: String,
        inbox: Receiver<Option<ApplyBatch>>,
        kv_store: Arc<dyn KvEngine>,
        result_tx: Sender<ApplyResult>,
    ) -> ApplyWorker {
        ApplyWorker { label, inbox, kv_store, result_tx }
    }

    /// Runs until it receives the poison `None` batch or the channel disconnects.
    pub fn run(&mut self) {
        loop {
            match self.inbox.recv() {
                Ok(Some(batch)) => self.handle_batch(batch),
                Ok(None) => {
                    debug!("{} received shutdown poison, exiting", self.label);
                    return;
                }
                Err(_) => return,
            }
        }
    }

    fn handle_batch(&mut self, batch: ApplyBatch) {
        if batch.is_empty() {
            return;
        }
        let timer = SlowTimer::new();
        let mut wb = WriteBatch::new();
        let mut metrics = ApplyMetrics::default();
        let proposal_count = batch.proposals.len();

        let mut callbacks = Vec::with_capacity(proposal_count);
        let mut applied_indices: HashMap<u64, u64> = HashMap::new();
        for proposal in batch.proposals {
            applied_indices
                .entry(proposal.region_id)
                .and_modify(|i| *i = (*i).max(proposal.index))
                .or_insert(proposal.index);
            match &proposal.mutation {
                Mutation::Put { cf, key, value } => {
                    wb.set_cf(*cf, key, value);
                    metrics.written_bytes += (key.len() + value.len()) as u64;
                    metrics.written_keys += 1;
                    metrics.size_diff_hint += (key.len() + value.len()) as i64;
                }
                Mutation::Delete { cf, key } => {
                    wb.delete_cf(*cf, key);
                    metrics.delete_keys_hint += 1;
                    metrics.size_diff_hint -= key.len() as i64;
                }
            }
            callbacks.push(proposal.callback);
        }

        // Atomic flush, fatal on failure — a torn apply would leave the region's
        // state machine permanently inconsistent.
        wb.must_write_to_kv(self.kv_store.as_ref());

        for callback in callbacks {
            callback(Ok(ProposalResponse { value: Vec::new() }));
        }

        for (region_id, applied_index) in applied_indices {
            let _ = self.result_tx.send(ApplyResult { region_id, applied_index });
        }

        // Only after this batch (which any migrating region's messages were
        // folded into) has fully committed do blocked senders cut over to the new
        // worker.
        for barrier in batch.barriers {
            barrier.trigger();
        }

        slow_log!(
            timer,
            "{} applied {} proposals, metrics {:?}",
            self.label,
            proposal_count,
            metrics
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Cf, MemEngine};
    use crate::peer::Latch;
    use crate::store::msg::ApplyProposal;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn applies_put_and_invokes_callback() {
        let engine = Arc::new(MemEngine::new());
        let (tx, rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let mut worker = ApplyWorker::new("apply-0".to_owned(), rx, engine.clone(), result_tx);

        let invoked = Arc::new(AtomicBool::new(false));
        let invoked2 = invoked.clone();
        let mut batch = ApplyBatch::new();
        batch.proposals.push(ApplyProposal {
            region_id: 1,
            index: 1,
            mutation: Mutation::Put {
                cf: Cf::Default,
                key: b"a".to_vec(),
                value: b"1".to_vec(),
            },
            callback: Box::new(move |res| {
                assert!(res.is_ok());
                invoked2.store(true, Ordering::SeqCst);
            }),
        });
        tx.send(Some(batch)).unwrap();
        tx.send(None).unwrap();

        worker.run();

        assert!(invoked.load(Ordering::SeqCst));
        assert_eq!(engine.get_cf(Cf::Default, b"a").unwrap(), Some(b"1".to_vec()));
        let result = result_rx.recv().unwrap();
        assert_eq!(result.region_id, 1);
        assert_eq!(result.applied_index, 1);
    }

    #[test]
    fn triggers_barrier_after_batch_commits() {
        let engine = Arc::new(MemEngine::new());
        let (tx, rx) = unbounded();
        let (result_tx, _result_rx) = unbounded();
        let mut worker = ApplyWorker::new("apply-0".to_owned(), rx, engine, result_tx);

        let latch = Latch::new();
        let mut batch = ApplyBatch::new();
        batch.barriers.push(latch.clone());
        tx.send(Some(batch)).unwrap();
        tx.send(None).unwrap();

        worker.run();

        latch.wait(); // must not block: already triggered
    }
}
