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

//! The worker-pool balancer: periodically compares per-worker message rates and
//! migrates at most one peer per tick. Follows the same `log`/atomics idiom as the
//! rest of `store/`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::config::Config;
use crate::metrics;
use crate::router::Router;
use crate::store::raft_worker::WorkerStats;

/// Fires on a fixed interval, tracks `last_cnt[i]`, triggers at most one migration
/// per tick (anti-flap via `last_move`).
pub struct Balancer {
    workers: Vec<WorkerStats>,
    router: Arc<Router>,
    config: Config,
    last_cnt: Vec<u64>,
    last_move: Option<u64>,
}

impl Balancer {
    pub fn new(workers: Vec<WorkerStats>, router: Arc<Router>, config: Config) -> Balancer {
        let last_cnt = vec![0; workers.len()];
        Balancer {
            workers,
            router,
            config,
            last_cnt,
            last_move: None,
        }
    }

    /// One balancer tick. Returns the migrated region id, if any, for tests/logging.
    pub fn tick(&mut self) -> Option<u64> {
        if self.workers.len() < 2 {
            return None;
        }

        let deltas: Vec<u64> = self
            .workers
            .iter()
            .zip(self.last_cnt.iter())
            .map(|(w, &last)| w.msg_cnt.load(Ordering::SeqCst).saturating_sub(last))
            .collect();
        for (i, w) in self.workers.iter().enumerate() {
            self.last_cnt[i] = w.msg_cnt.load(Ordering::SeqCst);
        }

        let i_max = (0..deltas.len()).max_by_key(|&i| deltas[i]).unwrap();
        let i_min = (0..deltas.len()).min_by_key(|&i| deltas[i]).unwrap();
        if i_max == i_min {
            return None;
        }

        let candidate = self.workers[i_max].move_peer_candidate.load(Ordering::SeqCst);
        let triggers = deltas[i_max] > self.config.min_balance_factor * deltas[i_min]
            && deltas[i_max] > self.config.min_balance_msg_cnt()
            && candidate != 0
            && Some(candidate) != self.last_move;

        if !triggers {
            return None;
        }

        let peer = match self.router.get(candidate) {
            Some(p) => p,
            None => return None,
        };
        self.last_move = Some(candidate);
        info!(
            "balancer migrating region {} from worker {} to worker {} (delta {} vs {})",
            candidate, i_max, i_min, deltas[i_max], deltas[i_min]
        );
        peer.change_worker(self.workers[i_min].inbox.clone(), self.config.migration_yield.as_duration());
        metrics::MIGRATIONS_TRIGGERED.inc();
        Some(candidate)
    }

    pub fn run(&mut self, close_rx: crossbeam_channel::Receiver<()>) {
        let interval = self.config.balance_interval.as_duration();
        loop {
            crossbeam_channel::select! {
                recv(close_rx) -> _ => return,
                default(interval) => { self.tick(); }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{Handle, PeerState};
    use crossbeam_channel::unbounded;
    use std::sync::atomic::AtomicU64;

    fn worker(inbox_tx: crossbeam_channel::Sender<crate::store::msg::PeerMsg>, cnt: u64, candidate: u64) -> WorkerStats {
        WorkerStats {
            inbox: inbox_tx,
            msg_cnt: Arc::new(AtomicU64::new(cnt)),
            move_peer_candidate: Arc::new(AtomicU64::new(candidate)),
        }
    }

    #[test]
    fn no_migration_below_threshold() {
        let router = Arc::new(Router::new());
        let (tx0, _rx0) = unbounded();
        let (tx1, _rx1) = unbounded();
        let (tx2, _rx2) = unbounded();
        let workers = vec![worker(tx0, 6000, 1), worker(tx1, 2000, 2), worker(tx2, 500, 3)];
        let mut cfg = Config::new();
        cfg.min_balance_msg_cnt_per_second = 1000;
        cfg.balance_interval = crate::config::Millis::secs(10);
        let mut balancer = Balancer::new(workers, router, cfg);

        assert_eq!(balancer.tick(), None);
    }

    #[test]
    fn migration_triggers_over_threshold_and_factor() {
        let router = Arc::new(Router::new());
        let (tx_w1, _rx_w1) = unbounded();
        let (tx0, _rx0) = unbounded();
        let (tx1, _rx1) = unbounded();
        let peer = Arc::new(PeerState::new(7, Handle::bound(tx_w1)));
        router.insert(7, peer);

        let w0 = worker(tx0, 25000, 7);
        let w1 = worker(tx1, 3000, 2);
        let w0_cnt = w0.msg_cnt.clone();
        let w1_cnt = w1.msg_cnt.clone();
        let mut cfg = Config::new();
        cfg.min_balance_msg_cnt_per_second = 1000;
        cfg.balance_interval = crate::config::Millis::secs(10);
        let mut balancer = Balancer::new(vec![w0, w1], router, cfg);

        assert_eq!(balancer.tick(), Some(7));

        // Same candidate, same qualifying rates next interval: anti-flap blocks a
        // second migration in a row.
        w0_cnt.fetch_add(25000, Ordering::SeqCst);
        w1_cnt.fetch_add(3000, Ordering::SeqCst);
        assert_eq!(balancer.tick(), None);
    }
}
