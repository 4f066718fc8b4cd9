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

//! System assembly: wires N raft workers (each with its own paired apply worker),
//! one store worker, one balancer, and the shared router/config into a running
//! node-local system, and owns shutdown (spawn threads, hold `JoinHandle`s,
//! broadcast shutdown by closing a channel).

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use log::info;

use crate::config::Config;
use crate::engine::{KvEngine, RaftEngine};
use crate::router::Router;
use crate::store::apply_worker::ApplyWorker;
use crate::store::balancer::Balancer;
use crate::store::msg::{PeerMsg, StoreMsg};
use crate::store::raft_worker::{RaftWorker, WorkerStats};
use crate::store::store_worker::StoreWorker;
use crate::store::StoreMeta;

/// A running node-local system. Dropping the last clone of the internal close
/// sender (done in `shutdown`) broadcasts close to every worker at once, since
/// `crossbeam_channel::Receiver::recv` returns an error for every clone once all
/// senders disconnect.
pub struct System {
    router: Arc<Router>,
    worker_inboxes: Vec<Sender<PeerMsg>>,
    store_inbox: Sender<StoreMsg>,
    close_tx: Option<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl System {
    /// Spawns `config.raft_worker_count` raft workers (each with its own apply
    /// worker) plus one store worker and one balancer, all sharing `router`.
    pub fn start(
        config: Config,
        kv_store: Arc<dyn KvEngine>,
        raft_store: Arc<dyn RaftEngine>,
    ) -> System {
        config.validate().unwrap_or_else(|e| panic!("invalid config: {:?}", e));

        let router = Arc::new(Router::new());
        let store_meta = Arc::new(StoreMeta::new());
        let (close_tx, close_rx) = unbounded::<()>();

        let mut worker_inboxes = Vec::with_capacity(config.raft_worker_count);
        let mut worker_stats = Vec::with_capacity(config.raft_worker_count);
        let mut handles = Vec::new();

        for i in 0..config.raft_worker_count {
            let label = format!("raft-{}", i);
            let (raft_tx, raft_rx) = bounded::<PeerMsg>(config.notify_capacity);
            let (apply_tx, apply_rx) = bounded(1);
            let (apply_result_tx, apply_result_rx) = unbounded();

            let msg_cnt = Arc::new(AtomicU64::new(0));
            let move_peer_candidate = Arc::new(AtomicU64::new(0));
            worker_stats.push(WorkerStats {
                inbox: raft_tx.clone(),
                msg_cnt: msg_cnt.clone(),
                move_peer_candidate: move_peer_candidate.clone(),
            });
            worker_inboxes.push(raft_tx);

            let apply_label = format!("apply-{}", i);
            let apply_kv_store = kv_store.clone();
            let apply_handle = thread::Builder::new()
                .name(apply_label.clone())
                .spawn(move || {
                    ApplyWorker::new(apply_label, apply_rx, apply_kv_store, apply_result_tx).run();
                })
                .expect("failed to spawn apply worker");
            handles.push(apply_handle);

            let raft_close_rx = close_rx.clone();
            let raft_router = router.clone();
            let raft_kv_store = kv_store.clone();
            let raft_raft_store = raft_store.clone();
            let raft_store_meta = store_meta.clone();
            let raft_handle = thread::Builder::new()
                .name(label.clone())
                .spawn(move || {
                    RaftWorker::new(
                        label,
                        raft_rx,
                        raft_close_rx,
                        apply_tx,
                        apply_result_rx,
                        raft_router,
                        raft_kv_store,
                        raft_raft_store,
                        raft_store_meta,
                        msg_cnt,
                        move_peer_candidate,
                    )
                    .run();
                })
                .expect("failed to spawn raft worker");
            handles.push(raft_handle);
        }

        let (store_tx, store_rx) = unbounded::<StoreMsg>();
        let store_close_rx = close_rx.clone();
        let store_handle = thread::Builder::new()
            .name("store".to_owned())
            .spawn(move || {
                StoreWorker::new(store_rx, store_close_rx).run();
            })
            .expect("failed to spawn store worker");
        handles.push(store_handle);

        let balancer_router = router.clone();
        let balancer_close_rx = close_rx;
        let balancer_handle = thread::Builder::new()
            .name("balancer".to_owned())
            .spawn(move || {
                Balancer::new(worker_stats, balancer_router, config).run(balancer_close_rx);
            })
            .expect("failed to spawn balancer");
        handles.push(balancer_handle);

        info!("system started");

        System {
            router,
            worker_inboxes,
            store_inbox: store_tx,
            close_tx: Some(close_tx),
            handles,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The raft worker inboxes, in pool order — what a caller binding a freshly
    /// created region's `PeerState` picks from (round-robin, least-loaded, etc. is
    /// a policy choice left to the caller; the balancer takes over from there).
    pub fn worker_inboxes(&self) -> &[Sender<PeerMsg>] {
        &self.worker_inboxes
    }

    /// The node-scoped store worker's inbox, for ticks/heartbeats that aren't
    /// region-sharded.
    pub fn store_inbox(&self) -> &Sender<StoreMsg> {
        &self.store_inbox
    }

    /// Broadcasts close and blocks until every worker thread has returned within
    /// bounded time.
    pub fn shutdown(mut self) {
        drop(self.close_tx.take());
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        info!("system shut down");
    }
}
