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

//! End-to-end scenarios run against `MemEngine`, the deterministic in-memory
//! stand-in for a real transactional engine — a `Cluster`/`Simulator`-style harness
//! rather than exercising production RocksDB.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use raftkv_core::engine::{Cf, MemEngine};
use raftkv_core::peer::{Handle, PeerState};
use raftkv_core::store::msg::{Mutation, PeerMsg, Proposal};
use raftkv_core::{Config, System};

fn start_system(worker_count: usize) -> (System, Arc<MemEngine>, Arc<MemEngine>) {
    let kv = Arc::new(MemEngine::new());
    let raft = Arc::new(MemEngine::new());
    let mut config = Config::new();
    config.raft_worker_count = worker_count;
    let system = System::start(config, kv.clone(), raft.clone());
    (system, kv, raft)
}

// S1: basic propose -> apply. A client proposes Put(a, 1); after the raft pass the
// raft store holds a log entry, and after the apply pass the KV store is updated
// and the proposal callback fires with success.
#[test]
fn s1_basic_propose_to_apply() {
    let (system, kv, raft) = start_system(1);

    let peer = Arc::new(PeerState::new(1, Handle::bound(system.worker_inboxes()[0].clone())));
    system.router().insert(1, peer.clone());

    let (tx, rx) = mpsc::channel();
    peer.send(PeerMsg::Propose(Proposal {
        region_id: 1,
        mutation: Mutation::Put {
            cf: Cf::Default,
            key: b"a".to_vec(),
            value: b"1".to_vec(),
        },
        callback: Box::new(move |res| {
            let _ = tx.send(res);
        }),
    }))
    .unwrap();

    let response = rx.recv_timeout(Duration::from_secs(5)).expect("callback never fired");
    assert!(response.is_ok());
    assert_eq!(kv.get_cf(Cf::Default, b"a").unwrap(), Some(b"1".to_vec()));
    assert!(raft.commit_count() >= 1);

    system.shutdown();
}

// S6 (partial): committed-entry application is idempotent.
// Full crash/restart bootstrapping (reopening a persisted engine and replaying its
// log) is system-wiring outside this core's named hard parts; what this core owns is
// the invariant the recovery rule depends on — applying the same committed entry
// twice must not produce a different final value.
#[test]
fn s6_reapplying_a_committed_entry_is_idempotent() {
    let kv = MemEngine::new();
    let mut wb = raftkv_core::WriteBatch::new();
    wb.set_cf(Cf::Default, b"k", b"v1");
    wb.write_to_kv(&kv).unwrap();

    let mut wb2 = raftkv_core::WriteBatch::new();
    wb2.set_cf(Cf::Default, b"k", b"v1");
    wb2.write_to_kv(&kv).unwrap();

    assert_eq!(kv.get_cf(Cf::Default, b"k").unwrap(), Some(b"v1".to_vec()));
}

// After close, every worker returns within bounded time, and whatever was
// already queued still finishes.
#[test]
fn graceful_shutdown_completes_pending_work() {
    let (system, kv, _raft) = start_system(2);

    let peer = Arc::new(PeerState::new(5, Handle::bound(system.worker_inboxes()[0].clone())));
    system.router().insert(5, peer.clone());

    let (tx, rx) = mpsc::channel();
    peer.send(PeerMsg::Propose(Proposal {
        region_id: 5,
        mutation: Mutation::Put {
            cf: Cf::Default,
            key: b"shutdown-key".to_vec(),
            value: b"v".to_vec(),
        },
        callback: Box::new(move |res| {
            let _ = tx.send(res);
        }),
    }))
    .unwrap();
    rx.recv_timeout(Duration::from_secs(5)).expect("callback never fired");

    system.shutdown();
    assert_eq!(kv.get_cf(Cf::Default, b"shutdown-key").unwrap(), Some(b"v".to_vec()));
}
