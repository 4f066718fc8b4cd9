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

//! Peer state and worker handle: binds a region to a worker's inbox and supports
//! safe re-binding (migration) without reordering or losing messages. The handle
//! pointer is a single-word atomic (`ArcSwap`), the same "publish an immutable
//! record, readers never block a writer" shape `arc-swap` is used for in
//! `QuintinTao-ceresdb/analytic_engine`.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use crossbeam_channel::Sender;

use crate::errors::{Error, Result};
use crate::store::msg::PeerMsg;

/// A one-shot, multi-waiter gate: any number of threads may call `wait`, all of them
/// unblock the moment `trigger` is called (idempotently) by anyone. A migration
/// barrier needs many independent senders concurrently waiting on one counter that
/// a single release call satisfies; `crossbeam_utils::sync::WaitGroup` doesn't fit
/// that shape since its `wait(self)` consumes the caller's own clone and waits for
/// every *other* clone to drop instead.
#[derive(Clone)]
pub struct Latch {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Latch {
    pub fn new() -> Latch {
        Latch {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Blocks until `trigger` has been called at least once. Safe to call from any
    /// number of threads, before or after `trigger` fires.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut done = lock.lock().unwrap();
        while !*done {
            done = cvar.wait(done).unwrap();
        }
    }

    /// Releases every current and future waiter. Idempotent.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }
}

impl Default for Latch {
    fn default() -> Latch {
        Latch::new()
    }
}

/// An immutable worker binding. Replaced wholesale, never mutated in place — `send`
/// and `change_worker` only ever install a brand new one.
pub struct Handle {
    inbox: Option<Sender<PeerMsg>>,
    barrier: Option<Latch>,
    closed: bool,
}

impl Handle {
    /// A handle bound to a live worker inbox, no pending migration.
    pub fn bound(inbox: Sender<PeerMsg>) -> Handle {
        Handle {
            inbox: Some(inbox),
            barrier: None,
            closed: false,
        }
    }

    /// The tombstone installed by `close()` and by `Router::destroy`.
    fn closed() -> Handle {
        Handle {
            inbox: None,
            barrier: None,
            closed: true,
        }
    }
}

/// Per-region state: an id plus the atomic worker-handle pointer. The raft FSM and
/// applier this peer drives live above this core's boundary — the consensus
/// algorithm is an external black box; this module only owns the routing handle.
pub struct PeerState {
    id: u64,
    handle: ArcSwap<Handle>,
}

impl PeerState {
    pub fn new(id: u64, handle: Handle) -> PeerState {
        PeerState {
            id,
            handle: ArcSwap::from_pointee(handle),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Loads the handle, fails fast on a tombstone, waits out and helps complete
    /// any in-flight migration, then enqueues on whichever inbox is current at
    /// that point.
    pub fn send(&self, msg: PeerMsg) -> Result<()> {
        loop {
            let current = self.handle.load_full();
            if current.closed {
                return Err(Error::PeerNotFound(self.id));
            }
            if let Some(barrier) = current.barrier.clone() {
                barrier.wait();
                let settled = Arc::new(Handle {
                    inbox: current.inbox.clone(),
                    barrier: None,
                    closed: false,
                });
                // Whether or not the CAS wins, retry from the top: on success the
                // next load sees the settled handle and falls through to enqueue; on
                // failure another sender already moved the handle on and this
                // snapshot is stale either way.
                let _ = self.handle.compare_and_swap(&current, settled);
                continue;
            }
            let inbox = current
                .inbox
                .as_ref()
                .expect("a non-closed handle always carries an inbox");
            return inbox.send(msg).map_err(|_| Error::PeerNotFound(self.id));
        }
    }

    /// Re-binds this region to `new_inbox`, returning the latch that gates senders
    /// until the old worker's apply batch has drained. `yield_before_barrier` is a
    /// bounded pre-barrier yield, resolved literally rather than replaced with a
    /// sequence-number handshake (see DESIGN.md).
    pub fn change_worker(&self, new_inbox: Sender<PeerMsg>, yield_before_barrier: Duration) -> Latch {
        let barrier = Latch::new();
        let new_handle = Arc::new(Handle {
            inbox: Some(new_inbox),
            barrier: Some(barrier.clone()),
            closed: false,
        });
        let old = self.handle.swap(new_handle);

        std::thread::sleep(yield_before_barrier);

        if let Some(old_inbox) = old.inbox.as_ref() {
            // Best-effort: if the old worker already shut its inbox down, there is
            // nothing left to drain and the barrier would never have blocked anyone
            // on it anyway.
            let _ = old_inbox.send(PeerMsg::Barrier(barrier.clone()));
        } else {
            barrier.trigger();
        }
        barrier
    }

    /// Installs the tombstone. Any sender that already holds this `Arc<PeerState>`
    /// observes `PeerNotFound` on its next `send`.
    pub fn close(&self) {
        self.handle.store(Arc::new(Handle::closed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::thread;

    #[test]
    fn send_delivers_on_bound_handle() {
        let (tx, rx) = unbounded();
        let peer = PeerState::new(1, Handle::bound(tx));
        peer.send(PeerMsg::Tick { region_id: 1 }).unwrap();
        assert!(matches!(rx.recv().unwrap(), PeerMsg::Tick { region_id: 1 }));
    }

    #[test]
    fn send_after_close_is_peer_not_found() {
        let (tx, _rx) = unbounded();
        let peer = PeerState::new(1, Handle::bound(tx));
        peer.close();
        match peer.send(PeerMsg::Tick { region_id: 1 }) {
            Err(Error::PeerNotFound(id)) => assert_eq!(id, 1),
            other => panic!("expected PeerNotFound, got {:?}", other),
        }
    }

    #[test]
    fn latch_releases_waiters_that_arrive_after_trigger() {
        let latch = Latch::new();
        latch.trigger();
        latch.wait(); // must not block
    }

    #[test]
    fn latch_releases_concurrent_waiters() {
        let latch = Latch::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let l = latch.clone();
                thread::spawn(move || l.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        latch.trigger();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn migration_preserves_fifo_across_old_and_new_inbox() {
        // Region bound to W1, `change_worker(W2)` invoked mid-stream. Every message
        // sent before the swap must land on W1's inbox; the barrier message is the
        // last thing W1 ever receives.
        let (tx1, rx1) = unbounded();
        let (tx2, rx2) = unbounded();
        let peer = PeerState::new(7, Handle::bound(tx1));

        peer.send(PeerMsg::Tick { region_id: 1 }).unwrap();
        peer.send(PeerMsg::Tick { region_id: 1 }).unwrap();

        let latch = peer.change_worker(tx2, Duration::from_millis(1));
        assert_eq!(peer.id(), 7);

        assert!(matches!(rx1.recv().unwrap(), PeerMsg::Tick { region_id: 1 }));
        assert!(matches!(rx1.recv().unwrap(), PeerMsg::Tick { region_id: 1 }));
        match rx1.recv().unwrap() {
            PeerMsg::Barrier(l) => {
                // The old worker forwards the latch into its apply batch; the apply
                // worker triggers it once that batch has drained.
                l.trigger();
            }
            other => panic!("expected Barrier, got {:?}", other),
        }
        latch.wait();
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn change_worker_with_dead_old_inbox_does_not_hang() {
        let (tx1, rx1) = unbounded();
        let (tx2, _rx2) = unbounded();
        let peer = PeerState::new(1, Handle::bound(tx1));
        drop(rx1);

        let latch = peer.change_worker(tx2, Duration::from_millis(1));
        latch.wait();
    }
}
