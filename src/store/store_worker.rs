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

//! The store worker: a single-threaded loop for node-scoped messages that don't
//! belong to any one region. Grounded on `raftstore::store::store.rs`'s top-level
//! `Store` event loop, stripped to the node-scoped subset (the region-sharded
//! majority of that loop is `raft_worker.rs` in this core).

use crossbeam_channel::Receiver;
use log::{debug, info};

use crate::store::msg::StoreMsg;

pub struct StoreWorker {
    inbox: Receiver<StoreMsg>,
    close_rx: Receiver<()>,
}

impl StoreWorker {
    pub fn new(inbox: Receiver<StoreMsg>, close_rx: Receiver<()>) -> StoreWorker {
        StoreWorker { inbox, close_rx }
    }

    pub fn run(&mut self) {
        loop {
            crossbeam_channel::select! {
                recv(self.close_rx) -> _ => {
                    info!("store worker closing");
                    return;
                }
                recv(self.inbox) -> msg => {
                    match msg {
                        Ok(StoreMsg::Tick) => debug!("store tick"),
                        Ok(StoreMsg::StoreHeartbeat) => debug!("store heartbeat"),
                        Err(_) => return,
                    }
                }
            }
        }
    }
}
