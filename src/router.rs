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

//! The region router: a concurrent `region_id -> PeerState` map. Reads are frequent
//! and concurrent, writes (`insert`/`remove`) rare — a `std::sync::RwLock` fits that
//! shape directly.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::peer::PeerState;

#[derive(Default)]
pub struct Router {
    peers: RwLock<HashMap<u64, Arc<PeerState>>>,
}

impl Router {
    pub fn new() -> Router {
        Router::default()
    }

    pub fn get(&self, region_id: u64) -> Option<Arc<PeerState>> {
        self.peers.read().unwrap().get(&region_id).cloned()
    }

    pub fn insert(&self, region_id: u64, peer: Arc<PeerState>) {
        self.peers.write().unwrap().insert(region_id, peer);
    }

    /// Removes the region's mapping. The caller is responsible for closing the
    /// peer's handle first, so in-flight senders observe closed rather than
    /// dereferencing freed state — `destroy` below does both in the right order.
    pub fn remove(&self, region_id: u64) -> Option<Arc<PeerState>> {
        self.peers.write().unwrap().remove(&region_id)
    }

    /// Closes the peer's handle, then drops the router's mapping. Any sender that
    /// already holds the `Arc<PeerState>` will observe `closed` on its next `send`.
    pub fn destroy(&self, region_id: u64) {
        if let Some(peer) = self.peers.write().unwrap().remove(&region_id) {
            peer.close();
        }
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::Handle;
    use crossbeam_channel::unbounded;

    #[test]
    fn get_on_unknown_region_is_none() {
        let router = Router::new();
        assert!(router.get(1).is_none());
    }

    #[test]
    fn insert_then_get_round_trips() {
        let router = Router::new();
        let (tx, _rx) = unbounded();
        let peer = Arc::new(PeerState::new(1, Handle::bound(tx)));
        router.insert(1, peer.clone());
        assert!(Arc::ptr_eq(&router.get(1).unwrap(), &peer));
    }

    #[test]
    fn destroy_closes_handle_and_drops_mapping() {
        let router = Router::new();
        let (tx, _rx) = unbounded();
        let peer = Arc::new(PeerState::new(1, Handle::bound(tx)));
        router.insert(1, peer.clone());

        router.destroy(1);

        assert!(router.get(1).is_none());
        assert!(peer.send(crate::store::msg::PeerMsg::Tick { region_id: 1 }).is_err());
    }
}
