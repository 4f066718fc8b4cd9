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

//! The message taxonomy: the closed set of types a raft worker's inbox carries,
//! plus the node-scoped `StoreMsg` the store worker drains. The consensus algorithm
//! itself is an out-of-scope black box, so `RaftMessage`/`Proposal` below carry
//! opaque payloads rather than a concrete wire format — this core only needs to
//! route them, not interpret them.

use std::fmt;

use crate::engine::Cf;
use crate::errors::ProposalError;
use crate::peer::Latch;

/// Delivered once a proposal's fate (committed-and-applied, or rejected) is known.
#[derive(Debug, Clone)]
pub struct ProposalResponse {
    pub value: Vec<u8>,
}

/// Invoked exactly once per proposal, from the apply worker (success) or from
/// whichever stage detects a terminal rejection (failure). A stable `FnOnce` trait
/// object, in place of the pre-1.0 nightly `Box<FnBox(..) + Send>` this is modeled
/// on.
pub type Callback = Box<dyn FnOnce(Result<ProposalResponse, ProposalError>) + Send>;

/// The decided effect of one committed entry, once past the raft black box. This is
/// what `handle_raft_committed_entries`-equivalent code in the apply worker executes
/// through a `WriteBatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put { cf: Cf, key: Vec<u8>, value: Vec<u8> },
    Delete { cf: Cf, key: Vec<u8> },
}

/// A client-submitted mutation awaiting consensus.
pub struct Proposal {
    pub region_id: u64,
    pub mutation: Mutation,
    pub callback: Callback,
}

impl fmt::Debug for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proposal")
            .field("region_id", &self.region_id)
            .field("mutation", &self.mutation)
            .finish()
    }
}

/// A message from a peer replica on another node, opaque to this core beyond its
/// region routing — the raft protocol that interprets `data` is an out-of-scope
/// black box.
#[derive(Debug, Clone)]
pub struct RaftMessage {
    pub region_id: u64,
    pub data: Vec<u8>,
}

/// Outcome of a snapshot send to a peer, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    Finished,
    Failed,
}

/// Administrative commands: region split, raft-log compaction, heartbeat.
#[derive(Debug, Clone)]
pub enum AdminMsg {
    SplitRegion { region_id: u64 },
    CompactLog { region_id: u64, compact_index: u64 },
    RegionHeartbeat { region_id: u64 },
}

/// A proposal forwarded from the raft worker to the apply worker, tagged with its
/// region.
pub struct ApplyProposal {
    pub region_id: u64,
    pub index: u64,
    pub mutation: Mutation,
    pub callback: Callback,
}

impl fmt::Debug for ApplyProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyProposal")
            .field("region_id", &self.region_id)
            .field("index", &self.index)
            .finish()
    }
}

/// Reported from the apply worker back to the raft worker once a batch entry has
/// been applied, carrying the new applied index for that region.
#[derive(Debug, Clone, Copy)]
pub struct ApplyResult {
    pub region_id: u64,
    pub applied_index: u64,
}

/// Everything that can land in a region's inbox. The set is closed; a new kind of
/// message is a deliberate addition, not a variant left to guess at.
pub enum PeerMsg {
    /// A region's own inbox is shared by a worker with many other regions' inboxes,
    /// so even a tick needs to say which region it is for.
    Tick { region_id: u64 },
    Propose(Proposal),
    Raft(RaftMessage),
    SnapshotStatus { region_id: u64, to_peer_id: u64, status: SnapshotStatus },
    ComputeResult { region_id: u64, hash: Vec<u8> },
    Admin(AdminMsg),
    /// Migration barrier: carries the waitgroup the old worker must forward into
    /// its apply batch before any sender may cut over to the new inbox.
    Barrier(Latch),
}

impl PeerMsg {
    /// The region this message routes to, or `None` for a barrier, which targets
    /// the worker itself rather than any one peer.
    pub fn region_id(&self) -> Option<u64> {
        match self {
            PeerMsg::Tick { region_id } => Some(*region_id),
            PeerMsg::Propose(p) => Some(p.region_id),
            PeerMsg::Raft(m) => Some(m.region_id),
            PeerMsg::SnapshotStatus { region_id, .. } => Some(*region_id),
            PeerMsg::ComputeResult { region_id, .. } => Some(*region_id),
            PeerMsg::Admin(AdminMsg::SplitRegion { region_id })
            | PeerMsg::Admin(AdminMsg::CompactLog { region_id, .. })
            | PeerMsg::Admin(AdminMsg::RegionHeartbeat { region_id }) => Some(*region_id),
            PeerMsg::Barrier(_) => None,
        }
    }
}

impl fmt::Debug for PeerMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerMsg::Tick { region_id } => write!(f, "PeerMsg::Tick({})", region_id),
            PeerMsg::Propose(p) => write!(f, "PeerMsg::Propose({:?})", p),
            PeerMsg::Raft(m) => write!(f, "PeerMsg::Raft({:?})", m),
            PeerMsg::SnapshotStatus { region_id, to_peer_id, status } => f
                .debug_struct("PeerMsg::SnapshotStatus")
                .field("region_id", region_id)
                .field("to_peer_id", to_peer_id)
                .field("status", status)
                .finish(),
            PeerMsg::ComputeResult { region_id, hash } => f
                .debug_struct("PeerMsg::ComputeResult")
                .field("region_id", region_id)
                .field("hash_len", &hash.len())
                .finish(),
            PeerMsg::Admin(a) => write!(f, "PeerMsg::Admin({:?})", a),
            PeerMsg::Barrier(_) => write!(f, "PeerMsg::Barrier(..)"),
        }
    }
}

/// Node-scoped (non-region) messages handled by the store worker.
#[derive(Debug, Clone, Copy)]
pub enum StoreMsg {
    Tick,
    StoreHeartbeat,
}
