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

//! A raft execution core for a region-sharded, worker-pooled KV storage node: a
//! batched cross-CF write abstraction, per-region worker binding with safe
//! re-binding, the raft/apply worker pair, and the balancer that keeps the pool
//! even. The consensus protocol and the physical storage engine are external
//! collaborators this crate only depends on through traits (`engine::KvEngine`,
//! `engine::RaftEngine`).

#![allow(clippy::module_inception)]

#[macro_use]
pub mod util;
pub mod config;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod peer;
pub mod router;
pub mod store;
pub mod system;
pub mod write_batch;

pub use config::Config;
pub use engine::{Cf, KvEngine, MemEngine, RaftEngine};
pub use errors::{Error, ProposalError, Result};
pub use peer::PeerState;
pub use router::Router;
pub use system::System;
pub use write_batch::WriteBatch;
