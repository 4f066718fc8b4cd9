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

//! Error taxonomy for the raft execution core.
//!
//! `Error` covers everything a caller might reasonably want to handle. Conditions
//! that indicate a corrupted persistence pipeline or a programmer mistake are not
//! represented here: they go through `fatal!` instead, which logs and aborts the
//! process directly (see the `fatal` macro below), following the
//! `must_write_*` convention of never returning from such a failure.

use std::result;

use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// The region has no live peer on this node (handle is a tombstone).
        PeerNotFound(region_id: u64) {
            display("peer not found for region {}", region_id)
        }
        /// A proposal failed for a reason the client can retry or act on.
        Proposal(err: ProposalError) {
            display("proposal rejected: {:?}", err)
        }
        /// The underlying engine reported a retryable or fatal failure.
        Engine(reason: String) {
            display("engine error: {}", reason)
        }
        /// A caller passed a value the contract forbids (e.g. empty delete_range end).
        InvalidArgument(reason: String) {
            display("invalid argument: {}", reason)
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Reasons a single proposal can be rejected without harming node consistency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    NotLeader { region_id: u64 },
    StaleEpoch { region_id: u64 },
    KeyNotInRegion { region_id: u64 },
    RegionRemoved { region_id: u64 },
    StaleCommand,
}

/// Log at error level and abort the process. The only sink for persistence-pipeline
/// failures and other conditions where continuing would leave the node in an unknown
/// state: any inconsistency in the persistence pipeline is treated as fatal rather
/// than recoverable.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        panic!($($arg)*);
    }};
}
