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

//! Prometheus counters/histograms, in the `lazy_static! { ... }` + `register_*!`
//! style used throughout `raftstore::store::worker::metrics`/`local_metrics`.
//! Incremented at pass boundaries, commit calls, and migration triggers.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Histogram, HistogramVec, IntCounter, IntCounterVec,
};

lazy_static! {
    pub static ref WORKER_MSG_DRAIN: IntCounterVec = register_int_counter_vec!(
        "raftkv_worker_msg_drain_total",
        "Total messages drained from a raft worker's inbox in one pass, per worker",
        &["worker"]
    )
    .unwrap();

    pub static ref KV_COMMIT_DURATION: Histogram = register_histogram!(
        "raftkv_kv_commit_duration_seconds",
        "Bucketed histogram of write_to_kv commit latency",
        exponential_buckets(0.0001, 2.0, 20).unwrap()
    )
    .unwrap();

    pub static ref RAFT_COMMIT_DURATION: Histogram = register_histogram!(
        "raftkv_raft_commit_duration_seconds",
        "Bucketed histogram of write_to_raft commit latency",
        exponential_buckets(0.0001, 2.0, 20).unwrap()
    )
    .unwrap();

    pub static ref MIGRATIONS_TRIGGERED: IntCounter = register_int_counter!(
        "raftkv_balancer_migrations_triggered_total",
        "Total peer migrations triggered by the balancer"
    )
    .unwrap();

    pub static ref APPLY_BATCH_SIZE: HistogramVec = register_histogram_vec!(
        "raftkv_apply_batch_size",
        "Number of messages in an apply batch, per worker",
        &["worker"],
        exponential_buckets(1.0, 2.0, 16).unwrap()
    )
    .unwrap();
}
