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

//! Typed, serde-backed tunables, following `raftstore::store::config::Config`'s
//! `#[serde(default, rename_all = "kebab-case")]` shape. `ReadableDuration`/
//! `ReadableSize`-style newtypes (`Millis`/`Bytes` here) carry the same
//! serde-friendly-string shape (`"10s"`, `"64MB"`) in miniature.

use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// A duration expressed in config files as e.g. `"10s"`, `"500ms"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Millis(pub u64);

impl Millis {
    pub fn millis(n: u64) -> Millis {
        Millis(n)
    }

    pub fn secs(n: u64) -> Millis {
        Millis(n * 1000)
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl std::convert::TryFrom<String> for Millis {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Millis, String> {
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Millis)
                .map_err(|e| format!("invalid duration {:?}: {}", s, e))
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Millis::secs)
                .map_err(|e| format!("invalid duration {:?}: {}", s, e))
        } else {
            Err(format!("duration {:?} must end in 's' or 'ms'", s))
        }
    }
}

impl From<Millis> for String {
    fn from(d: Millis) -> String {
        format!("{}ms", d.0)
    }
}

/// A byte size expressed in config files as e.g. `"64MB"`, `"512KB"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bytes(pub u64);

impl Bytes {
    pub fn kb(n: u64) -> Bytes {
        Bytes(n * 1024)
    }

    pub fn mb(n: u64) -> Bytes {
        Bytes(n * 1024 * 1024)
    }
}

impl std::convert::TryFrom<String> for Bytes {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Bytes, String> {
        if let Some(kb) = s.strip_suffix("KB") {
            kb.parse::<u64>()
                .map(Bytes::kb)
                .map_err(|e| format!("invalid size {:?}: {}", s, e))
        } else if let Some(mb) = s.strip_suffix("MB") {
            mb.parse::<u64>()
                .map(Bytes::mb)
                .map_err(|e| format!("invalid size {:?}: {}", s, e))
        } else if let Some(b) = s.strip_suffix('B') {
            b.parse::<u64>()
                .map(Bytes)
                .map_err(|e| format!("invalid size {:?}: {}", s, e))
        } else {
            Err(format!("size {:?} must end in B, KB or MB", s))
        }
    }
}

impl From<Bytes> for String {
    fn from(b: Bytes) -> String {
        format!("{}B", b.0)
    }
}

/// The node-local tunables for the worker pool and balancer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Number of raft workers in the pool; each spawns its own paired apply worker.
    pub raft_worker_count: usize,
    /// Bounded capacity of each raft worker's inbox.
    pub notify_capacity: usize,
    /// How often the balancer evaluates per-worker message rates.
    pub balance_interval: Millis,
    /// Migration triggers when `delta[i_max] > min_balance_factor * delta[i_min]`.
    pub min_balance_factor: u64,
    /// `minBalanceMsgCntPerSecond`, scaled by `balance_interval` to get the
    /// per-tick threshold.
    pub min_balance_msg_cnt_per_second: u64,
    /// The bounded pre-barrier yield during migration.
    pub migration_yield: Millis,
    /// Write batches are flushed once they reach either threshold.
    pub write_batch_size_threshold: Bytes,
    pub write_batch_keys_threshold: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            raft_worker_count: 4,
            notify_capacity: 4096,
            balance_interval: Millis::secs(10),
            min_balance_factor: 2,
            min_balance_msg_cnt_per_second: 1000,
            migration_yield: Millis::millis(1),
            write_batch_size_threshold: Bytes::mb(1),
            write_batch_keys_threshold: 128,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// `minBalanceMsgCnt = minBalanceMsgCntPerSecond * balanceInterval_seconds`.
    pub fn min_balance_msg_cnt(&self) -> u64 {
        let secs = self.balance_interval.0 / 1000;
        self.min_balance_msg_cnt_per_second * secs.max(1)
    }

    /// Rejects a zero worker count or a balance factor that could never trigger a
    /// migration.
    pub fn validate(&self) -> Result<()> {
        if self.raft_worker_count == 0 {
            return Err(Error::InvalidArgument("raft_worker_count must be > 0".to_owned()));
        }
        if self.min_balance_factor <= 1 {
            return Err(Error::InvalidArgument(
                "min_balance_factor must be > 1".to_owned(),
            ));
        }
        if self.notify_capacity == 0 {
            return Err(Error::InvalidArgument("notify_capacity must be > 0".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::new().validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let mut cfg = Config::new();
        cfg.raft_worker_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_balance_factor_of_one() {
        let mut cfg = Config::new();
        cfg.min_balance_factor = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn min_balance_msg_cnt_scales_with_interval() {
        let mut cfg = Config::new();
        cfg.balance_interval = Millis::secs(10);
        cfg.min_balance_msg_cnt_per_second = 1000;
        assert_eq!(cfg.min_balance_msg_cnt(), 10_000);
    }

    #[test]
    fn millis_round_trips_through_string() {
        use std::convert::TryFrom;
        let d = Millis::try_from("250ms".to_owned()).unwrap();
        assert_eq!(d.0, 250);
        let s: String = Millis::secs(3).into();
        assert_eq!(s, "3000ms");
    }

    #[test]
    fn bytes_round_trips_through_string() {
        use std::convert::TryFrom;
        let b = Bytes::try_from("64MB".to_owned()).unwrap();
        assert_eq!(b.0, 64 * 1024 * 1024);
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = Config::new();
        let s = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(cfg, back);
    }
}
