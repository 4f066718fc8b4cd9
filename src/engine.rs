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

//! The engine boundary: a trait standing in for the real transactional,
//! ordered-KV store. The store itself is an out-of-scope external collaborator — this
//! module only states the contract this core relies on (atomic multi-key commit, point
//! get, CF-scoped prefix scan) plus the CF key codec, and a deterministic
//! in-memory implementation (`MemEngine`) used by the test suite in place of a real
//! transactional backend, the way integration tests elsewhere stand up a
//! `Cluster`/`Simulator` instead of exercising production RocksDB.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::errors::{Error, Result};
use crate::fatal;
use crate::write_batch::{KvOp, WriteBatch};

/// The fixed set of column families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cf {
    Default,
    Write,
    Lock,
}

pub const ALL_CFS: [Cf; 3] = [Cf::Default, Cf::Write, Cf::Lock];

impl Cf {
    pub fn name(self) -> &'static str {
        match self {
            Cf::Default => "default",
            Cf::Write => "write",
            Cf::Lock => "lock",
        }
    }
}

/// `cf_name || "_" || key`.
pub fn key_with_cf(cf: Cf, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(cf.name().len() + 1 + key.len());
    out.extend_from_slice(cf.name().as_bytes());
    out.push(b'_');
    out.extend_from_slice(key);
    out
}

/// The transactional, CF-scoped KV store this core applies committed entries to.
pub trait KvEngine: Send + Sync {
    /// Atomically applies `ops` in order. All-or-nothing.
    fn commit(&self, ops: &[KvOp]) -> Result<()>;

    /// Point lookup in a read view. `None` means not-found, distinct from an empty value.
    fn get_cf(&self, cf: Cf, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Keys in `[start, end)` for one CF, in ascending byte order. Used by
    /// `delete_range`; a real engine would expose this through a scanning iterator
    /// (`seek`/`valid`/`next`), collapsed here to a `Vec` since the in-memory
    /// implementation has no need for lazy iteration.
    fn keys_in_range(&self, cf: Cf, start: &[u8], end: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// The append-only log store this core writes raft hard state and entries to. Kept
/// as a separate trait from `KvEngine` because the two stores are independent and
/// committed in a fixed order.
pub trait RaftEngine: Send + Sync {
    fn commit(&self, ops: &[KvOp]) -> Result<()>;
    fn get_cf(&self, cf: Cf, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// `delete_range`: for every CF, deletes every key in `[start, end)`. `end` must
/// be non-empty — an empty end is a programmer error and halts the process.
pub fn delete_range(store: &dyn KvEngine, start: &[u8], end: &[u8]) -> Result<()> {
    if end.is_empty() {
        fatal!("delete_range called with empty end key");
    }
    let mut wb = WriteBatch::new();
    for &cf in ALL_CFS.iter() {
        for key in store.keys_in_range(cf, start, end)? {
            wb.delete_cf(cf, &key);
        }
    }
    wb.write_to_kv(store)
}

/// A single in-process key-value store backing both `KvEngine` and `RaftEngine` in
/// tests. Keyed by the prefixed physical key so CF isolation is exercised the same way
/// a real engine would enforce it.
pub struct MemEngine {
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_next: AtomicBool,
    commits: std::sync::atomic::AtomicUsize,
}

impl MemEngine {
    pub fn new() -> MemEngine {
        MemEngine {
            data: Mutex::new(BTreeMap::new()),
            fail_next: AtomicBool::new(false),
            commits: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Makes the next `commit` return an error without mutating any state, simulating
    /// a mid-commit fault for testable property 1.
    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Test helper: seed a value directly, bypassing the write batch path.
    pub fn put_for_test(&self, cf: Cf, key: &[u8], value: &[u8]) {
        self.data
            .lock()
            .unwrap()
            .insert(key_with_cf(cf, key), value.to_vec());
    }

    fn do_commit(&self, ops: &[KvOp]) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Engine("simulated mid-commit fault".to_owned()));
        }
        let mut data = self.data.lock().unwrap();
        for op in ops {
            match op {
                KvOp::Set(cf, key, value) => {
                    data.insert(key_with_cf(*cf, key), value.clone());
                }
                KvOp::Delete(cf, key) => {
                    data.remove(&key_with_cf(*cf, key));
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn do_get_cf(&self, cf: Cf, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(&key_with_cf(cf, key)).cloned())
    }
}

impl Default for MemEngine {
    fn default() -> MemEngine {
        MemEngine::new()
    }
}

impl KvEngine for MemEngine {
    fn commit(&self, ops: &[KvOp]) -> Result<()> {
        self.do_commit(ops)
    }

    fn get_cf(&self, cf: Cf, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.do_get_cf(cf, key)
    }

    fn keys_in_range(&self, cf: Cf, start: &[u8], end: &[u8]) -> Result<Vec<Vec<u8>>> {
        let prefix = cf.name().as_bytes();
        let lo = key_with_cf(cf, start);
        let data = self.data.lock().unwrap();
        let mut out = Vec::new();
        for key in data.keys() {
            if !key.starts_with(prefix) || key.len() <= prefix.len() + 1 {
                continue;
            }
            if key.as_slice() < lo.as_slice() {
                continue;
            }
            let logical = &key[prefix.len() + 1..];
            if logical >= end {
                continue;
            }
            out.push(logical.to_vec());
        }
        Ok(out)
    }
}

impl RaftEngine for MemEngine {
    fn commit(&self, ops: &[KvOp]) -> Result<()> {
        self.do_commit(ops)
    }

    fn get_cf(&self, cf: Cf, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.do_get_cf(cf, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_with_cf_matches_convention() {
        assert_eq!(key_with_cf(Cf::Default, b"a"), b"default_a".to_vec());
        assert_eq!(key_with_cf(Cf::Lock, b"k"), b"lock_k".to_vec());
    }

    #[test]
    fn range_delete_bounds() {
        let engine = MemEngine::new();
        engine.put_for_test(Cf::Default, b"a", b"1");
        engine.put_for_test(Cf::Default, b"b", b"2");
        engine.put_for_test(Cf::Default, b"c", b"3");
        engine.put_for_test(Cf::Write, b"a", b"x");

        delete_range(&engine, b"a", b"c").unwrap();

        assert_eq!(engine.get_cf(Cf::Default, b"a").unwrap(), None);
        assert_eq!(engine.get_cf(Cf::Default, b"b").unwrap(), None);
        assert_eq!(engine.get_cf(Cf::Default, b"c").unwrap(), Some(b"3".to_vec()));
        assert_eq!(engine.get_cf(Cf::Write, b"a").unwrap(), None);
    }

    #[test]
    #[should_panic(expected = "empty end")]
    fn range_delete_rejects_empty_end() {
        let engine = MemEngine::new();
        delete_range(&engine, b"a", b"").unwrap();
    }
}
