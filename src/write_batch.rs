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

//! A batched, cross-CF write abstraction with a single checkpoint/rollback facility.
//!
//! Grounded on two teacher shapes: `storage::mvcc::txn::MvccTxn`'s `Vec<Modify>` plus
//! running `write_size`, and `raftstore::store::worker::apply::ApplyContext`'s
//! `WriteBatch` with `set_save_point`/`rollback_to_save_point`. This module owns neither
//! RocksDB nor any concrete engine; `write_to_kv`/`write_to_raft` delegate to the
//! `KvEngine`/`RaftEngine` traits in `engine.rs`.

use crate::engine::{Cf, KvEngine, RaftEngine};
use crate::errors::Result;
use crate::fatal;

/// One pending mutation. A delete is `value.is_empty() && user_meta.is_empty()`; any
/// other combination encodes a set.
#[derive(Debug, Clone)]
pub struct Entry {
    pub cf: Cf,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub user_meta: Vec<u8>,
}

impl Entry {
    fn kv_bytes(&self) -> usize {
        self.key.len() + self.value.len()
    }

    /// KV-store semantics: delete iff both value and user_meta are empty.
    fn is_kv_delete(&self) -> bool {
        self.value.is_empty() && self.user_meta.is_empty()
    }

    /// Raft-log semantics: user_meta is ignored; delete iff value is empty.
    fn is_raft_delete(&self) -> bool {
        self.value.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Safepoint {
    entry_count: usize,
    size: usize,
}

/// An ordered sequence of entries plus a running byte size, with at most one
/// outstanding safepoint.
#[derive(Debug, Default)]
pub struct WriteBatch {
    entries: Vec<Entry>,
    size: usize,
    safepoint: Option<Safepoint>,
}

impl WriteBatch {
    pub fn new() -> WriteBatch {
        WriteBatch::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.set_cf(Cf::Default, key, value);
    }

    pub fn set_cf(&mut self, cf: Cf, key: &[u8], value: &[u8]) {
        let entry = Entry {
            cf,
            key: key.to_vec(),
            value: value.to_vec(),
            user_meta: Vec::new(),
        };
        self.size += entry.kv_bytes();
        self.entries.push(entry);
    }

    /// Set with an explicit, possibly non-empty, user_meta. This is the only way to
    /// produce the "set under KV semantics, delete under raft semantics" entry from
    /// testable property 4: empty value, non-empty user_meta.
    pub fn set_cf_with_meta(&mut self, cf: Cf, key: &[u8], value: &[u8], user_meta: &[u8]) {
        let entry = Entry {
            cf,
            key: key.to_vec(),
            value: value.to_vec(),
            user_meta: user_meta.to_vec(),
        };
        self.size += entry.kv_bytes();
        self.entries.push(entry);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.delete_cf(Cf::Default, key);
    }

    pub fn delete_cf(&mut self, cf: Cf, key: &[u8]) {
        let entry = Entry {
            cf,
            key: key.to_vec(),
            value: Vec::new(),
            user_meta: Vec::new(),
        };
        self.size += entry.key.len();
        self.entries.push(entry);
    }

    pub fn set_safepoint(&mut self) {
        self.safepoint = Some(Safepoint {
            entry_count: self.entries.len(),
            size: self.size,
        });
    }

    /// Truncates back to the recorded safepoint. No-op if none was set.
    pub fn rollback_to_safepoint(&mut self) {
        if let Some(sp) = self.safepoint.take() {
            self.entries.truncate(sp.entry_count);
            self.size = sp.size;
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.size = 0;
        self.safepoint = None;
    }

    /// Atomically commits with KV semantics. Empty batches are a no-op.
    pub fn write_to_kv(&mut self, store: &dyn KvEngine) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let ops: Vec<KvOp> = self
            .entries
            .iter()
            .map(|e| {
                if e.is_kv_delete() {
                    KvOp::Delete(e.cf, e.key.clone())
                } else {
                    KvOp::Set(e.cf, e.key.clone(), e.value.clone())
                }
            })
            .collect();
        store.commit(&ops)?;
        self.reset();
        Ok(())
    }

    /// Atomically commits with raft-log semantics. Empty batches are a no-op.
    pub fn write_to_raft(&mut self, store: &dyn RaftEngine) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let ops: Vec<KvOp> = self
            .entries
            .iter()
            .map(|e| {
                if e.is_raft_delete() {
                    KvOp::Delete(e.cf, e.key.clone())
                } else {
                    KvOp::Set(e.cf, e.key.clone(), e.value.clone())
                }
            })
            .collect();
        store.commit(&ops)?;
        self.reset();
        Ok(())
    }

    /// As `write_to_kv`, but a commit failure is fatal: the persistence pipeline can
    /// never silently drop a commit.
    pub fn must_write_to_kv(&mut self, store: &dyn KvEngine) {
        if let Err(e) = self.write_to_kv(store) {
            fatal!("failed to commit write batch to kv store: {:?}", e);
        }
    }

    /// As `write_to_raft`, but a commit failure is fatal.
    pub fn must_write_to_raft(&mut self, store: &dyn RaftEngine) {
        if let Err(e) = self.write_to_raft(store) {
            fatal!("failed to commit write batch to raft store: {:?}", e);
        }
    }
}

/// A single committed operation, in insertion order, as handed to the engine's atomic
/// commit. `cf` here is already resolved; the `key_with_cf` prefixing happens inside
/// the engine implementation, not in the batch itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Set(Cf, Vec<u8>, Vec<u8>),
    Delete(Cf, Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemEngine;

    #[test]
    fn safepoint_law() {
        let mut wb = WriteBatch::new();
        wb.set_cf(Cf::Default, b"a", b"1");
        wb.set_safepoint();
        wb.set_cf(Cf::Default, b"b", b"2");
        wb.delete_cf(Cf::Write, b"a");
        wb.rollback_to_safepoint();

        assert_eq!(wb.len(), 1);
        assert_eq!(wb.size(), b"a".len() + b"1".len());
        assert_eq!(wb.entries()[0].key, b"a");
    }

    #[test]
    fn cf_isolation() {
        let engine = MemEngine::new();
        let mut wb = WriteBatch::new();
        wb.set_cf(Cf::Default, b"k", b"v1");
        wb.set_cf(Cf::Write, b"k", b"v2");
        wb.write_to_kv(&engine).unwrap();

        assert_eq!(engine.get_cf(Cf::Default, b"k").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(engine.get_cf(Cf::Write, b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn delete_semantics_diverge_by_meta() {
        let kv_engine = MemEngine::new();
        let raft_engine = MemEngine::new();
        kv_engine.put_for_test(Cf::Default, b"k", b"seed");
        raft_engine.put_for_test(Cf::Default, b"k", b"seed");

        let mut wb = WriteBatch::new();
        wb.set_cf_with_meta(Cf::Default, b"k", b"", b"meta");
        let entries = wb.entries().to_vec();
        assert!(!entries[0].is_kv_delete());
        assert!(entries[0].is_raft_delete());

        let mut wb_kv = WriteBatch::new();
        wb_kv.set_cf_with_meta(Cf::Default, b"k", b"", b"meta");
        wb_kv.write_to_kv(&kv_engine).unwrap();
        assert_eq!(kv_engine.get_cf(Cf::Default, b"k").unwrap(), Some(Vec::new()));

        let mut wb_raft = WriteBatch::new();
        wb_raft.set_cf_with_meta(Cf::Default, b"k", b"", b"meta");
        wb_raft.write_to_raft(&raft_engine).unwrap();
        assert_eq!(raft_engine.get_cf(Cf::Default, b"k").unwrap(), None);
    }

    #[test]
    fn plain_delete_is_delete_under_both_semantics() {
        let kv_engine = MemEngine::new();
        kv_engine.put_for_test(Cf::Default, b"k", b"seed");

        let mut wb = WriteBatch::new();
        wb.delete_cf(Cf::Default, b"k");
        wb.write_to_kv(&kv_engine).unwrap();
        assert_eq!(kv_engine.get_cf(Cf::Default, b"k").unwrap(), None);
    }

    #[test]
    fn write_to_kv_is_noop_on_empty_batch() {
        let engine = MemEngine::new();
        let mut wb = WriteBatch::new();
        wb.write_to_kv(&engine).unwrap();
        assert_eq!(engine.commit_count(), 0);
    }

    #[test]
    fn atomicity_under_simulated_fault() {
        let engine = MemEngine::new();
        engine.fail_next_commit();

        let mut wb = WriteBatch::new();
        wb.set_cf(Cf::Default, b"a", b"1");
        wb.set_cf(Cf::Default, b"b", b"2");
        assert!(wb.write_to_kv(&engine).is_err());

        assert_eq!(engine.get_cf(Cf::Default, b"a").unwrap(), None);
        assert_eq!(engine.get_cf(Cf::Default, b"b").unwrap(), None);
    }
}
