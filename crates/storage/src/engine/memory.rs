// Path: crates/storage/src/engine/memory.rs

//! Ordered in-memory engine, used by tests and simulations.

use std::collections::BTreeMap;
use std::ops::Bound;

use canopy_api::storage::{BatchOp, KvStore, ScanVisitor, StoreError, WriteBatch};
use parking_lot::RwLock;

/// Ordered in-memory key/value engine.
///
/// Scans hold the read lock for their duration, so visitors must not call
/// back into the engine's write path. Batches are applied under the write
/// lock, so readers observe either the pre-write or the post-write state.
#[derive(Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn scan(
        &self,
        lo: &[u8],
        hi: Option<&[u8]>,
        visit: &mut ScanVisitor<'_>,
    ) -> Result<(), StoreError> {
        if hi.is_some_and(|hi| hi <= lo) {
            return Ok(());
        }
        let map = self.map.read();
        let upper = match hi {
            Some(hi) => Bound::Excluded(hi),
            None => Bound::Unbounded,
        };
        for (k, v) in map.range::<[u8], _>((Bound::Included(lo), upper)) {
            if !visit(k, v) {
                break;
            }
        }
        Ok(())
    }

    fn scan_rev(
        &self,
        lo: &[u8],
        hi: Option<&[u8]>,
        visit: &mut ScanVisitor<'_>,
    ) -> Result<(), StoreError> {
        if hi.is_some_and(|hi| hi <= lo) {
            return Ok(());
        }
        let map = self.map.read();
        let upper = match hi {
            Some(hi) => Bound::Excluded(hi),
            None => Bound::Unbounded,
        };
        for (k, v) in map.range::<[u8], _>((Bound::Included(lo), upper)).rev() {
            if !visit(k, v) {
                break;
            }
        }
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut map = self.map.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}
