// Path: crates/storage/src/engine/redb_store.rs

//! Durable engine backed by a single-file `redb` database.
//!
//! MVCC read snapshots let readers proceed concurrently with an in-progress
//! batch write; a reader sees the state as of its own `begin_read`.

use std::ops::Bound;
use std::path::Path;

use canopy_api::storage::{BatchOp, KvStore, ScanVisitor, StoreError, WriteBatch};
use redb::{Database, ReadableTable, TableDefinition};

const STATE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("state");

/// Disk engine holding all key families in one ordered `redb` table.
pub struct RedbKv {
    db: Database,
}

impl RedbKv {
    /// Opens (or creates) the database at `path` and ensures the table
    /// exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let w = db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            w.open_table(STATE)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

impl KvStore for RedbKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = r
            .open_table(STATE)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let out = table
            .get(key)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map(|guard| guard.value().to_vec());
        Ok(out)
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
        let r = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = r
            .open_table(STATE)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let upper = match hi {
            Some(hi) => Bound::Excluded(hi),
            None => Bound::Unbounded,
        };
        let range = table
            .range::<&[u8]>((Bound::Included(lo), upper))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for entry in range {
            let (key, value) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !visit(key.value(), value.value()) {
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
        let r = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = r
            .open_table(STATE)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let upper = match hi {
            Some(hi) => Bound::Excluded(hi),
            None => Bound::Unbounded,
        };
        let range = table
            .range::<&[u8]>((Bound::Included(lo), upper))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for entry in range.rev() {
            let (key, value) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !visit(key.value(), value.value()) {
                break;
            }
        }
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let mut table = w
                .open_table(STATE)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            for op in batch.into_ops() {
                match op {
                    BatchOp::Put(key, value) => {
                        table
                            .insert(key.as_slice(), value.as_slice())
                            .map_err(|e| StoreError::Backend(e.to_string()))?;
                    }
                    BatchOp::Delete(key) => {
                        table
                            .remove(key.as_slice())
                            .map_err(|e| StoreError::Backend(e.to_string()))?;
                    }
                }
            }
        }
        w.commit().map_err(|e| StoreError::Backend(e.to_string()))
    }
}
