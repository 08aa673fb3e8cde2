// Path: crates/api/src/storage/mod.rs

//! Contracts for a durable, versioned, content-addressed node store.
//!
//! The store keeps three key families in a single ordered byte keyspace and
//! relies on the backing engine for point gets, range scans in both
//! directions, and atomic batch writes. Engines must tolerate many concurrent
//! readers alongside a single writer.

use thiserror::Error;

use crate::error::ErrorCode;

/// A type alias for a committed tree version.
///
/// Versions are positive and monotonically increasing; 0 is reserved for
/// "no version". On disk a version is encoded as an 8-byte big-endian signed
/// integer so that lexicographic key order matches numeric order.
pub type Version = i64;

/// The fixed byte length of a node content hash.
pub const HASH_LEN: usize = 20;

/// Encodes a version into a big-endian byte array, suitable for ordered key
/// scans.
#[inline]
pub fn be64(x: Version) -> [u8; 8] {
    x.to_be_bytes()
}

/// A 20-byte content-addressed hash of a node's canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHash(pub [u8; HASH_LEN]);

impl NodeHash {
    /// Parses a hash from a raw byte slice, failing when the length is wrong.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        let raw: [u8; HASH_LEN] = bytes.try_into().map_err(|_| {
            StoreError::Corrupt(format!(
                "hash must be {HASH_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeHash({})", hex::encode(self.0))
    }
}

/// Represents errors that can occur within the node store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A caller broke a store precondition (missing hash, double persist,
    /// deleting the latest version, inconsistent orphan lifetime). These are
    /// caller bugs, reported with enough context to diagnose.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// A root was saved for a version other than the next consecutive one.
    /// Recoverable: the caller re-syncs its version counter.
    #[error("must save consecutive versions: expected {expected}, got {got}")]
    NonConsecutiveVersion {
        /// The version the store expected (latest plus one).
        expected: Version,
        /// The version the caller supplied.
        got: Version,
    },
    /// A stored entry failed to decode; the database is damaged.
    #[error("corrupt entry: {0}")]
    Corrupt(String),
    /// A generic error originating from the underlying key-value engine.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvariantViolation(_) => "STORE_INVARIANT_VIOLATION",
            Self::NonConsecutiveVersion { .. } => "STORE_NON_CONSECUTIVE_VERSION",
            Self::Corrupt(_) => "STORE_CORRUPT",
            Self::Backend(_) => "STORE_BACKEND_ERROR",
        }
    }
}

/// A single staged mutation in a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put(Vec<u8>, Vec<u8>),
    /// Remove a key, if present.
    Delete(Vec<u8>),
}

/// An ordered set of pending writes and deletes, applied atomically by
/// [`KvStore::write`].
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an insert-or-overwrite.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    /// Stages a delete.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    /// The number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes the batch, yielding its operations in staging order.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Visitor invoked once per key/value pair during a scan. Returning `false`
/// stops the scan early.
pub type ScanVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> bool + 'a;

/// An ordered byte-keyed storage engine.
///
/// Point reads and scans may run concurrently with a single writer; an
/// in-progress [`write`](Self::write) must not expose torn values — readers
/// observe, per key, either the pre-write or the post-write state.
pub trait KvStore: Send + Sync {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Ascending scan over `[lo, hi)`. `hi = None` scans to the end of the
    /// keyspace. An inverted range is empty, not an error.
    fn scan(
        &self,
        lo: &[u8],
        hi: Option<&[u8]>,
        visit: &mut ScanVisitor<'_>,
    ) -> Result<(), StoreError>;

    /// Descending scan over `[lo, hi)`.
    fn scan_rev(
        &self,
        lo: &[u8],
        hi: Option<&[u8]>,
        visit: &mut ScanVisitor<'_>,
    ) -> Result<(), StoreError>;

    /// Ascending scan over every key starting with `prefix`.
    fn scan_prefix(
        &self,
        prefix: &[u8],
        visit: &mut ScanVisitor<'_>,
    ) -> Result<(), StoreError> {
        self.scan(prefix, prefix_successor(prefix).as_deref(), visit)
    }

    /// Atomically applies a batch of writes and deletes.
    fn write(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Calculates the lexicographical successor of a byte string: the smallest
/// key greater than every key starting with `prefix`.
/// Returns `None` if the prefix is empty or all `0xFF` bytes, as there is no
/// successor in that byte space.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut successor = prefix.to_vec();
    for i in (0..successor.len()).rev() {
        if let Some(byte) = successor.get_mut(i) {
            if *byte != 0xFF {
                *byte = byte.wrapping_add(1);
                successor.truncate(i + 1);
                return Some(successor);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"o"), Some(b"p".to_vec()));
        assert_eq!(prefix_successor(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_successor(b""), None);
    }

    #[test]
    fn test_node_hash_from_slice_enforces_length() {
        assert!(NodeHash::from_slice(&[0u8; HASH_LEN]).is_ok());
        assert!(matches!(
            NodeHash::from_slice(&[0u8; HASH_LEN - 1]),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_write_batch_preserves_staging_order() {
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.delete(b"a".to_vec());
        assert_eq!(batch.len(), 2);

        let ops = batch.into_ops();
        assert!(matches!(&ops[0], BatchOp::Put(k, _) if k == b"a"));
        assert!(matches!(&ops[1], BatchOp::Delete(k) if k == b"a"));
    }
}
