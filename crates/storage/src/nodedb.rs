// Path: crates/storage/src/nodedb.rs

//! The node store facade.
//!
//! Contention between readers and the single writer is reduced by splitting
//! synchronization in two: a writer mutex protects the pending batch and the
//! version counter, while a separate cache mutex protects the LRU node
//! cache. Readers that hit the cache never touch the writer mutex; readers
//! that miss drop the cache mutex across the backing-store read, which the
//! engine serves concurrently with any in-progress batch write. When both
//! locks are needed, the writer mutex is acquired first.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use canopy_api::storage::{KvStore, NodeHash, StoreError, Version, WriteBatch};
use parking_lot::Mutex;

use crate::cache::NodeCache;
use crate::encode;
use crate::keys;
use crate::node::Node;

/// Optional callback used to rehydrate leaf values stored outside the node
/// encoding. When configured, leaf values are omitted from stored node bytes
/// and fetched by key at decode time.
pub type LeafValueFn = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// State owned by the single writer: the pending batch and the latest
/// committed version, lazily derived from disk (0 until first derived).
struct WriterState {
    batch: WriteBatch,
    latest_version: Version,
}

/// Persistent store for tree nodes, addressed by content hash.
///
/// Writes accumulate in a pending batch and become visible to backing-store
/// readers only at [`commit`](Self::commit), the single atomic flush point.
/// Cached nodes become visible immediately, which is safe: hashes are
/// content-derived, so a reader can only ask for a hash it obtained from the
/// structure that produced it.
///
/// Each committed version records one root entry. Nodes displaced by a new
/// version are recorded as orphans with a `[first, last]` lifetime, and
/// [`delete_version`](Self::delete_version) resolves expiring orphans by
/// either destroying the node or shortening its lifetime.
pub struct NodeDb {
    db: Arc<dyn KvStore>,
    writer: Mutex<WriterState>,
    cache: Mutex<NodeCache>,
    leaf_value_lookup: Option<LeafValueFn>,
}

impl NodeDb {
    /// Creates a store over `db` with an LRU node cache holding at most
    /// `cache_size` nodes (0 disables the cache).
    pub fn new(
        db: Arc<dyn KvStore>,
        cache_size: usize,
        leaf_value_lookup: Option<LeafValueFn>,
    ) -> Self {
        Self {
            db,
            writer: Mutex::new(WriterState {
                batch: WriteBatch::new(),
                latest_version: 0,
            }),
            cache: Mutex::new(NodeCache::new(cache_size)),
            leaf_value_lookup,
        }
    }

    /// Gets a node from the cache or the backing store. Inner nodes are
    /// returned without their children loaded.
    ///
    /// Requesting a hash that was never written, or was pruned while still
    /// referenced, is a caller bug and fails as an invariant violation.
    pub fn get_node(&self, hash: &NodeHash) -> Result<Arc<Node>, StoreError> {
        if let Some(node) = self.cache.lock().touch_or_get(hash) {
            return Ok(node);
        }

        // Cache miss: read the backing store without holding either lock.
        let buf = self.db.get(&keys::node_key(hash))?.ok_or_else(|| {
            StoreError::InvariantViolation(format!(
                "node missing for hash {}",
                hex::encode(hash.as_bytes())
            ))
        })?;
        let mut node = encode::decode_node(&buf, self.leaf_value_lookup.as_ref())?;
        node.hash = Some(*hash);
        node.persisted = true;

        let node = Arc::new(node);
        self.cache.lock().insert(node.clone());
        Ok(node)
    }

    /// Stages a freshly hashed node into the pending batch and caches it.
    /// The node must carry a hash and must not already be persisted; a
    /// duplicate save is rejected to surface accidental rework.
    pub fn save_node(&self, node: &mut Node) -> Result<(), StoreError> {
        let hash = node.hash.ok_or_else(|| {
            StoreError::InvariantViolation("cannot save a node without a hash".into())
        })?;
        if node.persisted {
            return Err(StoreError::InvariantViolation(format!(
                "node {} is already persisted",
                hex::encode(hash.as_bytes())
            )));
        }

        let buf = encode::encode_node(node, self.leaf_value_lookup.is_some())?;
        {
            let mut w = self.writer.lock();
            w.batch.put(keys::node_key(&hash), buf);
            node.persisted = true;
        }
        log::debug!("batched node {}", hex::encode(hash.as_bytes()));

        self.cache.lock().insert(Arc::new(node.detached()));
        Ok(())
    }

    /// Checks whether a node entry exists in the backing store. Entries still
    /// pending in the batch become visible only after
    /// [`commit`](Self::commit).
    pub fn has(&self, hash: &NodeHash) -> Result<bool, StoreError> {
        Ok(self.db.get(&keys::node_key(hash))?.is_some())
    }

    /// Persists `node` and every unpersisted descendant, depth-first and
    /// post-order, then returns the root hash. Child hashes are computed
    /// bottom-up and replace the in-memory child pointers, releasing the
    /// subtree. Upon return, every node reachable from `node` sits in the
    /// pending batch.
    pub fn save_branch(&self, node: &mut Node) -> Result<NodeHash, StoreError> {
        if node.persisted {
            return node.hash.ok_or_else(|| {
                StoreError::InvariantViolation("persisted node has no hash".into())
            });
        }

        if let Some(left) = node.left_node.as_deref_mut() {
            node.left_hash = Some(self.save_branch(left)?);
        }
        if let Some(right) = node.right_node.as_deref_mut() {
            node.right_hash = Some(self.save_branch(right)?);
        }

        if node.hash.is_none() {
            node.hash = Some(node.compute_hash()?);
        }
        self.save_node(node)?;

        node.left_node = None;
        node.right_node = None;

        node.hash
            .ok_or_else(|| StoreError::InvariantViolation("saved node has no hash".into()))
    }

    /// Records the lifetime of every node displaced by `version`. `orphans`
    /// maps each displaced hash to the version that introduced it.
    pub fn save_orphans(
        &self,
        version: Version,
        orphans: &HashMap<NodeHash, Version>,
    ) -> Result<(), StoreError> {
        let mut w = self.writer.lock();

        // The new version displaces these nodes, so they are last needed at
        // the version immediately before it.
        let to_version = version - 1;
        for (hash, &from_version) in orphans {
            log::debug!(
                "orphan {from_version}..{to_version} {}",
                hex::encode(hash.as_bytes())
            );
            Self::save_orphan(&mut w.batch, hash, from_version, to_version)?;
        }
        Ok(())
    }

    /// Stages a single orphan entry. The stored value duplicates the hash so
    /// scans can hand back the bare hash without reparsing the key.
    fn save_orphan(
        batch: &mut WriteBatch,
        hash: &NodeHash,
        from_version: Version,
        to_version: Version,
    ) -> Result<(), StoreError> {
        if from_version > to_version {
            return Err(StoreError::InvariantViolation(format!(
                "orphan expires before it comes alive: {from_version} > {to_version}"
            )));
        }
        batch.put(
            keys::orphan_key(from_version, to_version, hash),
            hash.as_bytes().to_vec(),
        );
        Ok(())
    }

    /// Prunes one committed version: resolves every orphan whose lifetime
    /// ends at `version`, then removes the root entry. All mutations are
    /// staged in the batch; this is not a commit point.
    pub fn delete_version(
        &self,
        version: Version,
        check_latest_version: bool,
    ) -> Result<(), StoreError> {
        let mut w = self.writer.lock();

        if check_latest_version && version == self.latest_version_locked(&mut w)? {
            return Err(StoreError::InvariantViolation(format!(
                "cannot delete latest version {version}"
            )));
        }

        self.delete_orphans(&mut w, version)?;
        w.batch.delete(keys::root_key(version));
        Ok(())
    }

    /// Resolves the orphans expiring at `version`.
    ///
    /// Each orphan entry is always deleted. If no earlier version survives,
    /// or the surviving predecessor is earlier than the orphan's birth, or
    /// the lifetime spans exactly the version being deleted, the node itself
    /// is destroyed. Otherwise the lifetime endpoint moves back to the
    /// predecessor; the new endpoint is always strictly smaller than the old.
    fn delete_orphans(&self, w: &mut WriterState, version: Version) -> Result<(), StoreError> {
        // 0 when no earlier version survives.
        let predecessor = self.previous_version(version)?;

        let mut expiring: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        self.db
            .scan_prefix(&keys::orphan_expiry_prefix(version), &mut |key, value| {
                expiring.push((key.to_vec(), value.to_vec()));
                true
            })?;

        for (key, value) in expiring {
            let (from_version, to_version, _) = keys::parse_orphan_key(&key).ok_or_else(|| {
                StoreError::Corrupt(format!("malformed orphan key {}", hex::encode(&key)))
            })?;
            let hash = NodeHash::from_slice(&value)?;

            w.batch.delete(key);

            if predecessor < from_version || from_version == to_version {
                log::debug!(
                    "delete orphan node predecessor:{predecessor} lifetime:{from_version}..{to_version} {}",
                    hex::encode(hash.as_bytes())
                );
                w.batch.delete(keys::node_key(&hash));
                self.cache.lock().remove(&hash);
            } else {
                log::debug!(
                    "shorten orphan predecessor:{predecessor} lifetime:{from_version}..{to_version} {}",
                    hex::encode(hash.as_bytes())
                );
                Self::save_orphan(&mut w.batch, &hash, from_version, predecessor)?;
            }
        }
        Ok(())
    }

    /// The latest committed version, lazily derived from a reverse root scan
    /// on first use.
    pub fn latest_version(&self) -> Result<Version, StoreError> {
        let mut w = self.writer.lock();
        self.latest_version_locked(&mut w)
    }

    fn latest_version_locked(&self, w: &mut WriterState) -> Result<Version, StoreError> {
        if w.latest_version == 0 {
            w.latest_version = self.previous_version(Version::MAX)?;
        }
        Ok(w.latest_version)
    }

    /// Overrides the cached latest version, e.g. after rolling back a
    /// half-built version with [`reset_batch`](Self::reset_batch). Pass 0 to
    /// re-derive from disk on next use.
    pub fn reset_latest_version(&self, version: Version) {
        self.writer.lock().latest_version = version;
    }

    /// The greatest committed version strictly below `version`, or 0 when no
    /// earlier root entry exists. Tolerates interior gaps left by pruning.
    fn previous_version(&self, version: Version) -> Result<Version, StoreError> {
        let mut found = 0;
        self.db.scan_rev(
            &keys::root_key(1),
            Some(&keys::root_key(version)),
            &mut |key, _| {
                if let Some(v) = keys::parse_root_key(key) {
                    found = v;
                }
                false
            },
        )?;
        Ok(found)
    }

    /// The root hash recorded for `version`, if any. An empty byte string
    /// marks a committed empty tree, distinct from an absent version.
    pub fn get_root(&self, version: Version) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(&keys::root_key(version))
    }

    /// Records the root entry for `version`, which must be the latest
    /// version plus one.
    pub fn save_root(&self, root: &Node, version: Version) -> Result<(), StoreError> {
        let hash = root.hash.ok_or_else(|| {
            StoreError::InvariantViolation("root hash should not be empty".into())
        })?;
        self.save_root_hash(hash.as_bytes().to_vec(), version)
    }

    /// Records an empty-tree root entry for `version`.
    pub fn save_empty_root(&self, version: Version) -> Result<(), StoreError> {
        self.save_root_hash(Vec::new(), version)
    }

    fn save_root_hash(&self, hash: Vec<u8>, version: Version) -> Result<(), StoreError> {
        let mut w = self.writer.lock();

        let latest = self.latest_version_locked(&mut w)?;
        if version != latest + 1 {
            return Err(StoreError::NonConsecutiveVersion {
                expected: latest + 1,
                got: version,
            });
        }

        w.batch.put(keys::root_key(version), hash);
        if w.latest_version < version {
            w.latest_version = version;
        }
        Ok(())
    }

    /// Atomically flushes the pending batch to the backing store and installs
    /// a fresh one. This is the only point at which staged effects become
    /// visible to backing-store readers. The node cache is left intact.
    pub fn commit(&self) -> Result<(), StoreError> {
        let mut w = self.writer.lock();
        let batch = std::mem::take(&mut w.batch);
        self.db.write(batch)
    }

    /// Discards the pending batch without writing it.
    pub fn reset_batch(&self) {
        self.writer.lock().batch = WriteBatch::new();
    }

    // ---- Diagnostics ------------------------------------------------------

    /// Every committed root entry, keyed by version.
    pub fn roots(&self) -> Result<BTreeMap<Version, Vec<u8>>, StoreError> {
        let mut roots = BTreeMap::new();
        self.db.scan_prefix(&[keys::ROOT_PREFIX], &mut |key, value| {
            if let Some(version) = keys::parse_root_key(key) {
                roots.insert(version, value.to_vec());
            }
            true
        })?;
        Ok(roots)
    }

    /// The stored value (the bare node hash) of every orphan entry.
    pub fn orphans(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut orphans = Vec::new();
        self.db.scan_prefix(&[keys::ORPHAN_PREFIX], &mut |_, value| {
            orphans.push(value.to_vec());
            true
        })?;
        Ok(orphans)
    }

    /// Visits every orphan entry as `(first, last, hash)`.
    pub fn traverse_orphans(
        &self,
        visit: &mut dyn FnMut(Version, Version, &NodeHash),
    ) -> Result<(), StoreError> {
        self.db.scan_prefix(&[keys::ORPHAN_PREFIX], &mut |key, _| {
            if let Some((first, last, hash)) = keys::parse_orphan_key(key) {
                visit(first, last, &hash);
            }
            true
        })
    }

    /// Decodes every committed node entry, ordered by node key.
    pub fn nodes(&self) -> Result<Vec<Node>, StoreError> {
        let mut raw: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        self.db.scan_prefix(&[keys::NODE_PREFIX], &mut |key, value| {
            raw.push((key.to_vec(), value.to_vec()));
            true
        })?;

        let mut nodes = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let mut node = encode::decode_node(&value, self.leaf_value_lookup.as_ref())?;
            let hash_raw = key
                .get(1..)
                .ok_or_else(|| StoreError::Corrupt("malformed node key".into()))?;
            node.hash = Some(NodeHash::from_slice(hash_raw)?);
            node.persisted = true;
            nodes.push(node);
        }
        nodes.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(nodes)
    }

    /// Decoded committed leaf entries only, ordered by key.
    pub fn leaf_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.nodes()?.into_iter().filter(|n| n.is_leaf()).collect())
    }

    /// Total number of committed entries across all key families. Not
    /// efficient; intended for tests and debugging.
    pub fn size(&self) -> Result<usize, StoreError> {
        let mut size = 0;
        self.db.scan(&[], None, &mut |_, _| {
            size += 1;
            true
        })?;
        Ok(size)
    }
}
