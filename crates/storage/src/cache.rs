// Path: crates/storage/src/cache.rs

//! Bounded LRU cache of decoded nodes.
//!
//! The cache is a process-local performance layer: correctness never depends
//! on its contents. Eviction is by element count, not bytes.

use std::num::NonZeroUsize;
use std::sync::Arc;

use canopy_api::storage::NodeHash;
use lru::LruCache;

use crate::node::Node;

pub(crate) struct NodeCache {
    /// `None` when caching is disabled (capacity 0).
    entries: Option<LruCache<NodeHash, Arc<Node>>>,
}

impl NodeCache {
    /// A cache holding at most `size` nodes. Size 0 disables caching.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(size).map(LruCache::new),
        }
    }

    /// Returns the cached node and promotes it to most-recently-used.
    pub(crate) fn touch_or_get(&mut self, hash: &NodeHash) -> Option<Arc<Node>> {
        self.entries.as_mut()?.get(hash).cloned()
    }

    /// Inserts at the most-recently-used position, evicting the
    /// least-recently-used entry when full. Nodes without a hash are ignored.
    pub(crate) fn insert(&mut self, node: Arc<Node>) {
        let Some(entries) = self.entries.as_mut() else {
            return;
        };
        if let Some(hash) = node.hash() {
            entries.put(hash, node);
        }
    }

    /// Drops the entry for `hash`, if cached. Used only when the node itself
    /// is deleted from the backing store.
    pub(crate) fn remove(&mut self, hash: &NodeHash) {
        if let Some(entries) = self.entries.as_mut() {
            entries.pop(hash);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }
}

#[cfg(test)]
mod tests {
    use canopy_api::storage::HASH_LEN;

    use super::*;

    fn cached_leaf(tag: u8) -> Arc<Node> {
        let mut node = Node::new_leaf(vec![tag], vec![tag], 1);
        node.hash = Some(NodeHash([tag; HASH_LEN]));
        Arc::new(node)
    }

    #[test]
    fn test_eviction_is_by_count_in_lru_order() {
        let mut cache = NodeCache::new(2);
        let (a, b, c) = (cached_leaf(1), cached_leaf(2), cached_leaf(3));

        cache.insert(a.clone());
        cache.insert(b.clone());

        // Touch `a` so `b` becomes least recently used.
        assert!(cache.touch_or_get(&NodeHash([1; HASH_LEN])).is_some());

        cache.insert(c);
        assert_eq!(cache.len(), 2);
        assert!(cache.touch_or_get(&NodeHash([2; HASH_LEN])).is_none());
        assert!(cache.touch_or_get(&NodeHash([1; HASH_LEN])).is_some());
        assert!(cache.touch_or_get(&NodeHash([3; HASH_LEN])).is_some());
    }

    #[test]
    fn test_remove_drops_entry() {
        let mut cache = NodeCache::new(4);
        cache.insert(cached_leaf(1));
        cache.remove(&NodeHash([1; HASH_LEN]));
        assert!(cache.touch_or_get(&NodeHash([1; HASH_LEN])).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let mut cache = NodeCache::new(0);
        cache.insert(cached_leaf(1));
        assert!(cache.touch_or_get(&NodeHash([1; HASH_LEN])).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_unhashed_nodes_are_ignored() {
        let mut cache = NodeCache::new(4);
        cache.insert(Arc::new(Node::new_leaf(b"k".to_vec(), b"v".to_vec(), 1)));
        assert_eq!(cache.len(), 0);
    }
}
