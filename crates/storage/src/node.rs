// Path: crates/storage/src/node.rs

use canopy_api::storage::{NodeHash, StoreError, Version, HASH_LEN};
use sha2::{Digest, Sha256};

use crate::encode;

/// A single tree node. Children are referenced by hash; the owning
/// `left_node`/`right_node` pointers exist only while a subtree is being
/// built in memory and are dropped once the subtree is persisted.
///
/// A node is frozen once persisted: its hash is a pure function of its
/// content, so any later mutation would break addressing.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) key: Vec<u8>,
    pub(crate) value: Vec<u8>,
    pub(crate) version: Version,
    pub(crate) height: i32,
    pub(crate) size: i64,
    /// The hash of this node's canonical encoding, once computed.
    pub(crate) hash: Option<NodeHash>,
    /// The hash of the left child, if it exists.
    pub(crate) left_hash: Option<NodeHash>,
    /// The hash of the right child, if it exists.
    pub(crate) right_hash: Option<NodeHash>,
    pub(crate) left_node: Option<Box<Node>>,
    pub(crate) right_node: Option<Box<Node>>,
    pub(crate) persisted: bool,
}

impl Node {
    /// Creates a new, unpersisted leaf node. Its hash is computed when the
    /// node is first persisted.
    pub fn new_leaf(key: Vec<u8>, value: Vec<u8>, version: Version) -> Self {
        Self {
            key,
            value,
            version,
            height: 0,
            size: 1,
            hash: None,
            left_hash: None,
            right_hash: None,
            left_node: None,
            right_node: None,
            persisted: false,
        }
    }

    /// Creates a new, unpersisted inner node over two in-memory children.
    /// `key` is the subtree split key chosen by the caller; height and size
    /// are derived from the children.
    pub fn new_inner(key: Vec<u8>, version: Version, left: Node, right: Node) -> Self {
        let height = 1 + left.height.max(right.height);
        let size = left.size + right.size;
        Self {
            key,
            value: Vec::new(),
            version,
            height,
            size,
            hash: None,
            left_hash: left.hash,
            right_hash: right.hash,
            left_node: Some(Box::new(left)),
            right_node: Some(Box::new(right)),
            persisted: false,
        }
    }

    /// Check if this is a leaf node.
    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }

    /// The node's search key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The stored value. Empty for inner nodes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The version that introduced this node.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Height of this node above the leaf level.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Number of leaves in the subtree rooted here.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// The content hash, once computed.
    pub fn hash(&self) -> Option<NodeHash> {
        self.hash
    }

    /// The left child's hash, for inner nodes.
    pub fn left_hash(&self) -> Option<NodeHash> {
        self.left_hash
    }

    /// The right child's hash, for inner nodes.
    pub fn right_hash(&self) -> Option<NodeHash> {
        self.right_hash
    }

    /// Whether this node has already been handed to the store.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Computes the content hash: SHA-256 over the canonical encoding (with
    /// leaf values embedded), truncated to the fixed hash width. Inner nodes
    /// must already carry both child hashes.
    pub fn compute_hash(&self) -> Result<NodeHash, StoreError> {
        let bytes = encode::encode_node(self, false)?;
        let digest = Sha256::digest(&bytes);
        NodeHash::from_slice(digest.get(..HASH_LEN).unwrap_or_default())
    }

    /// A copy safe to share from the cache: child pointers dropped, child
    /// hashes kept.
    pub(crate) fn detached(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            version: self.version,
            height: self.height,
            size: self.size,
            hash: self.hash,
            left_hash: self.left_hash,
            right_hash: self.right_hash,
            left_node: None,
            right_node: None,
            persisted: self.persisted,
        }
    }
}
