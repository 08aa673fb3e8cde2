// Path: crates/storage/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! Persistent node store backing a versioned, content-addressed AVL tree.
//!
//! Nodes are immutable once persisted and addressed by the hash of their
//! canonical encoding. Each committed version records a root hash; nodes
//! displaced by a newer version are tracked as orphans with an explicit
//! `[first, last]` version lifetime, so pruning can decide between destroying
//! a node outright and shortening its lifetime to the surviving predecessor
//! version.

mod cache;
mod encode;
pub mod engine;
mod keys;
mod node;
mod nodedb;

pub use engine::{MemoryKv, RedbKv};
pub use node::Node;
pub use nodedb::{LeafValueFn, NodeDb};
