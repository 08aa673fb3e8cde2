// Path: crates/api/src/lib.rs

//! # Canopy API Crate Lints
//!
//! This crate enforces a strict set of lints to ensure high-quality,
//! panic-free, and well-documented code. Panics are disallowed in non-test
//! code to promote robust error handling.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]
//! # Canopy API
//!
//! Core traits and types for the canopy node store. This crate defines the
//! stable contract between the store facade and its backing engines.

/// Shared error plumbing (stable machine-readable error codes).
pub mod error;
/// Contracts for the ordered byte-keyed backing store and the node store's
/// key material.
pub mod storage;
