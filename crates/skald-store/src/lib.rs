// SPDX-License-Identifier: GPL-3.0-or-later

//! Content-addressable store for normalized audio artifacts and their
//! fingerprint records.
//!
//! Dedup and caching are keyed by the SHA-256 of normalized bytes. The
//! store is the only owner of artifact lifetimes; other components pass
//! content hashes around.

pub mod db;
pub mod error;
pub mod index;
pub mod singleflight;
pub mod store;

pub use error::{Result, StoreError};
pub use index::StoreStats;
pub use singleflight::{Flight, Singleflight};
pub use store::Store;
