// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory artifact index: sizes, formats, pin counts, and LRU ordering.
//!
//! Mutated only behind the store's single lock; the index itself is plain
//! synchronous code so its invariants are easy to test in isolation.

use std::collections::HashMap;

use serde::Serialize;
use skald_domain::{AudioFormat, ContentHash};

#[derive(Debug, Clone)]
pub(crate) struct ArtifactEntry {
    pub size_bytes: u64,
    pub format: AudioFormat,
    pub pins: u32,
    last_access: u64,
}

/// Point-in-time store occupancy, surfaced through the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub artifact_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ArtifactIndex {
    entries: HashMap<ContentHash, ArtifactEntry>,
    total_bytes: u64,
    clock: u64,
}

impl ArtifactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            artifact_count: self.entries.len(),
            total_bytes: self.total_bytes,
        }
    }

    /// Record an access for LRU purposes and return the entry's format.
    pub fn touch(&mut self, hash: &ContentHash) -> Option<(u64, AudioFormat)> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(hash)?;
        entry.last_access = clock;
        Some((entry.size_bytes, entry.format.clone()))
    }

    pub fn insert(&mut self, hash: ContentHash, size_bytes: u64, format: AudioFormat) {
        self.clock += 1;
        let previous = self.entries.insert(
            hash,
            ArtifactEntry {
                size_bytes,
                format,
                pins: 0,
                last_access: self.clock,
            },
        );
        debug_assert!(previous.is_none(), "index insert over existing entry");
        self.total_bytes += size_bytes;
    }

    pub fn remove(&mut self, hash: &ContentHash) -> Option<u64> {
        let entry = self.entries.remove(hash)?;
        self.total_bytes -= entry.size_bytes;
        Some(entry.size_bytes)
    }

    pub fn pin(&mut self, hash: &ContentHash) -> bool {
        match self.entries.get_mut(hash) {
            Some(entry) => {
                entry.pins += 1;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&mut self, hash: &ContentHash) -> bool {
        match self.entries.get_mut(hash) {
            Some(entry) => {
                entry.pins = entry.pins.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    /// Least-recently-used entry that is not pinned by an in-flight job.
    pub fn eviction_victim(&self) -> Option<ContentHash> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.pins == 0)
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(hash, _)| hash.clone())
    }
}
