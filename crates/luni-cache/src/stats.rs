// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hit/miss/eviction counters for a cache domain.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the eviction count including this one.
    pub(crate) fn evicted(&self) -> u64 {
        self.evictions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self, size: usize) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsSnapshot {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

/// Point-in-time copy of a domain's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    /// Hits over lookups, 0 when nothing was looked up yet.
    pub hit_rate: f64,
}

impl fmt::Display for CacheStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={} hits={} misses={} evictions={} hit_rate={:.1}%",
            self.size,
            self.hits,
            self.misses,
            self.evictions,
            self.hit_rate * 100.0
        )
    }
}
