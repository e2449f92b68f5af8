// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-process TTL cache.
//!
//! Holds ephemeral derived data (rendered templates, funnel and trigger
//! state) that does not need to survive a restart. Each named domain has its
//! own lifetime and capacity; a background task sweeps expired entries.

pub mod manager;
pub mod stats;
pub mod ttl;

pub use manager::{CacheManager, cache_key};
pub use stats::CacheStatsSnapshot;
pub use ttl::{CachePolicy, TtlCache};
