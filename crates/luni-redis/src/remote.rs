// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The key-value operations the remote stores need from the cache service.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use luni_core::LuniError;

/// Minimal command surface over a Redis-compatible service.
///
/// Every write that takes a `ttl` also (re)sets the key's expiry.
#[async_trait]
pub trait RemoteCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, LuniError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LuniError>;

    /// Set only if absent. Returns whether the key was written.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LuniError>;

    /// Delete keys. Returns how many existed.
    async fn del(&self, keys: &[String]) -> Result<usize, LuniError>;

    /// Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LuniError>;

    /// Write hash fields and refresh the key's expiry in one round trip.
    async fn hset_ex(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), LuniError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, LuniError>;

    /// Push to the head of a list, trim it to `cap` entries and refresh expiry.
    async fn push_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl: Duration,
    ) -> Result<(), LuniError>;

    /// The first `count` entries from the head of a list.
    async fn list_head(&self, key: &str, count: usize) -> Result<Vec<String>, LuniError>;

    async fn ping(&self) -> Result<(), LuniError>;
}

/// Whole seconds for an expiry, never zero.
pub fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
