// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named cache domains keyed by `domain:clientId:key`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use luni_config::model::CacheConfig;
use luni_core::LuniError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::stats::CacheStatsSnapshot;
use crate::ttl::{CachePolicy, TtlCache};

/// Full key of a cached value.
pub fn cache_key(domain: &str, client_id: &str, key: &str) -> String {
    format!("{domain}:{client_id}:{key}")
}

/// Registry of cache domains, each with its own TTL and capacity.
///
/// Domains named in configuration are created up front; any other name is
/// created on first write with the default policy.
pub struct CacheManager {
    domains: RwLock<HashMap<String, Arc<TtlCache<Value>>>>,
    default_policy: CachePolicy,
}

impl CacheManager {
    pub fn new(default_policy: CachePolicy) -> Self {
        Self {
            domains: RwLock::new(HashMap::new()),
            default_policy,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let manager = Self::new(CachePolicy {
            ttl: Duration::from_secs(config.default_ttl_seconds),
            max_entries: config.default_max_entries,
        });
        for domain in &config.domains {
            manager.register(
                &domain.name,
                CachePolicy {
                    ttl: Duration::from_secs(domain.ttl_seconds),
                    max_entries: domain.max_entries,
                },
            );
        }
        manager
    }

    /// Add or replace a domain.
    pub fn register(&self, name: &str, policy: CachePolicy) -> Arc<TtlCache<Value>> {
        let cache = Arc::new(TtlCache::new(name, policy));
        self.write().insert(name.to_string(), cache.clone());
        cache
    }

    pub fn domain(&self, name: &str) -> Option<Arc<TtlCache<Value>>> {
        self.read().get(name).cloned()
    }

    fn domain_or_default(&self, name: &str) -> Arc<TtlCache<Value>> {
        if let Some(cache) = self.domain(name) {
            return cache;
        }
        self.write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TtlCache::new(name, self.default_policy)))
            .clone()
    }

    pub fn get(&self, domain: &str, client_id: &str, key: &str) -> Option<Value> {
        self.domain(domain)?.get(&cache_key(domain, client_id, key))
    }

    pub fn set(&self, domain: &str, client_id: &str, key: &str, value: Value) {
        self.domain_or_default(domain)
            .set(cache_key(domain, client_id, key), value);
    }

    /// Typed read; a value that no longer decodes is dropped and reported as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, domain: &str, client_id: &str, key: &str) -> Option<T> {
        let value = self.get(domain, client_id, key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(domain, client_id, key, error = %e, "dropping undecodable cache entry");
                self.delete(domain, client_id, key);
                None
            }
        }
    }

    pub fn set_as<T: Serialize>(
        &self,
        domain: &str,
        client_id: &str,
        key: &str,
        value: &T,
    ) -> Result<(), LuniError> {
        self.set(domain, client_id, key, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn delete(&self, domain: &str, client_id: &str, key: &str) -> bool {
        self.domain(domain)
            .is_some_and(|c| c.delete(&cache_key(domain, client_id, key)))
    }

    /// Drop everything cached for one client across all domains.
    pub fn clear_client(&self, client_id: &str) -> usize {
        self.read()
            .iter()
            .map(|(name, cache)| cache.delete_prefix(&format!("{name}:{client_id}:")))
            .sum()
    }

    /// Sweep every domain. Returns the number of entries removed.
    pub fn sweep_all(&self) -> usize {
        let domains: Vec<_> = self.read().values().cloned().collect();
        let removed: usize = domains.iter().map(|c| c.sweep_expired()).sum();
        if removed > 0 {
            tracing::debug!(removed, "cache sweep removed expired entries");
        }
        removed
    }

    pub fn all_stats(&self) -> BTreeMap<String, CacheStatsSnapshot> {
        self.read()
            .iter()
            .map(|(name, cache)| (name.clone(), cache.stats()))
            .collect()
    }

    /// Sweep all domains every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.sweep_all();
                    }
                }
            }
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<TtlCache<Value>>>> {
        self.domains.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<TtlCache<Value>>>> {
        self.domains.write().unwrap_or_else(|e| e.into_inner())
    }
}
