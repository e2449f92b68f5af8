// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory remote cache for deterministic testing.
//!
//! `MockRemoteCache` implements [`RemoteCache`] with key expiry driven by an
//! injected clock and set-if-absent semantics, and can be switched offline to
//! simulate an unreachable service.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use luni_core::{AdapterType, Clock, HealthStatus, LuniError, PluginAdapter};
use luni_redis::RemoteCache;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum Stored {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<DateTime<Utc>>,
}

/// A Redis stand-in backed by a map.
pub struct MockRemoteCache {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
    commands: AtomicU64,
}

impl MockRemoteCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            offline: AtomicBool::new(false),
            commands: AtomicU64::new(0),
        }
    }

    /// Make every subsequent command fail as if the service were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of commands issued so far.
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::SeqCst)
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remaining time to live for a key, if it has one.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        let expires_at = entries.get(key)?.expires_at?;
        (expires_at - now).to_std().ok()
    }

    fn check(&self) -> Result<DateTime<Utc>, LuniError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(LuniError::Remote {
                message: "mock remote offline".into(),
                source: None,
            });
        }
        Ok(self.clock.now())
    }

    fn deadline(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        Some(now + chrono::Duration::seconds(secs))
    }
}

fn purge(entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) {
    entries.retain(|_, e| e.expires_at.is_none_or(|at| at > now));
}

fn wrong_type(key: &str) -> LuniError {
    LuniError::Remote {
        message: format!("WRONGTYPE operation against key {key}"),
        source: None,
    }
}

#[async_trait]
impl RemoteCache for MockRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<String>, LuniError> {
        let now = self.check()?;
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Stored::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LuniError> {
        let now = self.check()?;
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: Stored::Str(value.to_string()),
                expires_at: Self::deadline(now, ttl),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LuniError> {
        let now = self.check()?;
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Str(value.to_string()),
                expires_at: Self::deadline(now, ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, keys: &[String]) -> Result<usize, LuniError> {
        let now = self.check()?;
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, LuniError> {
        let now = self.check()?;
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Self::deadline(now, ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hset_ex(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), LuniError> {
        let now = self.check()?;
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Stored::Hash(HashMap::new()),
            expires_at: None,
        });
        let Stored::Hash(hash) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        hash.extend(fields.iter().cloned());
        entry.expires_at = Self::deadline(now, ttl);
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, LuniError> {
        let now = self.check()?;
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        match entries.get(key).map(|e| &e.value) {
            None => Ok(HashMap::new()),
            Some(Stored::Hash(h)) => Ok(h.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn push_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        ttl: Duration,
    ) -> Result<(), LuniError> {
        let now = self.check()?;
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Stored::List(VecDeque::new()),
            expires_at: None,
        });
        let Stored::List(list) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        list.push_front(value.to_string());
        list.truncate(cap);
        entry.expires_at = Self::deadline(now, ttl);
        Ok(())
    }

    async fn list_head(&self, key: &str, count: usize) -> Result<Vec<String>, LuniError> {
        let now = self.check()?;
        let mut entries = self.entries.lock().await;
        purge(&mut entries, now);
        match entries.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Stored::List(l)) => Ok(l.iter().take(count).cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn ping(&self) -> Result<(), LuniError> {
        self.check().map(|_| ())
    }
}

#[async_trait]
impl PluginAdapter for MockRemoteCache {
    fn name(&self) -> &str {
        "mock-remote"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RemoteCache
    }

    async fn health_check(&self) -> Result<HealthStatus, LuniError> {
        if self.offline.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("offline".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LuniError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luni_core::ManualClock;

    fn mock() -> (Arc<ManualClock>, MockRemoteCache) {
        let clock = Arc::new(ManualClock::at_epoch_millis(0));
        (clock.clone(), MockRemoteCache::new(clock))
    }

    #[tokio::test]
    async fn keys_expire_with_the_clock() {
        let (clock, remote) = mock();
        remote.set_ex("k", "v", Duration::from_secs(10)).await.unwrap();
        clock.advance(chrono::Duration::seconds(9));
        assert_eq!(remote.get("k").await.unwrap().as_deref(), Some("v"));
        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(remote.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_nx_respects_existing_keys() {
        let (clock, remote) = mock();
        let ttl = Duration::from_secs(30);
        assert!(remote.set_nx_ex("lock", "1", ttl).await.unwrap());
        assert!(!remote.set_nx_ex("lock", "1", ttl).await.unwrap());
        clock.advance(chrono::Duration::seconds(30));
        assert!(remote.set_nx_ex("lock", "1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn capped_list_keeps_newest_first() {
        let (_clock, remote) = mock();
        for i in 0..5 {
            remote
                .push_capped("l", &i.to_string(), 3, Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(remote.list_head("l", 10).await.unwrap(), ["4", "3", "2"]);
    }

    #[tokio::test]
    async fn offline_fails_every_command() {
        let (_clock, remote) = mock();
        remote.set_offline(true);
        assert!(remote.ping().await.is_err());
        assert!(remote.get("k").await.unwrap_err().is_connectivity());
        remote.set_offline(false);
        assert!(remote.ping().await.is_ok());
    }
}
