// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-client variables with individual expiry, stored as `<client>_vars.json`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use luni_core::variable::{VariableStats, VariablesFile};
use luni_core::{Clock, LuniError};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::json_file::{JsonFileStore, sanitize_key};

/// Durable key-value variables scoped to a client.
pub struct VariableStore {
    files: JsonFileStore,
    clock: Arc<dyn Clock>,
    max_keys: usize,
    default_ttl: Duration,
    // Serializes read-modify-write cycles on the per-client files.
    write_lock: Mutex<()>,
}

impl VariableStore {
    pub async fn open(
        dir: impl Into<PathBuf>,
        max_keys: usize,
        default_ttl: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LuniError> {
        let default_ttl = Duration::from_std(default_ttl)
            .map_err(|e| LuniError::Config(format!("variable ttl out of range: {e}")))?;
        Ok(Self {
            files: JsonFileStore::open(dir).await?,
            clock,
            max_keys,
            default_ttl,
            write_lock: Mutex::new(()),
        })
    }

    pub fn files(&self) -> &JsonFileStore {
        &self.files
    }

    fn file_name(client_id: &str) -> String {
        format!("{}_vars.json", sanitize_key(client_id))
    }

    async fn load(&self, client_id: &str) -> VariablesFile {
        self.files.read_or_default(&Self::file_name(client_id)).await
    }

    async fn save(&self, client_id: &str, file: &mut VariablesFile) -> Result<(), LuniError> {
        file.meta.last_write = Some(self.clock.now());
        self.files.write(&Self::file_name(client_id), file).await
    }

    fn ttl_or_default(&self, ttl: Option<std::time::Duration>) -> Duration {
        ttl.and_then(|t| Duration::from_std(t).ok())
            .unwrap_or(self.default_ttl)
    }

    /// Store `value` under `key`. Object values merge into an existing object.
    #[doc(alias = "salvarVariavel")]
    pub async fn set(
        &self,
        client_id: &str,
        key: &str,
        value: Value,
        ttl: Option<std::time::Duration>,
    ) -> Result<(), LuniError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(client_id).await;
        let now = self.clock.now();
        file.sweep_expired(now);
        file.set(key, value, self.ttl_or_default(ttl), now, self.max_keys)?;
        self.save(client_id, &mut file).await?;
        tracing::debug!(client_id, key, keys = file.entries.len(), "variable saved");
        Ok(())
    }

    /// Unexpired values. Expired keys are removed from disk as a side effect.
    #[doc(alias = "getVariaveisValidas")]
    pub async fn valid(&self, client_id: &str) -> Result<Map<String, Value>, LuniError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(client_id).await;
        let removed = file.sweep_expired(self.clock.now());
        if removed > 0 {
            tracing::debug!(client_id, removed, "expired variables swept");
            self.save(client_id, &mut file).await?;
        }
        Ok(file.values())
    }

    pub async fn get(&self, client_id: &str, key: &str) -> Result<Option<Value>, LuniError> {
        Ok(self.valid(client_id).await?.remove(key))
    }

    #[doc(alias = "deletarVariavel")]
    pub async fn delete(&self, client_id: &str, key: &str) -> Result<bool, LuniError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(client_id).await;
        if file.entries.remove(key).is_none() {
            return Ok(false);
        }
        self.save(client_id, &mut file).await?;
        Ok(true)
    }

    /// Push a key's expiry forward. Expired or unknown keys are not revived.
    #[doc(alias = "renovarVariavel")]
    pub async fn renew(
        &self,
        client_id: &str,
        key: &str,
        ttl: Option<std::time::Duration>,
    ) -> Result<bool, LuniError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load(client_id).await;
        let now = self.clock.now();
        let swept = file.sweep_expired(now);
        let renewed = file.renew(key, self.ttl_or_default(ttl), now)?;
        if renewed || swept > 0 {
            self.save(client_id, &mut file).await?;
        }
        Ok(renewed)
    }

    pub async fn stats(&self, client_id: &str) -> VariableStats {
        self.load(client_id).await.meta.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luni_core::ManualClock;
    use serde_json::json;

    const HOUR: std::time::Duration = std::time::Duration::from_secs(3600);

    async fn store(max_keys: usize) -> (tempfile::TempDir, Arc<ManualClock>, VariableStore) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000));
        let store = VariableStore::open(dir.path(), max_keys, 48 * HOUR, clock.clone())
            .await
            .unwrap();
        (dir, clock, store)
    }

    #[tokio::test]
    async fn expired_variable_is_dropped_and_persisted() {
        let (_dir, clock, store) = store(200).await;
        store.set("c1", "k", json!(1), Some(HOUR)).await.unwrap();

        clock.advance(Duration::minutes(59));
        assert_eq!(store.valid("c1").await.unwrap().get("k"), Some(&json!(1)));

        clock.advance(Duration::minutes(2));
        assert!(store.valid("c1").await.unwrap().is_empty());

        let on_disk: VariablesFile = store.files().read("c1_vars.json").await.unwrap();
        assert!(on_disk.entries.is_empty());
        assert_eq!(on_disk.meta.stats.expirations, 1);
        assert_eq!(on_disk.meta.version, 2);
    }

    #[tokio::test]
    async fn objects_merge_and_nulls_do_not_erase() {
        let (_dir, _clock, store) = store(200).await;
        store
            .set("c1", "perfil", json!({"nome": "Ana", "cidade": "Recife"}), None)
            .await
            .unwrap();
        store
            .set("c1", "perfil", json!({"cidade": null, "idade": 30}), None)
            .await
            .unwrap();
        let vals = store.valid("c1").await.unwrap();
        assert_eq!(
            vals["perfil"],
            json!({"nome": "Ana", "cidade": "Recife", "idade": 30})
        );
    }

    #[tokio::test]
    async fn oldest_keys_pruned_past_cap() {
        let (_dir, clock, store) = store(3).await;
        for k in ["a", "b", "c", "d"] {
            store.set("c1", k, json!(k), None).await.unwrap();
            clock.advance(Duration::seconds(1));
        }
        let vals = store.valid("c1").await.unwrap();
        assert_eq!(vals.keys().collect::<Vec<_>>(), ["b", "c", "d"]);
        assert_eq!(store.stats("c1").await.prunes, 1);
    }

    #[tokio::test]
    async fn renew_extends_expiry() {
        let (_dir, clock, store) = store(200).await;
        store.set("c1", "k", json!(true), Some(HOUR)).await.unwrap();
        clock.advance(Duration::minutes(50));
        assert!(store.renew("c1", "k", Some(HOUR)).await.unwrap());
        clock.advance(Duration::minutes(50));
        assert_eq!(store.get("c1", "k").await.unwrap(), Some(json!(true)));
        assert!(!store.renew("c1", "missing", None).await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let (_dir, _clock, store) = store(200).await;
        store.set("c1", "k", json!(1), None).await.unwrap();
        assert!(store.delete("c1", "k").await.unwrap());
        assert!(!store.delete("c1", "k").await.unwrap());
        assert!(store.valid("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reserved_key_is_rejected_and_file_stays_readable() {
        let (_dir, _clock, store) = store(200).await;
        store.set("c1", "k", json!(1), None).await.unwrap();
        let err = store.set("c1", "__meta", json!({"x": 1}), None).await.unwrap_err();
        assert!(matches!(err, LuniError::ReservedKey { .. }));
        assert!(store.renew("c1", "__meta", None).await.is_err());

        let on_disk: VariablesFile = store.files().read("c1_vars.json").await.unwrap();
        assert_eq!(on_disk.values().get("k"), Some(&json!(1)));
        assert_eq!(on_disk.meta.stats.writes, 1);
    }

    #[tokio::test]
    async fn clients_are_isolated() {
        let (_dir, _clock, store) = store(200).await;
        store.set("c1", "k", json!(1), None).await.unwrap();
        assert!(store.valid("c2").await.unwrap().is_empty());
    }
}
