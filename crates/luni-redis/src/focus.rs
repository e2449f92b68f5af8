// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Focus store on the remote cache, one hash per client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use luni_core::focus::{self, FocusCategories, FocusPolicy, FocusRecord};
use luni_core::{
    AdapterType, BackendKind, Clock, FocusStore, HealthStatus, LuniError, PluginAdapter,
};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::keys::KeySpace;
use crate::remote::RemoteCache;

pub fn focus_fields(record: &FocusRecord) -> Result<Vec<(String, String)>, serde_json::Error> {
    let mut fields = vec![("focos".to_string(), serde_json::to_string(&record.focos)?)];
    if let Some(at) = record.atualizado_em {
        fields.push(("atualizado_em".to_string(), at.to_rfc3339()));
    }
    if let Some(name) = &record.file_name {
        fields.push(("nomeArquivo".to_string(), name.clone()));
    }
    Ok(fields)
}

/// `None` when the hash has no usable `focos` field.
pub fn focus_from_fields(fields: &HashMap<String, String>) -> Option<FocusRecord> {
    let focos: FocusCategories = serde_json::from_str(fields.get("focos")?).ok()?;
    Some(FocusRecord {
        focos,
        atualizado_em: fields
            .get("atualizado_em")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc)),
        file_name: fields.get("nomeArquivo").cloned(),
    })
}

pub struct RedisFocusStore {
    remote: Arc<dyn RemoteCache>,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
    policy: FocusPolicy,
    ttl: Duration,
    // Serializes this process's read-merge-write cycles.
    write_lock: Mutex<()>,
}

impl RedisFocusStore {
    pub fn new(
        remote: Arc<dyn RemoteCache>,
        keys: KeySpace,
        policy: FocusPolicy,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            keys,
            clock,
            policy,
            ttl,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self, client_id: &str) -> Result<Option<FocusRecord>, LuniError> {
        let fields = self.remote.hgetall(&self.keys.focus(client_id)).await?;
        Ok(focus_from_fields(&fields))
    }

    /// Read for display paths: failures degrade to "no record".
    async fn load_or_none(&self, client_id: &str) -> Option<FocusRecord> {
        match self.load(client_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(client_id, error = %e, "remote focus read failed");
                None
            }
        }
    }

    async fn save(&self, client_id: &str, record: &FocusRecord) -> Result<(), LuniError> {
        self.remote
            .hset_ex(&self.keys.focus(client_id), &focus_fields(record)?, self.ttl)
            .await
    }
}

#[async_trait]
impl PluginAdapter for RedisFocusStore {
    fn name(&self) -> &str {
        "redis-focus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::FocusStore
    }

    async fn health_check(&self) -> Result<HealthStatus, LuniError> {
        Ok(match self.remote.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), LuniError> {
        let _guard = self.write_lock.lock().await;
        Ok(())
    }
}

#[async_trait]
impl FocusStore for RedisFocusStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn policy(&self) -> &FocusPolicy {
        &self.policy
    }

    async fn update_focus(
        &self,
        client_id: &str,
        update: Map<String, Value>,
    ) -> Result<FocusRecord, LuniError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let stored = match self.load(client_id).await {
            Ok(stored) => stored,
            Err(e) if e.is_connectivity() => {
                // Unknown stored state: answer from the update alone, write nothing.
                tracing::warn!(client_id, error = %e, "remote focus read failed, update not persisted");
                let mut record = FocusRecord::empty(client_id, now);
                focus::apply_update(&mut record, &update, &self.policy, now);
                return Ok(record);
            }
            Err(e) => return Err(e),
        };
        let mut record = stored.unwrap_or_else(|| FocusRecord::empty(client_id, now));
        focus::apply_update(&mut record, &update, &self.policy, now);
        if let Err(e) = self.save(client_id, &record).await {
            if !e.is_connectivity() {
                return Err(e);
            }
            tracing::warn!(client_id, error = %e, "remote focus write failed, update not persisted");
        }
        Ok(record)
    }

    async fn get_focus(&self, client_id: &str) -> Result<FocusRecord, LuniError> {
        Ok(self
            .load_or_none(client_id)
            .await
            .unwrap_or_else(|| FocusRecord::empty(client_id, self.clock.now())))
    }

    async fn get_valid_focus(&self, client_id: &str) -> Result<FocusRecord, LuniError> {
        let record = self.get_focus(client_id).await?;
        Ok(focus::valid_view(&record, &self.policy, self.clock.now()))
    }

    async fn prune_expired(&self, client_id: &str) -> Result<bool, LuniError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.load_or_none(client_id).await else {
            return Ok(false);
        };
        if !focus::prune_expired(&mut record, &self.policy, self.clock.now()) {
            return Ok(false);
        }
        match self.save(client_id, &record).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(client_id, error = %e, "remote focus prune not persisted");
                Ok(false)
            }
        }
    }

    async fn remove_category(&self, client_id: &str, category: &str) -> Result<bool, LuniError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.load_or_none(client_id).await else {
            return Ok(false);
        };
        if !record.remove_category(category) {
            return Ok(false);
        }
        record.atualizado_em = Some(self.clock.now());
        match self.save(client_id, &record).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(client_id, category, error = %e, "remote focus category removal failed");
                Ok(false)
            }
        }
    }

    async fn set_active_focus(&self, client_id: &str, value: Value) -> Result<(), LuniError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut record = self
            .load(client_id)
            .await?
            .unwrap_or_else(|| FocusRecord::empty(client_id, now));
        record.set_active_focus(value);
        record.atualizado_em = Some(now);
        self.save(client_id, &record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luni_core::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hash-only cache whose next `failing_reads` hgetall calls time out.
    #[derive(Default)]
    struct FlakyHashes {
        hashes: Mutex<HashMap<String, HashMap<String, String>>>,
        failing_reads: AtomicUsize,
    }

    #[async_trait]
    impl RemoteCache for FlakyHashes {
        async fn get(&self, _key: &str) -> Result<Option<String>, LuniError> {
            Ok(None)
        }

        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), LuniError> {
            Ok(())
        }

        async fn set_nx_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, LuniError> {
            Ok(true)
        }

        async fn del(&self, keys: &[String]) -> Result<usize, LuniError> {
            let mut hashes = self.hashes.lock().await;
            Ok(keys.iter().filter(|k| hashes.remove(*k).is_some()).count())
        }

        async fn expire(&self, key: &str, _ttl: Duration) -> Result<bool, LuniError> {
            Ok(self.hashes.lock().await.contains_key(key))
        }

        async fn hset_ex(
            &self,
            key: &str,
            fields: &[(String, String)],
            _ttl: Duration,
        ) -> Result<(), LuniError> {
            let mut hashes = self.hashes.lock().await;
            hashes.entry(key.to_string()).or_default().extend(fields.iter().cloned());
            Ok(())
        }

        async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, LuniError> {
            let pending = self.failing_reads.load(Ordering::SeqCst);
            if pending > 0 {
                self.failing_reads.store(pending - 1, Ordering::SeqCst);
                return Err(LuniError::Timeout {
                    duration: Duration::from_millis(500),
                });
            }
            Ok(self.hashes.lock().await.get(key).cloned().unwrap_or_default())
        }

        async fn push_capped(
            &self,
            _key: &str,
            _value: &str,
            _cap: usize,
            _ttl: Duration,
        ) -> Result<(), LuniError> {
            Ok(())
        }

        async fn list_head(&self, _key: &str, _count: usize) -> Result<Vec<String>, LuniError> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<(), LuniError> {
            Ok(())
        }
    }

    fn flaky_store() -> (Arc<FlakyHashes>, RedisFocusStore) {
        let remote = Arc::new(FlakyHashes::default());
        let store = RedisFocusStore::new(
            remote.clone(),
            KeySpace::new("luni", "test"),
            FocusPolicy::default(),
            Duration::from_secs(3600),
            Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000)),
        );
        (remote, store)
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn failed_read_does_not_overwrite_stored_focus() {
        let (remote, store) = flaky_store();
        store
            .update_focus(
                "acme",
                obj(json!({"produto": ["cafe"], "duvidasRecentes": ["preço?"]})),
            )
            .await
            .unwrap();

        remote.failing_reads.store(1, Ordering::SeqCst);
        let degraded = store
            .update_focus("acme", obj(json!({"duvidasRecentes": ["prazo?"]})))
            .await
            .unwrap();
        assert_eq!(degraded.focos.recent_questions, ["prazo?"]);

        let stored = store.get_focus("acme").await.unwrap();
        assert_eq!(stored.focos.products.len(), 1);
        assert_eq!(stored.focos.products[0].name, "cafe");
        assert_eq!(stored.focos.recent_questions, ["preço?"]);
    }

    #[tokio::test]
    async fn failed_read_fails_active_focus_write() {
        let (remote, store) = flaky_store();
        store
            .update_focus("acme", obj(json!({"produto": ["cafe"]})))
            .await
            .unwrap();

        remote.failing_reads.store(1, Ordering::SeqCst);
        let result = store.set_active_focus("acme", json!({"tipo": "produto"})).await;
        assert!(matches!(result, Err(LuniError::Timeout { .. })));

        let stored = store.get_focus("acme").await.unwrap();
        assert_eq!(stored.focos.products[0].name, "cafe");
        assert!(stored.active_focus().is_none());
    }

    #[test]
    fn hash_round_trip() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut record = FocusRecord::empty("acme", now);
        focus::apply_update(
            &mut record,
            json!({"produto": ["cafe"], "duvidasRecentes": ["preço?"]})
                .as_object()
                .unwrap(),
            &FocusPolicy::default(),
            now,
        );
        let fields: HashMap<String, String> = focus_fields(&record).unwrap().into_iter().collect();
        assert_eq!(fields["nomeArquivo"], "focos_acme.json");

        let back = focus_from_fields(&fields).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn missing_or_corrupt_focos_is_no_record() {
        assert!(focus_from_fields(&HashMap::new()).is_none());
        let fields = HashMap::from([("focos".to_string(), "[oops".to_string())]);
        assert!(focus_from_fields(&fields).is_none());
    }
}
