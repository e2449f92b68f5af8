// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed focus store, one `focos_<client>.json` per client.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use luni_core::focus::{self, FocusPolicy, FocusRecord};
use luni_core::{
    AdapterType, BackendKind, Clock, FocusStore, HealthStatus, LuniError, PluginAdapter,
};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::json_file::{JsonFileStore, sanitize_key};

pub struct FileFocusStore {
    files: JsonFileStore,
    clock: Arc<dyn Clock>,
    policy: FocusPolicy,
    write_lock: Mutex<()>,
}

impl FileFocusStore {
    pub async fn open(
        dir: impl Into<PathBuf>,
        policy: FocusPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LuniError> {
        Ok(Self {
            files: JsonFileStore::open(dir).await?,
            clock,
            policy,
            write_lock: Mutex::new(()),
        })
    }

    pub fn files(&self) -> &JsonFileStore {
        &self.files
    }

    fn file_name(client_id: &str) -> String {
        format!("focos_{}.json", sanitize_key(client_id))
    }

    async fn load(&self, client_id: &str) -> Option<FocusRecord> {
        self.files.read(&Self::file_name(client_id)).await
    }

    async fn save(&self, client_id: &str, record: &FocusRecord) -> Result<(), LuniError> {
        self.files.write(&Self::file_name(client_id), record).await
    }
}

#[async_trait]
impl PluginAdapter for FileFocusStore {
    fn name(&self) -> &str {
        "file-focus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::FocusStore
    }

    async fn health_check(&self) -> Result<HealthStatus, LuniError> {
        Ok(match self.files.probe().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), LuniError> {
        // Wait out any in-flight write.
        let _guard = self.write_lock.lock().await;
        Ok(())
    }
}

#[async_trait]
impl FocusStore for FileFocusStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Fallback
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
        let mut record = self
            .load(client_id)
            .await
            .unwrap_or_else(|| FocusRecord::empty(client_id, now));
        focus::apply_update(&mut record, &update, &self.policy, now);
        self.save(client_id, &record).await?;
        tracing::debug!(client_id, keys = update.len(), "focus updated");
        Ok(record)
    }

    async fn get_focus(&self, client_id: &str) -> Result<FocusRecord, LuniError> {
        Ok(self
            .load(client_id)
            .await
            .unwrap_or_else(|| FocusRecord::empty(client_id, self.clock.now())))
    }

    async fn get_valid_focus(&self, client_id: &str) -> Result<FocusRecord, LuniError> {
        let record = self.get_focus(client_id).await?;
        Ok(focus::valid_view(&record, &self.policy, self.clock.now()))
    }

    async fn prune_expired(&self, client_id: &str) -> Result<bool, LuniError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.load(client_id).await else {
            return Ok(false);
        };
        let changed = focus::prune_expired(&mut record, &self.policy, self.clock.now());
        if changed {
            self.save(client_id, &record).await?;
            tracing::debug!(client_id, "stale focus entries removed");
        }
        Ok(changed)
    }

    async fn remove_category(&self, client_id: &str, category: &str) -> Result<bool, LuniError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.load(client_id).await else {
            return Ok(false);
        };
        if !record.remove_category(category) {
            return Ok(false);
        }
        record.atualizado_em = Some(self.clock.now());
        self.save(client_id, &record).await?;
        Ok(true)
    }

    async fn set_active_focus(&self, client_id: &str, value: Value) -> Result<(), LuniError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut record = self
            .load(client_id)
            .await
            .unwrap_or_else(|| FocusRecord::empty(client_id, now));
        record.set_active_focus(value);
        record.atualizado_em = Some(now);
        self.save(client_id, &record).await
    }
}
