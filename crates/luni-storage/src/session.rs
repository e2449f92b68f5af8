// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed session store used when the remote cache is unavailable.
//!
//! Sessions are indexed in memory and mirrored to `session_<id>.json`. Every
//! access checks liveness against the configured timeout and reaps expired
//! sessions from both the index and disk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use luni_config::model::SessionConfig;
use luni_core::session::TOPIC_CHANGE_TAG;
use luni_core::{
    AdapterType, BackendKind, Clock, HealthStatus, LockAcquisition, LuniError, PluginAdapter,
    Session, SessionMessage, SessionStore, SessionUpdate,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::json_file::{JsonFileStore, sanitize_key};

const SESSION_PREFIX: &str = "session_";

/// Tuning for [`FileSessionStore`].
#[derive(Debug, Clone)]
pub struct FileSessionOptions {
    /// Inactivity after which a session is no longer live.
    pub timeout: Duration,
    /// Messages kept in each session's window.
    pub message_window: usize,
}

impl From<&SessionConfig> for FileSessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            timeout: config.fallback_timeout(),
            message_window: config.message_window,
        }
    }
}

/// Why a client is treated as starting a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewSessionReason {
    NoPreviousActivity,
    Timeout,
    TopicChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Continuing,
    New(NewSessionReason),
}

impl Freshness {
    pub fn is_new(self) -> bool {
        matches!(self, Freshness::New(_))
    }
}

/// Per-client activity marker, `<client>_sessao.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActivityMarker {
    #[serde(rename = "ultimaInteracao")]
    last_interaction: i64,
}

#[derive(Default)]
struct SessionIndex {
    sessions: HashMap<String, Session>,
    by_client: HashMap<String, String>,
}

impl SessionIndex {
    fn insert(&mut self, session: Session) {
        self.by_client
            .insert(session.client_id.clone(), session.id.clone());
        self.sessions.insert(session.id.clone(), session);
    }

    fn remove(&mut self, session_id: &str) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        if self.by_client.get(&session.client_id).map(String::as_str) == Some(session_id) {
            self.by_client.remove(&session.client_id);
        }
        Some(session)
    }
}

/// Sessions held in memory and persisted as JSON files.
pub struct FileSessionStore {
    files: JsonFileStore,
    clock: Arc<dyn Clock>,
    timeout_ms: i64,
    window: usize,
    index: RwLock<SessionIndex>,
}

impl FileSessionStore {
    /// Open the directory and load every live session found there.
    pub async fn open(
        dir: impl Into<PathBuf>,
        options: FileSessionOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LuniError> {
        let store = Self {
            files: JsonFileStore::open(dir).await?,
            clock,
            timeout_ms: i64::try_from(options.timeout.as_millis()).unwrap_or(i64::MAX),
            window: options.message_window,
            index: RwLock::new(SessionIndex::default()),
        };
        store.load_persisted().await?;
        Ok(store)
    }

    pub fn files(&self) -> &JsonFileStore {
        &self.files
    }

    fn file_name(session_id: &str) -> String {
        format!("{SESSION_PREFIX}{}.json", sanitize_key(session_id))
    }

    fn marker_name(client_id: &str) -> String {
        format!("{}_sessao.json", sanitize_key(client_id))
    }

    async fn load_persisted(&self) -> Result<(), LuniError> {
        let now = self.clock.now_millis();
        let mut index = self.index.write().await;
        let mut expired = 0usize;
        for name in self.files.list(SESSION_PREFIX).await? {
            let Some(session) = self.files.read::<Session>(&name).await else {
                continue;
            };
            if !session.is_live(now, self.timeout_ms) {
                self.files.remove(&name).await?;
                expired += 1;
                continue;
            }
            // Keep the most recently active session per client.
            let newer = index
                .by_client
                .get(&session.client_id)
                .and_then(|id| index.sessions.get(id))
                .is_none_or(|current| current.last_activity <= session.last_activity);
            if newer {
                index.insert(session);
            } else {
                index.sessions.insert(session.id.clone(), session);
            }
        }
        tracing::info!(
            loaded = index.sessions.len(),
            expired,
            dir = %self.files.dir().display(),
            "file session store loaded"
        );
        Ok(())
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.files.write(&Self::file_name(&session.id), session).await {
            tracing::warn!(session_id = %session.id, error = %e, "failed to persist session, keeping in memory");
        }
    }

    async fn reap(&self, index: &mut SessionIndex, session_id: &str) {
        if index.remove(session_id).is_some() {
            tracing::debug!(session_id, "session expired");
        }
        if let Err(e) = self.files.remove(&Self::file_name(session_id)).await {
            tracing::warn!(session_id, error = %e, "failed to delete expired session file");
        }
    }

    async fn touch_marker(&self, client_id: &str, now_ms: i64) {
        let marker = ActivityMarker {
            last_interaction: now_ms,
        };
        if let Err(e) = self.files.write(&Self::marker_name(client_id), &marker).await {
            tracing::warn!(client_id, error = %e, "failed to refresh activity marker");
        }
    }

    /// Whether the client's next message starts a new session.
    #[doc(alias = "isNovaSessao")]
    pub async fn check_freshness(&self, client_id: &str, tags: &[String]) -> Freshness {
        if tags.iter().any(|t| t == TOPIC_CHANGE_TAG) {
            return Freshness::New(NewSessionReason::TopicChange);
        }
        let Some(marker) = self
            .files
            .read::<ActivityMarker>(&Self::marker_name(client_id))
            .await
        else {
            return Freshness::New(NewSessionReason::NoPreviousActivity);
        };
        if self.clock.now_millis() - marker.last_interaction > self.timeout_ms {
            Freshness::New(NewSessionReason::Timeout)
        } else {
            Freshness::Continuing
        }
    }

    /// Apply `f` to a live session and persist it.
    async fn modify<F>(&self, session_id: &str, f: F) -> Result<Option<Session>, LuniError>
    where
        F: FnOnce(&mut Session, i64) -> Result<(), LuniError> + Send,
    {
        let now = self.clock.now_millis();
        let mut index = self.index.write().await;
        let live = match index.sessions.get(session_id) {
            None => return Ok(None),
            Some(s) => s.is_live(now, self.timeout_ms),
        };
        if !live {
            self.reap(&mut index, session_id).await;
            return Ok(None);
        }
        let Some(session) = index.sessions.get_mut(session_id) else {
            return Ok(None);
        };
        f(session, now)?;
        let snapshot = session.clone();
        drop(index);
        self.persist(&snapshot).await;
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl PluginAdapter for FileSessionStore {
    fn name(&self) -> &str {
        "file-sessions"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::SessionStore
    }

    async fn health_check(&self) -> Result<HealthStatus, LuniError> {
        Ok(match self.files.probe().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), LuniError> {
        let index = self.index.read().await;
        for session in index.sessions.values() {
            self.persist(session).await;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Fallback
    }

    async fn create_session(
        &self,
        client_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<Session, LuniError> {
        let now = self.clock.now_millis();
        let session = Session::new(client_id, metadata, now)?;
        self.persist(&session).await;
        self.touch_marker(client_id, now).await;
        self.index.write().await.insert(session.clone());
        tracing::debug!(client_id, session_id = %session.id, "session created");
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, LuniError> {
        let now = self.clock.now_millis();
        {
            let index = self.index.read().await;
            match index.sessions.get(session_id) {
                None => return Ok(None),
                Some(s) if s.is_live(now, self.timeout_ms) => return Ok(Some(s.clone())),
                Some(_) => {}
            }
        }
        let mut index = self.index.write().await;
        self.reap(&mut index, session_id).await;
        Ok(None)
    }

    async fn get_session_by_client(&self, client_id: &str) -> Result<Option<Session>, LuniError> {
        let id = self.index.read().await.by_client.get(client_id).cloned();
        match id {
            Some(id) => self.get_session(&id).await,
            None => Ok(None),
        }
    }

    async fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Option<Session>, LuniError> {
        self.modify(session_id, |session, now| {
            session.apply_update(&update, now)?;
            Ok(())
        })
        .await
    }

    async fn add_message(
        &self,
        session_id: &str,
        text: &str,
        tags: Vec<String>,
    ) -> Result<Option<Session>, LuniError> {
        let window = self.window;
        let updated = self
            .modify(session_id, |session, now| {
                session.record_message(
                    SessionMessage {
                        text: text.to_string(),
                        timestamp: now,
                        tags,
                    },
                    window,
                );
                Ok(())
            })
            .await?;
        if let Some(session) = &updated {
            self.touch_marker(&session.client_id, session.last_activity)
                .await;
        }
        Ok(updated)
    }

    async fn get_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionMessage>, LuniError> {
        Ok(self
            .get_session(session_id)
            .await?
            .map(|s| s.recent_messages(limit))
            .unwrap_or_default())
    }

    async fn set_summary(&self, session_id: &str, _summary: &str) -> Result<bool, LuniError> {
        tracing::debug!(session_id, "summaries are not kept by the file backend");
        Ok(false)
    }

    async fn set_focus(&self, session_id: &str, focus: Value) -> Result<bool, LuniError> {
        let updated = self
            .modify(session_id, |session, now| {
                session.set_focus(focus, now);
                Ok(())
            })
            .await?;
        Ok(updated.is_some())
    }

    async fn try_lock(
        &self,
        _session_id: &str,
        _name: &str,
        _ttl: Duration,
    ) -> Result<LockAcquisition, LuniError> {
        Ok(LockAcquisition::Unsupported)
    }

    async fn release_lock(&self, _session_id: &str, _name: &str) -> Result<(), LuniError> {
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize, LuniError> {
        let now = self.clock.now_millis();
        let mut index = self.index.write().await;
        let expired: Vec<String> = index
            .sessions
            .values()
            .filter(|s| !s.is_live(now, self.timeout_ms))
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            self.reap(&mut index, id).await;
        }
        if !expired.is_empty() {
            tracing::info!(reaped = expired.len(), "expired file sessions removed");
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luni_core::{ManualClock, with_lock};
    use serde_json::json;

    const HOUR_MS: i64 = 3_600_000;

    fn options() -> FileSessionOptions {
        FileSessionOptions {
            timeout: Duration::from_secs(12 * 3600),
            message_window: 20,
        }
    }

    async fn open(dir: &std::path::Path, clock: Arc<ManualClock>) -> FileSessionStore {
        FileSessionStore::open(dir, options(), clock).await.unwrap()
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000))
    }

    #[tokio::test]
    async fn create_and_lookup_by_client() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), clock()).await;
        let s = store.create_session("acme", Map::new()).await.unwrap();
        assert!(s.id.starts_with("sess_1700000000000_"));
        assert_eq!(s.metadata.funnel_stage, "descoberta");
        assert!(s.metadata.first_interaction);

        let found = store.get_session_by_client("acme").await.unwrap().unwrap();
        assert_eq!(found.id, s.id);
        assert!(store.get_session_by_client("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_window_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), clock()).await;
        let s = store.create_session("acme", Map::new()).await.unwrap();
        for i in 0..25 {
            store
                .add_message(&s.id, &format!("m{i}"), vec![])
                .await
                .unwrap();
        }
        let s = store.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(s.stats.message_count, 25);
        assert_eq!(s.context.messages.len(), 20);
        assert_eq!(s.context.messages[0].text, "m5");
        assert!(!s.metadata.first_interaction);

        let last = store.get_messages(&s.id, 3).await.unwrap();
        let texts: Vec<_> = last.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m22", "m23", "m24"]);
    }

    #[tokio::test]
    async fn liveness_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let store = open(dir.path(), clock.clone()).await;
        let s = store.create_session("acme", Map::new()).await.unwrap();

        clock.advance(chrono::Duration::milliseconds(12 * HOUR_MS - 1));
        assert!(store.get_session(&s.id).await.unwrap().is_some());

        clock.advance(chrono::Duration::milliseconds(1));
        assert!(store.get_session(&s.id).await.unwrap().is_none());
        assert!(!store.files().exists(&FileSessionStore::file_name(&s.id)).await);
        assert!(store.get_session_by_client("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_merges_sections() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), clock()).await;
        let s = store
            .create_session("acme", json!({"canal": "whatsapp"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        let updated = store
            .update_session(
                &s.id,
                SessionUpdate::new()
                    .metadata("funnelStage", json!("negociacao"))
                    .context("tags", json!(["vip"])),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.metadata.funnel_stage, "negociacao");
        assert_eq!(updated.metadata.extra["canal"], json!("whatsapp"));
        assert_eq!(updated.context.tags, ["vip"]);
        assert!(store.update_session("nope", SessionUpdate::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_survive_reopen_and_expired_files_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let (live, stale) = {
            let store = open(dir.path(), clock.clone()).await;
            let stale = store.create_session("old", Map::new()).await.unwrap();
            clock.advance(chrono::Duration::hours(11));
            let live = store.create_session("acme", Map::new()).await.unwrap();
            store.add_message(&live.id, "oi", vec![]).await.unwrap();
            (live, stale)
        };
        clock.advance(chrono::Duration::hours(2));

        let store = open(dir.path(), clock.clone()).await;
        let reloaded = store.get_session_by_client("acme").await.unwrap().unwrap();
        assert_eq!(reloaded.id, live.id);
        assert_eq!(reloaded.context.messages.len(), 1);
        assert!(!store.files().exists(&FileSessionStore::file_name(&stale.id)).await);
    }

    #[tokio::test]
    async fn cleanup_reaps_expired() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let store = open(dir.path(), clock.clone()).await;
        store.create_session("a", Map::new()).await.unwrap();
        store.create_session("b", Map::new()).await.unwrap();
        clock.advance(chrono::Duration::hours(13));
        store.create_session("c", Map::new()).await.unwrap();
        assert_eq!(store.cleanup_expired().await.unwrap(), 2);
        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn summary_is_not_supported_but_focus_is() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), clock()).await;
        let s = store.create_session("acme", Map::new()).await.unwrap();
        assert!(!store.set_summary(&s.id, "resumo").await.unwrap());
        assert!(store.set_focus(&s.id, json!({"produto": "x"})).await.unwrap());
        let s = store.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(s.metadata.focus_current, Some(json!({"produto": "x"})));
        assert_eq!(s.context.last_intent_at, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn locks_run_unguarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), clock()).await;
        let s = store.create_session("acme", Map::new()).await.unwrap();
        let outcome = with_lock(&store, &s.id, "reply", Duration::from_secs(30), || async { 7 })
            .await
            .unwrap();
        assert!(!outcome.was_exclusive());
        assert_eq!(outcome.into_result(), Some(7));
    }

    #[tokio::test]
    async fn freshness_marker() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock();
        let store = open(dir.path(), clock.clone()).await;
        assert_eq!(
            store.check_freshness("acme", &[]).await,
            Freshness::New(NewSessionReason::NoPreviousActivity)
        );
        let s = store.create_session("acme", Map::new()).await.unwrap();
        store.add_message(&s.id, "oi", vec![]).await.unwrap();
        assert_eq!(store.check_freshness("acme", &[]).await, Freshness::Continuing);
        assert!(
            store
                .check_freshness("acme", &[TOPIC_CHANGE_TAG.to_string()])
                .await
                .is_new()
        );
        clock.advance(chrono::Duration::hours(13));
        assert_eq!(
            store.check_freshness("acme", &[]).await,
            Freshness::New(NewSessionReason::Timeout)
        );
    }
}
