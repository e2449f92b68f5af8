// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The store facade handed to request handlers.
//!
//! [`StoreAdapter`] is built once at startup. Session and focus operations
//! pass through to the selected backend and are wrapped with duration and
//! outcome telemetry. Variables always live in local files.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use luni_cache::{CacheManager, CacheStatsSnapshot};
use luni_config::LuniConfig;
use luni_core::{
    BackendKind, Clock, FocusRecord, FocusStore, HealthStatus, LockOutcome, LuniError, Session,
    SessionMessage, SessionStore, SystemClock, with_lock,
};
use luni_redis::{RedisConnector, RemoteCache};
use luni_storage::{FileSessionStore, VariableStore};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{self, Backends};
use crate::monitor::{MonitorSnapshot, OperationCategory, OperationMonitor};

/// Messages returned by [`StoreAdapter::get_session_messages`] by default.
pub const DEFAULT_MESSAGE_LIMIT: usize = 12;

/// What a handler needs to start a turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    pub focus_current: Option<Value>,
    pub funnel_stage: String,
    pub first_interaction: bool,
    #[serde(skip)]
    pub session: Session,
}

impl From<Session> for SessionHandle {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id.clone(),
            focus_current: session.metadata.focus_current.clone(),
            funnel_stage: session.metadata.funnel_stage.clone(),
            first_interaction: session.metadata.first_interaction,
            session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub session_store: &'static str,
    pub focus_store: &'static str,
    pub overall: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHealth {
    pub sessions: HealthStatus,
    pub focus: HealthStatus,
    pub variables: HealthStatus,
}

impl StoreHealth {
    pub fn is_healthy(&self) -> bool {
        self.sessions.is_operational()
            && self.focus.is_operational()
            && self.variables.is_operational()
    }

    /// The first unusable component as an error.
    fn failure(&self) -> Option<LuniError> {
        [
            ("sessions", &self.sessions),
            ("focus", &self.focus),
            ("variables", &self.variables),
        ]
        .into_iter()
        .find_map(|(name, status)| match status {
            HealthStatus::Unhealthy(reason) => Some(LuniError::HealthCheckFailed {
                name: name.to_string(),
                source: reason.clone().into(),
            }),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetrics {
    pub backend: BackendKind,
    pub remote_requested: bool,
    pub storage: StorageInfo,
    pub health: StoreHealth,
    pub monitor: MonitorSnapshot,
    pub cache: BTreeMap<String, CacheStatsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub sessions_reaped: usize,
    pub cache_entries_swept: usize,
}

pub struct StoreAdapter {
    kind: BackendKind,
    remote_requested: bool,
    sessions: Arc<dyn SessionStore>,
    focus: Arc<dyn FocusStore>,
    variables: VariableStore,
    cache: Arc<CacheManager>,
    monitor: OperationMonitor,
    connector: Option<Arc<RedisConnector>>,
    file_sessions: Option<Arc<FileSessionStore>>,
    lock_ttl: Duration,
}

impl StoreAdapter {
    /// Select the backend from configuration using the system clock.
    pub async fn init(config: &LuniConfig) -> Result<Self, LuniError> {
        Self::init_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn init_with_clock(
        config: &LuniConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LuniError> {
        let backends = backend::select(config, clock.clone()).await?;
        Self::assemble(config, backends, clock).await
    }

    /// Use a caller-provided remote cache instead of connecting to Redis.
    ///
    /// The remote is probed once; a failed probe selects the file backend.
    pub async fn with_remote(
        config: &LuniConfig,
        remote: Arc<dyn RemoteCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LuniError> {
        let backends = backend::select_with_remote(config, remote, clock.clone()).await?;
        Self::assemble(config, backends, clock).await
    }

    async fn assemble(
        config: &LuniConfig,
        backends: Backends,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LuniError> {
        let variables = VariableStore::open(
            config.storage.variables_path(),
            config.variables.max_keys,
            config.variables.default_ttl(),
            clock.clone(),
        )
        .await?;
        let monitor = OperationMonitor::new(config.monitoring.clone(), clock);
        if backends.fell_back {
            monitor.track_fallback();
            luni_prometheus::record_fallback();
        }
        tracing::info!(
            backend = %backends.kind,
            storage = backends.kind.storage_label(),
            "store adapter initialized"
        );
        Ok(Self {
            kind: backends.kind,
            remote_requested: config.store.use_redis,
            sessions: backends.sessions,
            focus: backends.focus,
            variables,
            cache: Arc::new(CacheManager::from_config(&config.cache)),
            monitor,
            connector: backends.connector,
            file_sessions: backends.file_sessions,
            lock_ttl: config.store.lock_ttl(),
        })
    }

    pub fn backend(&self) -> BackendKind {
        self.kind
    }

    pub fn monitor(&self) -> &OperationMonitor {
        &self.monitor
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Time `fut` and record its outcome against `op`.
    async fn observe<T, F>(
        &self,
        op: &'static str,
        category: OperationCategory,
        fut: F,
    ) -> Result<T, LuniError>
    where
        F: Future<Output = Result<T, LuniError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.record(op, category, start.elapsed(), result.as_ref().err());
        result
    }

    fn record(
        &self,
        op: &'static str,
        category: OperationCategory,
        elapsed: Duration,
        error: Option<&LuniError>,
    ) {
        luni_prometheus::record_operation(op, self.kind.storage_label(), error.is_none(), elapsed);
        let message = error.map(ToString::to_string);
        self.monitor
            .track_operation(category, elapsed, message.as_deref());
        match (error, self.kind) {
            (Some(e), BackendKind::Remote) if e.is_connectivity() => {
                self.monitor.track_remote_error(&e.to_string());
            }
            (_, BackendKind::Remote) => self.monitor.track_remote_hit(),
            (_, BackendKind::Fallback) => self.monitor.track_remote_miss(),
        }
        tracing::debug!(
            op,
            backend = self.kind.storage_label(),
            elapsed_ms = elapsed.as_millis() as u64,
            ok = error.is_none(),
            "store operation"
        );
    }

    async fn live_session(&self, client_id: &str) -> Result<Session, LuniError> {
        self.sessions
            .get_session_by_client(client_id)
            .await?
            .ok_or_else(|| LuniError::SessionNotFound {
                client_id: client_id.to_string(),
            })
    }

    // ---- sessions ----

    /// The client's live session, creating one when none exists.
    #[doc(alias = "getOrInitSessao")]
    pub async fn get_or_init_session(&self, client_id: &str) -> Result<SessionHandle, LuniError> {
        self.observe("get_or_init_session", OperationCategory::Session, async {
            if let Some(session) = self.sessions.get_session_by_client(client_id).await? {
                return Ok(session.into());
            }
            let session = self.sessions.create_session(client_id, Map::new()).await?;
            tracing::debug!(client_id, session_id = %session.id, "session started");
            Ok(session.into())
        })
        .await
    }

    /// Append a message to the client's live session.
    ///
    /// Fails with [`LuniError::SessionNotFound`] when there is none. `None`
    /// means the write did not land (the session expired or the backend
    /// dropped it).
    pub async fn add_message_to_session(
        &self,
        client_id: &str,
        text: &str,
        tags: Vec<String>,
    ) -> Result<Option<Session>, LuniError> {
        self.observe("add_message", OperationCategory::Session, async {
            let session = self.live_session(client_id).await?;
            self.sessions.add_message(&session.id, text, tags).await
        })
        .await
    }

    pub async fn update_session_focus(&self, client_id: &str, focus: Value) -> Result<bool, LuniError> {
        self.observe("update_session_focus", OperationCategory::Session, async {
            let session = self.live_session(client_id).await?;
            self.sessions.set_focus(&session.id, focus).await
        })
        .await
    }

    /// Most recent messages, oldest first. Empty when there is no session.
    pub async fn get_session_messages(
        &self,
        client_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionMessage>, LuniError> {
        self.observe("get_session_messages", OperationCategory::Session, async {
            match self.sessions.get_session_by_client(client_id).await? {
                Some(session) => self.sessions.get_messages(&session.id, limit).await,
                None => Ok(Vec::new()),
            }
        })
        .await
    }

    /// Store a summary. Always `false` on the file backend.
    pub async fn set_session_summary(&self, client_id: &str, summary: &str) -> Result<bool, LuniError> {
        self.observe("set_session_summary", OperationCategory::Session, async {
            match self.sessions.get_session_by_client(client_id).await? {
                Some(session) => self.sessions.set_summary(&session.id, summary).await,
                None => Ok(false),
            }
        })
        .await
    }

    /// Run `work` under a named lock on the client's session.
    ///
    /// `ttl` defaults to `store.lock_ttl_seconds`. The outcome says whether
    /// exclusion was real; see [`LockOutcome`].
    pub async fn with_lock<F, Fut, T>(
        &self,
        client_id: &str,
        name: &str,
        ttl: Option<Duration>,
        work: F,
    ) -> Result<LockOutcome<T>, LuniError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        self.observe("with_lock", OperationCategory::Session, async {
            let session = self.live_session(client_id).await?;
            with_lock(
                self.sessions.as_ref(),
                &session.id,
                name,
                ttl.unwrap_or(self.lock_ttl),
                work,
            )
            .await
        })
        .await
    }

    /// Legacy freshness check. Only the file backend keeps activity markers;
    /// on the remote backend this reports whether a live session exists.
    pub async fn check_freshness(&self, client_id: &str, tags: &[String]) -> Result<bool, LuniError> {
        if let Some(files) = &self.file_sessions {
            return Ok(files.check_freshness(client_id, tags).await.is_new());
        }
        Ok(self.sessions.get_session_by_client(client_id).await?.is_none())
    }

    // ---- focus ----

    #[doc(alias = "atualizarFocos")]
    pub async fn update_focus(
        &self,
        client_id: &str,
        update: Map<String, Value>,
    ) -> Result<FocusRecord, LuniError> {
        self.observe(
            "update_focus",
            OperationCategory::Focus,
            self.focus.update_focus(client_id, update),
        )
        .await
    }

    #[doc(alias = "getFocos")]
    pub async fn get_focus(&self, client_id: &str) -> Result<FocusRecord, LuniError> {
        self.observe("get_focus", OperationCategory::Focus, self.focus.get_focus(client_id))
            .await
    }

    #[doc(alias = "getFocosValidos")]
    pub async fn get_valid_focus(&self, client_id: &str) -> Result<FocusRecord, LuniError> {
        self.observe(
            "get_valid_focus",
            OperationCategory::Focus,
            self.focus.get_valid_focus(client_id),
        )
        .await
    }

    #[doc(alias = "limparFocosExpirados")]
    pub async fn prune_expired_focus(&self, client_id: &str) -> Result<bool, LuniError> {
        self.observe(
            "prune_expired_focus",
            OperationCategory::Focus,
            self.focus.prune_expired(client_id),
        )
        .await
    }

    #[doc(alias = "removerFocoPorCategoria")]
    pub async fn remove_focus_category(&self, client_id: &str, category: &str) -> Result<bool, LuniError> {
        self.observe(
            "remove_focus_category",
            OperationCategory::Focus,
            self.focus.remove_category(client_id, category),
        )
        .await
    }

    #[doc(alias = "getFocoAtivo")]
    pub async fn get_active_focus(&self, client_id: &str) -> Result<Option<Value>, LuniError> {
        self.observe(
            "get_active_focus",
            OperationCategory::Focus,
            self.focus.get_active_focus(client_id),
        )
        .await
    }

    #[doc(alias = "setFocoAtivo")]
    pub async fn set_active_focus(&self, client_id: &str, value: Value) -> Result<(), LuniError> {
        self.observe(
            "set_active_focus",
            OperationCategory::Focus,
            self.focus.set_active_focus(client_id, value),
        )
        .await
    }

    // ---- variables ----

    #[doc(alias = "salvarVariavel")]
    pub async fn set_variable(
        &self,
        client_id: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), LuniError> {
        self.observe(
            "set_variable",
            OperationCategory::Variables,
            self.variables.set(client_id, key, value, ttl),
        )
        .await
    }

    #[doc(alias = "getVariaveisValidas")]
    pub async fn valid_variables(&self, client_id: &str) -> Result<Map<String, Value>, LuniError> {
        self.observe(
            "valid_variables",
            OperationCategory::Variables,
            self.variables.valid(client_id),
        )
        .await
    }

    #[doc(alias = "deletarVariavel")]
    pub async fn delete_variable(&self, client_id: &str, key: &str) -> Result<bool, LuniError> {
        self.observe(
            "delete_variable",
            OperationCategory::Variables,
            self.variables.delete(client_id, key),
        )
        .await
    }

    #[doc(alias = "renovarVariavel")]
    pub async fn renew_variable(
        &self,
        client_id: &str,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, LuniError> {
        self.observe(
            "renew_variable",
            OperationCategory::Variables,
            self.variables.renew(client_id, key, ttl),
        )
        .await
    }

    // ---- operations ----

    pub async fn health_check(&self) -> StoreHealth {
        let start = Instant::now();
        let health = self.collect_health().await;
        let failure = health.failure();
        self.record("health_check", OperationCategory::Admin, start.elapsed(), failure.as_ref());
        health
    }

    async fn collect_health(&self) -> StoreHealth {
        let sessions = self
            .sessions
            .health_check()
            .await
            .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
        let focus = self
            .focus
            .health_check()
            .await
            .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
        let variables = match self.variables.files().probe().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        StoreHealth {
            sessions,
            focus,
            variables,
        }
    }

    /// Snapshot of backend, health, monitor and cache state.
    ///
    /// The snapshot is taken before this call is itself recorded.
    pub async fn get_metrics(&self) -> StoreMetrics {
        let start = Instant::now();
        self.monitor.check_thresholds();
        let metrics = StoreMetrics {
            backend: self.kind,
            remote_requested: self.remote_requested,
            storage: self.storage_info(),
            health: self.collect_health().await,
            monitor: self.monitor.snapshot(),
            cache: self.cache.all_stats(),
        };
        self.record("get_metrics", OperationCategory::Admin, start.elapsed(), None);
        metrics
    }

    #[doc(alias = "isUsingRedis")]
    pub fn is_using_redis(&self) -> bool {
        self.kind == BackendKind::Remote
    }

    #[doc(alias = "getStorageInfo")]
    pub fn storage_info(&self) -> StorageInfo {
        let label = self.kind.storage_label();
        StorageInfo {
            session_store: self.sessions.backend().storage_label(),
            focus_store: self.focus.backend().storage_label(),
            overall: label,
        }
    }

    /// Reap expired sessions and sweep the in-process caches.
    pub async fn sweep(&self) -> Result<SweepReport, LuniError> {
        let sessions_reaped = self.sessions.cleanup_expired().await?;
        let cache_entries_swept = self.cache.sweep_all();
        if sessions_reaped + cache_entries_swept > 0 {
            tracing::info!(sessions_reaped, cache_entries_swept, "sweep finished");
        }
        Ok(SweepReport {
            sessions_reaped,
            cache_entries_swept,
        })
    }

    /// Run [`StoreAdapter::sweep`] every `interval` until `cancel` fires.
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("store maintenance stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = adapter.sweep().await {
                            tracing::warn!(error = %e, "periodic sweep failed");
                        }
                        adapter.monitor.check_thresholds();
                    }
                }
            }
        })
    }

    pub async fn shutdown(&self) -> Result<(), LuniError> {
        self.sessions.shutdown().await?;
        self.focus.shutdown().await?;
        if let Some(connector) = &self.connector {
            connector.disconnect().await;
        }
        tracing::info!("store adapter shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luni_core::ManualClock;
    use serde_json::json;

    async fn fallback_adapter() -> (tempfile::TempDir, Arc<ManualClock>, StoreAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LuniConfig::default();
        config.storage.data_dir = dir.path().to_string_lossy().to_string();
        let clock = Arc::new(ManualClock::at_epoch_millis(1_700_000_000_000));
        let adapter = StoreAdapter::init_with_clock(&config, clock.clone())
            .await
            .unwrap();
        (dir, clock, adapter)
    }

    #[tokio::test]
    async fn disabled_remote_selects_files() {
        let (_dir, _clock, adapter) = fallback_adapter().await;
        assert_eq!(adapter.backend(), BackendKind::Fallback);
        assert!(!adapter.is_using_redis());
        assert_eq!(
            adapter.storage_info(),
            StorageInfo {
                session_store: "files",
                focus_store: "files",
                overall: "files",
            }
        );
        // Not requested, so not counted as a fallback.
        assert_eq!(adapter.monitor().snapshot().fallbacks, 0);
    }

    #[tokio::test]
    async fn get_or_init_reuses_live_session() {
        let (_dir, _clock, adapter) = fallback_adapter().await;
        let first = adapter.get_or_init_session("acme").await.unwrap();
        assert!(first.first_interaction);
        assert_eq!(first.funnel_stage, "descoberta");

        adapter
            .add_message_to_session("acme", "oi", vec![])
            .await
            .unwrap();
        let again = adapter.get_or_init_session("acme").await.unwrap();
        assert_eq!(again.session_id, first.session_id);
        assert!(!again.first_interaction);
    }

    #[tokio::test]
    async fn session_writes_require_a_live_session() {
        let (_dir, _clock, adapter) = fallback_adapter().await;
        let err = adapter
            .add_message_to_session("ghost", "oi", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, LuniError::SessionNotFound { .. }));
        assert!(matches!(
            adapter.update_session_focus("ghost", json!(1)).await,
            Err(LuniError::SessionNotFound { .. })
        ));
        assert!(adapter.get_session_messages("ghost", 5).await.unwrap().is_empty());
        assert!(!adapter.set_session_summary("ghost", "x").await.unwrap());
        assert_eq!(adapter.monitor().snapshot().failed, 2);
    }

    #[tokio::test]
    async fn fallback_lock_is_unguarded() {
        let (_dir, _clock, adapter) = fallback_adapter().await;
        adapter.get_or_init_session("acme").await.unwrap();
        let outcome = adapter
            .with_lock("acme", "confirm", None, || async { "done" })
            .await
            .unwrap();
        assert!(matches!(outcome, LockOutcome::Unguarded("done")));
    }

    #[tokio::test]
    async fn lock_health_and_metrics_are_recorded() {
        let (_dir, _clock, adapter) = fallback_adapter().await;
        adapter.get_or_init_session("acme").await.unwrap();
        adapter
            .with_lock("acme", "confirm", None, || async {})
            .await
            .unwrap();
        assert!(matches!(
            adapter.with_lock("ghost", "confirm", None, || async {}).await,
            Err(LuniError::SessionNotFound { .. })
        ));
        assert!(adapter.health_check().await.is_healthy());

        let metrics = adapter.get_metrics().await;
        assert_eq!(metrics.monitor.total, 4);
        assert_eq!(metrics.monitor.failed, 1);
        assert_eq!(adapter.monitor().snapshot().total, 5);
    }

    #[tokio::test]
    async fn sweep_reaps_expired_sessions() {
        let (_dir, clock, adapter) = fallback_adapter().await;
        adapter.get_or_init_session("acme").await.unwrap();
        clock.advance(chrono::Duration::hours(13));
        let report = adapter.sweep().await.unwrap();
        assert_eq!(report.sessions_reaped, 1);
    }

    #[tokio::test]
    async fn metrics_report_everything() {
        let (_dir, _clock, adapter) = fallback_adapter().await;
        adapter
            .update_focus("acme", json!({"produto": ["cafe"]}).as_object().cloned().unwrap())
            .await
            .unwrap();
        let metrics = adapter.get_metrics().await;
        assert!(metrics.health.is_healthy());
        assert_eq!(metrics.monitor.total, 1);
        assert_eq!(metrics.monitor.remote_misses, 1);
        assert!(metrics.cache.contains_key("contextoEstatico"));

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["backend"], "fallback");
        assert_eq!(json["health"]["sessions"]["status"], "healthy");
    }
}
