// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session store on the remote cache.
//!
//! A session is a hash under `<base>:ctx` holding scalar fields and JSON
//! encoded sections, with its message window kept separately as a capped
//! list under `<base>:msgs`. Two string keys index it by client and by id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use luni_config::model::{SessionConfig, StoreConfig};
use luni_core::session::truncate_summary;
use luni_core::{
    AdapterType, BackendKind, Clock, HealthStatus, LockAcquisition, LuniError, PluginAdapter,
    Session, SessionMessage, SessionStore, SessionUpdate,
};
use serde_json::{Map, Value};

use crate::keys::{KeySpace, ctx_key, lock_key, msgs_key};
use crate::remote::RemoteCache;

#[derive(Debug, Clone)]
pub struct RemoteSessionOptions {
    pub ttl: Duration,
    pub message_window: usize,
    pub summary_max_chars: usize,
}

impl RemoteSessionOptions {
    pub fn from_config(store: &StoreConfig, session: &SessionConfig) -> Self {
        Self {
            ttl: store.ttl(),
            message_window: session.message_window,
            summary_max_chars: session.summary_max_chars,
        }
    }
}

/// Hash fields for a session. The message window lives in its own list.
pub fn session_fields(session: &Session) -> Result<Vec<(String, String)>, serde_json::Error> {
    let mut context = session.context.clone();
    context.messages.clear();
    let mut fields = vec![
        ("sessionId".to_string(), session.id.clone()),
        ("clientId".to_string(), session.client_id.clone()),
        ("createdAt".to_string(), session.created_at.to_string()),
        ("lastActivity".to_string(), session.last_activity.to_string()),
        ("metadata".to_string(), serde_json::to_string(&session.metadata)?),
        ("context".to_string(), serde_json::to_string(&context)?),
        ("stats".to_string(), serde_json::to_string(&session.stats)?),
    ];
    if let Some(summary) = &session.summary {
        fields.push(("summary".to_string(), summary.clone()));
    }
    Ok(fields)
}

/// Rebuild a session from its hash. Unparseable sections fall back to defaults.
pub fn session_from_fields(fields: &HashMap<String, String>) -> Option<Session> {
    let id = fields.get("sessionId")?.clone();
    let number = |key: &str| fields.get(key).and_then(|v| v.parse::<i64>().ok());
    let section = |key: &str| -> Value {
        fields
            .get(key)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_else(|| Value::Object(Map::new()))
    };
    let created_at = number("createdAt").unwrap_or_default();

    let mut session = Session {
        id,
        client_id: fields
            .get("clientId")
            .or_else(|| fields.get("clienteId"))
            .cloned()
            .unwrap_or_default(),
        created_at,
        last_activity: number("lastActivity").unwrap_or(created_at),
        metadata: serde_json::from_value(section("metadata")).unwrap_or_default(),
        context: serde_json::from_value(section("context")).unwrap_or_default(),
        stats: serde_json::from_value(section("stats")).unwrap_or_default(),
        summary: fields.get("summary").cloned(),
    };
    if session.metadata.focus_current.is_none() {
        session.metadata.focus_current = fields
            .get("focus")
            .and_then(|raw| serde_json::from_str(raw).ok());
    }
    if session.context.last_intent_at.is_none() {
        session.context.last_intent_at = number("last_intent_at");
    }
    Some(session)
}

/// Decode a list entry, skipping anything malformed.
fn parse_messages(raw: Vec<String>) -> Vec<SessionMessage> {
    let mut messages: Vec<SessionMessage> = raw
        .iter()
        .filter_map(|m| serde_json::from_str(m).ok())
        .collect();
    // Stored newest first.
    messages.reverse();
    messages
}

pub struct RedisSessionStore {
    remote: Arc<dyn RemoteCache>,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
    options: RemoteSessionOptions,
}

impl RedisSessionStore {
    pub fn new(
        remote: Arc<dyn RemoteCache>,
        keys: KeySpace,
        options: RemoteSessionOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            keys,
            clock,
            options,
        }
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.options.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    async fn base(&self, session_id: &str) -> Result<Option<String>, LuniError> {
        self.remote.get(&self.keys.session_index(session_id)).await
    }

    /// Load a live session with its base key; expired ones are removed.
    async fn load(&self, session_id: &str) -> Result<Option<(String, Session)>, LuniError> {
        let Some(base) = self.base(session_id).await? else {
            return Ok(None);
        };
        let fields = self.remote.hgetall(&ctx_key(&base)).await?;
        let Some(mut session) = session_from_fields(&fields) else {
            return Ok(None);
        };
        if !session.is_live(self.clock.now_millis(), self.ttl_ms()) {
            self.remove(&base, &session).await?;
            return Ok(None);
        }
        let raw = self
            .remote
            .list_head(&msgs_key(&base), self.options.message_window)
            .await?;
        session.context.messages = parse_messages(raw);
        Ok(Some((base, session)))
    }

    async fn remove(&self, base: &str, session: &Session) -> Result<(), LuniError> {
        self.remote
            .del(&[
                ctx_key(base),
                msgs_key(base),
                self.keys.session_index(&session.id),
            ])
            .await?;
        let client_key = self.keys.client_index(&session.client_id);
        if self.remote.get(&client_key).await?.as_deref() == Some(session.id.as_str()) {
            self.remote.del(&[client_key]).await?;
        }
        tracing::debug!(session_id = %session.id, "expired remote session removed");
        Ok(())
    }

    /// Write the hash plus `extra` fields and refresh every TTL on the session.
    async fn save(
        &self,
        base: &str,
        session: &Session,
        extra: Vec<(String, String)>,
    ) -> Result<(), LuniError> {
        let ttl = self.options.ttl;
        let mut fields = session_fields(session)?;
        fields.extend(extra);
        self.remote.hset_ex(&ctx_key(base), &fields, ttl).await?;
        self.remote.expire(&msgs_key(base), ttl).await?;
        self.remote
            .expire(&self.keys.session_index(&session.id), ttl)
            .await?;
        self.remote
            .expire(&self.keys.client_index(&session.client_id), ttl)
            .await?;
        Ok(())
    }

    /// Load, mutate and save, degrading failures to `None`.
    async fn modify<F>(
        &self,
        op: &'static str,
        session_id: &str,
        f: F,
    ) -> Result<Option<(String, Session)>, LuniError>
    where
        F: FnOnce(&mut Session, i64) -> Result<Vec<(String, String)>, LuniError> + Send,
    {
        let result: Result<Option<(String, Session)>, LuniError> = async {
            let Some((base, mut session)) = self.load(session_id).await? else {
                return Ok(None);
            };
            let extra = f(&mut session, self.clock.now_millis())?;
            self.save(&base, &session, extra).await?;
            Ok(Some((base, session)))
        }
        .await;
        match result {
            Ok(found) => Ok(found),
            Err(e) if e.is_connectivity() => {
                tracing::warn!(session_id, op, error = %e, "remote session write failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PluginAdapter for RedisSessionStore {
    fn name(&self) -> &str {
        "redis-sessions"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::SessionStore
    }

    async fn health_check(&self) -> Result<HealthStatus, LuniError> {
        Ok(match self.remote.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), LuniError> {
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn create_session(
        &self,
        client_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<Session, LuniError> {
        let session = Session::new(client_id, metadata, self.clock.now_millis())?;
        let base = self.keys.session_base(client_id, &session.id);
        let ttl = self.options.ttl;

        self.remote
            .hset_ex(&ctx_key(&base), &session_fields(&session)?, ttl)
            .await?;
        self.remote
            .set_ex(&self.keys.client_index(client_id), &session.id, ttl)
            .await?;
        self.remote
            .set_ex(&self.keys.session_index(&session.id), &base, ttl)
            .await?;

        tracing::debug!(client_id, session_id = %session.id, "remote session created");
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, LuniError> {
        match self.load(session_id).await {
            Ok(found) => Ok(found.map(|(_, s)| s)),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "remote session read failed");
                Ok(None)
            }
        }
    }

    async fn get_session_by_client(&self, client_id: &str) -> Result<Option<Session>, LuniError> {
        match self.remote.get(&self.keys.client_index(client_id)).await {
            Ok(Some(id)) => self.get_session(&id).await,
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::warn!(client_id, error = %e, "remote client index read failed");
                Ok(None)
            }
        }
    }

    async fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Option<Session>, LuniError> {
        let updated = self
            .modify("update_session", session_id, |session, now| {
                session.apply_update(&update, now)?;
                Ok(Vec::new())
            })
            .await?;
        Ok(updated.map(|(_, s)| s))
    }

    async fn add_message(
        &self,
        session_id: &str,
        text: &str,
        tags: Vec<String>,
    ) -> Result<Option<Session>, LuniError> {
        let message = SessionMessage {
            text: text.to_string(),
            timestamp: self.clock.now_millis(),
            tags,
        };
        let encoded = serde_json::to_string(&message)?;
        let window = self.options.message_window;

        let updated = self
            .modify("add_message", session_id, |session, now| {
                session.record_message(message, window);
                session.last_activity = now;
                Ok(Vec::new())
            })
            .await?;
        let Some((base, session)) = updated else {
            return Ok(None);
        };
        if let Err(e) = self
            .remote
            .push_capped(&msgs_key(&base), &encoded, window, self.options.ttl)
            .await
        {
            tracing::warn!(session_id, error = %e, "remote message append failed");
        }
        Ok(Some(session))
    }

    async fn get_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionMessage>, LuniError> {
        let result = async {
            let Some(base) = self.base(session_id).await? else {
                return Ok(Vec::new());
            };
            let raw = self.remote.list_head(&msgs_key(&base), limit).await?;
            Ok::<_, LuniError>(parse_messages(raw))
        }
        .await;
        result.or_else(|e| {
            tracing::warn!(session_id, error = %e, "remote message read failed");
            Ok(Vec::new())
        })
    }

    async fn set_summary(&self, session_id: &str, summary: &str) -> Result<bool, LuniError> {
        let truncated = truncate_summary(summary, self.options.summary_max_chars);
        let result = async {
            let Some(base) = self.base(session_id).await? else {
                return Ok(false);
            };
            self.remote
                .hset_ex(
                    &ctx_key(&base),
                    &[("summary".to_string(), truncated)],
                    self.options.ttl,
                )
                .await?;
            Ok::<_, LuniError>(true)
        }
        .await;
        result.or_else(|e| {
            tracing::warn!(session_id, error = %e, "remote summary write failed");
            Ok(false)
        })
    }

    async fn set_focus(&self, session_id: &str, focus: Value) -> Result<bool, LuniError> {
        let updated = self
            .modify("set_focus", session_id, |session, now| {
                let encoded = serde_json::to_string(&focus)?;
                session.set_focus(focus, now);
                Ok(vec![
                    ("focus".to_string(), encoded),
                    ("last_intent_at".to_string(), now.to_string()),
                ])
            })
            .await?;
        Ok(updated.is_some())
    }

    async fn try_lock(
        &self,
        session_id: &str,
        name: &str,
        ttl: Duration,
    ) -> Result<LockAcquisition, LuniError> {
        let base = match self.base(session_id).await {
            Ok(Some(base)) => base,
            Ok(None) => return Ok(LockAcquisition::Contended),
            Err(e) => {
                tracing::warn!(session_id, lock = name, error = %e, "lock lookup failed, running unguarded");
                return Ok(LockAcquisition::Unsupported);
            }
        };
        match self.remote.set_nx_ex(&lock_key(&base, name), "1", ttl).await {
            Ok(true) => Ok(LockAcquisition::Acquired),
            Ok(false) => Ok(LockAcquisition::Contended),
            Err(e) => {
                tracing::warn!(session_id, lock = name, error = %e, "lock acquire failed, running unguarded");
                Ok(LockAcquisition::Unsupported)
            }
        }
    }

    async fn release_lock(&self, session_id: &str, name: &str) -> Result<(), LuniError> {
        if let Some(base) = self.base(session_id).await? {
            self.remote.del(&[lock_key(&base, name)]).await?;
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize, LuniError> {
        // Key expiry reclaims remote sessions.
        Ok(0)
    }
}
