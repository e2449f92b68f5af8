// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session store trait and the scoped-lock helper built on it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::LuniError;
use crate::session::{Session, SessionMessage, SessionUpdate};
use crate::traits::adapter::PluginAdapter;
use crate::types::{BackendKind, LockAcquisition, LockOutcome};

/// CRUD over conversation sessions.
///
/// Implementations swallow connectivity failures where a safe default exists
/// (`None`, empty, `false`) and log them; `Err` is reserved for cases with no
/// sensible fallback value.
#[async_trait]
pub trait SessionStore: PluginAdapter {
    /// Which backend this store writes to.
    fn backend(&self) -> BackendKind;

    /// Create a session and point the client index at it.
    async fn create_session(
        &self,
        client_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<Session, LuniError>;

    /// Fetch a live session; expired sessions are reaped and reported as `None`.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, LuniError>;

    /// Resolve the client index, then fetch the session.
    async fn get_session_by_client(&self, client_id: &str) -> Result<Option<Session>, LuniError>;

    /// Shallow-merge sections, bump `lastActivity`, refresh the TTL.
    async fn update_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<Option<Session>, LuniError>;

    /// Append to the sliding message window.
    async fn add_message(
        &self,
        session_id: &str,
        text: &str,
        tags: Vec<String>,
    ) -> Result<Option<Session>, LuniError>;

    /// Most recent `limit` messages, oldest first.
    async fn get_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionMessage>, LuniError>;

    /// Store a truncated summary. Backends without summaries return `false`.
    async fn set_summary(&self, session_id: &str, summary: &str) -> Result<bool, LuniError>;

    /// Record the focus detected for the current turn.
    async fn set_focus(&self, session_id: &str, focus: Value) -> Result<bool, LuniError>;

    /// Try to take the named lock on a session.
    async fn try_lock(
        &self,
        session_id: &str,
        name: &str,
        ttl: Duration,
    ) -> Result<LockAcquisition, LuniError>;

    /// Release a lock taken with [`SessionStore::try_lock`].
    async fn release_lock(&self, session_id: &str, name: &str) -> Result<(), LuniError>;

    /// Remove expired sessions. Returns how many were reaped.
    async fn cleanup_expired(&self) -> Result<usize, LuniError>;
}

/// Run `work` under the named session lock.
///
/// The lock is released after `work` completes, whatever it returned. When the
/// backend cannot lock, `work` still runs and the outcome is
/// [`LockOutcome::Unguarded`].
pub async fn with_lock<S, F, Fut, T>(
    store: &S,
    session_id: &str,
    name: &str,
    ttl: Duration,
    work: F,
) -> Result<LockOutcome<T>, LuniError>
where
    S: SessionStore + ?Sized,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = T> + Send,
    T: Send,
{
    match store.try_lock(session_id, name, ttl).await? {
        LockAcquisition::Acquired => {
            let result = work().await;
            if let Err(e) = store.release_lock(session_id, name).await {
                tracing::warn!(session_id, lock = name, error = %e, "failed to release lock, relying on ttl");
            }
            Ok(LockOutcome::Exclusive(result))
        }
        LockAcquisition::Contended => {
            tracing::debug!(session_id, lock = name, "lock contended");
            Ok(LockOutcome::Contended)
        }
        LockAcquisition::Unsupported => Ok(LockOutcome::Unguarded(work().await)),
    }
}
