// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot backend selection.
//!
//! When the remote backend is enabled it is connected and probed once. Any
//! failure selects the file-backed stores for the rest of the process
//! lifetime; there is no promotion back to remote without a restart.

use std::sync::Arc;

use luni_config::LuniConfig;
use luni_core::{BackendKind, Clock, FocusStore, LuniError, SessionStore};
use luni_redis::{KeySpace, RedisConnector, RedisFocusStore, RedisSessionStore, RemoteCache, RemoteSessionOptions};
use luni_storage::{FileFocusStore, FileSessionOptions, FileSessionStore};

/// The stores chosen for this process.
pub struct Backends {
    pub kind: BackendKind,
    pub sessions: Arc<dyn SessionStore>,
    pub focus: Arc<dyn FocusStore>,
    /// Set when the remote backend was requested and could not be used.
    pub fell_back: bool,
    pub(crate) connector: Option<Arc<RedisConnector>>,
    /// The file session store, kept for its legacy freshness check.
    pub(crate) file_sessions: Option<Arc<FileSessionStore>>,
}

/// Connect to the configured Redis endpoint and pick the backend.
pub async fn select(config: &LuniConfig, clock: Arc<dyn Clock>) -> Result<Backends, LuniError> {
    if !config.store.use_redis {
        tracing::info!("remote backend disabled, using local files");
        return fallback(config, clock, false).await;
    }
    let connector = match RedisConnector::new(&config.store) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::warn!(error = %e, "remote backend misconfigured, using local files");
            return fallback(config, clock, true).await;
        }
    };
    if !connector.probe().await {
        tracing::warn!(endpoint = connector.endpoint(), "remote backend unreachable, using local files");
        return fallback(config, clock, true).await;
    }
    let remote: Arc<dyn RemoteCache> = connector.clone();
    let mut backends = remote_backends(config, remote, clock);
    backends.connector = Some(connector);
    Ok(backends)
}

/// Probe an already-built remote cache and pick the backend.
pub async fn select_with_remote(
    config: &LuniConfig,
    remote: Arc<dyn RemoteCache>,
    clock: Arc<dyn Clock>,
) -> Result<Backends, LuniError> {
    match remote.ping().await {
        Ok(()) => Ok(remote_backends(config, remote, clock)),
        Err(e) => {
            tracing::warn!(error = %e, "remote backend probe failed, using local files");
            fallback(config, clock, true).await
        }
    }
}

fn remote_backends(config: &LuniConfig, remote: Arc<dyn RemoteCache>, clock: Arc<dyn Clock>) -> Backends {
    let keys = KeySpace::new(&config.store.namespace, &config.store.channel);
    let sessions = RedisSessionStore::new(
        remote.clone(),
        keys.clone(),
        RemoteSessionOptions::from_config(&config.store, &config.session),
        clock.clone(),
    );
    let focus = RedisFocusStore::new(
        remote,
        keys,
        config.focus.policy(),
        config.store.ttl(),
        clock,
    );
    tracing::info!(namespace = %config.store.namespace, "using remote backend");
    Backends {
        kind: BackendKind::Remote,
        sessions: Arc::new(sessions),
        focus: Arc::new(focus),
        fell_back: false,
        connector: None,
        file_sessions: None,
    }
}

async fn fallback(
    config: &LuniConfig,
    clock: Arc<dyn Clock>,
    fell_back: bool,
) -> Result<Backends, LuniError> {
    let sessions = Arc::new(
        FileSessionStore::open(
            config.storage.sessions_path(),
            FileSessionOptions::from(&config.session),
            clock.clone(),
        )
        .await?,
    );
    let focus = FileFocusStore::open(config.storage.focus_path(), config.focus.policy(), clock).await?;
    Ok(Backends {
        kind: BackendKind::Fallback,
        sessions: sessions.clone(),
        focus: Arc::new(focus),
        fell_back,
        connector: None,
        file_sessions: Some(sessions),
    })
}
