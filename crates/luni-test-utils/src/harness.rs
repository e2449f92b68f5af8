// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a [`StoreAdapter`] over a temp data directory and a
//! manual clock, optionally backed by a [`MockRemoteCache`] in place of Redis.

use std::sync::Arc;

use luni_config::LuniConfig;
use luni_core::{Clock, LuniError, ManualClock};
use luni_redis::RemoteCache;
use luni_store::StoreAdapter;

use crate::mock_remote::MockRemoteCache;

/// Epoch millis the harness clock starts at unless overridden.
pub const DEFAULT_START_MS: i64 = 1_700_000_000_000;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    remote: bool,
    remote_offline: bool,
    start_ms: i64,
    configure: Option<Box<dyn FnOnce(&mut LuniConfig) + Send>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            remote: false,
            remote_offline: false,
            start_ms: DEFAULT_START_MS,
            configure: None,
        }
    }

    /// Back sessions and focus with an in-memory remote cache.
    pub fn with_remote(mut self) -> Self {
        self.remote = true;
        self
    }

    /// Request the remote backend but have it fail the startup probe.
    pub fn with_offline_remote(mut self) -> Self {
        self.remote = true;
        self.remote_offline = true;
        self
    }

    /// Start the manual clock at `epoch_ms`.
    pub fn with_start_time(mut self, epoch_ms: i64) -> Self {
        self.start_ms = epoch_ms;
        self
    }

    /// Adjust the configuration before the adapter is built.
    ///
    /// `storage.data_dir` is set to the temp dir before this runs.
    pub fn with_config(mut self, f: impl FnOnce(&mut LuniConfig) + Send + 'static) -> Self {
        self.configure = Some(Box::new(f));
        self
    }

    /// Build the test harness.
    pub async fn build(self) -> Result<TestHarness, LuniError> {
        let temp_dir = tempfile::TempDir::new().map_err(LuniError::storage)?;

        let mut config = LuniConfig::default();
        config.storage.data_dir = temp_dir.path().to_string_lossy().to_string();
        config.store.use_redis = self.remote;
        if let Some(configure) = self.configure {
            configure(&mut config);
        }

        let clock = Arc::new(ManualClock::at_epoch_millis(self.start_ms));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let (adapter, remote) = if self.remote {
            let mock = Arc::new(MockRemoteCache::new(dyn_clock.clone()));
            mock.set_offline(self.remote_offline);
            let remote: Arc<dyn RemoteCache> = mock.clone();
            let adapter = StoreAdapter::with_remote(&config, remote, dyn_clock).await?;
            // Later outages are simulated by the test, not inherited from startup.
            mock.set_offline(false);
            (adapter, Some(mock))
        } else {
            (StoreAdapter::init_with_clock(&config, dyn_clock).await?, None)
        };

        Ok(TestHarness {
            adapter: Arc::new(adapter),
            clock,
            remote,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A store adapter over temp storage with a controllable clock.
pub struct TestHarness {
    pub adapter: Arc<StoreAdapter>,
    pub clock: Arc<ManualClock>,
    /// Present when the harness was built with a remote.
    pub remote: Option<Arc<MockRemoteCache>>,
    pub config: LuniConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The temp directory holding all local files.
    pub fn data_dir(&self) -> &std::path::Path {
        self._temp_dir.path()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }

    /// The mock remote.
    ///
    /// # Panics
    ///
    /// Panics if the harness was built without a remote.
    pub fn remote(&self) -> &MockRemoteCache {
        self.remote
            .as_deref()
            .expect("harness built without a remote")
    }
}
