// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus exposition for the store's metrics.
//!
//! Store crates record through the `metrics` facade only. A process that
//! wants a scrape target installs [`PrometheusAdapter`] once at startup and
//! serves [`PrometheusAdapter::render`].

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;

use luni_core::LuniError;
use luni_core::traits::adapter::PluginAdapter;
use luni_core::types::{AdapterType, HealthStatus};

pub use recording::{
    record_cache_eviction, record_cache_hit, record_cache_miss, record_connect_attempt,
    record_fallback, record_operation, set_remote_disconnected,
};

/// Process-wide Prometheus recorder.
pub struct PrometheusAdapter {
    handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the recorder and describe the store metrics.
    ///
    /// Fails if another recorder is already installed in this process.
    pub fn new() -> Result<Self, LuniError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| LuniError::Internal(format!("metrics recorder already set: {e}")))?;
        recording::register_metrics();
        tracing::debug!("prometheus recorder installed");
        Ok(Self { handle })
    }

    /// Text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, LuniError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LuniError> {
        Ok(())
    }
}
