// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `luni sweep` command implementation.

use std::sync::Arc;
use std::time::Duration;

use luni_config::LuniConfig;
use luni_core::LuniError;
use luni_store::StoreAdapter;
use tokio_util::sync::CancellationToken;

/// Run one sweep, or with `watch` keep sweeping until Ctrl-C.
pub async fn run_sweep(config: &LuniConfig, watch: bool) -> Result<(), LuniError> {
    let adapter = Arc::new(StoreAdapter::init(config).await?);

    if !watch {
        let report = adapter.sweep().await?;
        println!(
            "swept {} expired sessions and {} cache entries",
            report.sessions_reaped, report.cache_entries_swept
        );
        return adapter.shutdown().await;
    }

    let interval = Duration::from_secs(config.session.sweep_interval_seconds.max(1));
    let cancel = CancellationToken::new();
    let maintenance = adapter.spawn_maintenance(interval, cancel.clone());
    tracing::info!(interval_secs = interval.as_secs(), "sweeping until interrupted");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    cancel.cancel();
    if let Err(e) = maintenance.await {
        tracing::warn!(error = %e, "maintenance task ended abnormally");
    }
    adapter.shutdown().await
}
