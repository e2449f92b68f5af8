// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `luni status` command implementation.
//!
//! Builds the store adapter from configuration, which runs backend selection,
//! then reports which backend won, the health of each store and the monitor
//! snapshot.

use std::io::IsTerminal;

use luni_config::LuniConfig;
use luni_core::{HealthStatus, LuniError};
use luni_store::{StoreAdapter, StoreMetrics};

/// Run the `luni status` command.
///
/// With `json`, prints the full metrics document for scripting. With `plain`
/// or when stdout is not a TTY, disables colors.
pub async fn run_status(
    config: &LuniConfig,
    json: bool,
    plain: bool,
    metrics: bool,
) -> Result<(), LuniError> {
    #[cfg(feature = "prometheus")]
    let exporter = if metrics {
        Some(luni_prometheus::PrometheusAdapter::new()?)
    } else {
        None
    };
    #[cfg(not(feature = "prometheus"))]
    if metrics {
        tracing::warn!("built without the prometheus feature, ignoring --metrics");
    }

    let adapter = StoreAdapter::init(config).await?;
    let report = adapter.get_metrics().await;
    adapter.shutdown().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_report(&report, use_color);
    }

    #[cfg(feature = "prometheus")]
    if let Some(exporter) = exporter {
        println!("{}", exporter.render());
    }

    Ok(())
}

fn health_line(label: &str, status: &HealthStatus, use_color: bool) -> String {
    let (mark, text) = match status {
        HealthStatus::Healthy => ("ok", "healthy".to_string()),
        HealthStatus::Degraded(d) => ("warn", format!("degraded: {d}")),
        HealthStatus::Unhealthy(d) => ("fail", format!("unhealthy: {d}")),
    };
    if use_color {
        use colored::Colorize;
        let mark = match mark {
            "ok" => "✓".green(),
            "warn" => "!".yellow(),
            _ => "✗".red(),
        };
        format!("    {label:<10}{mark} {text}")
    } else {
        format!("    {label:<10}[{}] {text}", mark.to_uppercase())
    }
}

fn print_report(report: &StoreMetrics, use_color: bool) {
    println!();
    println!("  luni status");
    println!("  {}", "-".repeat(35));

    let backend = if report.remote_requested && report.storage.overall != "redis" {
        format!("{} (remote requested, fell back)", report.storage.overall)
    } else {
        report.storage.overall.to_string()
    };
    println!("    Backend:  {backend}");
    println!("{}", health_line("Sessions:", &report.health.sessions, use_color));
    println!("{}", health_line("Focus:", &report.health.focus, use_color));
    println!("{}", health_line("Vars:", &report.health.variables, use_color));

    let m = &report.monitor;
    println!(
        "    Monitor:  {} ({} ops, {} failed, p95 {:.1}ms)",
        m.status, m.total, m.failed, m.p95_ms
    );
    for alert in &m.recent_alerts {
        println!("      - {}", alert.message);
    }

    if !report.cache.is_empty() {
        println!("    Caches:");
        for (name, stats) in &report.cache {
            println!("      {name:<18}{stats}");
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_health_lines() {
        assert_eq!(
            health_line("Focus:", &HealthStatus::Healthy, false),
            "    Focus:    [OK] healthy"
        );
        assert_eq!(
            health_line("Vars:", &HealthStatus::Unhealthy("disk".into()), false),
            "    Vars:     [FAIL] unhealthy: disk"
        );
    }

    #[tokio::test]
    async fn status_runs_against_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LuniConfig::default();
        config.storage.data_dir = dir.path().to_string_lossy().to_string();
        run_status(&config, true, true, false).await.unwrap();
        assert!(dir.path().join("variables").exists());
    }
}
