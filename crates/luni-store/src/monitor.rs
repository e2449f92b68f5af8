// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process operation monitor.
//!
//! Keeps running totals, a bounded duration history per operation category
//! and a short alert log. The thresholds from `[monitoring]` decide which
//! alerts fire and the overall status. When monitoring is disabled every
//! tracking call is a no-op.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use luni_config::model::MonitoringConfig;
use luni_core::Clock;
use serde::Serialize;
use strum::{Display, EnumString};

/// Samples kept per category before compaction.
const HISTORY_CAP: usize = 1000;
/// Samples kept after compaction.
const HISTORY_KEEP: usize = 500;
/// Alerts reported in a snapshot.
const RECENT_ALERTS: usize = 10;
/// Alerts retained in memory.
const ALERT_LOG_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Session,
    Focus,
    Variables,
    /// Health checks and metrics snapshots.
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    OperationFailed,
    RemoteError,
    FallbackUsed,
    HighLatency,
    HighErrorRate,
    ManyFallbacks,
    LowHitRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    duration_ms: f64,
}

#[derive(Debug, Default)]
struct MonitorState {
    total: u64,
    succeeded: u64,
    failed: u64,
    avg_latency_ms: f64,
    remote_hits: u64,
    remote_misses: u64,
    remote_errors: u64,
    fallbacks: u64,
    history: HashMap<OperationCategory, Vec<Sample>>,
    alerts: VecDeque<Alert>,
}

impl MonitorState {
    fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }

    fn hit_rate(&self) -> Option<f64> {
        let requests = self.remote_hits + self.remote_misses;
        (requests > 0).then(|| self.remote_hits as f64 / requests as f64)
    }

    fn push_alert(&mut self, alert: Alert) {
        self.alerts.push_back(alert);
        while self.alerts.len() > ALERT_LOG_CAP {
            self.alerts.pop_front();
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        let mut all: Vec<f64> = self
            .history
            .values()
            .flatten()
            .map(|s| s.duration_ms)
            .collect();
        if all.is_empty() {
            return 0.0;
        }
        all.sort_by(f64::total_cmp);
        let rank = ((p / 100.0) * all.len() as f64).ceil() as usize;
        all[rank.saturating_sub(1).min(all.len() - 1)]
    }
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub enabled: bool,
    pub uptime_seconds: u64,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub remote_hits: u64,
    pub remote_misses: u64,
    pub remote_errors: u64,
    pub fallbacks: u64,
    pub hit_rate: Option<f64>,
    pub status: OverallStatus,
    pub recent_alerts: Vec<Alert>,
}

pub struct OperationMonitor {
    config: MonitoringConfig,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    state: Mutex<MonitorState>,
}

impl OperationMonitor {
    pub fn new(config: MonitoringConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            started_at: clock.now(),
            config,
            clock,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn alert(&self, kind: AlertKind, severity: Severity, message: String) -> Alert {
        Alert {
            kind,
            severity,
            message,
            at: self.clock.now(),
        }
    }

    /// Record one finished operation. `error` carries the failure message.
    pub fn track_operation(
        &self,
        category: OperationCategory,
        elapsed: Duration,
        error: Option<&str>,
    ) {
        if !self.config.enabled {
            return;
        }
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        let failure = error.map(|e| {
            self.alert(
                AlertKind::OperationFailed,
                Severity::Error,
                format!("{category} operation failed: {e}"),
            )
        });

        let mut state = self.lock();
        state.total += 1;
        match failure {
            None => state.succeeded += 1,
            Some(alert) => {
                state.failed += 1;
                state.push_alert(alert);
            }
        }
        let n = state.total as f64;
        state.avg_latency_ms += (duration_ms - state.avg_latency_ms) / n;

        let history = state.history.entry(category).or_default();
        history.push(Sample { duration_ms });
        if history.len() > HISTORY_CAP {
            history.drain(..history.len() - HISTORY_KEEP);
        }
    }

    /// An operation served by the remote backend.
    pub fn track_remote_hit(&self) {
        if self.config.enabled {
            self.lock().remote_hits += 1;
        }
    }

    /// An operation served by the fallback backend.
    pub fn track_remote_miss(&self) {
        if self.config.enabled {
            self.lock().remote_misses += 1;
        }
    }

    pub fn track_remote_error(&self, error: &str) {
        if !self.config.enabled {
            return;
        }
        let alert = self.alert(AlertKind::RemoteError, Severity::Error, error.to_string());
        let mut state = self.lock();
        state.remote_errors += 1;
        state.push_alert(alert);
    }

    pub fn track_fallback(&self) {
        if !self.config.enabled {
            return;
        }
        let alert = self.alert(
            AlertKind::FallbackUsed,
            Severity::Warning,
            "remote backend unavailable, using local files".to_string(),
        );
        let mut state = self.lock();
        state.fallbacks += 1;
        state.push_alert(alert);
    }

    /// Evaluate thresholds, log and record any alerts raised.
    pub fn check_thresholds(&self) -> Vec<Alert> {
        if !self.config.enabled {
            return Vec::new();
        }
        let mut raised = Vec::new();
        let mut state = self.lock();

        if state.avg_latency_ms > self.config.latency_threshold_ms as f64 {
            raised.push(self.alert(
                AlertKind::HighLatency,
                Severity::Warning,
                format!("average latency {:.2}ms", state.avg_latency_ms),
            ));
        }
        let error_rate = state.error_rate();
        if error_rate > self.config.error_rate_threshold {
            raised.push(self.alert(
                AlertKind::HighErrorRate,
                Severity::Error,
                format!("error rate {:.2}%", error_rate * 100.0),
            ));
        }
        if state.fallbacks > self.config.fallback_threshold {
            raised.push(self.alert(
                AlertKind::ManyFallbacks,
                Severity::Warning,
                format!("{} fallbacks", state.fallbacks),
            ));
        }
        if let Some(hit_rate) = state.hit_rate()
            && hit_rate < self.config.hit_rate_threshold
        {
            raised.push(self.alert(
                AlertKind::LowHitRate,
                Severity::Warning,
                format!("remote hit rate {:.2}%", hit_rate * 100.0),
            ));
        }

        for alert in &raised {
            tracing::warn!(kind = %alert.kind, message = %alert.message, "monitoring threshold exceeded");
            state.push_alert(alert.clone());
        }
        raised
    }

    /// Critical past twice a threshold, degraded past it.
    pub fn overall_status(&self) -> OverallStatus {
        let state = self.lock();
        self.status_of(&state)
    }

    fn status_of(&self, state: &MonitorState) -> OverallStatus {
        let error_rate = state.error_rate();
        let latency = state.avg_latency_ms;
        let error_limit = self.config.error_rate_threshold;
        let latency_limit = self.config.latency_threshold_ms as f64;
        if error_rate > error_limit * 2.0 || latency > latency_limit * 2.0 {
            OverallStatus::Critical
        } else if error_rate > error_limit || latency > latency_limit {
            OverallStatus::Degraded
        } else {
            OverallStatus::Healthy
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let uptime = (self.clock.now() - self.started_at).num_seconds().max(0) as u64;
        let state = self.lock();
        let skip = state.alerts.len().saturating_sub(RECENT_ALERTS);
        MonitorSnapshot {
            enabled: self.config.enabled,
            uptime_seconds: uptime,
            total: state.total,
            succeeded: state.succeeded,
            failed: state.failed,
            success_rate: if state.total == 0 {
                0.0
            } else {
                state.succeeded as f64 / state.total as f64
            },
            avg_latency_ms: state.avg_latency_ms,
            p95_ms: state.percentile(95.0),
            p99_ms: state.percentile(99.0),
            remote_hits: state.remote_hits,
            remote_misses: state.remote_misses,
            remote_errors: state.remote_errors,
            fallbacks: state.fallbacks,
            hit_rate: state.hit_rate(),
            status: self.status_of(&state),
            recent_alerts: state.alerts.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn reset(&self) {
        *self.lock() = MonitorState::default();
    }

    #[cfg(test)]
    fn history_len(&self, category: OperationCategory) -> usize {
        self.lock().history.get(&category).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luni_core::ManualClock;

    fn monitor(enabled: bool) -> OperationMonitor {
        let config = MonitoringConfig {
            enabled,
            ..MonitoringConfig::default()
        };
        OperationMonitor::new(config, Arc::new(ManualClock::at_epoch_millis(0)))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn totals_and_average() {
        let m = monitor(true);
        m.track_operation(OperationCategory::Session, ms(10), None);
        m.track_operation(OperationCategory::Focus, ms(30), None);
        m.track_operation(OperationCategory::Focus, ms(20), Some("boom"));
        let snap = m.snapshot();
        assert_eq!((snap.total, snap.succeeded, snap.failed), (3, 2, 1));
        assert!((snap.avg_latency_ms - 20.0).abs() < 1e-9);
        assert_eq!(snap.recent_alerts.len(), 1);
        assert_eq!(snap.recent_alerts[0].kind, AlertKind::OperationFailed);
    }

    #[test]
    fn percentiles_use_ceiling_rank() {
        let m = monitor(true);
        for i in 1..=100 {
            m.track_operation(OperationCategory::Session, ms(i), None);
        }
        let snap = m.snapshot();
        assert!((snap.p95_ms - 95.0).abs() < 1e-9);
        assert!((snap.p99_ms - 99.0).abs() < 1e-9);
    }

    #[test]
    fn history_compacts_past_cap() {
        let m = monitor(true);
        for _ in 0..=HISTORY_CAP {
            m.track_operation(OperationCategory::Variables, ms(1), None);
        }
        assert_eq!(m.history_len(OperationCategory::Variables), HISTORY_KEEP);
    }

    #[test]
    fn disabled_monitor_records_nothing() {
        let m = monitor(false);
        m.track_operation(OperationCategory::Session, ms(500), Some("x"));
        m.track_fallback();
        let snap = m.snapshot();
        assert_eq!(snap.total, 0);
        assert!(snap.recent_alerts.is_empty());
        assert!(m.check_thresholds().is_empty());
    }

    #[test]
    fn status_follows_thresholds() {
        let m = monitor(true);
        assert_eq!(m.overall_status(), OverallStatus::Healthy);

        m.track_operation(OperationCategory::Session, ms(70), None);
        assert_eq!(m.overall_status(), OverallStatus::Degraded);

        m.track_operation(OperationCategory::Session, ms(300), None);
        assert_eq!(m.overall_status(), OverallStatus::Critical);
    }

    #[test]
    fn thresholds_raise_alerts() {
        let m = monitor(true);
        for _ in 0..11 {
            m.track_fallback();
        }
        m.track_remote_miss();
        m.track_operation(OperationCategory::Focus, ms(1), Some("down"));

        let kinds: Vec<AlertKind> = m.check_thresholds().into_iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&AlertKind::HighErrorRate));
        assert!(kinds.contains(&AlertKind::ManyFallbacks));
        assert!(kinds.contains(&AlertKind::LowHitRate));
        assert!(!kinds.contains(&AlertKind::HighLatency));
        assert_eq!(m.snapshot().recent_alerts.len(), RECENT_ALERTS);
    }
}
