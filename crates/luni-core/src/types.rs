// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the stores and the facade.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

impl HealthStatus {
    /// Healthy or degraded both count as usable.
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unhealthy(_))
    }
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    SessionStore,
    FocusStore,
    RemoteCache,
    Observability,
}

/// Which physical backend is authoritative for this process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Shared remote cache service.
    Remote,
    /// Local durable files.
    Fallback,
}

impl BackendKind {
    /// Storage label reported to operators (`redis` or `files`).
    pub fn storage_label(self) -> &'static str {
        match self {
            Self::Remote => "redis",
            Self::Fallback => "files",
        }
    }
}

/// Result of trying to take a scoped lock, before any work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The lock key was set; the holder must release it.
    Acquired,
    /// Another holder owns the lock, or the session is gone.
    Contended,
    /// The backend cannot provide exclusion; work runs unguarded.
    Unsupported,
}

/// Outcome of a `with_lock` call.
///
/// Only [`LockOutcome::Exclusive`] means the work ran under real mutual
/// exclusion. [`LockOutcome::Unguarded`] ran the work without any lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome<T> {
    /// The lock was held while the work ran.
    Exclusive(T),
    /// The work ran without a lock (fallback backend or lock error).
    Unguarded(T),
    /// The lock was held elsewhere; the work did not run.
    Contended,
}

impl<T> LockOutcome<T> {
    /// `true` when the work was skipped because the lock was taken.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Contended)
    }

    /// `true` only when the work ran under a real lock.
    pub fn was_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive(_))
    }

    /// The work's result, if it ran.
    pub fn into_result(self) -> Option<T> {
        match self {
            Self::Exclusive(v) | Self::Unguarded(v) => Some(v),
            Self::Contended => None,
        }
    }
}
