// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store adapter facade for Luni.
//!
//! Build a [`StoreAdapter`] once at startup and pass it to request handlers.
//! It picks the remote or file backend, forwards session, focus and variable
//! operations, and records per-operation telemetry in an
//! [`OperationMonitor`] and the metrics facade.

pub mod adapter;
pub mod backend;
pub mod monitor;

pub use adapter::{
    DEFAULT_MESSAGE_LIMIT, SessionHandle, StorageInfo, StoreAdapter, StoreHealth, StoreMetrics,
    SweepReport,
};
pub use monitor::{Alert, AlertKind, MonitorSnapshot, OperationCategory, OperationMonitor, OverallStatus};
