// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Luni conversational state store.
//!
//! This crate provides the trait definitions, error type, and the data model
//! (sessions, focus records, variables) shared by every backend. The focus
//! merge rules live here as pure functions so each backend applies the same
//! semantics.

pub mod clock;
pub mod error;
pub mod focus;
pub mod session;
pub mod traits;
pub mod types;
pub mod variable;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LuniError;
pub use focus::{FocusPolicy, FocusRecord};
pub use session::{Session, SessionMessage, SessionUpdate};
pub use types::{AdapterType, BackendKind, HealthStatus, LockAcquisition, LockOutcome};
pub use variable::{Variable, VariablesFile};

pub use traits::{FocusStore, PluginAdapter, SessionStore, with_lock};
