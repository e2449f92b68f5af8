// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Backends implement the [`PluginAdapter`] base trait plus one store trait,
//! using `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod focus;
pub mod session;

pub use adapter::PluginAdapter;
pub use focus::FocusStore;
pub use session::{SessionStore, with_lock};
