// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable local storage for Luni.
//!
//! Everything here persists through [`JsonFileStore`], which writes
//! atomically and recovers unreadable documents from their backups. On top
//! of it sit the per-client [`VariableStore`] and the file-backed session
//! and focus stores that serve as the fallback backend.

pub mod focus;
pub mod json_file;
pub mod session;
pub mod variables;

pub use focus::FileFocusStore;
pub use json_file::JsonFileStore;
pub use session::{FileSessionOptions, FileSessionStore, Freshness, NewSessionReason};
pub use variables::VariableStore;
