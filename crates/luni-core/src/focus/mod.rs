// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Focus records: the per-client aggregate of extracted signals.

pub mod merge;
pub mod model;

pub use merge::{FocusPolicy, apply_update, normalize, prune_expired, valid_view};
pub use model::{
    ACTIVE_FOCUS_KEY, ContactInfo, FocusCategories, FocusCategory, FocusRecord, Mention,
    SchedulingAttempt, UndefinedItem,
};
