// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Luni integration tests.
//!
//! Provides an in-memory remote cache and a harness that builds a complete
//! store adapter without external services.
//!
//! # Components
//!
//! - [`MockRemoteCache`] - Redis stand-in with clock-driven expiry and outage toggling
//! - [`TestHarness`] - Store adapter over a temp directory and a [`ManualClock`]

pub mod harness;
pub mod mock_remote;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use luni_core::ManualClock;
pub use mock_remote::MockRemoteCache;
