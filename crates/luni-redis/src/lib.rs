// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote backend for Luni.
//!
//! [`RedisConnector`] owns the connection to a Redis-compatible service and
//! exposes it through the [`RemoteCache`] seam. The session and focus stores
//! are written against that seam, so they run unchanged on any
//! implementation of it.

pub mod connector;
pub mod focus;
pub mod keys;
pub mod remote;
pub mod session;

pub use connector::{RedisConnector, backoff_delay};
pub use focus::RedisFocusStore;
pub use keys::KeySpace;
pub use remote::RemoteCache;
pub use session::{RedisSessionStore, RemoteSessionOptions};
