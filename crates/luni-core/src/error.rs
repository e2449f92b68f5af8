// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Luni state store.

use thiserror::Error;

/// The primary error type used across all Luni stores and adapters.
#[derive(Debug, Error)]
pub enum LuniError {
    /// Configuration errors (invalid values, unusable backend settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Local storage errors (file I/O, directory creation).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote cache errors (connection refused, command failure).
    #[error("remote cache error: {message}")]
    Remote {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A write operation targeted a client without a live session.
    #[error("no live session for client {client_id}")]
    SessionNotFound { client_id: String },

    /// A variable key collides with a name the document reserves.
    #[error("variable key `{key}` is reserved")]
    ReservedKey { key: String },

    /// Neither the remote nor the local backend is available.
    #[error("no storage backend initialized")]
    NoBackend,

    /// Adapter health check failed.
    #[error("health check failed for {name}: {source}")]
    HealthCheckFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LuniError {
    /// Wrap an I/O error as a storage error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// The remote backend has no open connection.
    pub fn remote_unavailable() -> Self {
        Self::Remote {
            message: "not connected".into(),
            source: None,
        }
    }

    /// Build a remote error with an underlying cause.
    pub fn remote(
        message: impl Into<String>,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Remote {
            message: message.into(),
            source: Some(Box::new(err)),
        }
    }

    /// Whether this error came from the remote cache connection.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::Timeout { .. })
    }
}
