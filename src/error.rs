//! Error types for the push channel and the replicated store.
//!
//! The [`Result`] type alias provides a shorthand for operations that may fail.
//!
//! # Error Categories
//!
//! | Category | Variants | Fatal to the request |
//! |----------|----------|----------------------|
//! | Push | `UnknownClient` | Yes (HTTP 501, client reconnects) |
//! | Store | `BadDomain`, `MalformedMessage` | Depends (whole-request vs. per-message) |
//! | Concurrency | `CollisionCreate`, `CollisionUpdate`, `CollisionDelete` | No (reported, message skipped) |
//! | Ambient | `Io`, `Json`, `Db`, `Config` | Yes |
//!
//! Collisions are the normal outcome of optimistic concurrency and are never
//! surfaced to the sending client as a request failure; they are reported
//! through the `on_collision` hook and the offending message is dropped.

use std::io;
use thiserror::Error;

/// Result type for push and store operations.
pub type Result<T> = std::result::Result<T, CometDictError>;

/// Errors that can occur in the push channel or the replicated store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CometDictError {
    /// A push operation referenced a client id that is not registered.
    ///
    /// Maps to HTTP 501; the browser is expected to reconnect.
    #[error("unknown client: {0}")]
    UnknownClient(String),

    /// A domain name failed validation.
    ///
    /// Domain names must match `[A-Za-z0-9_.]+` and must not be `_`,
    /// so that they are safe to use as file names.
    #[error("invalid domain name: {0:?}")]
    BadDomain(String),

    /// A message was missing a required field, carried an unknown command,
    /// or the request body was not a JSON array.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A `create` targeted a key that already exists.
    #[error("create collision on {domain}/{key}")]
    CollisionCreate { domain: String, key: String },

    /// An `update` targeted a missing key or carried a stale `previous_version`.
    #[error("update collision on {domain}/{key}")]
    CollisionUpdate { domain: String, key: String },

    /// A `delete` targeted a key that does not exist.
    #[error("delete collision on {domain}/{key}")]
    CollisionDelete { domain: String, key: String },

    /// Network or filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Durable store error.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal signalling value used while draining workers.
    ///
    /// Never surfaced through the HTTP layer.
    #[error("shutting down")]
    Shutdown,
}

impl CometDictError {
    /// Check whether this error is an optimistic-concurrency collision.
    ///
    /// Collisions are reported via the `on_collision` hook and skipped;
    /// they never fail the surrounding batch.
    #[inline]
    #[must_use]
    pub fn is_collision(&self) -> bool {
        matches!(
            self,
            CometDictError::CollisionCreate { .. }
                | CometDictError::CollisionUpdate { .. }
                | CometDictError::CollisionDelete { .. }
        )
    }
}
