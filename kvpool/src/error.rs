//! # Error Taxonomy
//!
//! One flat error type for everything the pool and its command facade can
//! surface, so callers match on a single enum.

use std::io;

use thiserror::Error;

/// Result type used across the crate.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the pool, factory, registry, and command facade.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The transport failed to establish or maintain a connection.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The store rejected the session during setup (failed AUTH).
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// A second connection creation was attempted while one was in flight.
    ///
    /// Fatal to that creation attempt, not to the pool.
    #[error("connection creation already in flight")]
    ConcurrentInitialization,

    /// The pool has been shut down; no further operations are accepted.
    #[error("pool is closed")]
    Closed,

    /// The store rejected a specific command.
    #[error("command error: {0}")]
    Command(String),

    /// Response framing violated the wire protocol.
    #[error("protocol error in server response")]
    Protocol,

    /// The reply type did not match the command that was issued.
    #[error("unexpected response type")]
    UnexpectedResponse,

    /// The configured address could not be parsed.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),
}
