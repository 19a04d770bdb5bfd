//! # kvpool
//!
//! Purpose: A managed pool of connections to a Redis-compatible key-value
//! store with a typed command facade, so callers never acquire or release a
//! connection themselves.
//!
//! ## Design Principles
//! 1. **Scoped Acquisition**: Every command checks a connection out and back
//!    in; failures never leak pool capacity.
//! 2. **Fair Waiting**: A full pool suspends acquirers in arrival order
//!    instead of failing or starving them.
//! 3. **One Pool Per Identifier**: [`PoolRegistry`] hands the same client to
//!    every caller using the same identifier, with exactly one
//!    initialization.
//! 4. **Graceful Shutdown**: Drain first, destroy after; an in-flight
//!    command is never interrupted.

mod client;
mod config;
mod error;
mod factory;
mod pool;
mod registry;
mod resp;

pub use client::{KeyTtl, PoolClient};
pub use config::{ClientConfig, PoolConfig, StoreConfig};
pub use error::{PoolError, PoolResult};
pub use factory::{Connection, ConnectionFactory};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use registry::PoolRegistry;
pub use resp::Value;
