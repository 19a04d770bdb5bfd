//! # Pooled Command Facade
//!
//! Purpose: Expose store commands as typed methods; every call checks a
//! connection out, runs exactly one command, and checks it back in.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `PoolClient` hides pooling and protocol details.
//! 2. **Scoped Acquisition**: The connection is released on success and
//!    failure alike; a failing command never leaks pool capacity.
//! 3. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 4. **Raw Passthrough**: Replies are decoded to their natural shape and
//!    nothing more; `send_command` returns the wire value untouched.

use std::time::Duration;

use crate::config::{ClientConfig, PoolConfig};
use crate::error::{PoolError, PoolResult};
use crate::pool::{ConnectionPool, PoolStatus};
use crate::resp::Value;

/// TTL state reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the given duration.
    ExpiresIn(Duration),
}

/// Pooled store client.
///
/// Cloning is cheap and clones share the same pool. Obtain shared instances
/// through [`crate::PoolRegistry::get_or_create`].
#[derive(Clone)]
pub struct PoolClient {
    pool: ConnectionPool,
}

impl PoolClient {
    /// Creates a client and its pool from facade configuration.
    ///
    /// The pool is not initialized here; the registry does that, or call
    /// [`ConnectionPool::initialize`] directly.
    pub fn new(config: ClientConfig) -> Self {
        PoolClient {
            pool: ConnectionPool::new(PoolConfig {
                max_total: config.max_clients,
                store: config.store,
            }),
        }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Occupancy snapshot of the underlying pool.
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Drains in-flight commands, then destroys every pooled connection.
    ///
    /// Later calls fail with [`PoolError::Closed`].
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Fetches a value. `Ok(None)` when the key is missing.
    pub async fn get(&self, key: &[u8]) -> PoolResult<Option<Vec<u8>>> {
        match self.command(&[b"GET", key]).await? {
            Value::Bulk(data) => Ok(data),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    /// Stores a value without expiration.
    pub async fn set(&self, key: &[u8], value: &[u8]) -> PoolResult<()> {
        match self.command(&[b"SET", key, value]).await? {
            Value::Simple(_) => Ok(()),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    /// Stores a value that expires after `ttl`.
    pub async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> PoolResult<()> {
        let seconds = ttl.as_secs().to_string();
        match self
            .command(&[b"SET", key, value, b"EX", seconds.as_bytes()])
            .await?
        {
            Value::Simple(_) => Ok(()),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    /// Deletes a key, returning how many keys were removed.
    ///
    /// Deleting a missing key reports zero; it is not an error.
    pub async fn del(&self, key: &[u8]) -> PoolResult<u64> {
        self.non_negative(&[b"DEL", key]).await
    }

    /// Sets a time-to-live on a key. Returns whether the key existed.
    pub async fn expire(&self, key: &[u8], ttl: Duration) -> PoolResult<bool> {
        let seconds = ttl.as_secs().to_string();
        Ok(self.integer(&[b"EXPIRE", key, seconds.as_bytes()]).await? == 1)
    }

    /// Remaining time-to-live of a key.
    pub async fn ttl(&self, key: &[u8]) -> PoolResult<KeyTtl> {
        match self.integer(&[b"TTL", key]).await? {
            -2 => Ok(KeyTtl::Missing),
            -1 => Ok(KeyTtl::NoExpiry),
            secs if secs >= 0 => Ok(KeyTtl::ExpiresIn(Duration::from_secs(secs as u64))),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    /// Increments the integer stored at `key`, returning the new value.
    pub async fn incr(&self, key: &[u8]) -> PoolResult<i64> {
        self.integer(&[b"INCR", key]).await
    }

    /// Lists keys matching a glob pattern.
    pub async fn keys(&self, pattern: &[u8]) -> PoolResult<Vec<Vec<u8>>> {
        match self.command(&[b"KEYS", pattern]).await? {
            Value::Array(Some(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Bulk(Some(data)) => Ok(data),
                    _ => Err(PoolError::UnexpectedResponse),
                })
                .collect(),
            Value::Array(None) => Ok(Vec::new()),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    /// Fetches one hash field. `Ok(None)` when the field is missing.
    pub async fn hget(&self, key: &[u8], field: &[u8]) -> PoolResult<Option<Vec<u8>>> {
        match self.command(&[b"HGET", key, field]).await? {
            Value::Bulk(data) => Ok(data),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    /// Sets one hash field, returning how many new fields were created.
    pub async fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> PoolResult<u64> {
        self.non_negative(&[b"HSET", key, field, value]).await
    }

    /// Fetches all fields and values of a hash.
    pub async fn hgetall(&self, key: &[u8]) -> PoolResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let items = match self.command(&[b"HGETALL", key]).await? {
            Value::Array(Some(items)) => items,
            Value::Array(None) => return Ok(Vec::new()),
            _ => return Err(PoolError::UnexpectedResponse),
        };
        if items.len() % 2 != 0 {
            return Err(PoolError::UnexpectedResponse);
        }

        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            match (field, value) {
                (Value::Bulk(Some(f)), Value::Bulk(Some(v))) => pairs.push((f, v)),
                _ => return Err(PoolError::UnexpectedResponse),
            }
        }
        Ok(pairs)
    }

    /// Removes hash fields, returning how many were deleted.
    pub async fn hdel(&self, key: &[u8], fields: &[&[u8]]) -> PoolResult<u64> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(fields.len() + 2);
        args.push(b"HDEL");
        args.push(key);
        args.extend_from_slice(fields);
        self.non_negative(&args).await
    }

    /// Pushes a value onto the head of a list, returning the new length.
    pub async fn lpush(&self, key: &[u8], value: &[u8]) -> PoolResult<u64> {
        self.non_negative(&[b"LPUSH", key, value]).await
    }

    /// Pushes a value onto the tail of a list, returning the new length.
    pub async fn rpush(&self, key: &[u8], value: &[u8]) -> PoolResult<u64> {
        self.non_negative(&[b"RPUSH", key, value]).await
    }

    /// Pops from the head of a list, waiting until an element appears.
    ///
    /// The wait is unbounded by convention, and it ties up one pooled
    /// connection for its whole duration.
    pub async fn blpop(&self, key: &[u8]) -> PoolResult<Option<(Vec<u8>, Vec<u8>)>> {
        self.blocking_pop(b"BLPOP", key).await
    }

    /// Pops from the tail of a list, waiting until an element appears.
    ///
    /// Same caveat as [`blpop`](Self::blpop): the connection is held until
    /// the store answers.
    pub async fn brpop(&self, key: &[u8]) -> PoolResult<Option<(Vec<u8>, Vec<u8>)>> {
        self.blocking_pop(b"BRPOP", key).await
    }

    /// Pings the store, returning the reply payload.
    pub async fn ping(&self, payload: Option<&[u8]>) -> PoolResult<Vec<u8>> {
        let value = match payload {
            Some(data) => self.command(&[b"PING", data]).await?,
            None => self.command(&[b"PING"]).await?,
        };
        match value {
            Value::Simple(text) => Ok(text),
            Value::Bulk(Some(data)) => Ok(data),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    /// Forwards an arbitrary command verbatim and returns the raw reply.
    ///
    /// Nothing is validated here; a malformed command comes back as a
    /// [`PoolError::Command`] from the store.
    pub async fn send_command(&self, name: &str, args: &[&[u8]]) -> PoolResult<Value> {
        let mut full: Vec<&[u8]> = Vec::with_capacity(args.len() + 1);
        full.push(name.as_bytes());
        full.extend_from_slice(args);
        self.command(&full).await
    }

    async fn blocking_pop(
        &self,
        command: &[u8],
        key: &[u8],
    ) -> PoolResult<Option<(Vec<u8>, Vec<u8>)>> {
        match self.command(&[command, key, b"0"]).await? {
            Value::Array(Some(items)) if items.len() == 2 => {
                let mut iter = items.into_iter();
                match (iter.next(), iter.next()) {
                    (Some(Value::Bulk(Some(k))), Some(Value::Bulk(Some(v)))) => Ok(Some((k, v))),
                    _ => Err(PoolError::UnexpectedResponse),
                }
            }
            Value::Array(None) | Value::Bulk(None) => Ok(None),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    // acquire -> execute one command -> release; the release happens when
    // the pooled connection drops, error or not.
    async fn command(&self, args: &[&[u8]]) -> PoolResult<Value> {
        let mut conn = self.pool.acquire().await?;
        match conn.exec(args).await? {
            Value::Error(message) => Err(PoolError::Command(
                String::from_utf8_lossy(&message).into_owned(),
            )),
            value => Ok(value),
        }
    }

    async fn integer(&self, args: &[&[u8]]) -> PoolResult<i64> {
        match self.command(args).await? {
            Value::Integer(value) => Ok(value),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    async fn non_negative(&self, args: &[&[u8]]) -> PoolResult<u64> {
        match self.integer(args).await? {
            value if value >= 0 => Ok(value as u64),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }
}
