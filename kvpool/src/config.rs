//! # Configuration
//!
//! Immutable configuration for the pool and the facade. The store parameters
//! are opaque to the pool itself; only the connection factory reads them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backing-store connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Optional password sent via AUTH right after connecting.
    pub password: Option<String>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            addr: "127.0.0.1:6379".to_string(),
            password: None,
            connect_timeout: None,
        }
    }
}

/// Pool-level configuration, fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Parameters handed to the connection factory.
    pub store: StoreConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_total: 30,
            store: StoreConfig::default(),
        }
    }
}

/// Facade-level configuration accepted by [`crate::PoolClient`] and the
/// registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum connections the client's pool may hold.
    pub max_clients: usize,
    /// Backing-store parameters.
    pub store: StoreConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            max_clients: 5,
            store: StoreConfig::default(),
        }
    }
}
