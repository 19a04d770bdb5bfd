//! # Pool Registry
//!
//! Hands out one shared client per identifier, so unrelated parts of an
//! application reuse the same pool instead of creating duplicates. The
//! registry is an owned object: construct one per application (or per test)
//! and pass it where pools are needed; there is no hidden process-global.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::debug;

use crate::client::PoolClient;
use crate::config::ClientConfig;
use crate::error::PoolResult;

/// Registry mapping identifiers to shared pooled clients.
#[derive(Default)]
pub struct PoolRegistry {
    clients: Mutex<HashMap<String, PoolClient>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        PoolRegistry {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the client registered under `id`, creating and initializing it
    /// on first use.
    ///
    /// The map lock is held across initialization, so concurrent calls for
    /// one identifier serialize and trigger exactly one initialization; the
    /// losers observe the winner's entry. `config` only matters on the call
    /// that creates the pool; later calls get the existing client unchanged.
    pub async fn get_or_create(&self, id: &str, config: ClientConfig) -> PoolResult<PoolClient> {
        let mut clients = self.clients.lock().await;
        if let Some(existing) = clients.get(id) {
            return Ok(existing.clone());
        }

        let client = PoolClient::new(config);
        // Register only after initialization succeeds; a failed pool is not
        // worth caching, and the next call retries from scratch.
        client.pool().initialize().await?;
        clients.insert(id.to_string(), client.clone());
        debug!(pool = id, "registered new connection pool");
        Ok(client)
    }

    /// Unregisters and returns the client under `id`, if any.
    ///
    /// Shutdown of the returned client stays with the caller; clones held
    /// elsewhere keep working until then.
    pub async fn remove(&self, id: &str) -> Option<PoolClient> {
        self.clients.lock().await.remove(id)
    }

    /// Shuts down every registered client and empties the registry.
    pub async fn shutdown_all(&self) {
        let clients: Vec<(String, PoolClient)> = self.clients.lock().await.drain().collect();
        for (id, client) in clients {
            debug!(pool = %id, "shutting down pool");
            client.shutdown().await;
        }
    }
}
