//! # Connection Pool
//!
//! Purpose: Bounded, fair checkout of store connections with a drain-first
//! shutdown path.
//!
//! ## Design Principles
//! 1. **Waiters Suspend, Never Spin**: A fair semaphore queues acquirers in
//!    arrival order; a full pool suspends the caller instead of failing.
//! 2. **Minimal Locking**: The mutex is held only while moving connections
//!    between the idle and in-use sets.
//! 3. **RAII Release**: Dropping a checked-out connection returns it (or its
//!    slot, if the connection died) to the pool on every path.
//! 4. **Drain Before Destroy**: Shutdown waits for in-flight commands to
//!    finish; it never interrupts one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::factory::{Connection, ConnectionFactory};
use crate::resp::Value;

/// Pool lifecycle phase.
///
/// `Draining` rejects new acquisitions while in-use connections finish;
/// `Closed` additionally means the idle set has been destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Initializing,
    Ready,
    Draining,
    Closed,
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections sitting idle in the pool.
    pub idle: usize,
    /// Connections currently executing a command.
    pub in_use: usize,
    /// Configured maximum (idle + in-use).
    pub max_total: usize,
}

struct PoolState {
    phase: Phase,
    idle: VecDeque<Connection>,
    in_use: usize,
}

struct PoolInner {
    factory: ConnectionFactory,
    max_total: usize,
    state: Mutex<PoolState>,
    slots: Arc<Semaphore>,
    // Serializes growth so concurrent acquires never race the factory guard.
    create_lock: tokio::sync::Mutex<()>,
}

/// Bounded pool of store connections.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates an uninitialized pool. No connection is opened yet.
    pub fn new(config: PoolConfig) -> Self {
        let max_total = config.max_total.max(1);
        ConnectionPool {
            inner: Arc::new(PoolInner {
                factory: ConnectionFactory::new(config.store),
                max_total,
                state: Mutex::new(PoolState {
                    phase: Phase::Uninitialized,
                    idle: VecDeque::with_capacity(max_total),
                    in_use: 0,
                }),
                slots: Arc::new(Semaphore::new(max_total)),
                create_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Establishes the first connection and marks the pool ready.
    ///
    /// Exactly one initialization runs per pool: a concurrent call fails with
    /// [`PoolError::ConcurrentInitialization`], and calling again once ready
    /// is a no-op.
    pub async fn initialize(&self) -> PoolResult<()> {
        {
            let mut state = self.lock_state();
            match state.phase {
                Phase::Uninitialized => state.phase = Phase::Initializing,
                Phase::Initializing => return Err(PoolError::ConcurrentInitialization),
                Phase::Ready => return Ok(()),
                Phase::Draining | Phase::Closed => return Err(PoolError::Closed),
            }
        }

        let _growth = self.inner.create_lock.lock().await;
        match self.inner.factory.create().await {
            Ok(conn) => {
                let mut state = self.lock_state();
                state.idle.push_back(conn);
                // Shutdown may have raced the initialization; leave its phase
                // alone so the warm connection is destroyed by clear().
                if state.phase == Phase::Initializing {
                    state.phase = Phase::Ready;
                }
                Ok(())
            }
            Err(err) => {
                let mut state = self.lock_state();
                if state.phase == Phase::Initializing {
                    state.phase = Phase::Uninitialized;
                }
                Err(err)
            }
        }
    }

    /// Checks out a connection, suspending until a slot is free.
    ///
    /// Waiters are served in arrival order. The call fails only when the pool
    /// is shut down or when growing the pool fails; a momentarily full pool
    /// just suspends the caller.
    pub async fn acquire(&self) -> PoolResult<PooledConnection> {
        self.check_open()?;
        let permit = self
            .inner
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        // Shutdown may have started while this task waited for the permit.
        self.check_open()?;

        if let Some(conn) = self.checkout_idle() {
            return Ok(PooledConnection::new(self.inner.clone(), conn, permit));
        }

        // No idle connection: grow by one. Growth is serialized, so re-check
        // the idle set after taking the lock; a release may have landed.
        let _growth = self.inner.create_lock.lock().await;
        if let Some(conn) = self.checkout_idle() {
            return Ok(PooledConnection::new(self.inner.clone(), conn, permit));
        }
        let conn = self.inner.factory.create().await?;
        self.lock_state().in_use += 1;
        Ok(PooledConnection::new(self.inner.clone(), conn, permit))
    }

    /// Stops accepting acquisitions and waits for in-use connections to come
    /// back.
    pub async fn drain(&self) {
        {
            let mut state = self.lock_state();
            if state.phase == Phase::Closed {
                return;
            }
            if state.phase != Phase::Draining {
                info!("draining connection pool");
                state.phase = Phase::Draining;
            }
        }

        // Taking every slot waits for each outstanding connection to return.
        // The permits are dropped right away; the phase keeps new acquirers
        // out. An error here means the semaphore is already closed.
        if let Ok(all) = self
            .inner
            .slots
            .acquire_many(self.inner.max_total as u32)
            .await
        {
            drop(all);
        }
    }

    /// Destroys all idle connections and closes the pool for good.
    ///
    /// Any subsequent [`acquire`](Self::acquire) fails with
    /// [`PoolError::Closed`].
    pub async fn clear(&self) {
        let idle: Vec<Connection> = {
            let mut state = self.lock_state();
            state.phase = Phase::Closed;
            state.idle.drain(..).collect()
        };
        for conn in idle {
            self.inner.factory.destroy(conn).await;
        }
        // Queued waiters observe the closed pool instead of hanging.
        self.inner.slots.close();
        info!("connection pool closed");
    }

    /// Drains, then clears, strictly in that order.
    pub async fn shutdown(&self) {
        self.drain().await;
        self.clear().await;
    }

    /// Occupancy snapshot.
    pub fn status(&self) -> PoolStatus {
        let state = self.lock_state();
        PoolStatus {
            idle: state.idle.len(),
            in_use: state.in_use,
            max_total: self.inner.max_total,
        }
    }

    fn check_open(&self) -> PoolResult<()> {
        match self.lock_state().phase {
            Phase::Draining | Phase::Closed => Err(PoolError::Closed),
            _ => Ok(()),
        }
    }

    fn checkout_idle(&self) -> Option<Connection> {
        let mut state = self.lock_state();
        let conn = state.idle.pop_front()?;
        state.in_use += 1;
        Some(conn)
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.inner.state.lock().expect("pool mutex poisoned")
    }
}

/// A checked-out connection; returns to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection, permit: OwnedSemaphorePermit) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
            _permit: permit,
        }
    }

    /// Executes one command on the checked-out connection.
    ///
    /// A transport failure marks the connection dead so it is discarded on
    /// release instead of rejoining the idle set; capacity is freed either
    /// way.
    pub async fn exec(&mut self, args: &[&[u8]]) -> PoolResult<Value> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Err(PoolError::Closed),
        };
        let result = conn.exec(args).await;
        if matches!(
            result,
            Err(PoolError::Connection(_)) | Err(PoolError::Protocol)
        ) {
            self.valid = false;
        }
        result
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };
        let mut state = self.pool.state.lock().expect("pool mutex poisoned");
        state.in_use = state.in_use.saturating_sub(1);
        if self.valid && state.phase != Phase::Closed {
            state.idle.push_back(conn);
        }
        // Dead or closed: the connection drops here and the slot frees with
        // the permit.
    }
}
