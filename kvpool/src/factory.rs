//! # Connection Factory
//!
//! Purpose: Open, authenticate, and tear down individual store sessions on
//! behalf of a pool.
//!
//! ## Design Principles
//! 1. **One Creation In Flight**: An atomic guard rejects overlapping
//!    creations for the same pool instead of opening duplicate connections.
//! 2. **Single Completion Signal**: `create` resolves once the session is
//!    ready or fails once it is not; no persistent event listeners.
//! 3. **Cache-Friendly Buffers**: Each connection reuses its own encode and
//!    line buffers across commands.
//! 4. **Quiet Teardown**: `destroy` never fails; a QUIT error on a dead peer
//!    is logged and ignored.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{PoolError, PoolResult};
use crate::resp::{encode_command, read_value, Value};

/// A live session to the backing store with reusable buffers.
pub struct Connection {
    // Buffered reads; writes go straight to the socket.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    async fn open(config: &StoreConfig) -> PoolResult<Self> {
        let addr: SocketAddr = config
            .addr
            .parse()
            .map_err(|_| PoolError::InvalidAddress(config.addr.clone()))?;

        let stream = match config.connect_timeout {
            Some(limit) => timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| PoolError::Connection(std::io::ErrorKind::TimedOut.into()))??,
            None => TcpStream::connect(addr).await?,
        };
        // Small request/reply payloads; Nagle only adds latency here.
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        };
        if let Some(password) = &config.password {
            conn.authenticate(password).await?;
        }
        Ok(conn)
    }

    async fn authenticate(&mut self, password: &str) -> PoolResult<()> {
        match self.exec(&[b"AUTH", password.as_bytes()]).await? {
            Value::Simple(_) => Ok(()),
            Value::Error(message) => Err(PoolError::Auth(
                String::from_utf8_lossy(&message).into_owned(),
            )),
            _ => Err(PoolError::UnexpectedResponse),
        }
    }

    /// Sends one command and reads exactly one reply.
    pub(crate) async fn exec(&mut self, args: &[&[u8]]) -> PoolResult<Value> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf).await?;

        read_value(&mut self.reader, &mut self.line_buf).await
    }
}

/// Creates and destroys pool connections, one creation at a time.
pub struct ConnectionFactory {
    config: StoreConfig,
    creating: AtomicBool,
}

impl ConnectionFactory {
    pub fn new(config: StoreConfig) -> Self {
        ConnectionFactory {
            config,
            creating: AtomicBool::new(false),
        }
    }

    /// Opens one new connection to the configured store.
    ///
    /// Fails fast with [`PoolError::ConcurrentInitialization`] if another
    /// creation for this pool is still in flight. The pool serializes its own
    /// growth, so tripping this guard means the documented initialization
    /// order was bypassed.
    pub async fn create(&self) -> PoolResult<Connection> {
        if self.creating.swap(true, Ordering::AcqRel) {
            return Err(PoolError::ConcurrentInitialization);
        }
        let _guard = CreationGuard(&self.creating);

        let result = Connection::open(&self.config).await;
        match &result {
            Ok(_) => debug!(addr = %self.config.addr, "connection established"),
            Err(err) => debug!(addr = %self.config.addr, %err, "connection attempt failed"),
        }
        result
    }

    /// Closes a connection gracefully.
    ///
    /// A QUIT failure means the peer is already gone and is not actionable.
    pub async fn destroy(&self, mut conn: Connection) {
        match conn.exec(&[b"QUIT"]).await {
            Ok(_) => debug!(addr = %self.config.addr, "connection closed"),
            Err(err) => {
                debug!(addr = %self.config.addr, %err, "ignoring error while closing connection")
            }
        }
    }
}

// Clears the in-flight flag even when the creation future is dropped.
struct CreationGuard<'a>(&'a AtomicBool);

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
