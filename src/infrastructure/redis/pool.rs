//! Redis connection pool for the device store.

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

/// Error type for Redis pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Connection not available
    #[error("Connection not available: {0}")]
    ConnectionUnavailable(String),
}

/// Redis connection pool for data operations.
///
/// Holds one multiplexed connection shared across tasks, established
/// lazily on first use and re-established after an I/O failure.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisPool {
    pub fn new(config: &RedisConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
        })
    }

    /// Get a connection, establishing one if none exists.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.connect().await
    }

    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut conn_guard = self.connection.write().await;

        // Another task may have connected while we waited for the lock
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                tracing::info!("Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Drop the cached connection so the next call reconnects.
    async fn reset(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
    }

    /// Run a command against a pooled connection.
    ///
    /// I/O failures drop the cached connection before the error is returned.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() {
                    tracing::warn!(error = %e, "Redis connection lost, resetting");
                    self.reset().await;
                }
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Check connectivity with a PING.
    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}
