//! Redis-backed key-value store
//!
//! Entries are written with `PSETEX` so Redis owns expiry. The multiplexed
//! connection is opened on first use and shared by all commands, which lets the
//! service start while Redis is down and report the outage per request instead.
//! A connection that fails with an I/O error is dropped and reopened by the
//! next command.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::{Client, RedisError, aio::MultiplexedConnection};
use tokio::time::timeout;
use tracing::{info, warn};

use super::store::KeyValueStore;
use crate::{Error, Result};

/// Redis store for cached payloads shared across service instances
pub struct RedisStore {
    client: Client,
    connect_timeout: Duration,
    /// Shared connection, `None` until first use or after a broken one is dropped
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Create a store for the given Redis URL without connecting
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not a valid Redis URL.
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {e}")))?;

        info!(
            addr = %client.get_connection_info().addr,
            "Redis store configured"
        );

        Ok(Self {
            client,
            connect_timeout,
            connection: Mutex::new(None),
        })
    }

    /// Verify that Redis answers `PING`
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if Redis cannot be reached.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.command_failed(&e, "ping"))?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(Error::StoreUnavailable(format!(
                "redis ping returned unexpected reply '{pong}'"
            )))
        }
    }

    /// Whether a shared connection is currently held
    fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// Clone the shared connection, opening it within the connect timeout if needed
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let cached = self.connection.lock().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let conn = timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            Error::StoreUnavailable(format!(
                "timed out connecting to redis after {}ms",
                self.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| Error::StoreUnavailable(format!("failed to connect to redis: {e}")))?;

        // Racing first callers may each connect; the last one is kept
        *self.connection.lock() = Some(conn.clone());
        Ok(conn)
    }

    /// Map a command error, dropping the shared connection if it is broken
    fn command_failed(&self, error: &RedisError, command: &str) -> Error {
        if error.is_io_error() || error.is_connection_dropped() {
            self.connection.lock().take();
        }
        Error::StoreUnavailable(format!("redis {command} failed: {error}"))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Redis GET failed");
                self.command_failed(&e, "get")
            })?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.connection().await?;

        let (): () = redis::cmd("PSETEX")
            .arg(key)
            .arg(millis)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Redis PSETEX failed");
                self.command_failed(&e, "set")
            })?;

        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = RedisStore::new("not-a-redis-url", Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_construction_does_not_connect() {
        // Port 1 is never a Redis server; construction must still succeed
        let store = RedisStore::new("redis://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        assert_eq!(store.backend_type(), "redis");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_store_unavailable() {
        let store = RedisStore::new("redis://127.0.0.1:1", Duration::from_millis(500)).unwrap();

        let get = store.get("lms:users").await;
        assert!(matches!(get, Err(Error::StoreUnavailable(_))));

        let set = store.set("lms:users", b"{}", Duration::from_secs(1)).await;
        assert!(matches!(set, Err(Error::StoreUnavailable(_))));

        assert!(matches!(store.ping().await, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_failed_connect_is_retried_by_next_command() {
        let store = RedisStore::new("redis://127.0.0.1:1", Duration::from_millis(300)).unwrap();
        assert!(!store.is_connected());

        assert!(store.connection().await.is_err());
        assert!(!store.is_connected());

        // Nothing broken is cached, so the next command attempts a fresh connect
        let err = store.get("lms:users").await.unwrap_err();
        assert!(err.to_string().contains("redis"), "got: {err}");
        assert!(!store.is_connected());
    }
}
