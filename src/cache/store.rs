//! Key-value store abstraction consumed by the read-through cache

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// A key-value store with per-entry expiry
///
/// Implementations report an unreachable or failing backend as
/// [`crate::Error::StoreUnavailable`]; a missing or expired key is `Ok(None)`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the raw value stored under `key`, if present and unexpired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value, expiring after `ttl`
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Short backend name for logs and health output
    fn backend_type(&self) -> &'static str;
}
